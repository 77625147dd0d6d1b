//! Convoy Core - Identifiers, Records and Errors
//!
//! Pure data types shared by every other crate: store documents and paths,
//! decoded domain records, the error taxonomy and runtime configuration.
//! No I/O lives here.

pub mod config;
pub mod constants;
pub mod decode;
pub mod document;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod paths;

pub use config::SyncConfig;
pub use document::{Document, DocumentPath, Fields};
pub use entities::{
    FormDescriptor, FormEntry, FormSortKey, GroupFormIndex, GroupUserIndex, MessageRecord,
    StalenessMarker, UnitRecord, User, UserEntry,
};
pub use enums::{AckEventKind, AckSource, AckState, MarkerKind, MessageFolder, ReadMode};
pub use error::{
    Cancelled, ConfigError, ConvoyError, ConvoyResult, ParseError, PreferenceError, StoreError,
    StoreResult,
};
pub use identity::{
    now_unix_seconds, CustomerId, GroupId, ObcId, Timestamp, UnixSeconds, VehicleId,
    ALL_VEHICLES_GROUP_ID,
};
