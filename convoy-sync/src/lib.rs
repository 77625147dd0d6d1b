//! Convoy Sync - Resolution and Incremental Synchronization Engine
//!
//! The shared core behind every driver screen:
//!
//! - `groups`: unit -> vehicle -> groups -> forms/users, cache-first with
//!   transient-failure fallback
//! - `staleness`: last-modified markers decide when the indexes are refreshed
//! - `pagination`: live, paginated, merged message folder views
//! - `ack`: ordered, idempotent delivered/read acknowledgment
//! - `trash`: soft delete and permanent trash emptying
//!
//! Background refreshes run on the `supervisor`; engine signals go out on
//! the `events` bus.

pub mod ack;
pub mod engine;
pub mod events;
pub mod groups;
pub mod pagination;
pub mod staleness;
pub mod supervisor;
pub mod telemetry;
pub mod trash;

pub use ack::{AckOutcome, AckSequencer};
pub use engine::SyncEngine;
pub use events::{SyncEvent, SyncEvents};
pub use groups::{DriverView, FormResolution, GroupResolver, IndexResolution, Resolution, UserResolution};
pub use pagination::{
    BatchOutcome, FormTemplatePrefetcher, MessageAggregator, PageState, StoreTemplatePrefetcher,
};
pub use staleness::{StalenessCheck, StalenessGate};
pub use supervisor::{TaskHandle, TaskOutcome, TaskSupervisor};
pub use telemetry::{init_tracing, TelemetryConfig, TelemetryError};
pub use trash::TrashMover;
