//! Identity types for units, vehicles and groups

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Server-side last-modified values are stored as whole seconds.
pub type UnixSeconds = i64;

/// Customer identifiers are opaque strings (e.g. "10119").
pub type CustomerId = String;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

numeric_id!(
    /// On-board computer id installed in a physical unit.
    ObcId
);
numeric_id!(
    /// Vehicle id a physical unit resolves to.
    VehicleId
);
numeric_id!(
    /// Dispatch group id.
    GroupId
);

/// Synthetic group every vehicle belongs to, so driver-originated forms stay
/// visible on vehicles with no explicit assignment.
pub const ALL_VEHICLES_GROUP_ID: GroupId = GroupId(-1);

impl GroupId {
    /// True for the all-vehicles sentinel.
    pub fn is_all_vehicles(self) -> bool {
        self == ALL_VEHICLES_GROUP_ID
    }
}

/// Current wall-clock time in whole seconds.
pub fn now_unix_seconds() -> UnixSeconds {
    Utc::now().timestamp()
}
