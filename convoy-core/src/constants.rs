//! Constants for the Convoy sync engine
//!
//! Defaults for everything `SyncConfig::from_env` can override, plus the
//! fixed field names and flag values of the document layout.

// ============================================================================
// PAGINATION
// ============================================================================

/// Records fetched per message-list page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Hard upper bound accepted for a configured page size.
pub const MAX_PAGE_SIZE: usize = 500;

// ============================================================================
// ACKNOWLEDGMENTS
// ============================================================================

/// Delay between the delivered and read confirmations of the fallback path.
pub const DEFAULT_ACK_READ_DELAY_MS: u64 = 1000;

// ============================================================================
// FORM / USER FILTERS
// ============================================================================

/// Minimum `inUseBits` for a form to be offered to the driver.
pub const FORM_IN_USE_THRESHOLD: i64 = 1;

/// `driverOriginated` value marking a driver-originated form.
pub const DRIVER_ORIGINATED: i64 = 1;

// ============================================================================
// LOCAL PERSISTENCE
// ============================================================================

/// Default LMDB directory for staleness markers.
pub const DEFAULT_PREFERENCES_PATH: &str = "./convoy-prefs";

/// Default LMDB map size in megabytes.
pub const DEFAULT_PREFERENCES_MAX_SIZE_MB: usize = 4;

/// Local key for the "forms snapshot is empty" flag.
pub const PREF_FORMS_SNAPSHOT_EMPTY: &str = "snapshot_empty.forms";

/// Local key for the "users snapshot is empty" flag.
pub const PREF_USERS_SNAPSHOT_EMPTY: &str = "snapshot_empty.users";

// ============================================================================
// EVENTS / BULK DELETE
// ============================================================================

/// Capacity of the process-wide sync event channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Development base URL of the collection-delete service.
pub const DEFAULT_DELETE_SERVICE_URL: &str = "http://localhost:8085";

/// Request timeout for the collection-delete service.
pub const DEFAULT_DELETE_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// DOCUMENT FIELDS
// ============================================================================

pub const FIELD_UNIT_VEHICLE_ID: &str = "vid";
pub const FIELD_UNIT_CUSTOMER_ID: &str = "cid";
pub const FIELD_MEMBERSHIP_GROUPS: &str = "gid";
pub const FIELD_FORM_ID: &str = "formId";
pub const FIELD_FORM_CLASS: &str = "formClass";
pub const FIELD_FORM_NAME: &str = "name";
pub const FIELD_FORM_IN_USE_BITS: &str = "inUseBits";
pub const FIELD_FORM_DRIVER_ORIGINATED: &str = "driverOriginated";
pub const FIELD_USER_ID: &str = "uid";
pub const FIELD_USER_NAME: &str = "username";
pub const FIELD_USER_EMAIL: &str = "email";
pub const FIELD_USER_ACTIVE: &str = "active";
pub const FIELD_USER_ADDRESS_BOOK: &str = "addressBookEligible";
pub const FIELD_LAST_MODIFIED: &str = "lastModified";
pub const FIELD_ASN: &str = "asn";
pub const FIELD_CREATED_TIME: &str = "createdUnixTime";
pub const FIELD_IS_DELIVERED: &str = "isDelivered";
pub const FIELD_IS_READ: &str = "isRead";
pub const FIELD_PAYLOAD: &str = "payload";
pub const FIELD_ACK_EVENT: &str = "event";
pub const FIELD_ACK_SOURCE: &str = "source";
pub const FIELD_ACK_AT: &str = "at";
