//! Domain records decoded from store documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::constants::{DRIVER_ORIGINATED, FORM_IN_USE_THRESHOLD};
use crate::document::DocumentPath;
use crate::enums::{AckState, MarkerKind, MessageFolder};
use crate::identity::{CustomerId, GroupId, UnixSeconds, VehicleId};

// ============================================================================
// UNITS
// ============================================================================

/// A physical unit's resolution record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub vehicle_id: VehicleId,
    pub customer_id: CustomerId,
}

// ============================================================================
// FORMS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FormDescriptor {
    pub form_id: i64,
    pub form_class: i64,
    pub name: String,
}

/// A group form document before filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormEntry {
    pub descriptor: FormDescriptor,
    pub in_use_bits: i64,
    pub driver_originated: i64,
}

impl FormEntry {
    /// In use and driver-originated.
    pub fn is_visible_to_driver(&self) -> bool {
        self.in_use_bits >= FORM_IN_USE_THRESHOLD && self.driver_originated == DRIVER_ORIGINATED
    }
}

/// Synthetic ordering key used when merging form sets from several groups.
///
/// The integral part is the form id; the class is folded into the fraction
/// so the same id under two classes stays distinct.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormSortKey(pub f64);

impl FormSortKey {
    pub fn of(form: &FormDescriptor) -> Self {
        Self(form.form_id as f64 + (form.form_class.rem_euclid(100) as f64) / 100.0)
    }
}

impl Eq for FormSortKey {}

impl PartialOrd for FormSortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FormSortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Forms visible per group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFormIndex {
    pub by_group: BTreeMap<GroupId, BTreeSet<FormDescriptor>>,
}

impl GroupFormIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, group_id: GroupId, forms: impl IntoIterator<Item = FormDescriptor>) {
        self.by_group.entry(group_id).or_default().extend(forms);
    }

    /// True when no group contributed a form.
    pub fn is_empty(&self) -> bool {
        self.by_group.values().all(BTreeSet::is_empty)
    }

    /// Distinct forms across all groups.
    pub fn form_count(&self) -> usize {
        self.merged().len()
    }

    pub fn forms_for(&self, group_id: GroupId) -> Option<&BTreeSet<FormDescriptor>> {
        self.by_group.get(&group_id)
    }

    /// All groups' forms merged under their sort key; shared forms collapse.
    pub fn merged(&self) -> BTreeMap<FormSortKey, FormDescriptor> {
        self.by_group
            .values()
            .flatten()
            .map(|form| (FormSortKey::of(form), form.clone()))
            .collect()
    }
}

// ============================================================================
// USERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub active: bool,
}

/// A group user document before filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub user: User,
    pub address_book_eligible: bool,
}

/// Address-book users per group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUserIndex {
    pub by_group: BTreeMap<GroupId, BTreeSet<User>>,
}

impl GroupUserIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, group_id: GroupId, users: impl IntoIterator<Item = User>) {
        self.by_group.entry(group_id).or_default().extend(users);
    }

    pub fn is_empty(&self) -> bool {
        self.by_group.values().all(BTreeSet::is_empty)
    }

    /// Distinct users across all groups, keyed by user id.
    pub fn address_book(&self) -> BTreeMap<String, User> {
        self.by_group
            .values()
            .flatten()
            .map(|user| (user.id.clone(), user.clone()))
            .collect()
    }
}

// ============================================================================
// STALENESS MARKERS
// ============================================================================

/// Server and local last-modified values for one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessMarker {
    pub kind: MarkerKind,
    /// Zero when the server has no marker yet.
    pub server: UnixSeconds,
    /// Zero when this device never synced.
    pub local: UnixSeconds,
}

impl StalenessMarker {
    pub fn is_server_absent(&self) -> bool {
        self.server <= 0
    }

    pub fn is_behind(&self) -> bool {
        self.local < self.server
    }
}

// ============================================================================
// MESSAGES
// ============================================================================

/// One message of a folder, keyed for descending order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub folder: MessageFolder,
    pub path: DocumentPath,
    /// ASN for inbox, creation time for everything else.
    pub sort_key: i64,
    pub asn: Option<i64>,
    pub created_unix_time: Option<i64>,
    pub is_delivered: bool,
    pub is_read: bool,
    pub form_id: Option<i64>,
    pub form_class: Option<i64>,
    pub payload: Value,
}

impl MessageRecord {
    pub fn ack_state(&self) -> AckState {
        AckState::from_flags(self.is_delivered, self.is_read)
    }
}
