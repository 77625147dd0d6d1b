//! Group Resolution Cache
//!
//! Resolves a physical unit to its vehicle, the vehicle to its group
//! memberships, and each group to the forms and users a driver may see.
//! Every step reads cache-first (server when the cache is cold or the
//! caller forces it) and retries once against the cache on a transient
//! failure.
//!
//! Resolution never fails past its boundary: store and parse failures fold
//! into `ok = false` plus a log entry. Only cancellation escapes, as
//! `Err(Cancelled)`.

use std::collections::BTreeSet;
use std::sync::Arc;

use convoy_core::decode::{decode_form, decode_membership, decode_unit, decode_user};
use convoy_core::{
    paths, Cancelled, Document, DocumentPath, FormDescriptor, GroupFormIndex, GroupId,
    GroupUserIndex, ObcId, ParseError, StoreError, User, VehicleId, ALL_VEHICLES_GROUP_ID,
};
use convoy_storage::{FallbackReader, ReadPolicy, RemoteStore};
use tracing::{debug, info, warn};

/// Outcome of a resolution step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<T> {
    pub value: T,
    pub ok: bool,
}

impl<T> Resolution<T> {
    pub fn success(value: T) -> Self {
        Self { value, ok: true }
    }

    pub fn failed_with(value: T) -> Self {
        Self { value, ok: false }
    }

    pub fn into_parts(self) -> (T, bool) {
        (self.value, self.ok)
    }
}

impl<T: Default> Resolution<T> {
    pub fn failure() -> Self {
        Self::failed_with(T::default())
    }
}

/// Outcome of a per-group index resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexResolution<I> {
    pub index: I,
    pub ok: bool,
    /// Every group was answered by the server. False for an empty group set.
    pub all_from_server: bool,
}

impl<I: Default> IndexResolution<I> {
    fn failure() -> Self {
        Self {
            index: I::default(),
            ok: false,
            all_from_server: false,
        }
    }
}

pub type FormResolution = IndexResolution<GroupFormIndex>;
pub type UserResolution = IndexResolution<GroupUserIndex>;

/// The whole cascade for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverView {
    pub vehicle: Resolution<Option<VehicleId>>,
    pub groups: Resolution<BTreeSet<GroupId>>,
    pub forms: FormResolution,
    pub users: UserResolution,
}

impl DriverView {
    pub fn is_complete(&self) -> bool {
        self.vehicle.ok && self.groups.ok && self.forms.ok && self.users.ok
    }
}

type GroupDecoder<T> = fn(&Document) -> Result<Option<T>, ParseError>;

fn visible_form(doc: &Document) -> Result<Option<FormDescriptor>, ParseError> {
    let entry = decode_form(doc)?;
    Ok(entry.is_visible_to_driver().then_some(entry.descriptor))
}

fn address_book_user(doc: &Document) -> Result<Option<User>, ParseError> {
    let entry = decode_user(doc)?;
    Ok(entry.address_book_eligible.then_some(entry.user))
}

/// Cancellation escapes; anything else is logged and reported as failure.
fn escalate(err: &StoreError) -> Result<(), Cancelled> {
    if err.is_cancelled() {
        Err(Cancelled)
    } else {
        Ok(())
    }
}

pub struct GroupResolver<S: RemoteStore> {
    reader: FallbackReader<S>,
}

impl<S: RemoteStore> Clone for GroupResolver<S> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
        }
    }
}

impl<S: RemoteStore> GroupResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            reader: FallbackReader::new(store),
        }
    }

    /// Resolve the vehicle a unit is installed in. A missing unit record or
    /// a record owned by another customer is a failure.
    pub async fn resolve_vehicle(
        &self,
        customer_id: &str,
        obc_id: ObcId,
    ) -> Result<Resolution<Option<VehicleId>>, Cancelled> {
        let path = paths::unit(customer_id, obc_id);
        let fetched = match self.reader.read_document(&path, ReadPolicy::PreferCache).await {
            Ok(fetched) => fetched,
            Err(e) => {
                escalate(&e)?;
                warn!(customer_id, obc_id = %obc_id, error = %e, "unit lookup failed");
                return Ok(Resolution::failure());
            }
        };

        let Some(doc) = fetched.into_value() else {
            info!(customer_id, obc_id = %obc_id, "no unit record");
            return Ok(Resolution::failure());
        };

        let unit = match decode_unit(&doc) {
            Ok(unit) => unit,
            Err(e) => {
                warn!(customer_id, obc_id = %obc_id, error = %e, "malformed unit record");
                return Ok(Resolution::failure());
            }
        };

        if unit.customer_id != customer_id {
            warn!(
                customer_id,
                obc_id = %obc_id,
                record_customer_id = %unit.customer_id,
                "unit record belongs to another customer"
            );
            return Ok(Resolution::failure());
        }

        debug!(customer_id, obc_id = %obc_id, vehicle_id = %unit.vehicle_id, "vehicle resolved");
        Ok(Resolution::success(Some(unit.vehicle_id)))
    }

    /// Groups of a vehicle. Always contains the all-vehicles group, also on
    /// failure; no memberships at all is still a success.
    pub async fn resolve_groups(
        &self,
        customer_id: &str,
        obc_id: ObcId,
        vehicle_id: VehicleId,
        force_server: bool,
    ) -> Result<Resolution<BTreeSet<GroupId>>, Cancelled> {
        let mut groups = BTreeSet::from([ALL_VEHICLES_GROUP_ID]);
        let path = paths::vehicle_groups(customer_id, vehicle_id);
        let policy = ReadPolicy::from_force_server(force_server);

        let docs = match self.reader.read_collection(&path, policy).await {
            Ok(fetched) => fetched.into_value(),
            Err(e) => {
                escalate(&e)?;
                warn!(
                    customer_id,
                    obc_id = %obc_id,
                    vehicle_id = %vehicle_id,
                    error = %e,
                    "group membership lookup failed"
                );
                return Ok(Resolution::failed_with(groups));
            }
        };

        for doc in &docs {
            match decode_membership(doc) {
                Ok(ids) => groups.extend(ids),
                Err(e) => warn!(path = %doc.path, error = %e, "dropping malformed membership"),
            }
        }
        debug!(customer_id, vehicle_id = %vehicle_id, groups = groups.len(), "groups resolved");
        Ok(Resolution::success(groups))
    }

    /// Driver-visible forms per group: in use and driver-originated.
    pub async fn resolve_forms(
        &self,
        customer_id: &str,
        obc_id: ObcId,
        groups: &BTreeSet<GroupId>,
        force_server: bool,
    ) -> Result<FormResolution, Cancelled> {
        let scan = self
            .scan_groups(
                customer_id,
                obc_id,
                groups,
                force_server,
                paths::group_forms,
                visible_form,
            )
            .await?;
        let Some((per_group, all_from_server)) = scan else {
            return Ok(FormResolution::failure());
        };

        let mut index = GroupFormIndex::new();
        for (group_id, forms) in per_group {
            index.insert(group_id, forms);
        }
        Ok(FormResolution {
            index,
            ok: true,
            all_from_server,
        })
    }

    /// Address-book users per group.
    pub async fn resolve_users(
        &self,
        customer_id: &str,
        obc_id: ObcId,
        groups: &BTreeSet<GroupId>,
        force_server: bool,
    ) -> Result<UserResolution, Cancelled> {
        let scan = self
            .scan_groups(
                customer_id,
                obc_id,
                groups,
                force_server,
                paths::group_users,
                address_book_user,
            )
            .await?;
        let Some((per_group, all_from_server)) = scan else {
            return Ok(UserResolution::failure());
        };

        let mut index = GroupUserIndex::new();
        for (group_id, users) in per_group {
            index.insert(group_id, users);
        }
        Ok(UserResolution {
            index,
            ok: true,
            all_from_server,
        })
    }

    /// Vehicle, groups, forms and users in one pass.
    pub async fn resolve_all(
        &self,
        customer_id: &str,
        obc_id: ObcId,
        force_server: bool,
    ) -> Result<DriverView, Cancelled> {
        let vehicle = self.resolve_vehicle(customer_id, obc_id).await?;
        let Some(vehicle_id) = vehicle.value.filter(|_| vehicle.ok) else {
            return Ok(DriverView {
                vehicle,
                groups: Resolution::failed_with(BTreeSet::from([ALL_VEHICLES_GROUP_ID])),
                forms: FormResolution::failure(),
                users: UserResolution::failure(),
            });
        };

        let groups = self
            .resolve_groups(customer_id, obc_id, vehicle_id, force_server)
            .await?;
        let forms = self
            .resolve_forms(customer_id, obc_id, &groups.value, force_server)
            .await?;
        let users = self
            .resolve_users(customer_id, obc_id, &groups.value, force_server)
            .await?;

        Ok(DriverView {
            vehicle,
            groups,
            forms,
            users,
        })
    }

    /// Read one collection per group, each with its own fallback.
    ///
    /// `Ok(None)` on a non-transient store failure. Malformed documents are
    /// dropped individually.
    async fn scan_groups<T>(
        &self,
        customer_id: &str,
        obc_id: ObcId,
        groups: &BTreeSet<GroupId>,
        force_server: bool,
        collection: fn(&str, GroupId) -> DocumentPath,
        decode: GroupDecoder<T>,
    ) -> Result<Option<(Vec<(GroupId, Vec<T>)>, bool)>, Cancelled> {
        let policy = ReadPolicy::from_force_server(force_server);
        let mut per_group = Vec::with_capacity(groups.len());
        let mut all_from_server = !groups.is_empty();

        for &group_id in groups {
            let path = collection(customer_id, group_id);
            let fetched = match self.reader.read_collection(&path, policy).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    escalate(&e)?;
                    warn!(
                        customer_id,
                        obc_id = %obc_id,
                        group_id = %group_id,
                        error = %e,
                        "group collection lookup failed"
                    );
                    return Ok(None);
                }
            };

            if !fetched.was_server() {
                all_from_server = false;
            }
            if fetched.fell_back() {
                info!(customer_id, group_id = %group_id, path = %path, "group served from cache after failure");
            }

            let mut kept = Vec::new();
            for doc in fetched.value() {
                match decode(doc) {
                    Ok(Some(item)) => kept.push(item),
                    Ok(None) => {}
                    Err(e) => warn!(path = %doc.path, error = %e, "dropping malformed group entry"),
                }
            }
            per_group.push((group_id, kept));
        }

        Ok(Some((per_group, all_from_server)))
    }
}
