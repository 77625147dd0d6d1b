//! Staleness Gate
//!
//! Decides whether the group form/user indexes must be re-downloaded by
//! comparing three server-side last-modified markers with the copies this
//! device persisted after its last successful refresh. Three small reads
//! replace a full collection scan on every screen visit.

use std::sync::Arc;

use convoy_core::constants::{
    FIELD_LAST_MODIFIED, PREF_FORMS_SNAPSHOT_EMPTY, PREF_USERS_SNAPSHOT_EMPTY,
};
use convoy_core::decode::decode_marker;
use convoy_core::{
    now_unix_seconds, paths, Cancelled, CustomerId, Fields, MarkerKind, ObcId, ReadMode,
    StalenessMarker, StoreError, UnixSeconds,
};
use convoy_storage::{PreferenceStore, RemoteStore, WriteMode};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{SyncEvent, SyncEvents};
use crate::groups::GroupResolver;
use crate::supervisor::{TaskHandle, TaskSupervisor};

/// Result of one gate evaluation.
#[derive(Debug, Clone)]
pub struct StalenessCheck {
    /// Markers as evaluated; absent server markers carry the value written.
    pub markers: Vec<StalenessMarker>,
    /// Present when a background refresh was started.
    pub refresh: Option<TaskHandle>,
}

impl StalenessCheck {
    pub fn refreshed(&self) -> bool {
        self.refresh.is_some()
    }
}

pub struct StalenessGate<S: RemoteStore> {
    store: Arc<S>,
    prefs: Arc<dyn PreferenceStore>,
    resolver: GroupResolver<S>,
    supervisor: TaskSupervisor,
    events: SyncEvents,
}

impl<S: RemoteStore> StalenessGate<S> {
    pub fn new(
        store: Arc<S>,
        prefs: Arc<dyn PreferenceStore>,
        supervisor: TaskSupervisor,
        events: SyncEvents,
    ) -> Self {
        Self {
            resolver: GroupResolver::new(Arc::clone(&store)),
            store,
            prefs,
            supervisor,
            events,
        }
    }

    /// Returns whether a background refresh was triggered.
    pub async fn check_and_refresh_if_stale(
        &self,
        customer_id: &str,
        obc_id: ObcId,
    ) -> Result<bool, Cancelled> {
        Ok(self.check(customer_id, obc_id).await?.refreshed())
    }

    /// Same as [`Self::check_and_refresh_if_stale`] but hands back the
    /// evaluated markers and the refresh task.
    pub async fn check(
        &self,
        customer_id: &str,
        obc_id: ObcId,
    ) -> Result<StalenessCheck, Cancelled> {
        let customer: CustomerId = customer_id.to_string();

        let server = match self.fetch_server_markers(customer_id).await {
            Ok(server) => server,
            Err(e) if e.is_cancelled() => return Err(Cancelled),
            Err(e) => {
                warn!(customer_id, obc_id = %obc_id, error = %e, "marker fetch failed");
                self.events.publish(SyncEvent::StoreFault {
                    customer_id: customer,
                    obc_id,
                    reason: e.to_string(),
                });
                return Ok(StalenessCheck {
                    markers: Vec::new(),
                    refresh: None,
                });
            }
        };

        let now = now_unix_seconds();
        let mut markers = Vec::with_capacity(MarkerKind::ALL.len());
        let mut any_absent = false;
        for (kind, server_value) in MarkerKind::ALL.into_iter().zip(server) {
            let server_value = if server_value <= 0 {
                any_absent = true;
                self.seed_server_marker(customer_id, kind, now).await;
                now
            } else {
                server_value
            };
            let local = match self.prefs.local_marker(&customer, kind).await {
                Ok(local) => local,
                Err(e) => {
                    warn!(customer_id, marker = ?kind, error = %e, "local marker unreadable");
                    0
                }
            };
            markers.push(StalenessMarker {
                kind,
                server: server_value,
                local,
            });
        }

        let forms_empty = self.snapshot_empty(&customer, PREF_FORMS_SNAPSHOT_EMPTY).await;
        let users_empty = self.snapshot_empty(&customer, PREF_USERS_SNAPSHOT_EMPTY).await;
        let behind = markers.iter().any(StalenessMarker::is_behind);
        let stale = behind || any_absent || forms_empty || users_empty;

        debug!(
            customer_id,
            obc_id = %obc_id,
            behind,
            any_absent,
            forms_empty,
            users_empty,
            "staleness evaluated"
        );

        if !stale {
            return Ok(StalenessCheck {
                markers,
                refresh: None,
            });
        }

        let refresh = self.spawn_refresh(customer, obc_id, markers.clone());
        Ok(StalenessCheck {
            markers,
            refresh: Some(refresh),
        })
    }

    async fn fetch_server_markers(
        &self,
        customer_id: &str,
    ) -> Result<[UnixSeconds; 3], StoreError> {
        let [units, forms, users] = MarkerKind::ALL.map(|kind| paths::marker(customer_id, kind));
        let (units, forms, users) = tokio::join!(
            self.store.read_document(&units, ReadMode::Server),
            self.store.read_document(&forms, ReadMode::Server),
            self.store.read_document(&users, ReadMode::Server),
        );

        let mut values = [0; 3];
        for (slot, doc) in values.iter_mut().zip([units?, forms?, users?]) {
            *slot = match decode_marker(doc.as_ref()) {
                Ok(value) => value,
                Err(e) => {
                    warn!(customer_id, error = %e, "malformed marker treated as absent");
                    0
                }
            };
        }
        Ok(values)
    }

    /// Best effort: a failed write only means the next check seeds again.
    async fn seed_server_marker(&self, customer_id: &str, kind: MarkerKind, now: UnixSeconds) {
        let path = paths::marker(customer_id, kind);
        let mut fields = Fields::new();
        fields.insert(FIELD_LAST_MODIFIED.to_string(), json!(now));
        match self.store.write(&path, fields, WriteMode::Merge).await {
            Ok(()) => info!(customer_id, marker = ?kind, at = now, "seeded server marker"),
            Err(e) => warn!(customer_id, marker = ?kind, error = %e, "could not seed server marker"),
        }
    }

    async fn snapshot_empty(&self, customer: &CustomerId, key: &str) -> bool {
        match self.prefs.flag(customer, key).await {
            Ok(flag) => flag,
            Err(e) => {
                warn!(customer_id = %customer, key, error = %e, "snapshot flag unreadable");
                true
            }
        }
    }

    fn spawn_refresh(
        &self,
        customer_id: CustomerId,
        obc_id: ObcId,
        markers: Vec<StalenessMarker>,
    ) -> TaskHandle {
        let task_id = Uuid::now_v7();
        let resolver = self.resolver.clone();
        let prefs = Arc::clone(&self.prefs);
        let events = self.events.clone();

        self.events.publish(SyncEvent::RefreshStarted {
            task_id,
            customer_id: customer_id.clone(),
        });

        self.supervisor
            .spawn_with_id(task_id, "group-index-refresh", async move {
                let outcome =
                    repopulate(&resolver, prefs.as_ref(), &customer_id, obc_id, &markers).await;
                match outcome {
                    Ok((forms, users)) => {
                        events.publish(SyncEvent::RefreshCompleted {
                            task_id,
                            customer_id,
                            forms,
                            users,
                        });
                        Ok(())
                    }
                    Err(reason) => {
                        events.publish(SyncEvent::RefreshFailed {
                            task_id,
                            customer_id,
                            reason: reason.clone(),
                        });
                        Err(reason)
                    }
                }
            })
    }
}

/// Re-download both indexes from the server, record whether each came back
/// empty, then persist the markers. Returns the form and user counts.
async fn repopulate<S: RemoteStore>(
    resolver: &GroupResolver<S>,
    prefs: &dyn PreferenceStore,
    customer_id: &CustomerId,
    obc_id: ObcId,
    markers: &[StalenessMarker],
) -> Result<(usize, usize), String> {
    let cancelled = |_: Cancelled| "refresh cancelled".to_string();

    let vehicle = resolver
        .resolve_vehicle(customer_id, obc_id)
        .await
        .map_err(cancelled)?;
    let vehicle_id = match vehicle.into_parts() {
        (Some(vehicle_id), true) => vehicle_id,
        _ => return Err(format!("unit {obc_id} did not resolve to a vehicle")),
    };

    let groups = resolver
        .resolve_groups(customer_id, obc_id, vehicle_id, true)
        .await
        .map_err(cancelled)?;
    if !groups.ok {
        return Err("group membership unavailable".to_string());
    }

    let forms = resolver
        .resolve_forms(customer_id, obc_id, &groups.value, true)
        .await
        .map_err(cancelled)?;
    let users = resolver
        .resolve_users(customer_id, obc_id, &groups.value, true)
        .await
        .map_err(cancelled)?;
    if !forms.ok || !users.ok {
        return Err("group index unavailable".to_string());
    }

    let persist = |e: convoy_core::PreferenceError| e.to_string();
    prefs
        .set_flag(customer_id, PREF_FORMS_SNAPSHOT_EMPTY, forms.index.is_empty())
        .await
        .map_err(persist)?;
    prefs
        .set_flag(customer_id, PREF_USERS_SNAPSHOT_EMPTY, users.index.is_empty())
        .await
        .map_err(persist)?;
    for marker in markers {
        prefs
            .set_local_marker(customer_id, marker.kind, marker.server)
            .await
            .map_err(persist)?;
    }

    let counts = (forms.index.form_count(), users.index.address_book().len());
    info!(
        customer_id = %customer_id,
        vehicle_id = %vehicle_id,
        forms = counts.0,
        users = counts.1,
        "group indexes refreshed"
    );
    Ok(counts)
}
