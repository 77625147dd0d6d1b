//! Unit -> vehicle -> groups -> forms/users resolution scenarios.

use std::collections::BTreeSet;
use std::sync::Arc;

use convoy_core::{GroupId, ReadMode, StoreError, VehicleId, ALL_VEHICLES_GROUP_ID};
use convoy_storage::InMemoryRemoteStore;
use convoy_sync::GroupResolver;
use convoy_test_utils::{
    paths, seed_driver_scenario, seed_form, CUSTOMER_ID, FORM_ID, GROUP_ID, OBC_ID, VEHICLE_ID,
};

fn scenario() -> (Arc<InMemoryRemoteStore>, GroupResolver<InMemoryRemoteStore>) {
    let store = Arc::new(InMemoryRemoteStore::new());
    seed_driver_scenario(&store);
    let resolver = GroupResolver::new(Arc::clone(&store));
    (store, resolver)
}

#[tokio::test]
async fn test_driver_view_resolves_member_groups_only() {
    let (_, resolver) = scenario();

    let view = resolver.resolve_all(CUSTOMER_ID, OBC_ID, true).await.unwrap();

    assert!(view.is_complete());
    assert_eq!(view.vehicle.value, Some(VEHICLE_ID));
    assert_eq!(
        view.groups.value,
        BTreeSet::from([ALL_VEHICLES_GROUP_ID, GROUP_ID])
    );
    assert!(!view.groups.value.contains(&GroupId(8)));

    let forms = view.forms.index.forms_for(GROUP_ID).unwrap();
    assert_eq!(forms.len(), 1);
    assert_eq!(forms.iter().next().unwrap().form_id, FORM_ID);
    assert!(view.forms.all_from_server);
    assert_eq!(view.users.index.address_book().len(), 1);
}

#[tokio::test]
async fn test_warm_cache_is_preferred_without_force() {
    let (_, resolver) = scenario();

    let view = resolver.resolve_all(CUSTOMER_ID, OBC_ID, false).await.unwrap();

    assert!(view.is_complete());
    assert!(!view.forms.all_from_server);
    assert_eq!(view.forms.index.form_count(), 1);
}

#[tokio::test]
async fn test_cold_cache_is_read_from_server_without_force() {
    let (store, resolver) = scenario();
    store.evict_cache(paths::group_forms(CUSTOMER_ID, GROUP_ID).as_str());

    let view = resolver.resolve_all(CUSTOMER_ID, OBC_ID, false).await.unwrap();

    assert!(view.forms.ok);
    assert!(view.forms.all_from_server);
    assert_eq!(view.forms.index.form_count(), 1);
    assert!(store
        .cache_document(&paths::group_forms(CUSTOMER_ID, GROUP_ID).child(FORM_ID))
        .is_some());
}

#[tokio::test]
async fn test_offline_refresh_falls_back_to_cache() {
    let (store, resolver) = scenario();
    store.set_online(false);

    let view = resolver.resolve_all(CUSTOMER_ID, OBC_ID, true).await.unwrap();

    assert!(view.forms.ok);
    assert!(!view.forms.all_from_server);
    assert_eq!(view.forms.index.form_count(), 1);
}

#[tokio::test]
async fn test_unknown_unit_fails_the_whole_view() {
    let (_, resolver) = scenario();

    let view = resolver
        .resolve_all(CUSTOMER_ID, convoy_core::ObcId(12345), false)
        .await
        .unwrap();

    assert!(!view.vehicle.ok);
    assert!(!view.is_complete());
    assert!(view.groups.value.contains(&ALL_VEHICLES_GROUP_ID));
    assert!(view.forms.index.is_empty());
}

#[tokio::test]
async fn test_permission_error_on_one_group_fails_forms() {
    let (store, resolver) = scenario();
    store.fail_next(
        ReadMode::Server,
        paths::group_forms(CUSTOMER_ID, GROUP_ID).as_str(),
        StoreError::PermissionDenied {
            path: "forms".to_string(),
        },
    );

    let groups = BTreeSet::from([ALL_VEHICLES_GROUP_ID, GROUP_ID]);
    let forms = resolver
        .resolve_forms(CUSTOMER_ID, OBC_ID, &groups, true)
        .await
        .unwrap();

    assert!(!forms.ok);
    assert!(forms.index.is_empty());
    assert!(!forms.all_from_server);
}

#[tokio::test]
async fn test_shared_form_collapses_across_groups() {
    let (store, resolver) = scenario();
    seed_form(&store, CUSTOMER_ID, ALL_VEHICLES_GROUP_ID, FORM_ID);

    let view = resolver.resolve_all(CUSTOMER_ID, OBC_ID, true).await.unwrap();

    assert_eq!(view.forms.index.forms_for(ALL_VEHICLES_GROUP_ID).unwrap().len(), 1);
    assert_eq!(view.forms.index.form_count(), 1);
}

#[tokio::test]
async fn test_vehicle_without_memberships_keeps_sentinel() {
    let store = Arc::new(InMemoryRemoteStore::new());
    convoy_test_utils::seed_unit(&store, CUSTOMER_ID, OBC_ID, VehicleId(501));
    let resolver = GroupResolver::new(store);

    let view = resolver.resolve_all(CUSTOMER_ID, OBC_ID, true).await.unwrap();

    assert!(view.groups.ok);
    assert_eq!(view.groups.value, BTreeSet::from([ALL_VEHICLES_GROUP_ID]));
    assert!(view.forms.ok);
    assert!(view.forms.index.is_empty());
}
