mod common;

use common::Fixture;
use fabric_crypto::CategoryId;

use matter_onboard::core::clusters::ROOT_ENDPOINT;
use matter_onboard::core::{
    AccessControlEntry, AccessControlReconciler, AccessControlTarget, AuthMode,
    CommissioningError, Privilege,
};
use matter_onboard::sim::SimDevice;

fn installer() -> CategoryId {
    CategoryId::from_code("00030001").unwrap()
}

fn existing_entries() -> Vec<AccessControlEntry> {
    vec![
        AccessControlEntry {
            privilege: Privilege::VIEW,
            auth_mode: AuthMode::GROUP,
            subjects: None,
            targets: Some(vec![AccessControlTarget {
                cluster: Some(0x0006),
                endpoint: Some(1),
                device_type: None,
            }]),
            fabric_index: 3,
        },
        AccessControlEntry {
            privilege: Privilege::MANAGE,
            auth_mode: AuthMode::CASE,
            subjects: Some(vec![0x0000_0000_0000_0777]),
            targets: None,
            fabric_index: 3,
        },
    ]
}

#[tokio::test]
async fn test_reconcile_appends_exactly_one_operate_entry() {
    let fixture = Fixture::new(SimDevice::new().with_acl(existing_entries()));
    let node_id = fixture.join().await;
    let handle = fixture.registry().resolve(node_id).await.unwrap();
    let before = fixture.controller.acl();

    let outcome = AccessControlReconciler::new(fixture.client(), false)
        .reconcile(&handle, ROOT_ENDPOINT, installer())
        .await
        .expect("Reconcile failed");

    let writes = fixture.controller.acl_writes();
    assert_eq!(writes.len(), 1);
    let after = &writes[0];
    assert_eq!(after.len(), before.len() + 1);
    assert_eq!(&after[..before.len()], before.as_slice());

    let added: Vec<_> = after
        .iter()
        .filter(|entry| !before.contains(entry))
        .collect();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].privilege, Privilege::OPERATE);
    assert_eq!(added[0].subjects, Some(vec![installer().subject()]));

    // Index and auth mode come from the admin entry installed on join
    let admin = before
        .iter()
        .find(|entry| entry.privilege == Privilege::ADMINISTER)
        .unwrap();
    assert_eq!(added[0].fabric_index, admin.fabric_index);
    assert_eq!(added[0].auth_mode, admin.auth_mode);
    assert!(outcome.admin_entry_found);
    assert_eq!(outcome.entries_written, after.len());
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let fixture = Fixture::new(SimDevice::new());
    let node_id = fixture.join().await;
    let handle = fixture.registry().resolve(node_id).await.unwrap();
    let reconciler = AccessControlReconciler::new(fixture.client(), false);

    let first = reconciler
        .reconcile(&handle, ROOT_ENDPOINT, installer())
        .await
        .unwrap();
    let second = reconciler
        .reconcile(&handle, ROOT_ENDPOINT, installer())
        .await
        .unwrap();

    assert!(first.appended);
    assert!(!second.appended);
    assert_eq!(fixture.controller.acl_writes().len(), 1);
    assert_eq!(fixture.controller.acl().len(), 2);
}

#[tokio::test]
async fn test_missing_admin_entry_degrades_with_defaults() {
    let fixture = Fixture::new(SimDevice::new().without_admin_grant());
    let node_id = fixture.join().await;
    let handle = fixture.registry().resolve(node_id).await.unwrap();

    let outcome = AccessControlReconciler::new(fixture.client(), false)
        .reconcile(&handle, ROOT_ENDPOINT, installer())
        .await
        .expect("Degraded reconcile failed");

    assert!(!outcome.admin_entry_found);
    assert_eq!(outcome.fabric_index, 0);
    assert_eq!(outcome.auth_mode, AuthMode(0));
    let acl = fixture.controller.acl();
    assert_eq!(acl.len(), 1);
    assert_eq!(acl[0].fabric_index, 0);
}

#[tokio::test]
async fn test_missing_admin_entry_fails_in_strict_mode() {
    let fixture = Fixture::new(SimDevice::new().without_admin_grant());
    let node_id = fixture.join().await;
    let handle = fixture.registry().resolve(node_id).await.unwrap();

    let err = AccessControlReconciler::new(fixture.client(), true)
        .reconcile(&handle, ROOT_ENDPOINT, installer())
        .await
        .unwrap_err();

    assert!(matches!(err, CommissioningError::AdminEntryMissing));
    assert!(fixture.controller.acl_writes().is_empty());
}
