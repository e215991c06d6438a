mod common;

use std::time::Duration;

use common::Fixture;
use tokio_util::sync::CancellationToken;

use matter_onboard::app::CommissionerConfig;
use matter_onboard::core::clusters::{basic_information, ROOT_ENDPOINT};
use matter_onboard::core::{
    AttributePath, CommissioningError, EventPath, SubscriptionEvent, SubscriptionHandle,
    SubscriptionManager, TlvValue,
};
use matter_onboard::sim::SimDevice;

const TIMEOUT: Duration = Duration::from_secs(2);

fn product_name_path() -> AttributePath {
    AttributePath::new(
        ROOT_ENDPOINT,
        basic_information::CLUSTER_ID,
        basic_information::ATTR_PRODUCT_NAME,
    )
}

fn on_off_path() -> AttributePath {
    AttributePath::new(1, 0x0006, 0x0000)
}

async fn next(subscription: &mut SubscriptionHandle) -> Option<SubscriptionEvent> {
    tokio::time::timeout(TIMEOUT, subscription.next_event())
        .await
        .expect("No event within timeout")
}

#[tokio::test]
async fn test_subscription_delivers_priming_and_pushed_reports() {
    let fixture = Fixture::new(SimDevice::light());
    let node_id = fixture.join().await;
    let registry = fixture.registry();
    let handle = registry.resolve(node_id).await.unwrap();
    let manager = SubscriptionManager::new(fixture.controller.clone());

    let mut subscription = manager
        .subscribe(
            &handle,
            vec![product_name_path(), on_off_path()],
            Duration::from_secs(1),
            Duration::from_secs(10),
        )
        .await
        .expect("Subscribe failed");
    assert_eq!(subscription.node_id(), node_id);

    let subscription_id = subscription.subscription_id();
    assert_eq!(
        next(&mut subscription).await,
        Some(SubscriptionEvent::Established { subscription_id })
    );
    assert_eq!(
        next(&mut subscription).await,
        Some(SubscriptionEvent::Report {
            path: product_name_path(),
            value: TlvValue::Utf8("Sim Light".to_string()),
        })
    );

    assert_eq!(
        fixture
            .controller
            .push_report(on_off_path(), TlvValue::Bool(true)),
        1
    );
    assert_eq!(
        next(&mut subscription).await,
        Some(SubscriptionEvent::Report {
            path: on_off_path(),
            value: TlvValue::Bool(true),
        })
    );
}

#[tokio::test]
async fn test_resubscription_notice_carries_transport_backoff() {
    let fixture = Fixture::new(SimDevice::new());
    let node_id = fixture.join().await;
    fixture
        .controller
        .set_resubscribe_hint(Duration::from_secs(5));
    let handle = fixture.registry().resolve(node_id).await.unwrap();

    let mut subscription = SubscriptionManager::new(fixture.controller.clone())
        .subscribe_with_events(
            &handle,
            vec![product_name_path()],
            vec![EventPath::new(ROOT_ENDPOINT, basic_information::CLUSTER_ID, 0x00)],
            Duration::ZERO,
            Duration::from_secs(30),
        )
        .await
        .unwrap();

    let mut events = Vec::new();
    for _ in 0..3 {
        events.push(next(&mut subscription).await.expect("Stream ended"));
    }
    assert!(matches!(
        &events[2],
        SubscriptionEvent::Resubscribing { next_attempt, .. }
            if *next_attempt == Duration::from_secs(5)
    ));
}

#[tokio::test]
async fn test_subscription_ends_with_its_session() {
    let fixture = Fixture::new(SimDevice::light());
    let node_id = fixture.join().await;
    let registry = fixture.registry();
    let handle = registry.resolve(node_id).await.unwrap();
    let mut subscription = SubscriptionManager::new(fixture.controller.clone())
        .subscribe(
            &handle,
            vec![on_off_path()],
            Duration::from_secs(1),
            Duration::from_secs(10),
        )
        .await
        .unwrap();

    registry.invalidate(node_id).await;

    let event = tokio::time::timeout(TIMEOUT, subscription.next_event())
        .await
        .expect("Subscription did not end");
    assert_eq!(event, None);
}

#[tokio::test]
async fn test_invalid_subscription_requests() {
    let fixture = Fixture::new(SimDevice::new());
    let node_id = fixture.join().await;
    let handle = fixture.registry().resolve(node_id).await.unwrap();
    let manager = SubscriptionManager::new(fixture.controller.clone());

    let err = manager
        .subscribe(&handle, vec![], Duration::from_secs(1), Duration::from_secs(10))
        .await
        .unwrap_err();
    assert!(matches!(err, CommissioningError::InvalidSubscription(_)));

    let err = manager
        .subscribe(
            &handle,
            vec![product_name_path()],
            Duration::from_secs(20),
            Duration::from_secs(10),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CommissioningError::InvalidSubscription(_)));

    fixture.controller.disconnect(node_id);
    let err = manager
        .subscribe(
            &handle,
            vec![product_name_path()],
            Duration::from_secs(1),
            Duration::from_secs(10),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CommissioningError::StaleHandle { .. }));
}

#[tokio::test]
async fn test_commissioner_subscribes_with_configured_intervals() {
    let fixture = Fixture::new(SimDevice::light());
    let commissioner = fixture.commissioner(CommissionerConfig::default());
    let report = commissioner
        .commission(fixture.request(), CancellationToken::new())
        .await
        .unwrap();

    let mut subscription = commissioner
        .subscribe(report.node_id, vec![product_name_path()])
        .await
        .expect("Subscribe failed");
    assert!(matches!(
        subscription.next_event().await,
        Some(SubscriptionEvent::Established { .. })
    ));

    commissioner.shutdown().await;
    assert_eq!(subscription.next_event().await, None);
}
