use super::*;
use futures::StreamExt;

#[tokio::test]
async fn publish_reaches_every_registered_subscriber() {
    let bus = UpdateBus::new();
    let mut first = bus.subscribe();
    let mut second = bus.subscribe();

    assert_eq!(bus.publish(), 2);

    let a = first.recv().await.expect("first update");
    let b = second.recv().await.expect("second update");
    assert_eq!(a, b);
}

#[tokio::test]
async fn unsubscribed_listener_hears_nothing() {
    let bus = UpdateBus::new();
    let mut kept = bus.subscribe();
    let gone = bus.subscribe();
    let gone_id = gone.id();
    gone.unsubscribe();

    assert!(!bus.unsubscribe(gone_id), "already removed by the handle");
    assert_eq!(bus.subscriber_count(), 1);
    assert_eq!(bus.publish(), 1);
    assert!(kept.try_recv().is_some());
}

#[tokio::test]
async fn unsubscribe_by_id_stops_delivery() {
    let bus = UpdateBus::new();
    let mut listener = bus.subscribe();

    assert!(bus.unsubscribe(listener.id()));
    assert!(!bus.unsubscribe(listener.id()));
    assert_eq!(bus.publish(), 0);
    assert!(listener.try_recv().is_none());
}

#[tokio::test]
async fn late_subscriber_does_not_receive_earlier_publish() {
    let bus = UpdateBus::new();
    bus.publish();
    let mut late = bus.subscribe();

    assert!(late.try_recv().is_none());
    bus.publish();
    let update = late.try_recv().expect("update after subscribing");
    assert_eq!(update.sequence, 2);
}

#[tokio::test]
async fn dropping_handle_deregisters() {
    let bus = UpdateBus::new();
    {
        let _listener = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }
    assert_eq!(bus.subscriber_count(), 0);
}

#[tokio::test]
async fn sequences_distinguish_back_to_back_publishes() {
    let bus = UpdateBus::new();
    let mut listener = bus.subscribe();
    bus.publish();
    let first = listener.next().await.expect("first");
    bus.publish();
    let second = listener.next().await.expect("second");
    assert!(second.sequence > first.sequence);
}

#[tokio::test]
async fn stalled_subscriber_holds_a_single_pending_signal() {
    let bus = UpdateBus::new();
    let mut stalled = bus.subscribe();

    for _ in 0..10_000 {
        assert_eq!(bus.publish(), 1, "a full listener still counts as reached");
    }

    let pending = std::iter::from_fn(|| stalled.try_recv()).count();
    assert_eq!(pending, 1);

    bus.publish();
    let fresh = stalled.try_recv().expect("signal after catching up");
    assert_eq!(fresh.sequence, 10_001);
}

#[tokio::test]
async fn clones_share_one_topic() {
    let bus = UpdateBus::new();
    let publisher = bus.clone();
    let mut listener = bus.subscribe();

    assert_eq!(publisher.publish(), 1);
    assert!(listener.try_recv().is_some());
}
