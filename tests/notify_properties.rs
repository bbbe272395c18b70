//! Registry and session behavior with in-memory connections.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use bidgate::notify::mocks::MockConnection;
use bidgate::notify::{
    session, ConnectionRegistry, DomainEvent, SupersedePolicy, WriteFailurePolicy,
};

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_new_bid_reaches_connected_client() {
    let registry = Arc::new(ConnectionRegistry::new());
    let (conn, mut peer) = MockConnection::pair();
    tokio::spawn(session::serve(registry.clone(), "u1".to_string(), conn));
    wait_for(|| registry.is_connected("u1")).await;

    let (tender, bid) = (Uuid::new_v4(), Uuid::new_v4());
    registry
        .notify("u1", &DomainEvent::new_bid("u1", tender, bid, 100.0))
        .await
        .unwrap();

    let message = peer.recv().await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&message).unwrap();
    assert_eq!(value["type"], "new_bid");
    assert_eq!(value["tender_id"], tender.to_string());
    assert_eq!(value["bid_id"], bid.to_string());
    assert_eq!(value["price"], 100.0);
    assert!(peer.try_recv().is_none());
}

#[tokio::test]
async fn test_events_arrive_in_send_order() {
    let registry = ConnectionRegistry::new();
    let (conn, mut peer) = MockConnection::pair();
    registry.register("u1", conn).await;

    let tender = Uuid::new_v4();
    for price in [10.0, 20.0, 30.0] {
        registry
            .notify("u1", &DomainEvent::new_bid("u1", tender, Uuid::new_v4(), price))
            .await
            .unwrap();
    }

    let prices: Vec<f64> = peer
        .drain()
        .iter()
        .map(|m| serde_json::from_slice::<DomainEvent>(m).unwrap().payload().price)
        .collect();
    assert_eq!(prices, vec![10.0, 20.0, 30.0]);
}

#[tokio::test]
async fn test_disconnected_client_gets_nothing() {
    let registry = Arc::new(ConnectionRegistry::new());
    let (conn, mut peer) = MockConnection::pair();
    let session = tokio::spawn(session::serve(registry.clone(), "u1".to_string(), conn));
    wait_for(|| registry.is_connected("u1")).await;

    peer.disconnect();
    session.await.unwrap();

    let event = DomainEvent::award("u1", Uuid::new_v4(), None, 0.0);
    registry.notify("u1", &event).await.unwrap();
    assert!(peer.try_recv().is_none());
    assert!(registry.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_notify_racing_disconnect_never_errors_on_absent_entry() {
    let registry = Arc::new(ConnectionRegistry::new());

    for round in 0..50 {
        let identity = format!("u{}", round);
        let (conn, mut peer) = MockConnection::pair();
        let session = tokio::spawn(session::serve(registry.clone(), identity.clone(), conn));
        wait_for(|| registry.is_connected(&identity)).await;

        let notifier = {
            let registry = registry.clone();
            let identity = identity.clone();
            tokio::spawn(async move {
                let event = DomainEvent::new_bid(identity.as_str(), Uuid::new_v4(), Uuid::new_v4(), 1.0);
                registry.notify(&identity, &event).await
            })
        };
        peer.disconnect();

        session.await.unwrap();
        // Either delivered before the close or dropped; a closed-socket write
        // is the only possible error
        if let Err(e) = notifier.await.unwrap() {
            assert!(e.to_string().contains("connection closed"), "{}", e);
        }
        assert!(!registry.is_connected(&identity));
    }
}

#[tokio::test]
async fn test_concurrent_registration_of_distinct_identities() {
    let registry = Arc::new(ConnectionRegistry::new());
    let mut peers = Vec::new();
    let mut tasks = Vec::new();

    for i in 0..32 {
        let (conn, peer) = MockConnection::pair();
        peers.push(peer);
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            registry.register(&format!("user-{}", i), conn).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(registry.len(), 32);

    for i in 0..32 {
        let identity = format!("user-{}", i);
        registry
            .notify(&identity, &DomainEvent::award(identity.as_str(), Uuid::new_v4(), None, 1.0))
            .await
            .unwrap();
    }
    for peer in peers.iter_mut() {
        assert_eq!(peer.drain().len(), 1);
    }
}

#[tokio::test]
async fn test_supersede_close_policy_with_sessions() {
    let registry = Arc::new(ConnectionRegistry::with_policies(
        SupersedePolicy::Close,
        WriteFailurePolicy::Ignore,
    ));
    let (first, _first_peer) = MockConnection::pair();
    let (second, mut second_peer) = MockConnection::pair();

    let first_session = tokio::spawn(session::serve(registry.clone(), "u1".to_string(), first.clone()));
    wait_for(|| registry.is_connected("u1")).await;
    tokio::spawn(session::serve(registry.clone(), "u1".to_string(), second.clone()));

    // Closing the superseded connection ends its session without touching the new entry
    first_session.await.unwrap();
    assert!(first.is_closed());
    assert!(registry.is_connected("u1"));

    registry
        .notify("u1", &DomainEvent::new_bid("u1", Uuid::new_v4(), Uuid::new_v4(), 3.0))
        .await
        .unwrap();
    assert_eq!(second_peer.recv().await.map(|_| ()), Some(()));
}

#[tokio::test]
async fn test_supersede_retain_policy_with_sessions() {
    let registry = Arc::new(ConnectionRegistry::new());
    let (first, mut first_peer) = MockConnection::pair();
    let (second, _second_peer) = MockConnection::pair();

    let first_session = tokio::spawn(session::serve(registry.clone(), "u1".to_string(), first.clone()));
    wait_for(|| registry.is_connected("u1")).await;
    tokio::spawn(session::serve(registry.clone(), "u1".to_string(), second.clone()));
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The superseded connection stays open until its own peer leaves
    assert!(!first.is_closed());
    assert!(!first_session.is_finished());

    first_peer.disconnect();
    first_session.await.unwrap();
    assert!(first.is_closed());
    assert!(registry.is_connected("u1"));
}
