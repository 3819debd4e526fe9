#![cfg(feature = "integration-tests")]

use bytes::Bytes;
use common::transport::{AmqpConfig, AmqpTransport, DeliveryHandler, FanoutTopology, PubSubTransport};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::rabbitmq::RabbitMq;
use tokio::sync::mpsc;

async fn setup_broker() -> (ContainerAsync<RabbitMq>, AmqpTransport) {
    let rabbitmq = RabbitMq::default().start().await.unwrap();
    let host = rabbitmq.get_host().await.unwrap();
    let port = rabbitmq.get_host_port_ipv4(5672).await.unwrap();

    let transport = AmqpTransport::connect(AmqpConfig::new(
        format!("amqp://guest:guest@{}:{}/%2f", host, port),
        "fleet.events",
        "geofence_alerts",
    ))
    .await
    .expect("Failed to connect to RabbitMQ");

    (rabbitmq, transport)
}

fn forwarding_handler(tx: mpsc::UnboundedSender<Bytes>) -> DeliveryHandler {
    Arc::new(move |delivery| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(delivery.payload);
        })
    })
}

#[tokio::test]
async fn test_declare_topology_is_idempotent() {
    let (_container, transport) = setup_broker().await;

    transport
        .declare_topology("fleet.events", "geofence_alerts")
        .await
        .unwrap();
    transport
        .declare_topology("fleet.events", "geofence_alerts")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_fanout_reaches_every_bound_queue() {
    let (_container, transport) = setup_broker().await;

    transport
        .declare_topology("fleet.events", "geofence_alerts")
        .await
        .unwrap();
    transport
        .declare_topology("fleet.events", "geofence_audit")
        .await
        .unwrap();

    let (alerts_tx, mut alerts_rx) = mpsc::unbounded_channel();
    let (audit_tx, mut audit_rx) = mpsc::unbounded_channel();
    let _alerts = transport
        .subscribe("geofence_alerts", forwarding_handler(alerts_tx))
        .await
        .unwrap();
    let _audit = transport
        .subscribe("geofence_audit", forwarding_handler(audit_tx))
        .await
        .unwrap();

    let payload = Bytes::from_static(br#"{"vehicleID":"B1234XYZ"}"#);
    transport.publish("fleet.events", payload.clone()).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), alerts_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, payload);

    let received = tokio::time::timeout(Duration::from_secs(5), audit_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, payload);
}

#[tokio::test]
async fn test_close_ends_subscriptions() {
    let (_container, transport) = setup_broker().await;

    transport
        .declare_topology("fleet.events", "geofence_alerts")
        .await
        .unwrap();

    let (tx, _rx) = mpsc::unbounded_channel();
    let subscription = transport
        .subscribe("geofence_alerts", forwarding_handler(tx))
        .await
        .unwrap();

    transport.close().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), subscription.ended())
        .await
        .expect("Subscription did not end after close");
    assert!(subscription.is_ended());
}

#[tokio::test]
async fn test_connect_declares_configured_topology() {
    let (_container, transport) = setup_broker().await;

    // No explicit declare: connect already bound geofence_alerts to fleet.events
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = transport
        .subscribe("geofence_alerts", forwarding_handler(tx))
        .await
        .unwrap();

    let payload = Bytes::from_static(br#"{"vehicleID":"B5678XYZ"}"#);
    transport.publish("fleet.events", payload.clone()).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, payload);
}
