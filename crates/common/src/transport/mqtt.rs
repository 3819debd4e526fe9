use crate::transport::topic::topic_matches;
use crate::transport::traits::{Delivery, DeliveryHandler, PubSubTransport, Subscription};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const DEFAULT_MQTT_PORT: u16 = 1883;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const DISCONNECT_GRACE: Duration = Duration::from_millis(250);

/// MQTT connection settings
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker URL in the form `mqtt://host:port`, `tcp://host:port` or `host[:port]`
    pub broker_url: String,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Time allowed for the broker to acknowledge the connection
    pub connect_timeout: Duration,
    /// Capacity of the client request channel
    pub request_capacity: usize,
}

impl MqttConfig {
    pub fn new(broker_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            broker_url: broker_url.into(),
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            request_capacity: 100,
        }
    }
}

struct TopicSubscription {
    id: u64,
    filter: String,
    handler: DeliveryHandler,
    ended: CancellationToken,
}

type SubscriptionTable = Arc<RwLock<Vec<TopicSubscription>>>;

/// [`PubSubTransport`] over an MQTT broker
///
/// A background task drives the rumqttc event loop, dispatches incoming
/// publishes to the handler of every matching filter, and restores
/// subscriptions after the client reconnects.
pub struct MqttTransport {
    client: AsyncClient,
    subscriptions: SubscriptionTable,
    next_subscription_id: AtomicU64,
    shutdown: CancellationToken,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Connect and wait for the broker's CONNACK
    #[instrument(skip_all, fields(broker_url = %config.broker_url, client_id = %config.client_id))]
    pub async fn connect(config: &MqttConfig) -> Result<Self> {
        let broker = parse_broker_url(&config.broker_url)?;

        let mut mqtt_options = MqttOptions::new(&config.client_id, broker.host, broker.port);
        mqtt_options.set_keep_alive(config.keep_alive);
        mqtt_options.set_clean_session(true);
        if let Some((username, password)) = broker.credentials {
            mqtt_options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, config.request_capacity);

        tokio::time::timeout(config.connect_timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| anyhow!("Timed out waiting for MQTT broker acknowledgment"))??;

        info!("connected to MQTT broker");

        let subscriptions: SubscriptionTable = Arc::new(RwLock::new(Vec::new()));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            Arc::clone(&subscriptions),
            shutdown.clone(),
        ));

        Ok(Self {
            client,
            subscriptions,
            next_subscription_id: AtomicU64::new(0),
            shutdown,
            event_loop: Mutex::new(Some(handle)),
        })
    }
}

#[async_trait]
impl PubSubTransport for MqttTransport {
    async fn subscribe(&self, topic: &str, handler: DeliveryHandler) -> Result<Subscription> {
        if self.shutdown.is_cancelled() {
            bail!("MQTT transport is closed");
        }

        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let ended = CancellationToken::new();

        // Register before subscribing so no early publish is missed
        self.subscriptions.write().await.push(TopicSubscription {
            id,
            filter: topic.to_string(),
            handler,
            ended: ended.clone(),
        });

        if let Err(e) = self.client.subscribe(topic, QoS::AtLeastOnce).await {
            // A failed filter must not come back on the next resubscribe
            self.subscriptions.write().await.retain(|s| s.id != id);
            return Err(e).with_context(|| format!("Failed to subscribe to MQTT topic '{}'", topic));
        }

        info!(topic = %topic, "subscribed to MQTT topic");
        Ok(Subscription::new(ended))
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .with_context(|| format!("Failed to publish to MQTT topic '{}'", topic))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }

        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect request failed");
        }
        self.shutdown.cancel();

        if let Some(handle) = self.event_loop.lock().await.take() {
            handle.await.context("MQTT event loop task failed")?;
        }

        info!("MQTT client disconnected");
        Ok(())
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => continue,
            Err(e) => return Err(anyhow!("MQTT connection error: {}", e)),
        }
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    subscriptions: SubscriptionTable,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                flush_disconnect(&mut eventloop).await;
                break;
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        dispatch(&subscriptions, publish.topic, publish.payload).await;
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("reconnected to MQTT broker, restoring subscriptions");
                        resubscribe(&client, &subscriptions).await;
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        debug!("subscription acknowledged");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // rumqttc reconnects on the next poll
                        warn!(error = %e, "MQTT event loop error");
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                    }
                }
            }
        }
    }

    for subscription in subscriptions.read().await.iter() {
        subscription.ended.cancel();
    }
    debug!("MQTT event loop stopped");
}

/// Keep polling briefly so a queued DISCONNECT reaches the broker
async fn flush_disconnect(eventloop: &mut EventLoop) {
    let _ = tokio::time::timeout(DISCONNECT_GRACE, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
}

async fn dispatch(subscriptions: &SubscriptionTable, topic: String, payload: Bytes) {
    let handlers: Vec<DeliveryHandler> = subscriptions
        .read()
        .await
        .iter()
        .filter(|s| topic_matches(&s.filter, &topic))
        .map(|s| Arc::clone(&s.handler))
        .collect();

    if handlers.is_empty() {
        debug!(topic = %topic, "no handler for MQTT topic, skipping message");
        return;
    }

    for handler in handlers {
        handler(Delivery {
            topic: topic.clone(),
            payload: payload.clone(),
        })
        .await;
    }
}

async fn resubscribe(client: &AsyncClient, subscriptions: &SubscriptionTable) {
    for subscription in subscriptions.read().await.iter() {
        // try_subscribe: the event loop task itself drains the request channel
        if let Err(e) = client.try_subscribe(subscription.filter.clone(), QoS::AtLeastOnce) {
            warn!(topic = %subscription.filter, error = %e, "failed to restore MQTT subscription");
        }
    }
}

/// Broker host, port and optional credentials taken from a broker URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    /// Host name or address; IPv6 literals keep their brackets
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
}

/// Parse a broker URL
///
/// Accepts `mqtt://`, `tcp://` or no scheme, optional `user[:password]@`,
/// bracketed IPv6 hosts and a trailing path, which is ignored.
pub fn parse_broker_url(url: &str) -> Result<BrokerAddress> {
    let rest = ["mqtt://", "tcp://"]
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme))
        .unwrap_or(url);
    let authority = rest.split(['/', '?']).next().unwrap_or(rest);

    let (userinfo, host_port) = match authority.rsplit_once('@') {
        Some((userinfo, host_port)) => (Some(userinfo), host_port),
        None => (None, authority),
    };

    let credentials = userinfo.map(|userinfo| match userinfo.split_once(':') {
        Some((username, password)) => (username.to_string(), password.to_string()),
        None => (userinfo.to_string(), String::new()),
    });

    let (host, port) = if host_port.starts_with('[') {
        let end = host_port
            .find(']')
            .with_context(|| format!("Unclosed IPv6 host in broker URL: {}", url))?;
        let port = match &host_port[end + 1..] {
            "" => None,
            tail => Some(
                tail.strip_prefix(':')
                    .with_context(|| format!("Invalid broker URL format: {}", url))?,
            ),
        };
        (&host_port[..=end], port)
    } else {
        match host_port.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (host_port, None),
        }
    };

    if host.is_empty() || host == "[]" {
        bail!("Invalid broker URL format: {}", url);
    }

    let port = match port {
        Some(port) => port
            .parse::<u16>()
            .with_context(|| format!("Invalid port in broker URL: {}", port))?,
        None => DEFAULT_MQTT_PORT,
    };

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
        credentials,
    })
}
