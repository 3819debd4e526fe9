use anyhow::Result;
use common::domain::PositionReport;
use common::transport::PubSubTransport;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const VEHICLE_PREFIXES: [&str; 6] = ["1234", "2345", "3456", "4567", "5678", "6789"];

#[derive(Debug, Clone)]
pub struct DemoPositionProducerConfig {
    pub topic: String,
    pub interval: Duration,
    /// Fixed vehicle id; a random plate-style id is used per report when unset
    pub vehicle_id: Option<String>,
}

/// Publishes synthetic position reports on the position topic
///
/// Used to exercise the ingestion pipeline without real vehicles.
pub struct DemoPositionProducer {
    transport: Arc<dyn PubSubTransport>,
    config: DemoPositionProducerConfig,
}

impl DemoPositionProducer {
    pub fn new(transport: Arc<dyn PubSubTransport>, config: DemoPositionProducerConfig) -> Self {
        Self { transport, config }
    }

    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        info!(
            topic = %self.config.topic,
            interval_ms = self.config.interval.as_millis() as u64,
            "starting demo position producer"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("demo position producer stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.publish_next().await;
                }
            }
        }
    }

    async fn publish_next(&self) {
        let report = mock_position_report(
            &mut rand::thread_rng(),
            self.config.vehicle_id.as_deref(),
            chrono::Utc::now().timestamp(),
        );

        let payload = match report.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(vehicle_id = %report.vehicle_id, error = %e, "failed to encode mock position");
                return;
            }
        };

        match self
            .transport
            .publish(&self.config.topic, payload.into())
            .await
        {
            Ok(()) => debug!(
                vehicle_id = %report.vehicle_id,
                latitude = report.latitude,
                longitude = report.longitude,
                "published mock position"
            ),
            Err(e) => error!(
                vehicle_id = %report.vehicle_id,
                error = %e,
                "failed to publish mock position"
            ),
        }
    }
}

/// Random plate-style id such as `B3456QRT`
pub fn random_vehicle_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    let prefix = VEHICLE_PREFIXES[rng.gen_range(0..VEHICLE_PREFIXES.len())];
    let suffix: String = (0..3).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect();
    format!("B{}{}", prefix, suffix)
}

/// Uniformly random position anywhere on the globe
pub fn mock_position_report<R: Rng + ?Sized>(
    rng: &mut R,
    vehicle_id: Option<&str>,
    timestamp: i64,
) -> PositionReport {
    PositionReport {
        vehicle_id: vehicle_id
            .map(str::to_string)
            .unwrap_or_else(|| random_vehicle_id(rng)),
        latitude: rng.gen_range(-90.0..=90.0),
        longitude: rng.gen_range(-180.0..=180.0),
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use common::transport::MockPubSubTransport;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_vehicle_id_format() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let id = random_vehicle_id(&mut rng);
            assert_eq!(id.len(), 8);
            assert!(id.starts_with('B'));
            assert!(VEHICLE_PREFIXES.contains(&&id[1..5]));
            assert!(id[5..].chars().all(|c| c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_mock_position_report_ranges() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let report = mock_position_report(&mut rng, None, 1715003456);
            assert!((-90.0..=90.0).contains(&report.latitude));
            assert!((-180.0..=180.0).contains(&report.longitude));
            assert_eq!(report.timestamp, 1715003456);
        }
    }

    #[test]
    fn test_mock_position_report_uses_configured_vehicle() {
        let mut rng = StdRng::seed_from_u64(1);
        let report = mock_position_report(&mut rng, Some("B1234XYZ"), 0);
        assert_eq!(report.vehicle_id, "B1234XYZ");
    }

    #[tokio::test]
    async fn test_producer_publishes_decodable_reports_until_cancelled() {
        let mut mock_transport = MockPubSubTransport::new();
        mock_transport
            .expect_publish()
            .withf(|topic: &str, payload: &Bytes| {
                topic == "fleet/vehicles/positions"
                    && PositionReport::decode(payload)
                        .map(|r| r.vehicle_id == "B1234XYZ")
                        .unwrap_or(false)
            })
            .returning(|_, _| Ok(()));

        let producer = DemoPositionProducer::new(
            Arc::new(mock_transport),
            DemoPositionProducerConfig {
                topic: "fleet/vehicles/positions".to_string(),
                interval: Duration::from_millis(10),
                vehicle_id: Some("B1234XYZ".to_string()),
            },
        );

        let ctx = CancellationToken::new();
        let handle = tokio::spawn(producer.run(ctx.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        ctx.cancel();

        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_producer_keeps_running_after_publish_error() {
        let mut mock_transport = MockPubSubTransport::new();
        mock_transport
            .expect_publish()
            .times(2..)
            .returning(|_, _| Err(anyhow::anyhow!("broker unavailable")));

        let producer = DemoPositionProducer::new(
            Arc::new(mock_transport),
            DemoPositionProducerConfig {
                topic: "fleet/vehicles/positions".to_string(),
                interval: Duration::from_millis(10),
                vehicle_id: None,
            },
        );

        let ctx = CancellationToken::new();
        let handle = tokio::spawn(producer.run(ctx.clone()));

        tokio::time::sleep(Duration::from_millis(60)).await;
        ctx.cancel();

        assert!(handle.await.unwrap().is_ok());
    }
}
