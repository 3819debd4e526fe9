mod config;

use anyhow::{anyhow, Context, Result};
use common::domain::{GeofenceBoundary, Location};
use common::postgres::{run_migrations, PostgresClient, PostgresPositionRepository};
use common::retry::{retry_with_backoff, startup_backoff};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use common::transport::{
    AmqpConfig, AmqpTransport, FanoutTopology, MqttConfig, MqttTransport, PubSubTransport,
};
use crate::config::ServiceConfig;
use fleet_runner::Runner;
use geofence_alerts::{
    run_geofence_demo, AlertConsumer, AlertConsumerConfig, AmqpGeofenceEventProducer,
    GeofenceService, LoggingAlertHandler,
};
use ingestion_worker::{
    geofence_relay, DemoPositionProducer, DemoPositionProducerConfig, IngestionWorker,
    IngestionWorkerConfig, PositionService,
};
use position_api::{HttpServerConfig, PositionApi};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

struct SharedDependencies {
    postgres: PostgresClient,
    mqtt: Arc<MqttTransport>,
    amqp: Arc<AmqpTransport>,
}

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let telemetry_config = TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    };

    let telemetry_providers = match init_telemetry(&telemetry_config) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting fleet telemetry service");
    debug!("Configuration: {:?}", config);

    let boundary = match GeofenceBoundary::new(
        config.geofence_name.clone(),
        Location::new(config.geofence_latitude, config.geofence_longitude),
        config.geofence_radius_km,
    ) {
        Ok(boundary) => boundary,
        Err(e) => {
            error!("Invalid geofence boundary: {}", e);
            std::process::exit(1);
        }
    };

    let deps = match initialize_shared_dependencies(&config).await {
        Ok(deps) => deps,
        Err(e) => {
            error!("Failed to initialize shared dependencies: {:#}", e);
            std::process::exit(1);
        }
    };

    let amqp_transport: Arc<dyn PubSubTransport> = deps.amqp.clone();
    let amqp_topology: Arc<dyn FanoutTopology> = deps.amqp.clone();
    let mqtt_transport: Arc<dyn PubSubTransport> = deps.mqtt.clone();

    let event_producer = Arc::new(AmqpGeofenceEventProducer::new(
        amqp_transport.clone(),
        config.amqp_exchange.clone(),
    ));
    let geofence_service = Arc::new(GeofenceService::new(vec![boundary], event_producer));

    if config.geofence_demo_enabled {
        match run_geofence_demo(&geofence_service).await {
            Ok(events) => info!(events = events.len(), "geofence demonstration completed"),
            Err(e) => {
                error!("Geofence demonstration failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let relay_capacity =
        NonZeroUsize::new(config.geofence_relay_capacity).unwrap_or(NonZeroUsize::MIN);
    let (geofence_handle, geofence_monitor) = geofence_relay(relay_capacity, geofence_service);

    let position_repository = Arc::new(PostgresPositionRepository::new(deps.postgres.clone()));
    let position_service = Arc::new(PositionService::new(
        position_repository.clone(),
        Arc::new(geofence_handle),
    ));

    let queue_capacity = NonZeroUsize::new(config.ingestion_queue_capacity)
        .unwrap_or(NonZeroUsize::MIN);
    let ingestion_worker = IngestionWorker::new(
        mqtt_transport.clone(),
        position_service,
        IngestionWorkerConfig {
            topic: config.mqtt_topic.clone(),
            queue_capacity,
            enqueue_timeout: config.enqueue_timeout(),
        },
    );

    let alert_consumer = AlertConsumer::new(
        amqp_transport,
        amqp_topology,
        Arc::new(LoggingAlertHandler),
        AlertConsumerConfig {
            exchange: config.amqp_exchange.clone(),
            queue: config.amqp_queue.clone(),
        },
    );

    let position_api = PositionApi::new(
        position_repository,
        HttpServerConfig {
            address: config.http_address(),
        },
    );

    let mut runner = Runner::new()
        .with_named_process("ingestion_worker", move |ctx| ingestion_worker.run(ctx))
        .with_named_process("geofence_monitor", move |ctx| geofence_monitor.run(ctx))
        .with_named_process("alert_consumer", move |ctx| alert_consumer.run(ctx))
        .with_named_process("position_api", move |ctx| position_api.run(ctx));

    if config.demo_producer_enabled {
        let demo_producer = DemoPositionProducer::new(
            mqtt_transport,
            DemoPositionProducerConfig {
                topic: config.mqtt_topic.clone(),
                interval: config.demo_producer_interval(),
                vehicle_id: config.demo_vehicle_id.clone(),
            },
        );
        runner =
            runner.with_named_process("demo_position_producer", move |ctx| demo_producer.run(ctx));
    }

    let SharedDependencies {
        postgres,
        mqtt,
        amqp,
    } = deps;

    let runner = runner
        .with_closer(move || async move {
            info!("Closing MQTT connection");
            mqtt.close().await
        })
        .with_closer(move || async move {
            info!("Closing AMQP connection");
            amqp.close().await
        })
        .with_closer(move || async move {
            info!("Closing PostgreSQL pool");
            postgres.close();
            Ok(())
        })
        .with_closer(move || async move {
            info!("Shutting down telemetry");
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10))
        .with_shutdown_timeout(config.shutdown_timeout());

    runner.run().await;
}

/// Connect to PostgreSQL, MQTT and AMQP, retrying each with backoff
async fn initialize_shared_dependencies(config: &ServiceConfig) -> Result<SharedDependencies> {
    info!("Connecting to PostgreSQL");
    let postgres = PostgresClient::new(&config.database_url, config.postgres_max_pool_size)?;
    startup_retry("PostgreSQL connection", config, || postgres.ping()).await?;

    let applied = run_migrations(&postgres)
        .await
        .context("Failed to run database migrations")?;
    info!(applied, "database migrations complete");

    info!(broker = %config.mqtt_broker_url, "Connecting to MQTT broker");
    let mut mqtt_config = MqttConfig::new(&config.mqtt_broker_url, &config.mqtt_client_id);
    mqtt_config.connect_timeout = config.startup_timeout();
    let mqtt = startup_retry("MQTT connection", config, || {
        MqttTransport::connect(&mqtt_config)
    })
    .await?;

    info!("Connecting to AMQP broker");
    let amqp_config = AmqpConfig::new(
        config.amqp_url.clone(),
        config.amqp_exchange.clone(),
        config.amqp_queue.clone(),
    );
    let amqp = startup_retry("AMQP connection", config, || {
        AmqpTransport::connect(amqp_config.clone())
    })
    .await?;

    Ok(SharedDependencies {
        postgres,
        mqtt: Arc::new(mqtt),
        amqp: Arc::new(amqp),
    })
}

/// Retry a startup step, bounding each attempt by the startup timeout
async fn startup_retry<T, F, Fut>(name: &str, config: &ServiceConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let timeout = config.startup_timeout();
    retry_with_backoff(name, startup_backoff(config.startup_max_retries), || {
        let attempt = operation();
        async move {
            tokio::time::timeout(timeout, attempt)
                .await
                .map_err(|_| anyhow!("timed out after {:?}", timeout))?
        }
    })
    .await
}
