pub mod domain;
pub mod garde;
pub mod postgres;
pub mod retry;
pub mod telemetry;
pub mod transport;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockGeofenceEventProducer;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockGeofenceMonitor;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockPositionRepository;
#[cfg(any(test, feature = "testing"))]
pub use transport::MockFanoutTopology;
#[cfg(any(test, feature = "testing"))]
pub use transport::MockPubSubTransport;
