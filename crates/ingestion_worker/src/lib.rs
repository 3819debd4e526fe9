pub mod domain;
pub mod geofence_relay;
pub mod ingestion_worker;
pub mod mqtt;
pub mod queue;

pub use domain::*;
pub use geofence_relay::*;
pub use ingestion_worker::*;
pub use mqtt::*;
pub use queue::*;
