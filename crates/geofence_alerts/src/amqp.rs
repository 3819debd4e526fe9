mod alert_consumer;
mod geofence_event_producer;

pub use alert_consumer::*;
pub use geofence_event_producer::*;
