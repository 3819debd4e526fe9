mod alert_handler;
mod evaluator;
mod geofence_service;

pub use alert_handler::*;
pub use evaluator::*;
pub use geofence_service::*;
