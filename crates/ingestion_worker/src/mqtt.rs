mod demo_position_producer;
mod position_subscriber;

pub use demo_position_producer::*;
pub use position_subscriber::*;
