mod amqp;
mod mqtt;
mod topic;
mod traits;

pub use amqp::*;
pub use mqtt::*;
pub use topic::*;
pub use traits::*;
