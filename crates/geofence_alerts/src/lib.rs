pub mod amqp;
pub mod demo;
pub mod domain;

pub use amqp::*;
pub use demo::*;
pub use domain::*;
