mod client;
mod migrations;
mod position_repository;

pub use client::*;
pub use migrations::*;
pub use position_repository::*;
