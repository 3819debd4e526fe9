mod handlers;
mod server;

pub use handlers::*;
pub use server::*;
