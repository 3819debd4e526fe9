//! Garde validation helpers shared by the domain decoders.

mod validate;

pub use validate::*;
