mod geofence;
mod position;
mod result;

pub use geofence::*;
pub use position::*;
pub use result::*;
