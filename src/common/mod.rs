mod messages;
mod name;
mod record;

pub use messages::*;
pub use name::*;
pub use record::*;
