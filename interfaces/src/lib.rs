pub mod defs;
pub mod state;

pub use defs::*;
pub use state::{SeenStore, SubscriberRegistry};
