//! Change Reactor
//!
//! Observes committed changes to the sensor table. Each notification is
//! decoded and logged; nothing is written back to storage.

mod reactor;

pub use reactor::{ChangeReactor, DecodeError, ReactorStats};
