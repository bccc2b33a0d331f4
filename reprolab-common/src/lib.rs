//! Types exchanged between the simulation runner and the workflow graph that drives it.

pub mod messages;
pub mod state;

pub use messages::*;
pub use state::*;
