//! Dashboard session: wires the state machine to the network engine.
mod config;
mod effects;
mod session;

pub use config::DashboardConfig;
pub use effects::{command_for, failure_for, msg_for, EffectRunner};
pub use session::Session;
