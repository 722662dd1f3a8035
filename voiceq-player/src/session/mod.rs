//! Session state and registry

pub mod registry;
pub mod state;

pub use registry::{GatewayProvider, SessionRegistry};
pub use state::Session;
