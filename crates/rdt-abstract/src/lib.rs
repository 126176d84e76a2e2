pub mod config;
pub mod protocol;
pub mod scenario;

pub use config::{ConfigError, ConfigOverride, LossConfig, MAX_MSS, TransferConfig};
pub use protocol::Protocol;
pub use scenario::{Scenario, ScenarioAssertion, ScenarioPayload};
