//! DKG round lifecycle: configuration, the round factory, and round instances.

pub mod args;
pub mod config;
pub mod contract;
pub mod coordinator;
pub mod dealing;
pub mod local;
mod recovery;
pub mod round;
pub mod scope;
pub mod types;

pub use config::{PluginConfig, RoundFactoryCapabilities};
pub use contract::{KeyConsumer, MemoryContract, OnchainContract};
pub use coordinator::{DkgRoundFactory, FactoryConfig};
pub use local::{LocalKeyConfig, LocalKeys};
pub use round::{CompletionHandle, DkgRound};
pub use scope::RoundScope;
pub use types::{KeyData, RoundInfo, RoundLimits, RoundOutcome, RoundParams, RoundPhase};
