pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{CopernicusApi, EarthExplorerApi, LocalStorage};
pub use config::toml_config::SatflowConfig;
pub use core::flow::{FlowParameters, FlowRunSummary, FlowSettings, FlowState, HarmonizationFlow};
pub use core::manifest::ManifestWriter;
pub use core::registry::ProviderRegistry;
pub use utils::error::{Result, SatflowError};
