//! Harvest configuration: types, builder, and accessors.

mod builder;
mod getters;
mod types;

pub use builder::HarvestConfigBuilder;
pub use types::{ConfigError, Credential, HarvestConfig};
