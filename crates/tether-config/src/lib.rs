#![allow(clippy::must_use_candidate)]

pub mod deployment;
mod env;
mod loader;
pub mod telemetry;
pub mod vector_store;

use serde::Deserialize;

pub use deployment::*;
pub use telemetry::TelemetryConfig;
pub use vector_store::*;

/// Top-level Tether configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Model deployment the LLM client talks to
    #[serde(default)]
    pub deployment: Option<DeploymentConfig>,
    /// Redis vector store configuration
    #[serde(default)]
    pub vector_store: Option<VectorStoreConfig>,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
