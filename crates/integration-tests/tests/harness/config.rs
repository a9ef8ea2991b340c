//! Deployment configuration for integration tests

use secrecy::SecretString;
use tether_config::DeploymentConfig;
use url::Url;

/// Configuration pointed at a mock deployment, with instant retries
pub fn deployment(endpoint: Url) -> DeploymentConfig {
    DeploymentConfig {
        api_key: Some(SecretString::from("test-key")),
        max_retries: 3,
        backoff_factor: 0.0,
        ..DeploymentConfig::new(endpoint)
    }
}

/// Same as [`deployment`] with retries disabled
pub fn deployment_without_retries(endpoint: Url) -> DeploymentConfig {
    DeploymentConfig {
        max_retries: 0,
        ..deployment(endpoint)
    }
}
