use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        tracing::debug!(
            deployment = config.deployment.is_some(),
            vector_store = config.vector_store.is_some(),
            "configuration loaded"
        );

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no adapter is configured or a section is invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.deployment.is_none() && self.vector_store.is_none() {
            anyhow::bail!("at least one of [deployment] or [vector_store] must be configured");
        }

        if let Some(deployment) = &self.deployment {
            deployment.validate()?;
        }

        if let Some(store) = &self.vector_store {
            if store.dims == 0 {
                anyhow::bail!("vector_store.dims must be greater than 0");
            }
            if store.index_name.is_empty() {
                anyhow::bail!("vector_store.index_name must not be empty");
            }
        }

        if let Some(telemetry) = &self.telemetry {
            telemetry.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::telemetry::LogFormat;

    #[test]
    fn load_from_file_expands_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [deployment]
            endpoint = "https://example.com/predict"
            api_key = "{{{{ env.TETHER_LOADER_KEY }}}}"
            "#
        )
        .unwrap();

        temp_env::with_var("TETHER_LOADER_KEY", Some("sk-123"), || {
            let config = Config::load(file.path()).unwrap();
            let deployment = config.deployment.unwrap();
            assert_eq!(deployment.endpoint.as_str(), "https://example.com/predict");
            assert!(deployment.api_key.is_some());
        });
    }

    #[test]
    fn load_missing_file_fails() {
        let err = Config::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn empty_config_is_rejected() {
        let err = Config::from_toml("").unwrap_err();
        assert!(err.to_string().contains("at least one of"));
    }

    #[test]
    fn vector_store_only_is_accepted() {
        let config = Config::from_toml("[vector_store]\ndims = 8\n").unwrap();
        assert_eq!(config.vector_store.unwrap().dims, 8);
    }

    #[test]
    fn telemetry_section_parses() {
        let toml = r#"
            [deployment]
            endpoint = "https://example.com/predict"

            [telemetry]
            service_name = "rag-worker"
            log_format = "json"

            [telemetry.exporter]
            endpoint = "http://localhost:4317"

            [telemetry.tracing]
            sampling_rate = 0.25
        "#;

        let config = Config::from_toml(toml).unwrap();
        let telemetry = config.telemetry.unwrap();
        assert_eq!(telemetry.service_name, "rag-worker");
        assert_eq!(telemetry.log_format, LogFormat::Json);
        assert!(telemetry.exporter.is_some());
    }

    #[test]
    fn invalid_sampling_rate_is_rejected() {
        let toml = r#"
            [deployment]
            endpoint = "https://example.com/predict"

            [telemetry.tracing]
            sampling_rate = 1.5
        "#;

        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn zero_dims_is_rejected() {
        assert!(Config::from_toml("[vector_store]\ndims = 0\n").is_err());
    }
}
