//! Application configuration module.
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Values are loaded with the `CONDUCTOR_`
//! prefix and nested sections use double underscores as separators, e.g.
//! `CONDUCTOR_RATE_LIMIT__REQUESTS_PER_MINUTE=120`.
//!
//! # Example
//!
//! ```no_run
//! use conductor::config::AppConfig;
//!
//! let config = AppConfig::load().expect("failed to load configuration");
//! config.validate().expect("invalid configuration");
//! ```

mod analytics;
mod cross_domain;
mod detection;
mod error;
mod orchestrator;
mod rate_limit;
mod selection;
mod synthesis;

pub use analytics::AnalyticsConfig;
pub use cross_domain::CrossDomainConfig;
pub use detection::{mismatch_message, DetectionConfig};
pub use error::{ConfigError, ValidationError};
pub use orchestrator::OrchestratorConfig;
pub use rate_limit::RateLimitConfig;
pub use selection::SelectionConfig;
pub use synthesis::SynthesisConfig;

use serde::Deserialize;

/// Root application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Orchestration timeouts, retries, and validation behavior.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Domain detection and routing validation thresholds.
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Cross-domain query handling.
    #[serde(default)]
    pub cross_domain: CrossDomainConfig,

    /// Tool selection thresholds.
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Context synthesis limits and rule file.
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Admission limits and shared-store URL.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Analytics storage and reporting.
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

impl AppConfig {
    /// Loads configuration from the environment (and `.env` if present).
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let loaded = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("CONDUCTOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(loaded.try_deserialize()?)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.orchestrator.validate()?;
        self.detection.validate()?;
        self.cross_domain.validate()?;
        self.selection.validate()?;
        self.synthesis.validate()?;
        self.rate_limit.validate()?;
        self.analytics.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(AppConfig::default().validate().is_ok());
    }
}
