//! Rate limiting configuration.

use serde::Deserialize;

use super::error::ValidationError;

/// Per-client admission limits and the optional shared-store URL.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per client in any 60-second window.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Maximum requests per client in any 3600-second window.
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: u32,

    /// Redis URL for the distributed store; in-memory when absent.
    #[serde(default)]
    pub redis_url: Option<String>,
}

fn default_requests_per_minute() -> u32 {
    60
}
fn default_requests_per_hour() -> u32 {
    1000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            requests_per_hour: default_requests_per_hour(),
            redis_url: None,
        }
    }
}

impl RateLimitConfig {
    /// Validates the limit pair.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.requests_per_minute == 0 {
            return Err(ValidationError::Zero {
                field: "requests_per_minute".to_string(),
            });
        }
        if self.requests_per_hour < self.requests_per_minute {
            return Err(ValidationError::Invalid {
                field: "requests_per_hour".to_string(),
                reason: "must be at least requests_per_minute".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sixty_and_one_thousand() {
        let config = RateLimitConfig::default();
        assert_eq!(config.requests_per_minute, 60);
        assert_eq!(config.requests_per_hour, 1000);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn hour_limit_below_minute_limit_fails() {
        let config = RateLimitConfig {
            requests_per_minute: 100,
            requests_per_hour: 50,
            redis_url: None,
        };
        assert!(config.validate().is_err());
    }
}
