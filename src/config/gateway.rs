//! Gateway credentials and environment

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Upper bound for a single gateway request.
const MAX_TIMEOUT_SECS: u64 = 300;

/// Gateway configuration
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    /// Target gateway environment
    #[serde(default)]
    pub environment: GatewayEnvironment,

    /// Merchant account identifier
    #[serde(default)]
    pub merchant_id: String,

    /// Public API key
    #[serde(default)]
    pub public_key: String,

    /// Private API key (never logged)
    pub private_key: Option<SecretString>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Gateway environment
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GatewayEnvironment {
    Development,
    #[default]
    Sandbox,
    Production,
}

impl GatewayConfig {
    pub fn is_production(&self) -> bool {
        self.environment == GatewayEnvironment::Production
    }

    /// Private key for signing requests, if configured
    pub fn private_key(&self) -> Option<&str> {
        self.private_key
            .as_ref()
            .map(|key| key.expose_secret().as_str())
            .filter(|key| !key.is_empty())
    }

    /// Validate gateway configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.merchant_id.trim().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__MERCHANT_ID"));
        }
        if self.public_key.trim().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__PUBLIC_KEY"));
        }
        if self.private_key().is_none() {
            return Err(ValidationError::MissingRequired("GATEWAY__PRIVATE_KEY"));
        }
        if self.timeout_secs == 0 || self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            environment: GatewayEnvironment::default(),
            merchant_id: String::new(),
            public_key: String::new(),
            private_key: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> GatewayConfig {
        GatewayConfig {
            merchant_id: "merchant".to_string(),
            public_key: "public".to_string(),
            private_key: Some(SecretString::new("private".to_string())),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.environment, GatewayEnvironment::Sandbox);
        assert_eq!(config.timeout_secs, 60);
        assert!(!config.is_production());
    }

    #[test]
    fn test_validation_accepts_complete_config() {
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_validation_missing_keys() {
        assert!(GatewayConfig::default().validate().is_err());

        let config = GatewayConfig {
            private_key: Some(SecretString::new(String::new())),
            ..configured()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingRequired("GATEWAY__PRIVATE_KEY"))
        ));
    }

    #[test]
    fn test_validation_timeout_range() {
        let config = GatewayConfig {
            timeout_secs: 0,
            ..configured()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTimeout)));

        let config = GatewayConfig {
            timeout_secs: 301,
            ..configured()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_private_key_is_redacted_in_debug() {
        let rendered = format!("{:?}", configured());
        assert!(!rendered.contains("\"private\""));
    }
}
