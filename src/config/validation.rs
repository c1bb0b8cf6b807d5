//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, attempt budget > 0)
//! - Check addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: CustodyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use alloy::primitives::Address;

use crate::config::schema::CustodyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `network.poll_interval_ms`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration.
pub fn validate_config(config: &CustodyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.node.rpc_url.parse::<url::Url>().is_err() {
        errors.push(ValidationError::new("node.rpc_url", format!("invalid URL '{}'", config.node.rpc_url)));
    }
    for failover in &config.node.failover_urls {
        if failover.parse::<url::Url>().is_err() {
            errors.push(ValidationError::new("node.failover_urls", format!("invalid URL '{}'", failover)));
        }
    }
    if config.node.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("node.rpc_timeout_secs", "must be greater than zero"));
    }
    if !config.node.operator_address.is_empty() && config.node.operator_address.parse::<Address>().is_err() {
        errors.push(ValidationError::new(
            "node.operator_address",
            format!("invalid address '{}'", config.node.operator_address),
        ));
    }
    if config.node.deploy_gas_limit == 0 || config.node.withdraw_gas_limit == 0 {
        errors.push(ValidationError::new("node", "gas limits must be greater than zero"));
    }

    if config.network.name.trim().is_empty() {
        errors.push(ValidationError::new("network.name", "must not be empty"));
    }
    if config.network.poll_interval_ms == 0 {
        errors.push(ValidationError::new("network.poll_interval_ms", "must be greater than zero"));
    }
    if config.network.log_block_window == 0 {
        errors.push(ValidationError::new("network.log_block_window", "must be greater than zero"));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }

    if config.heartbeat.timeout_secs == 0 {
        errors.push(ValidationError::new("heartbeat.timeout_secs", "must be greater than zero"));
    }
    if config.heartbeat.block_timeout_secs < config.heartbeat.timeout_secs {
        errors.push(ValidationError::new(
            "heartbeat.block_timeout_secs",
            "must not be shorter than heartbeat.timeout_secs",
        ));
    }

    if config.admin.enabled && config.admin.api_key.len() < 16 {
        errors.push(ValidationError::new("admin.api_key", "must be at least 16 characters when admin is enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&CustodyConfig::default()).is_ok());
    }

    #[test]
    fn test_all_errors_are_reported() {
        let mut config = CustodyConfig::default();
        config.network.poll_interval_ms = 0;
        config.node.rpc_timeout_secs = 0;
        config.retries.max_attempts = 0;
        config.heartbeat.block_timeout_secs = 1;
        config.node.operator_address = "not-an-address".to_string();
        config.network.name = " ".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(errors.len(), 6);
        assert!(fields.contains(&"network.poll_interval_ms"));
        assert!(fields.contains(&"node.rpc_timeout_secs"));
        assert!(fields.contains(&"retries.max_attempts"));
        assert!(fields.contains(&"heartbeat.block_timeout_secs"));
        assert!(fields.contains(&"node.operator_address"));
        assert!(fields.contains(&"network.name"));
    }

    #[test]
    fn test_admin_requires_real_key() {
        let mut config = CustodyConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = "short".to_string();
        assert!(validate_config(&config).is_err());

        config.admin.api_key = "a-sufficiently-long-key".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
