use crate::config::types::{Config, OutputConfig, SiteConfig, ThrottleConfig, UserAgentConfig};
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_site_config(&config.site)?;
    validate_throttle(&config.throttle)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates throttle configuration
///
/// Also called by the request throttler itself, so an inverted delay range
/// can never reach the network even when the config was built in code.
pub fn validate_throttle(config: &ThrottleConfig) -> ConfigResult<()> {
    let (min, max) = (config.min_delay_ms(), config.max_delay_ms());
    if min > max {
        return Err(ConfigError::Validation(format!(
            "min-delay must not be larger than max-delay, got {}ms > {}ms",
            min, max
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max-attempts must be >= 1, got 0".to_string(),
        ));
    }

    if config.failure_ceiling < 1 {
        return Err(ConfigError::Validation(
            "failure-ceiling must be >= 1, got 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates the site section
fn validate_site_config(config: &SiteConfig) -> ConfigResult<()> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    let category = config.category.trim_matches('/');
    if category.is_empty() {
        return Err(ConfigError::Validation(
            "category cannot be empty".to_string(),
        ));
    }

    if category.contains(char::is_whitespace) {
        return Err(ConfigError::Validation(format!(
            "category must not contain whitespace, got '{}'",
            config.category
        )));
    }

    if config.rating.is_empty() || !config.rating.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::Validation(format!(
            "rating must be numeric, got '{}'",
            config.rating
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> ConfigResult<()> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> ConfigResult<()> {
    if config.out_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "out-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> ConfigResult<()> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
