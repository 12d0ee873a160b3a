use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Upload limit is not 0
/// - Default quality is within 0-100
/// - Engine timeouts are not 0
/// - Filename template is not empty
/// - Remote job URL uses http or https
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.server.max_upload_mb == 0 {
        return Err(ConfigError::ValidationError(
            "server.max_upload_mb cannot be 0".to_string(),
        ));
    }

    if config.conversion.default_quality > 100 {
        return Err(ConfigError::ValidationError(format!(
            "conversion.default_quality must be 0-100, got {}",
            config.conversion.default_quality
        )));
    }

    if config.conversion.filename_format.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "conversion.filename_format cannot be empty".to_string(),
        ));
    }

    let engines = &config.engines;
    let timeouts = [
        ("engines.image.timeout_secs", engines.image.timeout_secs),
        ("engines.media.timeout_secs", engines.media.timeout_secs),
        ("engines.document.timeout_secs", engines.document.timeout_secs),
    ];
    for (key, value) in timeouts {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!("{} cannot be 0", key)));
        }
    }

    if let Some(remote) = &engines.remote {
        if !(remote.url.starts_with("http://") || remote.url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "engines.remote.url must start with http:// or https://, got '{}'",
                remote.url
            )));
        }
        if remote.timeout_secs == 0 || remote.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "engines.remote timeouts cannot be 0".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RemoteEngineConfig, ServerConfig};
    use std::net::IpAddr;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".parse::<IpAddr>().unwrap(),
                port: 0,
                max_upload_mb: 256,
            },
            ..Config::default()
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_upload_limit_zero_fails() {
        let mut config = Config::default();
        config.server.max_upload_mb = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("max_upload_mb"));
    }

    #[test]
    fn test_validate_quality_out_of_range() {
        let mut config = Config::default();
        config.conversion.default_quality = 101;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("default_quality"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.engines.media.timeout_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("engines.media.timeout_secs"));
    }

    #[test]
    fn test_validate_empty_template() {
        let mut config = Config::default();
        config.conversion.filename_format = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_remote_url_scheme() {
        let mut config = Config::default();
        config.engines.remote = Some(RemoteEngineConfig {
            url: "localhost:24153".to_string(),
            timeout_secs: 60,
            poll_interval_ms: 500,
            request_timeout_secs: 10,
        });
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("engines.remote.url"));

        config.engines.remote.as_mut().unwrap().url = "http://localhost:24153".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
