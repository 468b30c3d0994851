//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a [`ConfigError`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_database(config, &mut result);
        Self::validate_dispatcher(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }

        if config.server.host.is_empty() {
            result.add_error(ValidationError::new("server.host", "Host cannot be empty"));
        }
    }

    fn validate_database(config: &Config, result: &mut ValidationResult) {
        if config.database.in_memory {
            result.add_warning(ValidationWarning::new(
                "database.in_memory",
                "In-memory database: jobs and events are lost on restart",
            ));
        } else if config.database.path.trim().is_empty() {
            result.add_error(ValidationError::new(
                "database.path",
                "Database path cannot be empty",
            ));
        }
    }

    fn validate_dispatcher(config: &Config, result: &mut ValidationResult) {
        if config.dispatcher.timeout_seconds == Some(0) {
            result.add_error(ValidationError::new(
                "dispatcher.timeout_seconds",
                "timeout_seconds must be greater than 0 (omit it to disable the timeout)",
            ));
        }

        if config.dispatcher.user_agent.trim().is_empty() {
            result.add_error(ValidationError::new(
                "dispatcher.user_agent",
                "user_agent cannot be empty",
            ));
        }

        if config.dispatcher.max_response_body_bytes > 16 * 1024 * 1024 {
            result.add_warning(ValidationWarning::new(
                "dispatcher.max_response_body_bytes",
                "Response body limit is very high (>16MiB), every event stores up to this much",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        if config.logging.level.trim().is_empty() {
            result.add_error(ValidationError::new(
                "logging.level",
                "Log level cannot be empty",
            ));
        }

        if config.logging.directory.is_some() && config.logging.max_log_files == 0 {
            result.add_error(ValidationError::new(
                "logging.max_log_files",
                "max_log_files must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
