//! Debug loop configuration.
//!
//! Loaded from YAML, then overridden by `CODELOOP_*` environment variables,
//! then validated. Every field has a default.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::output::OutputRequirement;
use crate::sandbox::{Policy, DEFAULT_INTERPRETER};

/// Default number of attempts, each starting from the initial conversation.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Default number of iterations within one attempt.
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Configuration for one debug loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Attempts before giving up.
    pub max_attempts: usize,
    /// Iterations per attempt.
    pub max_iterations_per_attempt: usize,
    /// Packages the model may use; quoted in the import corrective message.
    pub permitted_packages: Vec<String>,
    /// Outputs a successful run must produce.
    pub requirements: Vec<OutputRequirement>,
    /// Execution policy for every round.
    pub policy: Policy,
    /// Interpreter command used to run candidates.
    pub interpreter: String,
    /// Model requested from a live provider.
    pub model: Option<String>,
    /// Sampling temperature for a live provider.
    pub temperature: Option<f64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_iterations_per_attempt: DEFAULT_MAX_ITERATIONS,
            permitted_packages: Vec::new(),
            requirements: Vec::new(),
            policy: Policy::default(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
            model: None,
            temperature: None,
        }
    }
}

impl LoopConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a YAML file, applies environment overrides and validates.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parses YAML, applies environment overrides and validates.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content)?
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Creates configuration from defaults and environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CODELOOP_MAX_ATTEMPTS`: Attempts before giving up (default: 3)
    /// - `CODELOOP_MAX_ITERATIONS`: Iterations per attempt (default: 5)
    /// - `CODELOOP_TIMEOUT_SECS`: Candidate wall-clock timeout in seconds
    /// - `CODELOOP_INTERPRETER`: Interpreter command (default: python3)
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::default().with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `CODELOOP_*` environment variables on top of this configuration.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("CODELOOP_MAX_ATTEMPTS") {
            self.max_attempts = parse_env_value(&val, "CODELOOP_MAX_ATTEMPTS")?;
        }

        if let Some(val) = lookup("CODELOOP_MAX_ITERATIONS") {
            self.max_iterations_per_attempt = parse_env_value(&val, "CODELOOP_MAX_ITERATIONS")?;
        }

        if let Some(val) = lookup("CODELOOP_TIMEOUT_SECS") {
            let secs: f64 = parse_env_value(&val, "CODELOOP_TIMEOUT_SECS")?;
            self.policy.timeout_seconds = Some(secs);
        }

        if let Some(val) = lookup("CODELOOP_INTERPRETER") {
            self.interpreter = val;
        }

        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.max_iterations_per_attempt == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_iterations_per_attempt must be greater than 0".to_string(),
            ));
        }

        if self.interpreter.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "interpreter cannot be empty".to_string(),
            ));
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::ValidationFailed(
                    "temperature must be between 0.0 and 2.0".to_string(),
                ));
            }
        }

        self.policy.validate()?;

        let mut seen = HashSet::new();
        for requirement in &self.requirements {
            requirement.validate()?;
            if !seen.insert(requirement.id.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "duplicate output requirement id '{}'",
                    requirement.id
                )));
            }
        }

        Ok(())
    }

    /// Total iteration budget across all attempts.
    pub fn iteration_budget(&self) -> usize {
        self.max_attempts * self.max_iterations_per_attempt
    }

    /// Builder method to set max attempts.
    pub fn with_max_attempts(mut self, max: usize) -> Self {
        self.max_attempts = max;
        self
    }

    /// Builder method to set max iterations per attempt.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations_per_attempt = max;
        self
    }

    /// Builder method to set the permitted packages.
    pub fn with_permitted_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permitted_packages = packages.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method to add an output requirement.
    pub fn with_requirement(mut self, requirement: OutputRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Builder method to set the execution policy.
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Builder method to set the candidate timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.policy = self.policy.with_timeout(timeout);
        self
    }

    /// Builder method to set the interpreter command.
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Builder method to set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ContentKind;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = LoopConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.max_iterations_per_attempt, 5);
        assert_eq!(config.iteration_budget(), 15);
        assert_eq!(config.interpreter, "python3");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
max_attempts: 2
max_iterations_per_attempt: 4
permitted_packages: [pandas, numpy, scipy]
requirements:
  - id: results
    target: results.csv
    kind:
      type: table
policy:
  timeout_seconds: 10
  allowed_open_write_files: [results.csv]
  fatal_warning_kinds: [RuntimeWarning]
"#;
        let config: LoopConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.permitted_packages.len(), 3);
        assert_eq!(config.requirements[0].kind, ContentKind::csv());
        assert_eq!(config.policy.timeout(), Some(Duration::from_secs(10)));
        // Policy fields not given keep their defaults.
        assert!(config.policy.forbidden_imports.contains("os"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CODELOOP_MAX_ATTEMPTS", "1"),
            ("CODELOOP_MAX_ITERATIONS", "2"),
            ("CODELOOP_TIMEOUT_SECS", "2.5"),
            ("CODELOOP_INTERPRETER", "/usr/bin/python3"),
        ]
        .into_iter()
        .collect();

        let config = LoopConfig::default()
            .with_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.max_iterations_per_attempt, 2);
        assert_eq!(config.policy.timeout_seconds, Some(2.5));
        assert_eq!(config.interpreter, "/usr/bin/python3");
    }

    #[test]
    fn test_invalid_env_value() {
        let err = LoopConfig::default()
            .with_overrides(|key| (key == "CODELOOP_MAX_ATTEMPTS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "CODELOOP_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_validation() {
        assert!(LoopConfig::default().with_max_attempts(0).validate().is_err());
        assert!(LoopConfig::default().with_max_iterations(0).validate().is_err());
        assert!(LoopConfig::default().with_interpreter("").validate().is_err());

        let duplicate = LoopConfig::default()
            .with_requirement(OutputRequirement::text("out.txt"))
            .with_requirement(OutputRequirement::text("out.txt"));
        assert!(duplicate.validate().is_err());

        let mut bad_timeout = LoopConfig::default();
        bad_timeout.policy.timeout_seconds = Some(-1.0);
        assert!(bad_timeout.validate().is_err());
    }
}
