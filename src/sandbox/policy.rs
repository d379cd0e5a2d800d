//! Declarative execution policy for candidate code.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Modules candidate code may not import by default.
pub const DEFAULT_FORBIDDEN_IMPORTS: &[&str] =
    &["os", "sys", "subprocess", "shutil", "pickle", "matplotlib"];

/// Builtins candidate code may not call by default.
pub const DEFAULT_FORBIDDEN_CALLS: &[&str] =
    &["input", "exit", "quit", "eval", "exec", "breakpoint"];

/// Either every file, or only the listed ones.
///
/// Serialized as the string `"all"` or as a list of entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "AllowanceRepr", into = "AllowanceRepr")]
pub enum FileAllowance {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl FileAllowance {
    /// Allowance for exactly the given entries.
    pub fn only<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FileAllowance::Only(entries.into_iter().map(Into::into).collect())
    }

    /// Allowance that permits nothing.
    pub fn none() -> Self {
        FileAllowance::Only(BTreeSet::new())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, FileAllowance::All)
    }

    /// Listed entries, or `None` for [`FileAllowance::All`].
    pub fn entries(&self) -> Option<&BTreeSet<String>> {
        match self {
            FileAllowance::All => None,
            FileAllowance::Only(entries) => Some(entries),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum AllowanceRepr {
    Keyword(String),
    List(Vec<String>),
}

impl TryFrom<AllowanceRepr> for FileAllowance {
    type Error = String;

    fn try_from(repr: AllowanceRepr) -> Result<Self, Self::Error> {
        match repr {
            AllowanceRepr::Keyword(word) if word == "all" => Ok(FileAllowance::All),
            AllowanceRepr::Keyword(word) => Err(format!(
                "expected \"all\" or a list of entries, got \"{}\"",
                word
            )),
            AllowanceRepr::List(entries) => Ok(FileAllowance::only(entries)),
        }
    }
}

impl From<FileAllowance> for AllowanceRepr {
    fn from(allowance: FileAllowance) -> Self {
        match allowance {
            FileAllowance::All => AllowanceRepr::Keyword("all".to_string()),
            FileAllowance::Only(entries) => AllowanceRepr::List(entries.into_iter().collect()),
        }
    }
}

impl fmt::Display for FileAllowance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileAllowance::All => f.write_str("all"),
            FileAllowance::Only(entries) => {
                let list: Vec<&str> = entries.iter().map(String::as_str).collect();
                write!(f, "[{}]", list.join(", "))
            }
        }
    }
}

/// What candidate code may do while it runs.
///
/// Immutable for the duration of a loop. Every field has a default, so a
/// policy can be declared partially in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Module names that may not be imported (dotted submodules included).
    pub forbidden_imports: BTreeSet<String>,
    /// Builtin names that may not be called.
    pub forbidden_calls: BTreeSet<String>,
    /// Files that may be opened for writing, relative to the working directory.
    pub allowed_open_write_files: FileAllowance,
    /// Glob patterns newly created files must match.
    pub allowed_create_files: FileAllowance,
    /// Files inside the working directory that may be opened for reading.
    pub allowed_read_files: FileAllowance,
    /// Wall-clock budget in seconds.
    pub timeout_seconds: Option<f64>,
    /// Warning class names that abort the run.
    pub fatal_warning_kinds: BTreeSet<String>,
    /// Scoped working directory; `None` uses a fresh scratch directory per round.
    pub working_directory: Option<PathBuf>,
    /// Files copied into the working directory before every round.
    pub input_files: Vec<PathBuf>,
    /// Extra environment variables for the interpreter.
    pub env: BTreeMap<String, String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            forbidden_imports: DEFAULT_FORBIDDEN_IMPORTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            forbidden_calls: DEFAULT_FORBIDDEN_CALLS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_open_write_files: FileAllowance::All,
            allowed_create_files: FileAllowance::All,
            allowed_read_files: FileAllowance::All,
            timeout_seconds: None,
            fatal_warning_kinds: BTreeSet::new(),
            working_directory: None,
            input_files: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

impl Policy {
    /// Creates a policy with the default restrictions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the forbidden import list.
    pub fn with_forbidden_imports<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbidden_imports = modules.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the forbidden call list.
    pub fn with_forbidden_calls<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbidden_calls = symbols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allowed_write_files(mut self, allowance: FileAllowance) -> Self {
        self.allowed_open_write_files = allowance;
        self
    }

    pub fn with_allowed_create_files(mut self, allowance: FileAllowance) -> Self {
        self.allowed_create_files = allowance;
        self
    }

    pub fn with_allowed_read_files(mut self, allowance: FileAllowance) -> Self {
        self.allowed_read_files = allowance;
        self
    }

    /// Sets the wall-clock timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = Some(timeout.as_secs_f64());
        self
    }

    /// Adds a warning kind that aborts the run.
    pub fn with_fatal_warning(mut self, kind: impl Into<String>) -> Self {
        self.fatal_warning_kinds.insert(kind.into());
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Adds a file copied into the working directory before each round.
    pub fn with_input_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_files.push(path.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }

    /// Returns true if a newly created file (relative path) is acceptable.
    pub fn is_creation_allowed(&self, relative_path: &str) -> bool {
        match &self.allowed_create_files {
            FileAllowance::All => true,
            FileAllowance::Only(patterns) => patterns.iter().any(|pattern| {
                glob::Pattern::new(pattern)
                    .map(|p| p.matches(relative_path))
                    .unwrap_or(false)
            }),
        }
    }

    /// Validates the policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(secs) = self.timeout_seconds {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "timeout_seconds must be positive, got {}",
                    secs
                )));
            }
        }

        if let Some(patterns) = self.allowed_create_files.entries() {
            for pattern in patterns {
                glob::Pattern::new(pattern).map_err(|e| {
                    ConfigError::ValidationFailed(format!(
                        "invalid allowed_create_files pattern '{}': {}",
                        pattern, e
                    ))
                })?;
            }
        }

        for (kind, names) in [
            ("forbidden_imports", &self.forbidden_imports),
            ("forbidden_calls", &self.forbidden_calls),
        ] {
            if names.iter().any(|name| name.trim().is_empty()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} contains an empty name",
                    kind
                )));
            }
        }

        if self.env.contains_key("PATH") {
            return Err(ConfigError::ValidationFailed(
                "env may not override PATH".to_string(),
            ));
        }

        Ok(())
    }
}
