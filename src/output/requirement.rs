//! Declared output files a successful run must leave behind.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the content of an output file is checked and retained.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentKind {
    /// Non-empty UTF-8 text.
    #[default]
    Text,
    /// Delimited rows under a header, with a consistent column count.
    Table {
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
    /// A JSON document.
    Json,
}

fn default_delimiter() -> char {
    ','
}

impl ContentKind {
    /// Comma separated table.
    pub fn csv() -> Self {
        ContentKind::Table {
            delimiter: default_delimiter(),
        }
    }
}

/// One expected output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRequirement {
    /// Key under which the content is retained.
    pub id: String,
    /// Relative path or glob pattern inside the working directory.
    pub target: String,
    #[serde(default)]
    pub kind: ContentKind,
}

impl OutputRequirement {
    pub fn new(id: impl Into<String>, target: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            kind,
        }
    }

    /// Plain text output at `target`, keyed by the target itself.
    pub fn text(target: impl Into<String>) -> Self {
        let target = target.into();
        Self::new(target.clone(), target, ContentKind::Text)
    }

    /// Returns true if `target` is a glob pattern rather than a path.
    pub fn is_pattern(&self) -> bool {
        self.target.contains(['*', '?', '['])
    }

    /// Checks that the target is a usable relative path or pattern.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "output requirement id cannot be empty".to_string(),
            ));
        }
        if self.target.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(format!(
                "output requirement '{}' has an empty target",
                self.id
            )));
        }

        let path = Path::new(&self.target);
        let escapes = path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if escapes {
            return Err(ConfigError::ValidationFailed(format!(
                "output requirement '{}' must stay inside the working directory: {}",
                self.id, self.target
            )));
        }

        if self.is_pattern() {
            glob::Pattern::new(&self.target).map_err(|e| {
                ConfigError::ValidationFailed(format!(
                    "output requirement '{}' has an invalid pattern: {}",
                    self.id, e
                ))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_requirements() {
        let yaml = r#"
- id: summary
  target: summary.txt
- id: table
  target: results/*.csv
  kind:
    type: table
- id: stats
  target: stats.json
  kind:
    type: json
"#;
        let requirements: Vec<OutputRequirement> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(requirements[0].kind, ContentKind::Text);
        assert_eq!(requirements[1].kind, ContentKind::csv());
        assert!(requirements[1].is_pattern());
        assert_eq!(requirements[2].kind, ContentKind::Json);
        assert!(requirements.iter().all(|r| r.validate().is_ok()));
    }

    #[test]
    fn test_validate_rejects_escaping_targets() {
        assert!(OutputRequirement::text("../out.txt").validate().is_err());
        assert!(OutputRequirement::text("/tmp/out.txt").validate().is_err());
        assert!(OutputRequirement::new("", "a.txt", ContentKind::Text)
            .validate()
            .is_err());
        assert!(OutputRequirement::text("[bad").validate().is_err());
        assert!(OutputRequirement::text("nested/out.txt").validate().is_ok());
    }
}
