use super::schema::{ValidationError, ValidationIssue};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// File name looked up in the workspace root when no settings file is given.
pub const SETTINGS_FILE_NAME: &str = "symbol-patcher.toml";

const DEFAULT_COMMENT_PREFIX: &str = "#";

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Upper bound on waiting for, and running, one symbol query
    pub resolver_timeout_ms: u64,
    /// Context lines in unified diffs
    pub diff_context: usize,
    /// Extensions (without dot) picked up by directory walks
    pub source_extensions: Vec<String>,
    /// Line comment prefix per extension
    pub comment_prefixes: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        let comment_prefixes = [
            ("py", "#"),
            ("sh", "#"),
            ("toml", "#"),
            ("yaml", "#"),
            ("yml", "#"),
            ("rs", "//"),
            ("js", "//"),
            ("ts", "//"),
            ("go", "//"),
            ("c", "//"),
            ("cpp", "//"),
            ("java", "//"),
            ("sql", "--"),
            ("lua", "--"),
        ]
        .into_iter()
        .map(|(ext, prefix)| (ext.to_string(), prefix.to_string()))
        .collect();

        Self {
            resolver_timeout_ms: 30_000,
            diff_context: 3,
            source_extensions: vec!["py".to_string()],
            comment_prefixes,
        }
    }
}

/// On-disk shape; every key is optional and `comment_prefixes` extends
/// the defaults instead of replacing them.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SettingsFile {
    #[serde(default)]
    resolver_timeout_ms: Option<u64>,
    #[serde(default)]
    diff_context: Option<usize>,
    #[serde(default)]
    source_extensions: Option<Vec<String>>,
    #[serde(default)]
    comment_prefixes: BTreeMap<String, String>,
}

impl SettingsFile {
    pub(crate) fn into_settings(self) -> Settings {
        let mut settings = Settings::default();
        if let Some(timeout) = self.resolver_timeout_ms {
            settings.resolver_timeout_ms = timeout;
        }
        if let Some(context) = self.diff_context {
            settings.diff_context = context;
        }
        if let Some(extensions) = self.source_extensions {
            settings.source_extensions = extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_string())
                .collect();
        }
        for (ext, prefix) in self.comment_prefixes {
            settings
                .comment_prefixes
                .insert(ext.trim_start_matches('.').to_string(), prefix);
        }
        settings
    }
}

impl Settings {
    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_millis(self.resolver_timeout_ms)
    }

    /// Comment prefix for `file`, `#` for unknown extensions.
    pub fn comment_prefix(&self, file: &Path) -> &str {
        file.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.comment_prefixes.get(ext))
            .map_or(DEFAULT_COMMENT_PREFIX, String::as_str)
    }

    pub fn is_source_file(&self, file: &Path) -> bool {
        file.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.source_extensions.iter().any(|s| s == ext))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        if self.resolver_timeout_ms == 0 {
            issues.push(ValidationIssue::InvalidValue {
                op: None,
                message: "resolver_timeout_ms must be greater than 0".to_string(),
            });
        }
        if self.source_extensions.is_empty() {
            issues.push(ValidationIssue::MissingField {
                op: None,
                field: "source_extensions",
            });
        }
        for (ext, prefix) in &self.comment_prefixes {
            if prefix.trim().is_empty() {
                issues.push(ValidationIssue::InvalidValue {
                    op: None,
                    message: format!("comment prefix for '.{ext}' is empty"),
                });
            }
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.resolver_timeout(), Duration::from_secs(30));
        assert_eq!(settings.comment_prefix(Path::new("a.py")), "#");
        assert_eq!(settings.comment_prefix(Path::new("lib.rs")), "//");
        assert_eq!(settings.comment_prefix(Path::new("q.sql")), "--");
        assert_eq!(settings.comment_prefix(Path::new("Makefile")), "#");
        assert!(settings.is_source_file(Path::new("pkg/a.py")));
        assert!(!settings.is_source_file(Path::new("pkg/a.pyc")));
    }

    #[test]
    fn test_file_overrides_extend_defaults() {
        let file: SettingsFile = toml_edit::de::from_str(
            "source_extensions = [\".py\", \"pyi\"]\n[comment_prefixes]\nhs = \"--\"\n",
        )
        .unwrap();
        let settings = file.into_settings();
        assert_eq!(settings.source_extensions, vec!["py", "pyi"]);
        assert_eq!(settings.comment_prefix(Path::new("Main.hs")), "--");
        assert_eq!(settings.comment_prefix(Path::new("a.py")), "#");
        assert_eq!(settings.diff_context, 3);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let settings = Settings {
            resolver_timeout_ms: 0,
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert_eq!(err.issues.len(), 1);
    }
}
