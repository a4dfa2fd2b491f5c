//! Serialization of artifacts in the supported output formats.

use std::fs;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

/// Supported artifact formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    /// File extension for artifacts in this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

/// Failure to serialize or persist an artifact.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to write '{path}': {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Renders `value` in the requested format.
pub fn render_artifact<T: Serialize>(value: &T, format: OutputFormat) -> Result<String, OutputError> {
    match format {
        OutputFormat::Json => {
            let mut raw = serde_json::to_string_pretty(value)?;
            raw.push('\n');
            Ok(raw)
        }
        OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
    }
}

/// Renders `value` and writes it to `path`, creating parent directories.
pub fn write_artifact<T: Serialize>(
    path: &Path,
    value: &T,
    format: OutputFormat,
) -> Result<(), OutputError> {
    let raw = render_artifact(value, format)?;
    let write_err = |source| OutputError::Write {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
    }
    fs::write(path, raw).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_render_json_is_pretty_and_newline_terminated() {
        let mut value = BTreeMap::new();
        value.insert("b", 2);
        value.insert("a", 1);
        let raw = render_artifact(&value, OutputFormat::Json).unwrap();
        assert_eq!(raw, "{\n  \"a\": 1,\n  \"b\": 2\n}\n");
    }

    #[test]
    fn test_render_yaml() {
        let mut value = BTreeMap::new();
        value.insert("items", 3);
        let raw = render_artifact(&value, OutputFormat::Yaml).unwrap();
        assert!(raw.contains("items: 3"));
    }

    #[test]
    fn test_write_artifact_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/summary.json");
        write_artifact(&path, &vec![1, 2, 3], OutputFormat::Json).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        let back: Vec<i32> = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
