// TOML config adapter - Layered configuration from a TOML file and property overrides

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::debug;

use crate::domain::model::SessionProperties;
use crate::error::{BfpuError, BfpuResult};

/// Configuration tree: session keys at the root, one table per action.
///
/// Property overrides patch the tree before any typed extraction so that the
/// session and every action see the same merged view.
#[derive(Debug, Clone, Default)]
pub struct TomlConfig {
    root: Table,
    path: Option<PathBuf>,
}

impl TomlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> BfpuResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BfpuError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        let mut config = Self::from_toml_str(&content).map_err(|e| BfpuError::Config {
            message: format!("{}: {}", path.display(), e),
        })?;
        config.path = Some(path.to_path_buf());
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> BfpuResult<Self> {
        let root: Table = toml::from_str(content).map_err(|e| BfpuError::Config {
            message: format!("failed to parse TOML: {}", e),
        })?;
        Ok(Self { root, path: None })
    }

    /// File the tree was loaded from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Apply a `dotted.key=value` override.
    ///
    /// The value is read as a TOML scalar or array when it parses as one
    /// (`30`, `true`, `["a"]`) and as a plain string otherwise.
    pub fn set_property(&mut self, assignment: &str) -> BfpuResult<()> {
        let (key, raw) = assignment.split_once('=').ok_or_else(|| BfpuError::Config {
            message: format!("property \"{}\" is not of the form KEY=VALUE", assignment),
        })?;
        self.set_value(key.trim(), parse_value(raw.trim()))
    }

    pub fn set_value(&mut self, key_path: &str, value: Value) -> BfpuResult<()> {
        let segments: Vec<&str> = key_path.split('.').map(str::trim).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(BfpuError::Config {
                message: format!("property key \"{}\" is malformed", key_path),
            });
        }

        let (last, parents) = match segments.split_last() {
            Some(split) => split,
            None => {
                return Err(BfpuError::Config {
                    message: "property key is empty".to_string(),
                })
            }
        };

        let mut table = &mut self.root;
        for segment in parents {
            let entry = table
                .entry(segment.to_string())
                .or_insert_with(|| Value::Table(Table::new()));
            table = match entry {
                Value::Table(inner) => inner,
                _ => {
                    return Err(BfpuError::Config {
                        message: format!(
                            "property key \"{}\": \"{}\" is not a table",
                            key_path, segment
                        ),
                    })
                }
            };
        }
        table.insert(last.to_string(), value);
        Ok(())
    }

    /// Session keys from the root table
    pub fn session(&self) -> BfpuResult<SessionProperties> {
        Value::Table(self.root.clone())
            .try_into()
            .map_err(|e| BfpuError::Config {
                message: format!("session settings: {}", e),
            })
    }

    /// Typed view of one action's table; absent tables yield the defaults
    pub fn section<T>(&self, name: &str) -> BfpuResult<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.root.get(name) {
            None => Ok(T::default()),
            Some(Value::Table(table)) => Value::Table(table.clone())
                .try_into()
                .map_err(|e| BfpuError::Config {
                    message: format!("[{}]: {}", name, e),
                }),
            Some(_) => Err(BfpuError::Config {
                message: format!("\"{}\" must be a table", name),
            }),
        }
    }
}

fn parse_value(raw: &str) -> Value {
    toml::from_str::<Table>(&format!("value = {}", raw))
        .ok()
        .and_then(|mut table| table.remove("value"))
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default, rename_all = "kebab-case")]
    struct Sample {
        command: Option<String>,
        frame_rate: Option<f64>,
        ignore_exit_code: bool,
    }

    #[test]
    fn test_override_parses_scalars() {
        let mut config = TomlConfig::new();
        config.set_property("sample.frame-rate=30").unwrap();
        config.set_property("sample.ignore-exit-code=true").unwrap();
        config.set_property("sample.command=cp %source% %target%").unwrap();

        let sample: Sample = config.section("sample").unwrap();
        assert_eq!(sample.frame_rate, Some(30.0));
        assert!(sample.ignore_exit_code);
        assert_eq!(sample.command.as_deref(), Some("cp %source% %target%"));
    }

    #[test]
    fn test_override_wins_over_file() {
        let mut config = TomlConfig::from_toml_str(
            r#"
            recursive = false
            [sample]
            command = "echo"
            "#,
        )
        .unwrap();
        config.set_property("recursive=true").unwrap();
        config.set_property("sample.command = touch %target%").unwrap();

        assert!(config.session().unwrap().recursive);
        let sample: Sample = config.section("sample").unwrap();
        assert_eq!(sample.command.as_deref(), Some("touch %target%"));
    }

    #[test]
    fn test_missing_section_is_default() {
        let config = TomlConfig::new();
        assert_eq!(config.section::<Sample>("sample").unwrap(), Sample::default());
    }

    #[test]
    fn test_malformed_overrides_are_rejected() {
        let mut config = TomlConfig::new();
        assert!(config.set_property("no-equals-sign").is_err());
        assert!(config.set_property("a..b=1").is_err());

        config.set_property("scalar=1").unwrap();
        assert!(config.set_property("scalar.inner=2").is_err());
    }

    #[test]
    fn test_bad_types_surface_as_config_errors() {
        let config = TomlConfig::from_toml_str("[sample]\nframe-rate = \"fast\"").unwrap();
        let err = config.section::<Sample>("sample").unwrap_err();
        assert!(matches!(err, BfpuError::Config { .. }));
        assert!(err.to_string().contains("[sample]"));
    }

    #[test]
    fn test_invalid_file_content_is_rejected() {
        assert!(TomlConfig::from_toml_str("this is = = not toml").is_err());
    }
}
