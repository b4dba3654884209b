//! Action configuration
//!
//! Settings arrive as a YAML tree. This module type-checks the keys an exec
//! action understands and reads whole actions files.

use crate::credentials::LookupError;
use crate::template::TemplateError;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("action type `exec' requires `command'")]
    MissingCommand,

    #[error("`{key}' must be {expected}")]
    InvalidType {
        key: &'static str,
        expected: &'static str,
    },

    #[error("invalid command `{command}': {message}")]
    CommandSyntax { command: String, message: String },

    #[error("command is empty")]
    EmptyCommand,

    #[error("invalid template `{text}': {source}")]
    Template {
        text: String,
        #[source]
        source: TemplateError,
    },

    #[error("`{0}' is not a valid environment variable name. Must be series of alphanumeric or underscore characters, not starting with a digit (or empty)")]
    InvalidEnvName(String),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("unknown action type `{0}'")]
    UnknownActionType(String),

    #[error("action `{name}': {source}")]
    InvalidAction {
        name: String,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A user or group identifier as written in the config
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSpec {
    /// Looked up in the user/group database
    Name(String),

    /// Used as-is
    Id(u32),
}

/// Settings of one exec action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSettings {
    /// Shell-syntax command line
    pub command: String,

    /// `NAME` or `NAME=TEMPLATE` entries, in config order
    pub env: Vec<String>,

    /// Target user
    pub uid: Option<IdSpec>,

    /// Target group
    pub gid: Option<IdSpec>,
}

impl ExecSettings {
    /// Create settings with just a command
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: Vec::new(),
            uid: None,
            gid: None,
        }
    }

    /// Read settings from a YAML mapping
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let map = value.as_mapping().ok_or(ConfigError::InvalidType {
            key: "action",
            expected: "a mapping",
        })?;

        let command = match get(map, "command") {
            None => return Err(ConfigError::MissingCommand),
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(ConfigError::InvalidType {
                    key: "command",
                    expected: "a string",
                })
            }
        };

        Ok(Self {
            command,
            env: parse_env(get(map, "env"))?,
            uid: parse_id(map, "uid")?,
            gid: parse_id(map, "gid")?,
        })
    }
}

fn get<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(Value::String(key.to_string()))
}

fn parse_env(value: Option<&Value>) -> Result<Vec<String>, ConfigError> {
    const EXPECTED: &str = "a string or a list of strings, formatted as NAME or NAME=VALUE";

    match value {
        None => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                _ => Err(ConfigError::InvalidType {
                    key: "env",
                    expected: EXPECTED,
                }),
            })
            .collect(),
        Some(_) => Err(ConfigError::InvalidType {
            key: "env",
            expected: EXPECTED,
        }),
    }
}

fn parse_id(map: &Mapping, key: &'static str) -> Result<Option<IdSpec>, ConfigError> {
    let invalid = ConfigError::InvalidType {
        key,
        expected: "a name or a non-negative 32-bit integer",
    };

    match get(map, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(IdSpec::Name(s.clone()))),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|raw| u32::try_from(raw).ok())
            .map(|raw| Some(IdSpec::Id(raw)))
            .ok_or(invalid),
        Some(_) => Err(invalid),
    }
}

/// One entry of an actions file
#[derive(Debug, Clone)]
pub struct ActionEntry {
    /// Name used in logs and for `--action` selection
    pub name: String,

    /// Action type, `exec` unless given
    pub kind: String,

    /// Raw settings handed to the action type
    pub settings: Value,
}

/// Parse an actions document
pub fn parse_actions(yaml: &str) -> Result<Vec<ActionEntry>, ConfigError> {
    let doc: Value = serde_yaml::from_str(yaml)?;

    let list = doc
        .as_mapping()
        .and_then(|m| get(m, "actions"))
        .and_then(Value::as_sequence)
        .ok_or(ConfigError::InvalidType {
            key: "actions",
            expected: "a list of action settings",
        })?;

    Ok(list
        .iter()
        .enumerate()
        .map(|(idx, settings)| {
            let map = settings.as_mapping();
            let name = map
                .and_then(|m| get(m, "name"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("action-{}", idx));
            let kind = map
                .and_then(|m| get(m, "type"))
                .and_then(Value::as_str)
                .unwrap_or("exec")
                .to_string();

            ActionEntry {
                name,
                kind,
                settings: settings.clone(),
            }
        })
        .collect())
}

/// Read and parse an actions file
pub fn read_actions_file(path: &Path) -> Result<Vec<ActionEntry>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse_actions(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(yaml: &str) -> Result<ExecSettings, ConfigError> {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        ExecSettings::from_value(&value)
    }

    #[test]
    fn test_full_settings() {
        let s = settings(
            r#"
command: "logger ${DEVNAME}"
env: ["ACTION", "TAG=usb"]
uid: nobody
gid: 46
"#,
        )
        .unwrap();

        assert_eq!(s.command, "logger ${DEVNAME}");
        assert_eq!(s.env, vec!["ACTION".to_string(), "TAG=usb".to_string()]);
        assert_eq!(s.uid, Some(IdSpec::Name("nobody".to_string())));
        assert_eq!(s.gid, Some(IdSpec::Id(46)));
    }

    #[test]
    fn test_single_env_string() {
        let s = settings("command: true\nenv: LOG_LEVEL\n");
        // `true` parses as a YAML bool, not a string
        assert!(matches!(
            s,
            Err(ConfigError::InvalidType { key: "command", .. })
        ));

        let s = settings("command: \"true\"\nenv: LOG_LEVEL\n").unwrap();
        assert_eq!(s.env, vec!["LOG_LEVEL".to_string()]);
    }

    #[test]
    fn test_missing_command() {
        assert!(matches!(
            settings("env: FOO\n"),
            Err(ConfigError::MissingCommand)
        ));
    }

    #[test]
    fn test_bad_numeric_ids_are_explicit_errors() {
        for yaml in [
            "command: x\nuid: -1\n",
            "command: x\nuid: 1.5\n",
            "command: x\nuid: 4294967296\n",
            "command: x\ngid: [1]\n",
        ] {
            let err = settings(yaml).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidType { .. }),
                "{yaml}: {err}"
            );
        }
    }

    #[test]
    fn test_bad_env_type() {
        assert!(matches!(
            settings("command: x\nenv: [FOO, 3]\n"),
            Err(ConfigError::InvalidType { key: "env", .. })
        ));
    }

    #[test]
    fn test_parse_actions_defaults() {
        let entries = parse_actions(
            r#"
actions:
  - command: "echo one"
  - name: two
    type: exec
    command: "echo two"
"#,
        )
        .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "action-0");
        assert_eq!(entries[0].kind, "exec");
        assert_eq!(entries[1].name, "two");
    }

    #[test]
    fn test_parse_actions_requires_list() {
        assert!(parse_actions("actions: nope\n").is_err());
        assert!(parse_actions("[unclosed").is_err());
    }
}
