//! Compilation of exec settings into an immutable action template

use crate::config::ConfigError;
use crate::credentials::Credentials;
use crate::template::Template;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static ENV_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid env name regex"));

/// Environment override for the child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvEntry {
    /// Variable name
    pub name: String,

    /// Value template; `None` copies the same-named event property
    pub value: Option<Template>,
}

impl EnvEntry {
    /// Parse a `NAME` or `NAME=VALUE` entry
    pub fn parse(entry: &str) -> Result<Self, ConfigError> {
        let (name, value) = match entry.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (entry, None),
        };

        if !ENV_NAME.is_match(name) {
            return Err(ConfigError::InvalidEnvName(entry.to_string()));
        }

        let value = value
            .map(|raw| {
                Template::compile(raw).map_err(|source| ConfigError::Template {
                    text: entry.to_string(),
                    source,
                })
            })
            .transpose()?;

        Ok(Self {
            name: name.to_string(),
            value,
        })
    }

    /// Check if this entry copies an event property
    pub fn is_pass_through(&self) -> bool {
        self.value.is_none()
    }
}

/// Everything needed to run an exec action, fixed at setup time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTemplate {
    argv: Vec<Template>,
    env: Vec<EnvEntry>,
    credentials: Credentials,
}

impl ActionTemplate {
    /// Compile a command line and env entries
    pub fn compile(
        command: &str,
        env: &[String],
        credentials: Credentials,
    ) -> Result<Self, ConfigError> {
        let words = shell_words::split(command).map_err(|e| ConfigError::CommandSyntax {
            command: command.to_string(),
            message: e.to_string(),
        })?;

        if words.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }

        let argv = words
            .iter()
            .map(|word| {
                Template::compile(word).map_err(|source| ConfigError::Template {
                    text: word.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let env = env
            .iter()
            .map(|entry| EnvEntry::parse(entry))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            args = argv.len(),
            env = env.len(),
            "compiled command `{}'",
            command
        );

        Ok(Self {
            argv,
            env,
            credentials,
        })
    }

    /// Argument templates; the first one is the program
    pub fn argv(&self) -> &[Template] {
        &self.argv
    }

    /// Environment entries in config order
    pub fn env(&self) -> &[EnvEntry] {
        &self.env
    }

    /// Credentials to switch to before exec
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Uevent;

    fn compile(command: &str, env: &[&str]) -> Result<ActionTemplate, ConfigError> {
        let env: Vec<String> = env.iter().map(|s| s.to_string()).collect();
        ActionTemplate::compile(command, &env, Credentials::inherit())
    }

    #[test]
    fn test_argv_rendering() {
        let template = compile("echo ${FOO}", &[]).unwrap();
        let event = Uevent::from_pairs([("FOO", "bar")]);

        let argv: Vec<String> = template
            .argv()
            .iter()
            .map(|t| t.render(&event).unwrap())
            .collect();
        assert_eq!(argv, vec!["echo", "bar"]);
    }

    #[test]
    fn test_shell_quoting() {
        let template = compile(r#"sh -c 'echo "$1"' -- "a b""#, &[]).unwrap();
        assert_eq!(template.argv().len(), 5);
    }

    #[test]
    fn test_unterminated_quote() {
        assert!(matches!(
            compile(r#"echo "open"#, &[]),
            Err(ConfigError::CommandSyntax { .. })
        ));
    }

    #[test]
    fn test_empty_command() {
        assert!(matches!(compile("", &[]), Err(ConfigError::EmptyCommand)));
        assert!(matches!(compile("   \t", &[]), Err(ConfigError::EmptyCommand)));
    }

    #[test]
    fn test_bad_placeholder_in_argument() {
        let err = compile("echo ${FOO", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Template { ref text, .. } if text == "${FOO"));
    }

    #[test]
    fn test_env_forms() {
        let template = compile("true", &["LOG_LEVEL", "TAG=usb-${ID}", "EMPTY=", ""]).unwrap();
        let env = template.env();

        assert_eq!(env.len(), 4);
        assert!(env[0].is_pass_through());
        assert_eq!(env[1].name, "TAG");
        assert!(!env[2].is_pass_through());
        assert_eq!(env[2].value.as_ref().unwrap().segments().len(), 0);
        assert_eq!(env[3].name, "");
    }

    #[test]
    fn test_invalid_env_names() {
        for entry in ["1BAD=x", "BAD-NAME=x", "SP ACE", "Ü=1"] {
            match compile("true", &[entry]) {
                Err(ConfigError::InvalidEnvName(e)) => assert_eq!(e, entry),
                other => panic!("{entry}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_value_may_contain_equals() {
        let template = compile("true", &["OPTS=a=b"]).unwrap();
        let event = Uevent::new();
        let value = template.env()[0].value.as_ref().unwrap().render(&event).unwrap();
        assert_eq!(value, "a=b");
    }
}
