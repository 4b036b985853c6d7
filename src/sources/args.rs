//! Command-line argument overlay.

use super::ConfigSource;
use crate::error::{ConfigError, Result};
use clap::error::ErrorKind;
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, Command};
use serde_json::{Map, Number, Value};
use std::ffi::OsString;

/// How an option maps onto its configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// A switch; sets the key to `true` when present.
    Flag,
    /// A repeatable switch (`-vvv`); sets the key to the number of occurrences.
    Count,
    /// An option taking a value; the string takes the type of the value it
    /// replaces.
    Value,
}

/// Declaration of one command-line option bound to a configuration key.
///
/// The key is a dotted path into the configuration (`server.port`), so the
/// command-line surface is independent of how the configuration type is laid out.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    key: String,
    long: String,
    short: Option<char>,
    help: Option<String>,
    kind: ArgKind,
}

impl ArgSpec {
    fn new(key: impl Into<String>, long: impl Into<String>, kind: ArgKind) -> Self {
        Self {
            key: key.into(),
            long: long.into(),
            short: None,
            help: None,
            kind,
        }
    }

    /// A boolean switch.
    pub fn flag(key: impl Into<String>, long: impl Into<String>) -> Self {
        Self::new(key, long, ArgKind::Flag)
    }

    /// A repeatable switch counting its occurrences.
    pub fn count(key: impl Into<String>, long: impl Into<String>) -> Self {
        Self::new(key, long, ArgKind::Count)
    }

    /// An option taking one value.
    pub fn value(key: impl Into<String>, long: impl Into<String>) -> Self {
        Self::new(key, long, ArgKind::Value)
    }

    /// Set the short form (`-f`).
    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    /// Set the help text.
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// The configuration key this option writes.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// How the option is parsed.
    pub fn kind(&self) -> ArgKind {
        self.kind
    }

    fn to_arg(&self) -> Arg {
        let action = match self.kind {
            ArgKind::Flag => ArgAction::SetTrue,
            ArgKind::Count => ArgAction::Count,
            ArgKind::Value => ArgAction::Set,
        };

        let mut arg = Arg::new(self.key.clone())
            .long(self.long.clone())
            .action(action);
        if self.kind == ArgKind::Value {
            arg = arg.value_parser(clap::value_parser!(String));
        }
        if let Some(short) = self.short {
            arg = arg.short(short);
        }
        if let Some(help) = &self.help {
            arg = arg.help(help.clone());
        }
        arg
    }
}

/// Failure to turn the argument vector into overrides.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgError {
    /// Help or version output was requested; carries the rendered text.
    #[error("{0}")]
    Help(String),

    /// The arguments do not match the declared options.
    #[error("{0}")]
    Invalid(String),
}

/// Declarative schema mapping command-line options onto configuration keys.
///
/// The overlay is resolved on every load, before the configuration file, so
/// values from the file take precedence over values from the command line.
///
/// # Examples
///
/// ```rust
/// use livecfg::sources::{ArgOverlay, ArgSpec};
///
/// let overlay = ArgOverlay::new("my-service")
///     .arg(ArgSpec::value("file", "config").short('f').help("Yaml config"))
///     .arg(ArgSpec::count("verbose", "verbose").short('v').help("Show verbose debug information"))
///     .with_args(["my-service", "-vv", "-f", "/etc/my-service.yaml"]);
///
/// let overrides = overlay.resolve().unwrap();
/// assert_eq!(overrides.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ArgOverlay {
    program: String,
    specs: Vec<ArgSpec>,
    args: Option<Vec<OsString>>,
}

impl ArgOverlay {
    /// Create an overlay for `program` with no options.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            specs: Vec::new(),
            args: None,
        }
    }

    /// Declare an option.
    pub fn arg(mut self, spec: ArgSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Parse this argument vector instead of the process arguments.
    ///
    /// The first element is the program name, as in `std::env::args`.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Whether no option is declared. An empty overlay never parses anything.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// The declared options.
    pub fn specs(&self) -> &[ArgSpec] {
        &self.specs
    }

    fn command(&self) -> Command {
        self.specs
            .iter()
            .fold(Command::new(self.program.clone()), |cmd, spec| cmd.arg(spec.to_arg()))
    }

    /// Parse the arguments into overrides.
    ///
    /// Only options present on the command line produce an override.
    ///
    /// # Errors
    ///
    /// Returns `ArgError::Help` when help was requested and `ArgError::Invalid`
    /// for any other parse failure.
    pub fn resolve(&self) -> std::result::Result<ArgOverrides, ArgError> {
        if self.is_empty() {
            return Ok(ArgOverrides::default());
        }

        let args = match &self.args {
            Some(args) => args.clone(),
            None => std::env::args_os().collect(),
        };

        let matches = self
            .command()
            .try_get_matches_from(args)
            .map_err(|err| match err.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                    ArgError::Help(err.render().to_string())
                }
                _ => ArgError::Invalid(err.render().to_string()),
            })?;

        let mut values = Vec::new();
        for spec in &self.specs {
            if matches.value_source(&spec.key) != Some(ValueSource::CommandLine) {
                continue;
            }

            let value = match spec.kind {
                ArgKind::Flag => ArgValue::Flag(matches.get_flag(&spec.key)),
                ArgKind::Count => ArgValue::Count(matches.get_count(&spec.key)),
                ArgKind::Value => match matches.get_one::<String>(&spec.key) {
                    Some(value) => ArgValue::Text(value.clone()),
                    None => continue,
                },
            };
            values.push((spec.key.clone(), value));
        }

        Ok(ArgOverrides { values })
    }

    /// Parse the arguments, terminating the process on failure.
    ///
    /// A help request prints the help text and exits with status 0. Any other
    /// parse failure is logged and exits with status 1.
    pub fn resolve_or_exit(&self) -> ArgOverrides {
        match self.resolve() {
            Ok(overrides) => overrides,
            Err(ArgError::Help(text)) => {
                print!("{}", text);
                std::process::exit(0);
            }
            Err(ArgError::Invalid(msg)) => {
                tracing::error!(program = %self.program, "{}", msg.trim_end());
                eprint!("{}", msg);
                std::process::exit(1);
            }
        }
    }
}

#[derive(Debug, Clone)]
enum ArgValue {
    Flag(bool),
    Count(u8),
    Text(String),
}

/// Values taken from the command line, keyed by configuration path.
#[derive(Debug, Clone, Default)]
pub struct ArgOverrides {
    values: Vec<(String, ArgValue)>,
}

impl ArgOverrides {
    /// Number of overridden keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is overridden.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Overridden keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(key, _)| key.as_str())
    }
}

impl ConfigSource for ArgOverrides {
    fn overlay(&self, tree: &mut Value) -> Result<()> {
        for (key, value) in &self.values {
            let slot = entry(tree, key)?;
            *slot = match value {
                ArgValue::Flag(set) => Value::Bool(*set),
                ArgValue::Count(count) => Value::from(*count),
                ArgValue::Text(text) => coerce(text, slot),
            };
        }
        Ok(())
    }

    fn name(&self) -> String {
        "args".to_string()
    }
}

/// The node at dotted `key` below `tree`, created as needed.
fn entry<'a>(tree: &'a mut Value, key: &str) -> Result<&'a mut Value> {
    let mut node = tree;
    for part in key.split('.') {
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map.entry(part).or_insert(Value::Null),
            _ => {
                return Err(ConfigError::ParseError(format!(
                    "Argument key `{}` goes through a value that is not a table",
                    key
                )));
            }
        };
    }
    Ok(node)
}

/// Type a command-line string after the value it replaces.
///
/// Strings stay strings. An unset value takes a boolean or a number when the
/// text reads as one.
fn coerce(text: &str, current: &Value) -> Value {
    let typed = match current {
        Value::Bool(_) => text.parse::<bool>().ok().map(Value::Bool),
        Value::Number(_) => number(text),
        Value::Null => text.parse::<bool>().ok().map(Value::Bool).or_else(|| number(text)),
        _ => None,
    };
    typed.unwrap_or_else(|| Value::String(text.to_owned()))
}

fn number(text: &str) -> Option<Value> {
    if let Ok(n) = text.parse::<u64>() {
        return Some(Value::from(n));
    }
    if let Ok(n) = text.parse::<i64>() {
        return Some(Value::from(n));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}
