//! Configuration for bibsift
//!
//! Settings come from built-in defaults, then an optional TOML file, then
//! whatever the caller overrides (the command line, in practice):
//!
//! ```toml
//! cite_commands = ["cite", "citep", { name = "textcite", aliases = ["Textcite"] }]
//! drop_fields = ["abstract", "file"]
//! force_overwrite = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::emitter::FieldFilter;
use crate::error::{Result, SiftError};
use crate::scanner::CiteCommand;

lazy_static! {
    static ref COMMAND_NAME: Regex = Regex::new(r"^[A-Za-z@]+$").unwrap();
    static ref FIELD_NAME: Regex = Regex::new(r"^[A-Za-z0-9_:.+-]+$").unwrap();
}

/// Run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiftConfig {
    /// Citation commands whose arguments are citekeys
    pub cite_commands: Vec<CiteCommand>,
    /// Fields left out of every emitted entry
    pub drop_fields: Vec<String>,
    /// Replace an existing output file
    pub force_overwrite: bool,
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            cite_commands: CiteCommand::defaults(),
            drop_fields: Vec::new(),
            force_overwrite: false,
        }
    }
}

impl SiftConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SiftConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| SiftError::io(path, err))?;
        Self::from_toml_str(&text).map_err(|err| match err {
            SiftError::Config(message) => {
                SiftError::Config(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// Where a user-level config file is looked for
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bibsift").join("config.toml"))
    }

    /// Load `explicit` if given, else the user config file if it exists,
    /// else the defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!("Using config file {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Check command and field names
    pub fn validate(&self) -> Result<()> {
        for command in &self.cite_commands {
            for name in command.names() {
                if !COMMAND_NAME.is_match(name) {
                    return Err(SiftError::Config(format!(
                        "invalid cite command name '{name}'"
                    )));
                }
            }
        }
        for field in &self.drop_fields {
            if !FIELD_NAME.is_match(field.trim()) {
                return Err(SiftError::Config(format!("invalid field name '{field}'")));
            }
        }
        Ok(())
    }

    pub fn field_filter(&self) -> FieldFilter {
        FieldFilter::new(&self.drop_fields)
    }

    /// Replace the cite commands with plain names
    pub fn with_cite_commands<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cite_commands = names.into_iter().map(CiteCommand::new).collect();
        self
    }

    pub fn with_drop_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drop_fields = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }
}

/// Split a comma-separated list, trimming items and dropping empty ones
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
