//! VM configuration string: `path[,name[=value]]*`.
//!
//! The first comma-separated element is the module path, every following
//! element an option applied with `set_option` in the order given.  An
//! option without `=` gets an empty value.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{LoaderError, LoaderErrorCode};

/// Module path plus the options to apply once it is loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmConfig {
    path: PathBuf,
    options: Vec<(String, String)>,
}

impl VmConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), options: Vec::new() }
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((name.into(), value.into()));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &[(String, String)] {
        &self.options
    }
}

impl FromStr for VmConfig {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',');
        let path = parts.next().unwrap_or_default();
        if path.is_empty() {
            return Err(LoaderError::new(
                LoaderErrorCode::INVALID_ARGUMENT,
                "invalid argument: file name cannot be empty",
            ));
        }

        let mut config = VmConfig::new(path);
        for option in parts {
            let (name, value) = option.split_once('=').unwrap_or((option, ""));
            if name.is_empty() {
                return Err(LoaderError::new(
                    LoaderErrorCode::INVALID_OPTION_NAME,
                    format!("{path}: empty option name in '{s}'"),
                ));
            }
            config.options.push((name.to_owned(), value.to_owned()));
        }
        Ok(config)
    }
}

impl fmt::Display for VmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        for (name, value) in &self.options {
            write!(f, ",{name}")?;
            if !value.is_empty() {
                write!(f, "={value}")?;
            }
        }
        Ok(())
    }
}
