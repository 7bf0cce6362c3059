//! Scheduler options.

use crate::SchedMode;
use std::{env::VarError, str::FromStr};

#[cfg(feature = "clap")]
use clap::Parser;

/// Environment variable consulted by [`SchedOpts::from_env`].
pub const FLAGS_ENV_VAR: &str = "GPUSCHED_FLAGS";

/// Options for one run of the scheduling pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(Parser))]
#[cfg_attr(feature = "clap", command(name = "gpusched", next_help_heading = "Scheduling options"))]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default, rename_all = "kebab-case")
)]
pub struct SchedOpts {
    /// How much scheduling work to perform.
    #[cfg_attr(feature = "clap", arg(long, value_enum, default_value_t, env = "GPUSCHED_MODE"))]
    pub mode: SchedMode,
    /// Emit operand reuse hints.
    #[cfg_attr(
        feature = "clap",
        arg(long, default_value_t = true, action = clap::ArgAction::Set, value_name = "BOOL")
    )]
    pub reuse: bool,
    /// Allow a zero stall count when the target can dual-issue a pair of instructions.
    #[cfg_attr(
        feature = "clap",
        arg(long, default_value_t = true, action = clap::ArgAction::Set, value_name = "BOOL")
    )]
    pub dual_issue: bool,
    /// Check the scheduled function for hazards and panic on the first one found.
    #[cfg_attr(feature = "clap", arg(long))]
    pub verify: bool,
    /// Trace the computed schedule of every instruction.
    #[cfg_attr(feature = "clap", arg(long))]
    pub dump: bool,
}

impl Default for SchedOpts {
    fn default() -> Self {
        Self { mode: SchedMode::Full, reuse: true, dual_issue: true, verify: false, dump: false }
    }
}

impl SchedOpts {
    /// Reads options from the `GPUSCHED_FLAGS` environment variable, falling back to the defaults
    /// when it is unset.
    pub fn from_env() -> Result<Self, ParseOptsError> {
        Self::from_var(std::env::var(FLAGS_ENV_VAR))
    }

    fn from_var(var: Result<String, VarError>) -> Result<Self, ParseOptsError> {
        match var {
            Ok(flags) => flags.parse(),
            Err(VarError::NotPresent) => Ok(Self::default()),
            Err(VarError::NotUnicode(_)) => Err(ParseOptsError::NotUnicode),
        }
    }

    /// Applies a single `key[=value]` flag.
    ///
    /// Boolean flags given without a value are switched on.
    pub fn apply(&mut self, flag: &str) -> Result<(), ParseOptsError> {
        let (key, value) = match flag.split_once('=') {
            Some((key, value)) => (key.trim(), Some(value.trim())),
            None => (flag.trim(), None),
        };
        let flag_value = |value: Option<&str>| match value {
            None => Ok(true),
            Some(v) => parse_bool(v).ok_or_else(|| ParseOptsError::InvalidValue {
                key: key.to_string(),
                value: v.to_string(),
            }),
        };
        match key {
            "mode" => {
                let value = value.ok_or_else(|| ParseOptsError::MissingValue(key.to_string()))?;
                self.mode = SchedMode::from_str(value).map_err(|_| {
                    ParseOptsError::InvalidValue { key: key.to_string(), value: value.to_string() }
                })?;
            }
            "reuse" => self.reuse = flag_value(value)?,
            "dual-issue" | "dual_issue" => self.dual_issue = flag_value(value)?,
            "verify" => self.verify = flag_value(value)?,
            "dump" => self.dump = flag_value(value)?,
            _ => return Err(ParseOptsError::UnknownFlag(key.to_string())),
        }
        Ok(())
    }
}

/// Parses a comma separated list of flags, e.g. `mode=conservative,reuse=off,verify`.
impl FromStr for SchedOpts {
    type Err = ParseOptsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut opts = Self::default();
        for flag in s.split(',').filter(|flag| !flag.trim().is_empty()) {
            opts.apply(flag)?;
        }
        Ok(opts)
    }
}

/// Parses a boolean flag value.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

/// An error that occurred while parsing a flag string into [`SchedOpts`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseOptsError {
    #[error("unknown scheduler flag `{0}`")]
    UnknownFlag(String),
    #[error("scheduler flag `{0}` requires a value")]
    MissingValue(String),
    #[error("invalid value `{value}` for scheduler flag `{key}`")]
    InvalidValue { key: String, value: String },
    #[error("`GPUSCHED_FLAGS` is not valid unicode")]
    NotUnicode,
}
