//! Configuration for the gpusched scheduling pass.
//!
//! [`SchedOpts`] is a plain struct with a [`Default`] value; the `clap` feature derives a command
//! line parser for it and the `serde` feature makes it (de)serializable.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(test, allow(unused_crate_dependencies))]

#[macro_use]
mod macros;

mod opts;
pub use opts::{FLAGS_ENV_VAR, ParseOptsError, SchedOpts};

str_enum! {
    /// How much scheduling work the pass performs.
    #[derive(Default)]
    #[derive(strum::EnumIs)]
    #[strum(serialize_all = "lowercase")]
    pub enum SchedMode {
        /// Compute minimal stalls, dependency barriers and reuse hints.
        #[default]
        Full => "minimal stalls, dependency barriers and reuse hints",
        /// Stall every instruction for the maximum count, wait on every barrier, and put every
        /// variable-latency instruction on barrier 0.
        ///
        /// Useful to bisect suspected scheduling bugs on hardware.
        Conservative => "maximum stalls, every barrier waited on before every instruction",
        /// Leave every instruction with the maximally safe default schedule.
        #[strum(to_string = "off", serialize = "none")]
        Off => "leave the default schedules untouched",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_enum() {
        for &value in SchedMode::ALL {
            let s = value.to_str();
            assert_eq!(value.to_string(), s);
            assert_eq!(value, s.parse().unwrap());
        }
        assert_eq!("none".parse::<SchedMode>().unwrap(), SchedMode::Off);
        assert!("fast".parse::<SchedMode>().is_err());
        assert_eq!(SchedMode::Off.to_string(), "off");
        assert!(SchedMode::default().is_full());
        assert!(SchedMode::ALL.iter().all(|mode| !mode.help().is_empty()));
    }

    #[test]
    #[cfg(feature = "serde")]
    fn test_string_enum_serde() {
        for &value in SchedMode::ALL {
            let json_s = format!("\"{value}\"");
            assert_eq!(serde_json::to_string(&value).unwrap(), json_s);
            assert_eq!(serde_json::from_str::<SchedMode>(&json_s).unwrap(), value);
        }
        assert!(serde_json::from_str::<SchedMode>("\"fast\"").is_err());
    }
}
