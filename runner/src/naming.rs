//! Output file naming for generated artifacts.
//!
//! Every artifact name carries the job index as a `_seed<index>` segment right
//! before the extension, so two jobs of one batch can never write to the same
//! destination.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, path::Path, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NamingError {
    #[error("Output name {0:?} has no file name component")]
    EmptyName(String),
    #[error("Jobs {first} and {second} both write to {path}")]
    Collision {
        path: String,
        first: u64,
        second: u64,
    },
    #[error("Unknown output format {0:?}, expected one of hepmc, lhe, root")]
    UnknownFormat(String),
}

/// Artifact formats a generator job can be asked to write
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Hepmc,
    Root,
    Lhe,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [Self::Hepmc, Self::Root, Self::Lhe];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Hepmc => "hepmc",
            Self::Root => "root",
            Self::Lhe => "lhe",
        }
    }

    /// command line flag the generator uses to request this format
    pub fn flag(self) -> String {
        format!("--{}", self.extension())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = NamingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(s))
            .ok_or_else(|| NamingError::UnknownFormat(s.to_string()))
    }
}

/// Render a scanned value the way printf's `%g` does for the values we see in
/// practice: six significant digits and no trailing zeros (`4.0` -> `4`).
pub fn format_value(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let rounded = format!("{value:.5e}").parse::<f64>().unwrap_or(value);

    format!("{rounded}")
}

/// The semantic parameters shared by every job of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPolicy {
    pub channel: String,
    pub energy: u32,
    pub events: u64,
}

impl NamingPolicy {
    pub fn new(channel: impl Into<String>, energy: u32, events: u64) -> Self {
        Self {
            channel: channel.into(),
            energy,
            events,
        }
    }

    /// index-free part of a default artifact name
    pub fn stem(&self, value: Option<f64>) -> String {
        match value {
            Some(value) => format!(
                "{}_ma1_{}_{}TeV_n{}",
                self.channel,
                format_value(value),
                self.energy,
                self.events
            ),
            None => format!("{}_{}TeV_n{}", self.channel, self.energy, self.events),
        }
    }

    /// Default artifact name for a job
    pub fn name(&self, value: Option<f64>, index: u64, format: OutputFormat) -> String {
        let stem = self.stem(value);

        format!("{stem}_seed{index}.{}", format.extension())
    }
}

/// Qualify a caller chosen output name with the job index.
///
/// Only the base name is kept: any directory in `requested` is dropped, so the
/// destination of an artifact is decided by the staging plan alone. The last
/// extension is replaced by the one of `format`.
pub fn qualify(requested: &str, index: u64, format: OutputFormat) -> Result<String, NamingError> {
    let stem = Path::new(requested)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| NamingError::EmptyName(requested.to_string()))?;

    Ok(format!("{stem}_seed{index}.{}", format.extension()))
}

/// Check that no two jobs resolve to the same destination
pub fn ensure_unique<'a, I>(destinations: I) -> Result<(), NamingError>
where
    I: IntoIterator<Item = (u64, &'a str)>,
{
    let mut seen: HashMap<&'a str, u64> = HashMap::new();

    for (index, path) in destinations {
        if let Some(first) = seen.insert(path, index) {
            return Err(NamingError::Collision {
                path: path.to_string(),
                first,
                second: index,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_name_layout() {
        let policy = NamingPolicy::new("ggh_4tau", 13, 1000);

        assert_eq!(
            policy.name(Some(8.0), 3, OutputFormat::Hepmc),
            "ggh_4tau_ma1_8_13TeV_n1000_seed3.hepmc"
        );
        assert_eq!(
            policy.name(None, 12, OutputFormat::Lhe),
            "ggh_4tau_13TeV_n1000_seed12.lhe"
        );
    }

    #[test]
    fn values_render_like_printf_g() {
        assert_eq!(format_value(4.0), "4");
        assert_eq!(format_value(4.5), "4.5");
        assert_eq!(format_value(0.1 + 0.2), "0.3");
        assert_eq!(format_value(12.25), "12.25");
    }

    #[test]
    fn qualify_drops_directories() {
        assert_eq!(
            qualify("/tmp/elsewhere/events.hepmc", 7, OutputFormat::Hepmc).unwrap(),
            "events_seed7.hepmc"
        );
        assert_eq!(
            qualify("../out/events", 2, OutputFormat::Root).unwrap(),
            "events_seed2.root"
        );
    }

    #[test]
    fn qualify_rejects_empty_names() {
        assert_eq!(
            qualify("/", 1, OutputFormat::Lhe),
            Err(NamingError::EmptyName("/".to_string()))
        );
    }

    #[test]
    fn collisions_are_reported() {
        let result = ensure_unique([(1, "/a/x.hepmc"), (2, "/a/y.hepmc"), (3, "/a/x.hepmc")]);

        assert_eq!(
            result,
            Err(NamingError::Collision {
                path: "/a/x.hepmc".to_string(),
                first: 1,
                second: 3
            })
        );
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("HepMC".parse::<OutputFormat>(), Ok(OutputFormat::Hepmc));
        assert!("root5".parse::<OutputFormat>().is_err());
    }

    proptest! {
        #[test]
        fn names_are_injective_over_index(
            i in 1u64..100_000,
            j in 1u64..100_000,
            value in proptest::option::of(0.5f64..500.0),
            events in 1u64..1_000_000,
        ) {
            let policy = NamingPolicy::new("chan", 13, events);

            for format in OutputFormat::ALL {
                let same = policy.name(value, i, format) == policy.name(value, j, format);
                prop_assert_eq!(same, i == j);
            }
        }

        #[test]
        fn qualified_names_are_injective_over_index(
            i in 1u64..100_000,
            j in 1u64..100_000,
            name in "[a-z]{1,8}(/[a-z]{1,8}){0,2}(\\.[a-z]{1,5})?",
        ) {
            let a = qualify(&name, i, OutputFormat::Root).unwrap();
            let b = qualify(&name, j, OutputFormat::Root).unwrap();

            prop_assert!(!a.contains('/'));
            prop_assert_eq!(a == b, i == j);
        }
    }
}
