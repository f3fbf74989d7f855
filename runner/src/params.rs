//! Immutable view over a pass-through argument list.
//!
//! Generator arguments are kept as an ordered list of flags with optional
//! values. Overrides never touch the map they are called on, they return a new
//! one, so building many job descriptors from one base list is free of
//! aliasing between jobs.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Parameter {
    /// a `-x`/`--name` flag, with the value that follows it (if any)
    Flag { name: String, value: Option<String> },
    /// a token that does not belong to any flag
    Positional(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParameterMap {
    entries: Vec<Parameter>,
}

/// A token is a flag if it starts with `-` and is not a negative number
fn is_flag(token: &str) -> bool {
    let mut chars = token.chars();

    match (chars.next(), chars.next()) {
        (Some('-'), Some(next)) => !(next.is_ascii_digit() || next == '.'),
        _ => false,
    }
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// parse an argument list, a value is any token that is not itself a flag
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries: Vec<Parameter> = Vec::new();

        for token in args.into_iter().map(Into::into) {
            if is_flag(&token) {
                entries.push(Parameter::Flag {
                    name: token,
                    value: None,
                });
                continue;
            }

            match entries.last_mut() {
                Some(Parameter::Flag { value, .. }) if value.is_none() => *value = Some(token),
                _ => entries.push(Parameter::Positional(token)),
            }
        }

        Self { entries }
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| matches!(entry, Parameter::Flag { name, .. } if name == flag))
    }

    /// `None` if the flag is absent, `Some(None)` for a bare switch
    pub fn get(&self, flag: &str) -> Option<Option<&str>> {
        self.entries.iter().find_map(|entry| match entry {
            Parameter::Flag { name, value } if name == flag => Some(value.as_deref()),
            _ => None,
        })
    }

    /// value of the first flag out of `flags` that carries one
    pub fn value_of(&self, flags: &[&str]) -> Option<&str> {
        flags.iter().find_map(|flag| self.get(flag).flatten())
    }

    /// Return a copy with `flag` set to `value`.
    ///
    /// The first occurrence of the flag keeps its position, a missing flag is
    /// appended at the end.
    pub fn with_override(&self, flag: &str, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        let mut entries = self.entries.clone();

        match entries
            .iter_mut()
            .find(|entry| matches!(entry, Parameter::Flag { name, .. } if name == flag))
        {
            Some(Parameter::Flag { value: old, .. }) => *old = value,
            _ => entries.push(Parameter::Flag {
                name: flag.to_string(),
                value,
            }),
        }

        Self { entries }
    }

    /// Return a copy with a bare `flag` appended, unless it is already present
    pub fn with_switch(&self, flag: &str) -> Self {
        if self.contains(flag) {
            return self.clone();
        }

        let mut entries = self.entries.clone();
        entries.push(Parameter::Flag {
            name: flag.to_string(),
            value: None,
        });

        Self { entries }
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.entries.len() * 2);

        for entry in self.entries.iter() {
            match entry {
                Parameter::Flag { name, value } => {
                    args.push(name.clone());
                    if let Some(value) = value {
                        args.push(value.clone());
                    }
                }
                Parameter::Positional(token) => args.push(token.clone()),
            }
        }

        args
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for ParameterMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_args().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(args: &[&str]) -> ParameterMap {
        ParameterMap::from_args(args.iter().copied())
    }

    #[test]
    fn lookup_values_and_switches() {
        let params = map(&["--foo", "bar", "--man"]);

        assert_eq!(params.get("--foo"), Some(Some("bar")));
        assert_eq!(params.get("--man"), Some(None));
        assert_eq!(params.get("--fish"), None);
    }

    #[test]
    fn override_replaces_in_place() {
        let params = map(&["--foo", "bar", "--man", "--pasta"]);
        let changed = params
            .with_override("--foo", "ball")
            .with_override("--man", "trap")
            .with_override("--pasta", "bake");

        assert_eq!(
            changed.to_args(),
            ["--foo", "ball", "--man", "trap", "--pasta", "bake"]
        );
        // the receiver is untouched
        assert_eq!(params.to_args(), ["--foo", "bar", "--man", "--pasta"]);
    }

    #[test]
    fn override_appends_missing_flags() {
        let params = map(&["--card", "input_cards/a.cmnd"]).with_override("--seed", "4");

        assert_eq!(params.to_args(), ["--card", "input_cards/a.cmnd", "--seed", "4"]);
    }

    #[test]
    fn negative_numbers_are_values() {
        let params = map(&["--shift", "-1.5", "-n", "10"]);

        assert_eq!(params.get("--shift"), Some(Some("-1.5")));
        assert_eq!(params.value_of(&["--number", "-n"]), Some("10"));
    }

    #[test]
    fn positionals_survive_round_trip() {
        let args = ["card.txt", "--zip", "--number", "5", "extra"];

        assert_eq!(map(&args).to_args(), args);
    }

    #[test]
    fn switches_are_added_once() {
        let params = map(&["--hepmc"]).with_switch("--hepmc").with_switch("--root");

        assert_eq!(params.to_args(), ["--hepmc", "--root"]);
    }
}
