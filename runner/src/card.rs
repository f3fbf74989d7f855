//! Card templating.
//!
//! A card is a line oriented settings file. A field is set by rewriting every
//! line that contains its key as a whitespace delimited token: everything after
//! the key up to the end of the line is replaced by the new value. Comment and
//! blank lines are never touched, and untouched bytes (including line endings)
//! are copied verbatim.

use std::{collections::BTreeMap, fs, path::Path, path::PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("No line in the card sets {0:?}")]
    MissingKey(String),
    #[error("Failed to read card {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write card {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// split a line into its content and its line ending
fn split_ending(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else {
        (line, "")
    }
}

fn is_comment_or_blank(content: &str) -> bool {
    let trimmed = content.trim_start();

    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Byte offsets `(start, end)` of each whitespace delimited token
fn tokens(content: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;

    for (offset, c) in content.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(begin)) => {
                spans.push((begin, offset));
                start = None;
            }
            (false, None) => start = Some(offset),
            _ => {}
        }
    }

    if let Some(begin) = start {
        spans.push((begin, content.len()));
    }

    spans
}

/// Byte offset at which the value following `key` starts, if the line sets it
fn value_offset(content: &str, key: &str) -> Option<usize> {
    if is_comment_or_blank(content) {
        return None;
    }

    let spans = tokens(content);
    let position = spans
        .iter()
        .position(|&(start, end)| &content[start..end] == key)?;

    Some(match spans.get(position + 1) {
        Some(&(start, _)) => start,
        None => spans[position].1,
    })
}

/// Apply all substitutions in `fields` to the card text
pub fn substitute(card: &str, fields: &BTreeMap<String, String>) -> Result<String, TemplateError> {
    let mut lines: Vec<String> = card.split_inclusive('\n').map(str::to_string).collect();

    for (key, value) in fields.iter() {
        let mut found = false;

        for line in lines.iter_mut() {
            let (content, ending) = split_ending(line);

            if let Some(offset) = value_offset(content, key) {
                let head = &content[..offset];
                let separator = if head.ends_with(char::is_whitespace) {
                    ""
                } else {
                    " "
                };

                debug!("Setting {key} to {value}");
                *line = format!("{head}{separator}{value}{ending}");
                found = true;
            }
        }

        if !found {
            return Err(TemplateError::MissingKey(key.clone()));
        }
    }

    Ok(lines.concat())
}

/// Read back the value of a field, the text after the first line setting `key`
pub fn read_field<'a>(card: &'a str, key: &str) -> Option<&'a str> {
    card.lines().find_map(|line| {
        let (content, _) = split_ending(line);

        value_offset(content, key).map(|offset| content[offset..].trim_end())
    })
}

/// Write a copy of the card at `input` to `output` with `fields` applied
pub fn make_card(
    input: &Path,
    output: &Path,
    fields: &BTreeMap<String, String>,
) -> Result<(), TemplateError> {
    let template = fs::read_to_string(input).map_err(|source| TemplateError::Read {
        path: input.to_path_buf(),
        source,
    })?;
    let card = substitute(&template, fields)?;

    info!("Writing new card to {}", output.to_string_lossy());
    fs::write(output, card).map_err(|source| TemplateError::Write {
        path: output.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CARD: &str = "# run settings\n\
import model sm\n\
output genevents\n\
set run_card nevents 200\n\
set run_card iseed 0 \r\n\
# set run_card nevents 5\n\
launch";

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn empty_substitution_is_identity() {
        assert_eq!(substitute(CARD, &BTreeMap::new()).unwrap(), CARD);
    }

    #[test]
    fn only_the_trailing_value_changes() {
        let card = substitute(CARD, &fields(&[("nevents", "5000"), ("iseed", "7")])).unwrap();

        assert!(card.contains("set run_card nevents 5000\n"));
        assert!(card.contains("set run_card iseed 7\r\n"));
        // comment lines and substring matches are left alone
        assert!(card.contains("# set run_card nevents 5\n"));
        assert!(card.contains("output genevents\n"));
        assert!(card.ends_with("launch"));
    }

    #[test]
    fn keys_must_be_whole_tokens() {
        let result = substitute("output genevents\n", &fields(&[("events", "1")]));

        assert!(matches!(result, Err(TemplateError::MissingKey(key)) if key == "events"));
    }

    #[test]
    fn key_without_value_gets_one() {
        let card = substitute("set pythia8_path\n", &fields(&[("pythia8_path", "/opt/py8")])).unwrap();

        assert_eq!(card, "set pythia8_path /opt/py8\n");
    }

    #[test]
    fn values_with_spaces() {
        let card = substitute(
            "set extrapaths ../lib\n",
            &fields(&[("extrapaths", "../lib /opt/hepmc/lib")]),
        )
        .unwrap();

        assert_eq!(read_field(&card, "extrapaths"), Some("../lib /opt/hepmc/lib"));
    }

    #[test]
    fn make_card_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("card.txt");
        let output = dir.path().join("card_new.txt");
        std::fs::write(&input, CARD).unwrap();

        make_card(&input, &output, &fields(&[("iseed", "3")])).unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert_eq!(read_field(&written, "iseed"), Some("3"));
        assert_eq!(read_field(&written, "nevents"), Some("200"));
    }

    proptest! {
        #[test]
        fn set_then_read_round_trips(value in "[A-Za-z0-9_./-]{1,12}( [A-Za-z0-9_./-]{1,12}){0,2}") {
            let card = substitute(CARD, &fields(&[("nevents", &value)])).unwrap();

            prop_assert_eq!(read_field(&card, "nevents"), Some(value.as_str()));
        }
    }
}
