//! Move-log (PGN-like) header and move-text parsing.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveLogHeader {
    pub headers: BTreeMap<String, String>,
    pub move_count_per_player: Option<usize>,
    pub moves_row: Option<Vec<String>>,
}

impl MoveLogHeader {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoveLogError {
    #[error("malformed move-log header line: {line}")]
    MalformedHeader { line: String },
}

fn move_number_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r" \d+\. ").expect("move number marker regex is valid"))
}

pub fn parse_move_log(text: &str) -> Result<MoveLogHeader, MoveLogError> {
    let mut parsed = MoveLogHeader::default();

    for line in text.split('\n') {
        if line.starts_with('[') {
            let (key, value) = parse_header_line(line)?;
            parsed.headers.insert(key, value);
        } else if line.is_empty() {
            continue;
        } else {
            let moves: Vec<String> = move_number_marker()
                .split(line)
                .map(str::to_string)
                .collect();
            parsed.move_count_per_player = Some(moves.len());
            parsed.moves_row = Some(moves);
        }
    }

    Ok(parsed)
}

fn parse_header_line(line: &str) -> Result<(String, String), MoveLogError> {
    let body = line.trim_matches(|c| c == '[' || c == ']');
    let (key, value) = body
        .split_once(' ')
        .ok_or_else(|| MoveLogError::MalformedHeader {
            line: line.to_string(),
        })?;

    Ok((key.to_string(), value.trim_matches('"').to_string()))
}
