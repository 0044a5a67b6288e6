//! Answer markers written in the reply text instead of the namespace

use regex::Regex;
use std::sync::OnceLock;

/// A termination marker found in a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sentinel {
    /// `FINAL(<answer>)`
    Answer(String),
    /// `FINAL_VAR(<name>)`: the answer is the value bound to `name`
    Variable(String),
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"(?ms)^[ \t]*(FINAL_VAR|FINAL)\((.*?)\)").expect("marker pattern is valid")
    })
}

fn fence_block_regex() -> &'static Regex {
    static BLOCK: OnceLock<Regex> = OnceLock::new();
    BLOCK.get_or_init(|| Regex::new(r"(?s)```.*?(?:```|\z)").expect("fence pattern is valid"))
}

impl Sentinel {
    /// Find the first line-anchored marker outside code fences.
    ///
    /// Markers mentioned mid-sentence are ignored, as is an empty payload.
    pub fn scan(text: &str) -> Option<Sentinel> {
        let prose = fence_block_regex().replace_all(text, "\n");

        let captures = marker_regex().captures(&prose)?;
        let payload = captures.get(2)?.as_str().trim();
        if payload.is_empty() {
            return None;
        }

        match captures.get(1)?.as_str() {
            "FINAL_VAR" => Some(Sentinel::Variable(trim_quotes(payload).to_string())),
            _ => Some(Sentinel::Answer(payload.to_string())),
        }
    }
}

fn trim_quotes(name: &str) -> &str {
    name.trim_matches(|c| c == '"' || c == '\'').trim()
}
