//! Timestamp grammar accepted by `trim`: `[H+:]M?M:SS[.fraction]`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

fn grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        Regex::new(r"^(?:(\d+):)?([0-5]?\d):([0-5]\d)(?:\.(\d+))?$")
            .expect("timestamp grammar is a valid regex")
    })
}

/// Returns true if `raw` matches the timestamp grammar.
pub fn validate_timestamp(raw: &str) -> bool {
    grammar().is_match(raw)
}

/// A validated position within a media file.
///
/// Keeps the caller's original spelling, which is what gets handed to the
/// media tool, alongside its value in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Timestamp {
    raw: String,
    seconds: f64,
}

impl Timestamp {
    /// Parse and validate a timestamp.
    pub fn parse(raw: &str) -> Result<Self> {
        let caps = grammar()
            .captures(raw)
            .ok_or_else(|| Error::invalid(format!("Invalid timestamp format: {raw:?}")))?;

        let field = |idx: usize| -> f64 {
            caps.get(idx)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(0.0)
        };
        let fraction = caps
            .get(4)
            .and_then(|m| format!("0.{}", m.as_str()).parse::<f64>().ok())
            .unwrap_or(0.0);

        Ok(Self {
            raw: raw.to_string(),
            seconds: field(1) * 3600.0 + field(2) * 60.0 + field(3) + fraction,
        })
    }

    /// The timestamp exactly as supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Offset from the start of the media, in seconds.
    pub fn seconds(&self) -> f64 {
        self.seconds
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
