//! G-code line parsing
//!
//! A shallow, single-line parser used for progress bookkeeping. It does not
//! track modal state or validate words; it only extracts the mnemonic, axis
//! words, the feed rate and the trailing `;` comment.

use crate::data::AxesPosition;
use serde::{Deserialize, Serialize};

/// One parsed G-code line
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GCode {
    /// Mnemonic such as `G0`, `G1`, `M3`; `None` for comment-only lines
    pub command: Option<String>,
    /// Axis words present on the line
    pub axes: AxesPosition,
    /// `F` word
    pub feed_rate: Option<f64>,
    /// Text after the first `;`, verbatim (leading space included)
    pub comment: Option<String>,
}

/// A line of a G-code source together with its 1-based line number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLine {
    pub text: String,
    pub number: usize,
}

impl SourceLine {
    pub fn new(text: impl Into<String>, number: usize) -> Self {
        Self {
            text: text.into(),
            number,
        }
    }
}

/// Parse a single G-code line
///
/// Returns `None` when the line carries neither an instruction nor a comment.
/// Words with an unrecognised letter or an unparseable value are skipped.
pub fn parse_gcode(line: &str) -> Option<GCode> {
    let (instruction, comment) = match line.split_once(';') {
        Some((instruction, comment)) => (instruction, Some(comment.to_string())),
        None => (line, None),
    };

    let mut words = instruction.split_whitespace();
    let command = words.next().map(str::to_string);

    if command.is_none() && comment.is_none() {
        return None;
    }

    let mut parsed = GCode {
        command,
        comment,
        ..Default::default()
    };

    for word in words {
        let mut chars = word.chars();
        let Some(letter) = chars.next() else {
            continue;
        };
        let Ok(value) = chars.as_str().parse::<f64>() else {
            continue;
        };

        match letter.to_ascii_lowercase() {
            'x' => parsed.axes.x = Some(value),
            'y' => parsed.axes.y = Some(value),
            'z' => parsed.axes.z = Some(value),
            'a' => parsed.axes.a = Some(value),
            'b' => parsed.axes.b = Some(value),
            'c' => parsed.axes.c = Some(value),
            'f' => parsed.feed_rate = Some(value),
            _ => {}
        }
    }

    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_motion() {
        let gcode = parse_gcode("G0 X10 Y20").unwrap();
        assert_eq!(gcode.command.as_deref(), Some("G0"));
        assert_eq!(gcode.axes.x, Some(10.0));
        assert_eq!(gcode.axes.y, Some(20.0));
        assert_eq!(gcode.axes.z, None);
        assert_eq!(gcode.comment, None);
    }

    #[test]
    fn test_parse_with_comment() {
        let gcode = parse_gcode("G1 X10 Y20 ; comment").unwrap();
        assert_eq!(gcode.command.as_deref(), Some("G1"));
        assert_eq!(gcode.axes.x, Some(10.0));
        assert_eq!(gcode.axes.y, Some(20.0));
        assert_eq!(gcode.comment.as_deref(), Some(" comment"));
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse_gcode(""), None);
        assert_eq!(parse_gcode("   "), None);
    }

    #[test]
    fn test_parse_comment_only() {
        let gcode = parse_gcode("; only a comment").unwrap();
        assert_eq!(gcode.command, None);
        assert_eq!(gcode.comment.as_deref(), Some(" only a comment"));
        assert!(gcode.axes.is_empty());
    }

    #[test]
    fn test_unknown_words_ignored() {
        let gcode = parse_gcode("M106 S204").unwrap();
        assert_eq!(gcode.command.as_deref(), Some("M106"));
        assert!(gcode.axes.is_empty());
        assert_eq!(gcode.feed_rate, None);
    }

    #[test]
    fn test_lowercase_words_and_feed() {
        let gcode = parse_gcode("g1 x1.5 z-2 a90 f1200").unwrap();
        assert_eq!(gcode.axes.x, Some(1.5));
        assert_eq!(gcode.axes.z, Some(-2.0));
        assert_eq!(gcode.axes.a, Some(90.0));
        assert_eq!(gcode.feed_rate, Some(1200.0));
    }

    #[test]
    fn test_only_first_semicolon_splits() {
        let gcode = parse_gcode("G0 X1 ; a; b").unwrap();
        assert_eq!(gcode.comment.as_deref(), Some(" a; b"));
    }
}
