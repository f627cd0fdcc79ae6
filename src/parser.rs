//! Line extractor for v3bw bandwidth files.
//!
//! Data lines carry a `node_id=` field and a `bw=` field in either order:
//!
//! ```text
//! node_id=$AAAA...AAAA bw=12345 nick=relay1
//! bw=12345 nick=relay1 node_id=$AAAA...AAAA
//! ```
//!
//! Every other line (header, timestamp, blank, malformed) is skipped.

use serde::Serialize;
use std::convert::Infallible;
use std::io::BufRead;
use std::num::ParseIntError;
use thiserror::Error;

/// Length of a relay fingerprint, in characters.
pub const FINGERPRINT_LEN: usize = 40;

/// A single `(fingerprint, bandwidth)` measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pair {
    pub fingerprint: String,
    pub bandwidth: u64,
}

impl Pair {
    pub fn new(fingerprint: impl Into<String>, bandwidth: u64) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            bandwidth,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The matched bandwidth group did not convert to an integer.
    #[error("line {line}: invalid bandwidth `{value}`: {source}")]
    InvalidBandwidth {
        line: usize,
        value: String,
        #[source]
        source: ParseIntError,
    },

    /// Neither or both matched groups have fingerprint length.
    #[error(
        "line {line}: cannot tell fingerprint from bandwidth in `{first}` and `{second}`"
    )]
    AmbiguousFields {
        line: usize,
        first: String,
        second: String,
    },

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Infallible> for ExtractError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

/// One `key=value` field a pattern looks for.
#[derive(Clone, Copy)]
struct FieldSpec {
    key: &'static str,
    /// Key must be immediately preceded by a space.
    after_space: bool,
    /// A single `$` may sit between the key and the value.
    dollar: bool,
    class: fn(char) -> bool,
}

/// A located field value: the value text and the byte offset just past it.
#[derive(Clone, Copy)]
struct Field<'a> {
    value: &'a str,
    end: usize,
}

impl FieldSpec {
    /// All occurrences of this field whose key (and leading space, if any)
    /// start at or after `from`, in line order.
    fn occurrences<'a>(self, line: &'a str, from: usize) -> impl Iterator<Item = Field<'a>> + 'a {
        line[from..]
            .match_indices(self.key)
            .filter_map(move |(offset, _)| {
                let key_start = from + offset;
                if self.after_space && (key_start == from || line.as_bytes()[key_start - 1] != b' ')
                {
                    return None;
                }

                let mut start = key_start + self.key.len();
                if self.dollar && line[start..].starts_with('$') {
                    start += 1;
                }

                let rest = &line[start..];
                let len = rest
                    .char_indices()
                    .find(|&(_, c)| !(self.class)(c))
                    .map_or(rest.len(), |(i, _)| i);
                if len == 0 {
                    return None;
                }

                Some(Field {
                    value: &rest[..len],
                    end: start + len,
                })
            })
    }
}

const NODE_ID: FieldSpec = FieldSpec {
    key: "node_id=",
    after_space: false,
    dollar: true,
    class: is_word,
};

const BW: FieldSpec = FieldSpec {
    key: "bw=",
    after_space: false,
    dollar: false,
    class: is_digit,
};

/// Two fields that must appear in this order somewhere in a line.
struct Pattern {
    first: FieldSpec,
    second: FieldSpec,
}

impl Pattern {
    /// Returns the two matched groups in pattern order.
    ///
    /// Both wildcards around the fields are greedy, so the last first-field
    /// that has any second-field after it wins, paired with the last such
    /// second-field.
    fn search<'a>(&self, line: &'a str) -> Option<(&'a str, &'a str)> {
        let firsts: Vec<Field<'a>> = self.first.occurrences(line, 0).collect();
        firsts.iter().rev().find_map(|first| {
            self.second
                .occurrences(line, first.end)
                .last()
                .map(|second| (first.value, second.value))
        })
    }
}

/// Tried in order, first match wins.
const PATTERNS: [Pattern; 2] = [
    Pattern {
        first: NODE_ID,
        second: FieldSpec {
            after_space: true,
            ..BW
        },
    },
    Pattern {
        first: BW,
        second: FieldSpec {
            after_space: true,
            ..NODE_ID
        },
    },
];

/// Classifies a single line. `line_no` is 1-based and only used in errors.
///
/// Returns `Ok(None)` for lines that carry no measurement.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<Pair>, ExtractError> {
    if !line.contains("node_id") {
        return Ok(None);
    }

    let Some((first, second)) = PATTERNS.iter().find_map(|p| p.search(line)) else {
        return Ok(None);
    };

    let is_fingerprint = |s: &str| s.chars().count() == FINGERPRINT_LEN;
    let (fingerprint, bandwidth) = match (is_fingerprint(first), is_fingerprint(second)) {
        (true, false) => (first, second),
        (false, true) => (second, first),
        _ => {
            return Err(ExtractError::AmbiguousFields {
                line: line_no,
                first: first.to_string(),
                second: second.to_string(),
            });
        }
    };

    let bandwidth = bandwidth
        .parse::<u64>()
        .map_err(|source| ExtractError::InvalidBandwidth {
            line: line_no,
            value: bandwidth.to_string(),
            source,
        })?;

    Ok(Some(Pair::new(fingerprint, bandwidth)))
}

/// Lazy, single-pass iterator of pairs over a line source.
pub struct Pairs<I> {
    lines: I,
    line_no: usize,
}

impl<I> Pairs<I> {
    pub fn new(lines: I) -> Self {
        Self { lines, line_no: 0 }
    }
}

impl<I, S, E> Iterator for Pairs<I>
where
    I: Iterator<Item = Result<S, E>>,
    S: AsRef<str>,
    E: Into<ExtractError>,
{
    type Item = Result<Pair, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line_no += 1;
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            match parse_line(self.line_no, line.as_ref()) {
                Ok(Some(pair)) => return Some(Ok(pair)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Extracts pairs from in-memory lines.
pub fn extract_pairs<I>(lines: I) -> impl Iterator<Item = Result<Pair, ExtractError>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    Pairs::new(lines.into_iter().map(Ok::<_, Infallible>))
}

/// Extracts pairs from a buffered reader, one line at a time.
pub fn read_pairs<R: BufRead>(reader: R) -> Pairs<std::io::Lines<R>> {
    Pairs::new(reader.lines())
}
