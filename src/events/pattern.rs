//! Dot-delimited namespace patterns.
//!
//! `*` matches exactly one segment, `**` matches any number of segments
//! (including none). Matching is a segment-wise walk over the namespace.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    One,
    Many,
}

/// Parsed subscription pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(raw: &str) -> Self {
        let segments = if raw.is_empty() {
            Vec::new()
        } else {
            raw.split('.')
                .map(|s| match s {
                    "*" => Segment::One,
                    "**" => Segment::Many,
                    lit => Segment::Literal(lit.to_string()),
                })
                .collect()
        };
        Self { raw: raw.to_string(), segments }
    }

    /// Pattern receiving every event.
    pub fn all() -> Self {
        Self::parse("**")
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, namespace: &str) -> bool {
        let parts: Vec<&str> = if namespace.is_empty() {
            Vec::new()
        } else {
            namespace.split('.').collect()
        };
        match_segments(&self.segments, &parts)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for Pattern {
    fn from(raw: &str) -> Self {
        Pattern::parse(raw)
    }
}

/// Two-pointer glob walk. On a mismatch, only the most recent `**` is
/// widened by one segment, so each namespace segment is revisited at most
/// once per `**` position.
fn match_segments(pattern: &[Segment], ns: &[&str]) -> bool {
    let (mut p, mut n) = (0, 0);
    let mut resume: Option<(usize, usize)> = None;
    while n < ns.len() {
        match pattern.get(p) {
            Some(Segment::Many) => {
                resume = Some((p, n));
                p += 1;
            }
            Some(Segment::One) => {
                p += 1;
                n += 1;
            }
            Some(Segment::Literal(lit)) if lit == ns[n] => {
                p += 1;
                n += 1;
            }
            _ => match resume {
                Some((star, from)) => {
                    p = star + 1;
                    n = from + 1;
                    resume = Some((star, n));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|s| *s == Segment::Many)
}

/// Shorthand for `Pattern::parse(pattern).matches(namespace)`.
pub fn matches(pattern: &str, namespace: &str) -> bool {
    Pattern::parse(pattern).matches(namespace)
}
