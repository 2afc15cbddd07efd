//! Dotted-path node identifiers and timestamps.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A non-empty sequence of positive integers rendered `"1.2.3"`. The root is `"1"`.
///
/// Segment text is kept alongside its parsed numeric value so that leading
/// zeros (optional but preserved verbatim per the id grammar) round-trip.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct Segment {
    text: String,
    value: u64,
}

impl NodeId {
    /// Parse a dotted-path id, rejecting empty segments and non-positive values.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidNodeId("empty node id".into()));
        }
        let mut segments = Vec::new();
        for part in s.split('.') {
            if part.is_empty() {
                return Err(Error::InvalidNodeId(format!("empty segment in {s:?}")));
            }
            let value: u64 = part
                .parse()
                .map_err(|_| Error::InvalidNodeId(format!("non-numeric segment in {s:?}")))?;
            if value == 0 {
                return Err(Error::InvalidNodeId(format!(
                    "segment must be a positive integer in {s:?}"
                )));
            }
            segments.push(Segment {
                text: part.to_string(),
                value,
            });
        }
        if segments[0].value != 1 {
            return Err(Error::InvalidNodeId(format!(
                "root segment must be 1 in {s:?}"
            )));
        }
        Ok(Self { segments })
    }

    /// The root id, `"1"`.
    pub fn root() -> Self {
        Self {
            segments: vec![Segment {
                text: "1".to_string(),
                value: 1,
            }],
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    /// The parent id, or `None` if this is the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Whether `self` is an ancestor of (or equal to) `other`.
    pub fn is_ancestor_of_or_eq(&self, other: &Self) -> bool {
        if self.segments.len() > other.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(other.segments.iter())
            .all(|(a, b)| a.value == b.value)
    }

    pub fn is_strict_ancestor_of(&self, other: &Self) -> bool {
        self != other && self.is_ancestor_of_or_eq(other)
    }

    /// Append an integer child segment, e.g. `child(1.2, 3) = 1.2.3`.
    pub fn child(&self, k: u64) -> Result<Self> {
        if k == 0 {
            return Err(Error::InvalidNodeId("child index must be positive".into()));
        }
        let mut segments = self.segments.clone();
        segments.push(Segment {
            text: k.to_string(),
            value: k,
        });
        Ok(Self { segments })
    }

    fn values(&self) -> Vec<u64> {
        self.segments.iter().map(|s| s.value).collect()
    }
}

impl PartialEq for NodeId {
    fn eq(&self, other: &Self) -> bool {
        self.values() == other.values()
    }
}

impl std::hash::Hash for NodeId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.values().hash(state);
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.values().cmp(&other.values())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", seg.text)?;
        }
        Ok(())
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NodeId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

/// A UTC instant, serialized as RFC 3339. Generated by the appending process;
/// never used for cross-process ordering (only `seq` is authoritative for that).
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
