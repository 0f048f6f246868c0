//! Named segment layout over the disposition vector.
//!
//! The vector is partitioned into four contiguous named segments. The layout
//! is stored on every snapshot so older snapshots stay readable if the
//! partition ever changes.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::errors::{AdcError, Result};

/// Width of the full disposition vector.
pub const STATE_DIM: usize = 128;

/// Width of each of the four default segments.
pub const SEGMENT_WIDTH: usize = 32;

/// Identifier for one named segment of the disposition vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentId {
    /// Preference dispositions, reinforced by sentiment.
    Prefs,
    /// Goal dispositions, reinforced by coherence.
    Goals,
    /// Heuristic dispositions, reinforced by novelty.
    Heuristics,
    /// Risk dispositions, reinforced by clamped generation entropy.
    Risk,
}

impl SegmentId {
    /// All segments in their fixed processing order.
    pub const ALL: [Self; 4] = [Self::Prefs, Self::Goals, Self::Heuristics, Self::Risk];

    /// Stable wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Prefs => "prefs",
            Self::Goals => "goals",
            Self::Heuristics => "heuristics",
            Self::Risk => "risk",
        }
    }

    /// Parse from the stable wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "prefs" => Some(Self::Prefs),
            "goals" => Some(Self::Goals),
            "heuristics" => Some(Self::Heuristics),
            "risk" => Some(Self::Risk),
            _ => None,
        }
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One named contiguous span, stored as a half-open `[start, end)` index pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSpan {
    /// Segment this span belongs to.
    pub id: SegmentId,
    /// First index covered.
    pub start: usize,
    /// One past the last index covered.
    pub end: usize,
}

impl SegmentSpan {
    /// Number of elements covered.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.end - self.start
    }
}

/// Ordered partition of `[0, dim)` into named segments.
///
/// Construction and deserialization both enforce the partition invariant:
/// spans are contiguous, non-overlapping, and cover every index exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<SegmentSpan>", into = "Vec<SegmentSpan>")]
pub struct SegmentMap {
    spans: Vec<SegmentSpan>,
}

impl SegmentMap {
    /// Build a map from ordered spans, validating the partition invariant.
    pub fn new(spans: Vec<SegmentSpan>) -> Result<Self> {
        if spans.is_empty() {
            return Err(AdcError::InvalidConfig {
                details: "segment map must contain at least one span".to_string(),
            });
        }
        let mut cursor = 0usize;
        let mut seen = std::collections::BTreeSet::new();
        for span in &spans {
            if !seen.insert(span.id) {
                return Err(AdcError::InvalidConfig {
                    details: format!("duplicate segment {}", span.id),
                });
            }
            if span.start != cursor {
                return Err(AdcError::InvalidConfig {
                    details: format!(
                        "segment {} starts at {} but previous span ends at {cursor}",
                        span.id, span.start
                    ),
                });
            }
            if span.end <= span.start {
                return Err(AdcError::InvalidConfig {
                    details: format!("segment {} has non-positive width", span.id),
                });
            }
            cursor = span.end;
        }
        Ok(Self { spans })
    }

    /// The default four-segment layout: 32 elements per segment over 128.
    #[must_use]
    pub fn default_layout() -> Self {
        let spans = SegmentId::ALL
            .iter()
            .enumerate()
            .map(|(i, id)| SegmentSpan {
                id: *id,
                start: i * SEGMENT_WIDTH,
                end: (i + 1) * SEGMENT_WIDTH,
            })
            .collect();
        Self { spans }
    }

    /// Total vector width covered by this map.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.spans.last().map_or(0, |span| span.end)
    }

    /// Index range for a segment, if present in this layout.
    #[must_use]
    pub fn range(&self, id: SegmentId) -> Option<Range<usize>> {
        self.spans
            .iter()
            .find(|span| span.id == id)
            .map(|span| span.start..span.end)
    }

    /// Iterate spans in layout order.
    pub fn iter(&self) -> impl Iterator<Item = &SegmentSpan> {
        self.spans.iter()
    }

    /// Serialize to the JSON form persisted alongside each snapshot.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the persisted JSON form, re-validating the partition invariant.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl TryFrom<Vec<SegmentSpan>> for SegmentMap {
    type Error = AdcError;

    fn try_from(spans: Vec<SegmentSpan>) -> Result<Self> {
        Self::new(spans)
    }
}

impl From<SegmentMap> for Vec<SegmentSpan> {
    fn from(map: SegmentMap) -> Self {
        map.spans
    }
}
