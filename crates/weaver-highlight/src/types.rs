//! Core highlight types: stored ranges, the color palette, and segments.
//!
//! `HighlightRange` is the untrusted shape handed to us by the range store.
//! `Highlight` is what survives validation; everything downstream of the
//! segmenter works with validated highlights only.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::RangeRejection;

/// The fixed highlight palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    Yellow,
    Green,
    Blue,
    Pink,
    Purple,
}

impl HighlightColor {
    /// All palette entries, in display order.
    pub const ALL: [HighlightColor; 5] = [
        HighlightColor::Yellow,
        HighlightColor::Green,
        HighlightColor::Blue,
        HighlightColor::Pink,
        HighlightColor::Purple,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightColor::Yellow => "yellow",
            HighlightColor::Green => "green",
            HighlightColor::Blue => "blue",
            HighlightColor::Pink => "pink",
            HighlightColor::Purple => "purple",
        }
    }

    /// CSS class applied to segment markers whose topmost highlight has this color.
    pub fn css_class(&self) -> &'static str {
        match self {
            HighlightColor::Yellow => "hl-yellow",
            HighlightColor::Green => "hl-green",
            HighlightColor::Blue => "hl-blue",
            HighlightColor::Pink => "hl-pink",
            HighlightColor::Purple => "hl-purple",
        }
    }
}

impl FromStr for HighlightColor {
    type Err = RangeRejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HighlightColor::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or(RangeRejection::InvalidColor)
    }
}

impl std::fmt::Display for HighlightColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A highlight range as supplied by the persisted range store.
///
/// Nothing about it is trusted: bounds may be negative or past the end of
/// the text, the color may not be in the palette, and the timestamp may not
/// parse. Call [`HighlightRange::validate`] to get a [`Highlight`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HighlightRange {
    pub id: SmolStr,
    pub start: i64,
    pub end: i64,
    pub color: SmolStr,
    /// RFC 3339 creation instant.
    #[serde(alias = "createdAt")]
    pub created_at: SmolStr,
}

impl HighlightRange {
    /// Build a range from already-typed parts.
    pub fn new(
        id: impl Into<SmolStr>,
        start: i64,
        end: i64,
        color: HighlightColor,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            start,
            end,
            color: SmolStr::new_static(color.as_str()),
            created_at: created_at.to_rfc3339().into(),
        }
    }

    /// Check every range invariant against a text of `text_len` codepoints.
    pub fn validate(&self, text_len: usize) -> Result<Highlight, RangeRejection> {
        if self.start < 0 {
            return Err(RangeRejection::NegativeStart);
        }
        if self.end <= self.start {
            return Err(RangeRejection::EmptyOrInverted);
        }
        let (start, end) = match (usize::try_from(self.start), usize::try_from(self.end)) {
            (Ok(start), Ok(end)) if end <= text_len => (start, end),
            _ => return Err(RangeRejection::OutOfBounds),
        };
        let color = self.color.parse::<HighlightColor>()?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|_| RangeRejection::InvalidTimestamp)?
            .with_timezone(&Utc);

        Ok(Highlight {
            id: self.id.clone(),
            start,
            end,
            color,
            created_at,
        })
    }
}

/// A validated highlight: `start < end <= text_len`, palette color, real instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Highlight {
    pub id: SmolStr,
    pub start: usize,
    pub end: usize,
    pub color: HighlightColor,
    pub created_at: DateTime<Utc>,
}

impl Highlight {
    /// Length in codepoints.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Always false for a validated highlight.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Half-open containment check.
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// The one ordering that decides which highlight is visually on top.
///
/// Most recent first, then id ascending. The segmenter uses it both to order
/// sweep events and to order each segment's active set; using anything else
/// in either place makes output depend on input order.
pub fn topmost_order(a: &Highlight, b: &Highlight) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// A maximal run of text covered by one constant set of highlights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    /// Active highlight ids in [`topmost_order`]. Never empty.
    pub active_ids: Vec<SmolStr>,
    pub topmost_id: SmolStr,
    pub topmost_color: HighlightColor,
}

impl Segment {
    /// Length in codepoints.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Half-open containment check.
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }

    /// Whether `id` is one of this segment's active highlights.
    pub fn includes(&self, id: &str) -> bool {
        self.active_ids.iter().any(|a| a == id)
    }

    /// Active ids joined by single spaces, for the marker attribute.
    pub fn joined_ids(&self) -> String {
        let mut out = String::new();
        for (i, id) in self.active_ids.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(id);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_color_round_trip() {
        for color in HighlightColor::ALL {
            assert_eq!(color.as_str().parse::<HighlightColor>(), Ok(color));
            assert!(color.css_class().starts_with("hl-"));
        }
        assert_eq!(
            "orange".parse::<HighlightColor>(),
            Err(RangeRejection::InvalidColor)
        );
    }

    #[test]
    fn test_validate_accepts_valid() {
        let range = HighlightRange::new("a", 0, 5, HighlightColor::Green, at(10));
        let hl = range.validate(5).unwrap();
        assert_eq!(hl.start, 0);
        assert_eq!(hl.end, 5);
        assert_eq!(hl.color, HighlightColor::Green);
        assert_eq!(hl.created_at, at(10));
    }

    #[test]
    fn test_validate_rejections() {
        let base = HighlightRange::new("a", 0, 5, HighlightColor::Yellow, at(10));

        let neg = HighlightRange { start: -1, ..base.clone() };
        assert_eq!(neg.validate(10), Err(RangeRejection::NegativeStart));

        let empty = HighlightRange { end: 0, ..base.clone() };
        assert_eq!(empty.validate(10), Err(RangeRejection::EmptyOrInverted));

        let inverted = HighlightRange { start: 4, end: 2, ..base.clone() };
        assert_eq!(inverted.validate(10), Err(RangeRejection::EmptyOrInverted));

        assert_eq!(base.validate(4), Err(RangeRejection::OutOfBounds));

        let color = HighlightRange { color: "teal".into(), ..base.clone() };
        assert_eq!(color.validate(10), Err(RangeRejection::InvalidColor));

        let ts = HighlightRange { created_at: "not a date".into(), ..base };
        assert_eq!(ts.validate(10), Err(RangeRejection::InvalidTimestamp));
    }

    #[test]
    fn test_deserialize_camel_case_timestamp() {
        let json = r#"{"id":"h1","start":1,"end":4,"color":"pink","createdAt":"2024-05-01T12:00:00Z"}"#;
        let range: HighlightRange = serde_json::from_str(json).unwrap();
        let hl = range.validate(10).unwrap();
        assert_eq!(hl.color, HighlightColor::Pink);
        assert_eq!(hl.created_at.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_topmost_order() {
        let old = HighlightRange::new("a", 0, 1, HighlightColor::Blue, at(1))
            .validate(1)
            .unwrap();
        let new = HighlightRange::new("b", 0, 1, HighlightColor::Blue, at(2))
            .validate(1)
            .unwrap();
        let tie = HighlightRange::new("c", 0, 1, HighlightColor::Blue, at(2))
            .validate(1)
            .unwrap();

        assert_eq!(topmost_order(&new, &old), Ordering::Less);
        assert_eq!(topmost_order(&old, &new), Ordering::Greater);
        assert_eq!(topmost_order(&new, &tie), Ordering::Less);
        assert_eq!(topmost_order(&new, &new), Ordering::Equal);
    }

    #[test]
    fn test_segment_joined_ids() {
        let seg = Segment {
            start: 0,
            end: 3,
            active_ids: vec!["b".into(), "a".into()],
            topmost_id: "b".into(),
            topmost_color: HighlightColor::Yellow,
        };
        assert_eq!(seg.joined_ids(), "b a");
        assert!(seg.includes("a"));
        assert!(!seg.includes("c"));
    }
}
