//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for every highlight component.
///
/// Missing JSON fields fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    /// Minimum selection length in codepoints, after trimming.
    pub min_selection_len: usize,
    /// Maximum selection length in codepoints, after trimming.
    pub max_selection_len: usize,
    /// Quiet period before a measurement pass runs.
    pub measure_debounce_ms: u64,
    /// Height of one annotation row, in CSS pixels.
    pub row_height: f64,
    /// Minimum vertical gap between annotation rows.
    pub row_gap: f64,
    /// Where scroll-to-highlight places the anchor, as a fraction of the
    /// viewport height from the top.
    pub scroll_anchor_fraction: f64,
    /// Renders kept by the memo cache. Zero disables caching.
    pub render_cache_capacity: usize,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            min_selection_len: 2,
            max_selection_len: 2000,
            measure_debounce_ms: 150,
            row_height: 72.0,
            row_gap: 8.0,
            scroll_anchor_fraction: 0.2,
            render_cache_capacity: 64,
        }
    }
}

impl HighlightConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: HighlightConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_selection_len == 0 {
            return Err(ConfigError::Value {
                field: "min_selection_len",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_selection_len < self.min_selection_len {
            return Err(ConfigError::Value {
                field: "max_selection_len",
                reason: format!("must be at least min_selection_len ({})", self.min_selection_len),
            });
        }
        if !(self.row_height.is_finite() && self.row_height > 0.0) {
            return Err(ConfigError::Value {
                field: "row_height",
                reason: "must be a positive number".into(),
            });
        }
        if !(self.row_gap.is_finite() && self.row_gap >= 0.0) {
            return Err(ConfigError::Value {
                field: "row_gap",
                reason: "must be a non-negative number".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.scroll_anchor_fraction) {
            return Err(ConfigError::Value {
                field: "scroll_anchor_fraction",
                reason: "must be between 0 and 1".into(),
            });
        }
        Ok(())
    }

    pub fn selection_limits(&self) -> SelectionLimits {
        SelectionLimits {
            min: self.min_selection_len,
            max: self.max_selection_len,
        }
    }

    pub fn row_layout(&self) -> RowLayout {
        RowLayout {
            row_height: self.row_height,
            gap: self.row_gap,
        }
    }
}

/// Accepted selection length range, inclusive, in codepoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionLimits {
    pub min: usize,
    pub max: usize,
}

impl Default for SelectionLimits {
    fn default() -> Self {
        HighlightConfig::default().selection_limits()
    }
}

/// Geometry of aligned annotation rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowLayout {
    pub row_height: f64,
    pub gap: f64,
}

impl Default for RowLayout {
    fn default() -> Self {
        HighlightConfig::default().row_layout()
    }
}
