//! Layout engine configuration.
//!
//! [`LayoutConfig`] is plain data deserialized from TOML. Loading settings from
//! disk is the host's business; [`LayoutConfig::load`] and
//! [`LayoutConfig::from_toml`] exist so hosts and tests can feed a fragment of
//! their own config file straight in.
//!
//! ```toml
//! tab_size = 2
//! chunk_size = 512
//!
//! [size]
//! approximation_tolerance = 4
//! ```
use crate::error::{InvalidConfigSnafu, ReadConfigSnafu, Result};
use serde::Deserialize;
use snafu::ResultExt;
use std::path::Path;

/// Tunables for line layout, caching and size tracking.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// Columns between tab stops.
    pub tab_size: u32,

    /// Maximum length, in UTF-16 units, of a shaping chunk within a bidi run.
    pub chunk_size: usize,

    /// Distance, in UTF-16 units, between column checkpoints in
    /// [`LogicalColumnCache`](crate::LogicalColumnCache).
    pub column_checkpoint_interval: usize,

    /// Chunk fragment cache capacity while the editor is active.
    pub chunk_cache_active_limit: usize,

    /// Chunk fragment cache capacity while the editor is in the background.
    pub chunk_cache_inactive_limit: usize,

    /// Lines longer than this skip bidi analysis and lay out as a single LTR paragraph.
    pub bidi_max_line_length: usize,

    /// Lines longer than this keep their approximate width instead of being shaped.
    pub precise_width_max_line_length: usize,

    /// Route all text through the complex shaping path so ligatures form.
    pub use_ligatures: bool,

    /// Snap every glyph advance up to a multiple of this cell width.
    pub grid_cell_width: Option<f32>,

    /// Size tracking policy.
    pub size: SizePolicy,

    /// Panic on cache invariant violations instead of resetting the cache.
    pub strict_invariants: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            tab_size: 4,
            chunk_size: 1024,
            column_checkpoint_interval: 1024,
            chunk_cache_active_limit: 2048,
            chunk_cache_inactive_limit: 256,
            bidi_max_line_length: 16 * 1024,
            precise_width_max_line_length: 64 * 1024,
            use_ligatures: false,
            grid_cell_width: None,
            size: SizePolicy::default(),
            strict_invariants: cfg!(debug_assertions),
        }
    }
}

/// Policy knobs for [`SizeManager`](crate::SizeManager).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SizePolicy {
    /// Invalid windows spanning fewer visual lines than this are re-measured
    /// individually; larger ones trigger a full rescan.
    pub specific_lines_recalc_threshold: usize,

    /// Pixels by which a precise width may exceed its quick estimate before the
    /// line is re-measured and the document asked to revalidate.
    pub approximation_tolerance: i32,

    /// Visual lines measured between cancellation checks during a full rescan.
    pub cancellation_check_interval: usize,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self {
            specific_lines_recalc_threshold: 2,
            approximation_tolerance: 0,
            cancellation_check_interval: 256,
        }
    }
}

impl LayoutConfig {
    /// Parse a TOML fragment. Missing keys take their defaults.
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: LayoutConfig = toml::from_str(source).context(InvalidConfigSnafu)?;
        Ok(config.sanitized())
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).context(ReadConfigSnafu { path })?;
        Self::from_toml(&contents)
    }

    /// Clamp values that would make the caches degenerate.
    fn sanitized(mut self) -> Self {
        self.tab_size = self.tab_size.max(1);
        self.chunk_size = self.chunk_size.max(2);
        self.column_checkpoint_interval = self.column_checkpoint_interval.max(2);
        self.chunk_cache_active_limit = self.chunk_cache_active_limit.max(1);
        self.chunk_cache_inactive_limit = self.chunk_cache_inactive_limit.max(1);
        self.size.cancellation_check_interval = self.size.cancellation_check_interval.max(1);
        self.grid_cell_width = self.grid_cell_width.filter(|w| w.is_finite() && *w > 0.0);
        self
    }
}
