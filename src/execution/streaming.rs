//! Streaming configuration and division planning.
//!
//! A [`StreamingPlan`] decides how many streaming divisions the requested
//! output region is cut into, from exactly one of:
//! - a memory budget in bytes (the default, [`DEFAULT_MEMORY_LIMIT`])
//! - an explicit number of divisions
//! - a number of lines per division
//! - a maximal square tile size
//!
//! Row-based modes cut along the slowest axis; the tile mode cuts a grid.

use crate::core::error::{ConfigurationError, TilestreamResult};
use crate::core::region::ImageRegion;
use crate::core::splitter::{split_axis_one, split_grid_one, tile_counts};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default memory budget (500 MB)
pub const DEFAULT_MEMORY_LIMIT: usize = 500 * 1024 * 1024;

/// User-facing streaming knobs. At most one may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamingConfig {
    /// Byte budget for one division of the output.
    pub memory_budget_bytes: Option<usize>,
    /// Explicit number of divisions.
    pub division_count: Option<usize>,
    /// Number of rows per division.
    pub lines_per_division: Option<u64>,
    /// Side of the square tiles the output is cut into.
    pub tile_size: Option<u64>,
}

impl StreamingConfig {
    /// Create a configuration with nothing set (memory mode, default budget).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the memory budget in bytes.
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget_bytes = Some(bytes);
        self
    }

    /// Set the memory budget in megabytes.
    pub fn with_memory_budget_mb(mut self, mb: usize) -> Self {
        self.memory_budget_bytes = Some(mb * 1024 * 1024);
        self
    }

    /// Set an explicit number of divisions.
    pub fn with_division_count(mut self, count: usize) -> Self {
        self.division_count = Some(count);
        self
    }

    /// Set the number of rows per division.
    pub fn with_lines_per_division(mut self, lines: u64) -> Self {
        self.lines_per_division = Some(lines);
        self
    }

    /// Set the tile side.
    pub fn with_tile_size(mut self, size: u64) -> Self {
        self.tile_size = Some(size);
        self
    }

    /// Resolve the single active mode.
    pub fn mode(&self) -> Result<StreamingMode, ConfigurationError> {
        let mut set = Vec::new();
        if self.memory_budget_bytes.is_some() {
            set.push("memory_budget_bytes");
        }
        if self.division_count.is_some() {
            set.push("division_count");
        }
        if self.lines_per_division.is_some() {
            set.push("lines_per_division");
        }
        if self.tile_size.is_some() {
            set.push("tile_size");
        }
        if set.len() > 1 {
            return Err(ConfigurationError::ConflictingStreamingModes { modes: set });
        }

        let mode = if let Some(budget) = self.memory_budget_bytes {
            non_zero(budget as u64, "memory_budget_bytes")?;
            StreamingMode::Memory { budget_bytes: budget }
        } else if let Some(count) = self.division_count {
            non_zero(count as u64, "division_count")?;
            StreamingMode::Explicit { divisions: count }
        } else if let Some(lines) = self.lines_per_division {
            non_zero(lines, "lines_per_division")?;
            StreamingMode::Lines { lines }
        } else if let Some(size) = self.tile_size {
            non_zero(size, "tile_size")?;
            StreamingMode::Tiles { tile_size: size }
        } else {
            StreamingMode::Memory {
                budget_bytes: DEFAULT_MEMORY_LIMIT,
            }
        };
        Ok(mode)
    }
}

fn non_zero(value: u64, parameter: &'static str) -> Result<(), ConfigurationError> {
    if value == 0 {
        return Err(ConfigurationError::ZeroStreamingParameter { parameter });
    }
    Ok(())
}

/// How the division count was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StreamingMode {
    /// Rows per division derived from a byte budget.
    Memory {
        /// Bytes allowed per division
        budget_bytes: usize,
    },
    /// Fixed number of rows per division.
    Lines {
        /// Rows per division
        lines: u64,
    },
    /// Grid of square tiles.
    Tiles {
        /// Maximal tile side
        tile_size: u64,
    },
    /// Fixed number of divisions.
    Explicit {
        /// Requested divisions
        divisions: usize,
    },
}

impl fmt::Display for StreamingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamingMode::Memory { budget_bytes } => write!(f, "memory ({} bytes)", budget_bytes),
            StreamingMode::Lines { lines } => write!(f, "lines ({} per division)", lines),
            StreamingMode::Tiles { tile_size } => write!(f, "tiles ({}x{})", tile_size, tile_size),
            StreamingMode::Explicit { divisions } => write!(f, "explicit ({} divisions)", divisions),
        }
    }
}

/// Division layout for one run. Derived per update, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingPlan {
    mode: StreamingMode,
    region: ImageRegion,
    layout: Layout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Layout {
    Rows { divisions: usize },
    Grid { counts: [usize; 2] },
}

impl StreamingPlan {
    /// Plan the divisions of `region` for pixels of `footprint` bytes.
    pub fn new(
        config: &StreamingConfig,
        region: ImageRegion,
        footprint: usize,
    ) -> Result<Self, ConfigurationError> {
        let mode = config.mode()?;
        let rows = region.height();
        let layout = if region.is_empty() {
            Layout::Rows { divisions: 0 }
        } else {
            match mode {
                StreamingMode::Memory { budget_bytes } => {
                    let bytes_per_row = region.width().saturating_mul(footprint.max(1) as u64);
                    let rows_per_division = (budget_bytes as u64 / bytes_per_row).max(1);
                    Layout::Rows {
                        divisions: rows.div_ceil(rows_per_division) as usize,
                    }
                }
                StreamingMode::Lines { lines } => Layout::Rows {
                    divisions: rows.div_ceil(lines) as usize,
                },
                StreamingMode::Explicit { divisions } => Layout::Rows {
                    divisions: (divisions as u64).min(rows) as usize,
                },
                StreamingMode::Tiles { tile_size } => Layout::Grid {
                    counts: tile_counts(&region, tile_size),
                },
            }
        };
        Ok(Self {
            mode,
            region,
            layout,
        })
    }

    /// The active mode.
    pub fn mode(&self) -> StreamingMode {
        self.mode
    }

    /// The region being streamed.
    pub fn region(&self) -> &ImageRegion {
        &self.region
    }

    /// Number of divisions. Zero only for an empty region.
    pub fn division_count(&self) -> usize {
        match self.layout {
            Layout::Rows { divisions } => divisions,
            Layout::Grid { counts } => counts.iter().product(),
        }
    }

    /// The `index`-th division.
    pub fn division(&self, index: usize) -> TilestreamResult<ImageRegion> {
        match self.layout {
            Layout::Rows { divisions } => {
                split_axis_one(&self.region, self.region.slowest_axis(), divisions.max(1), index)
            }
            Layout::Grid { counts } => split_grid_one(&self.region, counts, index),
        }
    }

    /// All divisions, in processing order.
    pub fn divisions(&self) -> TilestreamResult<Vec<ImageRegion>> {
        (0..self.division_count()).map(|i| self.division(i)).collect()
    }
}
