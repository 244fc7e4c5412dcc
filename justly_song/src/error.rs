// Error taxonomy for the song model.
//
// Everything that can go wrong inside the core funnels into `SongError`.
// The variants fall into three families:
//
// - **Structural errors**: a request that would break the tree-shape
//   invariants (out-of-range positions, mixed child levels, children under a
//   leaf, treating the root as an item, scheduling at a level that has no
//   notes). Always fatal to the operation in progress; the tree is left as it
//   was.
// - **Lookup errors**: a path or node id that doesn't resolve. These mean
//   the caller asked for coordinates that were never handed out, so they
//   signal a bug on the caller's side.
// - **Boundary errors**: malformed JSON records, bad globals, schedules whose
//   folded values leave floating-point range, and failures reported by the
//   audio transport.
//
// A rejected field write (e.g. a zero numerator) is *not* an
// error. `field_set` / `cell_write` return `false` instead; see `item.rs`.

use crate::types::{Field, Level, TreePath};

/// Every failure the song model can report.
#[derive(thiserror::Error, Debug)]
pub enum SongError {
    #[error("position {position} is outside 0..={child_count} under {parent}")]
    PositionOutOfRange {
        parent: TreePath,
        position: usize,
        child_count: usize,
    },
    #[error("rows {position}..{end} are outside 0..{child_count} under {parent}")]
    RangeOutOfBounds {
        parent: TreePath,
        position: usize,
        end: usize,
        child_count: usize,
    },
    #[error("empty row range under {parent}")]
    EmptyRange { parent: TreePath },
    #[error("level mismatch: expected {expected:?} children, found {found:?}")]
    LevelMismatch { expected: Level, found: Level },
    #[error("leaf nodes cannot have children ({path})")]
    LeafHasNoChildren { path: TreePath },
    #[error("the root has no interval data")]
    IsRoot,
    #[error("field {field:?} is not editable at {path}")]
    FieldNotEditable { path: TreePath, field: Field },
    #[error("cannot play a selection at {level:?} level")]
    InvalidPlaybackLevel { level: Level },
    #[error("nothing selected")]
    EmptySelection,
    #[error("playback values at {path} are out of floating-point range")]
    NonFiniteSchedule { path: TreePath },
    #[error("row {row} is outside 0..{child_count} while resolving {path}")]
    RowOutOfRange {
        path: TreePath,
        row: usize,
        child_count: usize,
    },
    #[error("stale node id {0}")]
    StaleNode(u32),
    #[error("invalid {field:?} value {value} in song record")]
    InvalidRecord { field: Field, value: String },
    #[error("invalid {name} {value}")]
    InvalidGlobal { name: &'static str, value: i32 },
    #[error("song JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("audio transport error: {0}")]
    Transport(String),
}

impl SongError {
    /// True for the structural family (shape invariants and selections).
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SongError::PositionOutOfRange { .. }
                | SongError::RangeOutOfBounds { .. }
                | SongError::EmptyRange { .. }
                | SongError::LevelMismatch { .. }
                | SongError::LeafHasNoChildren { .. }
                | SongError::IsRoot
                | SongError::FieldNotEditable { .. }
                | SongError::InvalidPlaybackLevel { .. }
                | SongError::EmptySelection
        )
    }

    /// True for path / id resolution failures.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            SongError::RowOutOfRange { .. } | SongError::StaleNode(_)
        )
    }
}
