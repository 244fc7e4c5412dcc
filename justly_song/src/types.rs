// Core types shared across the song model.
//
// Defines tree addressing (`NodeId`, `TreePath`, `Locator`, `Selection`),
// the fixed column layout (`Field`), data roles (`Role`), the dynamically
// typed cell payload (`CellValue`), tree levels (`Level`), and the three
// song-wide globals (`GlobalParameter`).
//
// Two ways to point at a node:
// - `NodeId` is an arena slot in `SongTree` (see `tree.rs`). Cheap, but only
//   meaningful while the node is attached; slots are recycled after removal.
// - `TreePath` is the row index at each level from the root. This is what
//   commands store, because undo/redo replays edits in exact reverse order, so
//   a path recorded at apply time addresses the same node at revert time.
//
// See also: `item.rs` for how each `Field` maps onto interval data,
// `command.rs` for the path-based commands.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

// ---------------------------------------------------------------------------
// Tree addressing
// ---------------------------------------------------------------------------

/// Slot index into the `SongTree` arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Nesting level of a node. The tree is exactly three levels deep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    /// Pure container; carries no interval.
    Root = 0,
    /// A chord: a set of simultaneous leaves sharing one outer ratio.
    Group = 1,
    /// A single note, the smallest schedulable event.
    Leaf = 2,
}

impl Level {
    pub fn depth(self) -> usize {
        self as usize
    }

    pub fn from_depth(depth: usize) -> Option<Level> {
        match depth {
            0 => Some(Level::Root),
            1 => Some(Level::Group),
            2 => Some(Level::Leaf),
            _ => None,
        }
    }

    /// Level of this node's children, or `None` for leaves.
    pub fn child(self) -> Option<Level> {
        Level::from_depth(self.depth() + 1)
    }
}

/// Row indices from the root down to a node. The empty path is the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreePath(SmallVec<[usize; 2]>);

impl TreePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(rows: &[usize]) -> Self {
        Self(SmallVec::from_slice(rows))
    }

    /// Path to the group at `row`.
    pub fn group(row: usize) -> Self {
        Self::new(&[row])
    }

    /// Path to leaf `row` of group `group`.
    pub fn leaf(group: usize, row: usize) -> Self {
        Self::new(&[group, row])
    }

    pub fn rows(&self) -> &[usize] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The level of the node this path points at (if the depth is legal).
    pub fn level(&self) -> Option<Level> {
        Level::from_depth(self.0.len())
    }

    /// Row within the parent, or `None` for the root.
    pub fn row(&self) -> Option<usize> {
        self.0.last().copied()
    }

    pub fn parent(&self) -> Option<TreePath> {
        if self.is_root() {
            return None;
        }
        Some(Self(SmallVec::from_slice(&self.0[..self.0.len() - 1])))
    }

    pub fn child(&self, row: usize) -> TreePath {
        let mut rows = self.0.clone();
        rows.push(row);
        Self(rows)
    }

    /// Same parent, different row. The root has no siblings and is returned
    /// unchanged.
    pub fn sibling(&self, row: usize) -> TreePath {
        match self.parent() {
            Some(parent) => parent.child(row),
            None => self.clone(),
        }
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "/");
        }
        for row in &self.0 {
            write!(f, "/{row}")?;
        }
        Ok(())
    }
}

/// A single cell: a node plus one of its fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub path: TreePath,
    pub field: Field,
}

impl Locator {
    pub fn new(path: TreePath, field: Field) -> Self {
        Self { path, field }
    }
}

/// A contiguous run of siblings: the first node plus how many follow it
/// (including itself).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub first: TreePath,
    pub count: usize,
}

impl Selection {
    pub fn new(first: TreePath, count: usize) -> Self {
        Self { first, count }
    }

    /// A single node.
    pub fn single(path: TreePath) -> Self {
        Self::new(path, 1)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Path of the last selected sibling. `None` for an empty selection or a
    /// selection that starts at the root.
    pub fn last(&self) -> Option<TreePath> {
        let row = self.first.row()?;
        if self.count == 0 {
            return None;
        }
        Some(self.first.sibling(row + self.count - 1))
    }
}

// ---------------------------------------------------------------------------
// Columns, roles, and cell values
// ---------------------------------------------------------------------------

/// The editable (and display-only) fields of a node, in column order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    /// Glyph marking groups vs. leaves. Display-only.
    Symbol = 0,
    Numerator = 1,
    Denominator = 2,
    Octave = 3,
    Beats = 4,
    VolumeRatio = 5,
    TempoRatio = 6,
    Words = 7,
    /// Leaf-only instrument name.
    Instrument = 8,
}

impl Field {
    pub const COUNT: usize = 9;

    pub const ALL: [Field; Field::COUNT] = [
        Field::Symbol,
        Field::Numerator,
        Field::Denominator,
        Field::Octave,
        Field::Beats,
        Field::VolumeRatio,
        Field::TempoRatio,
        Field::Words,
        Field::Instrument,
    ];

    pub fn column(self) -> usize {
        self as usize
    }

    pub fn from_column(column: usize) -> Option<Field> {
        Field::ALL.get(column).copied()
    }

    /// Horizontal header label. The symbol column has none.
    pub fn header(self) -> Option<&'static str> {
        match self {
            Field::Symbol => None,
            Field::Numerator => Some("Numerator"),
            Field::Denominator => Some("Denominator"),
            Field::Octave => Some("Octave"),
            Field::Beats => Some("Beats"),
            Field::VolumeRatio => Some("Volume Ratio"),
            Field::TempoRatio => Some("Tempo Ratio"),
            Field::Words => Some("Words"),
            Field::Instrument => Some("Instrument"),
        }
    }
}

/// What a cell value is being requested for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Text shown in the cell.
    Display,
    /// Value loaded into / written back from an editor widget.
    Edit,
    /// Icons and other decoration. The model never supplies any.
    Decoration,
}

/// A dynamically typed cell payload.
///
/// Conversions are lenient in the same direction a spreadsheet would be:
/// an integral float or numeric text reads as an int, any number reads as a
/// float, and anything reads as text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Int(i32),
    Float(f64),
    Text(String),
}

impl CellValue {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            CellValue::Int(value) => Some(*value),
            CellValue::Float(value) => {
                let in_range = *value >= f64::from(i32::MIN) && *value <= f64::from(i32::MAX);
                if value.fract() == 0.0 && in_range {
                    Some(*value as i32)
                } else {
                    None
                }
            }
            CellValue::Text(text) => text.trim().parse().ok(),
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            CellValue::Int(value) => Some(f64::from(*value)),
            CellValue::Float(value) => Some(*value),
            CellValue::Text(text) => text.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Int(value) => write!(f, "{value}"),
            CellValue::Float(value) => write!(f, "{value}"),
            CellValue::Text(text) => write!(f, "{text}"),
        }
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Int(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

// ---------------------------------------------------------------------------
// Song-wide globals
// ---------------------------------------------------------------------------

/// The three song-wide starting values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GlobalParameter {
    /// Starting frequency in Hz.
    Frequency,
    /// Starting volume, percent of full note volume.
    VolumePercent,
    /// Starting tempo in beats per minute.
    Tempo,
}

impl GlobalParameter {
    pub const ALL: [GlobalParameter; 3] = [
        GlobalParameter::Frequency,
        GlobalParameter::VolumePercent,
        GlobalParameter::Tempo,
    ];

    pub fn default_value(self) -> i32 {
        match self {
            GlobalParameter::Frequency => 220,
            GlobalParameter::VolumePercent => 50,
            GlobalParameter::Tempo => 200,
        }
    }

    /// Inclusive range an editor control offers for this value.
    pub fn range(self) -> (i32, i32) {
        match self {
            GlobalParameter::Frequency => (60, 440),
            GlobalParameter::VolumePercent => (0, 100),
            GlobalParameter::Tempo => (100, 800),
        }
    }

    pub fn in_range(self, value: i32) -> bool {
        let (low, high) = self.range();
        (low..=high).contains(&value)
    }

    /// Field name in the persisted song record.
    pub fn name(self) -> &'static str {
        match self {
            GlobalParameter::Frequency => "frequency",
            GlobalParameter::VolumePercent => "volume_percent",
            GlobalParameter::Tempo => "tempo",
        }
    }
}
