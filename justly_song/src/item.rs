// Interval data carried by every non-root node.
//
// An `Interval` holds the relative musical parameters of one node: a pitch
// ratio (numerator / denominator, shifted by whole octaves), a duration in
// beats, and multiplicative volume and tempo ratios, plus lyric text. The
// absolute values only exist at playback time, when `playback.rs` multiplies
// the ratios along the path from the root.
//
// `IntervalItem` tags the interval with its node kind:
// - `Group` (level 1): a chord. `beats` may be zero or negative, because a
//   group's beats only advance the playback clock and a negative value is a
//   way of stepping back in time. There is no instrument.
// - `Leaf` (level 2): a note. `beats` must be non-negative and the note
//   carries an instrument name.
//
// All "which fields apply where" decisions key off that tag. Field access is
// column-based (see `Field` in `types.rs`) so the presentation layer can
// treat every node as a row of cells:
// - `data()` returns `None` for cells that have nothing to show (the leaf-only
//   instrument on a group, any decoration request).
// - `set_data()` returns `false` for writes it refuses. Refusal is the normal
//   outcome for a non-positive numerator, denominator, volume ratio, or tempo
//   ratio, and the stored value is untouched.
//
// **Invariant:** numerator, denominator, volume_ratio and tempo_ratio are
// strictly positive for every item, at all times.

use crate::types::{CellValue, Field, Level, Role};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NUMERATOR: i32 = 1;
pub const DEFAULT_DENOMINATOR: i32 = 1;
pub const DEFAULT_OCTAVE: i32 = 0;
pub const DEFAULT_BEATS: i32 = 1;
pub const DEFAULT_VOLUME_RATIO: f64 = 1.0;
pub const DEFAULT_TEMPO_RATIO: f64 = 1.0;
pub const DEFAULT_INSTRUMENT: &str = "default";

/// Frequency ratio of one octave.
pub const OCTAVE_RATIO: f64 = 2.0;

pub const GROUP_SYMBOL: &str = "♫";
pub const LEAF_SYMBOL: &str = "♪";

/// The relative parameters shared by groups and leaves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub numerator: i32,
    pub denominator: i32,
    pub octave: i32,
    pub beats: i32,
    pub volume_ratio: f64,
    pub tempo_ratio: f64,
    pub words: String,
}

impl Default for Interval {
    fn default() -> Self {
        Interval {
            numerator: DEFAULT_NUMERATOR,
            denominator: DEFAULT_DENOMINATOR,
            octave: DEFAULT_OCTAVE,
            beats: DEFAULT_BEATS,
            volume_ratio: DEFAULT_VOLUME_RATIO,
            tempo_ratio: DEFAULT_TEMPO_RATIO,
            words: String::new(),
        }
    }
}

impl Interval {
    /// `numerator / denominator * 2^octave`.
    pub fn pitch_ratio(&self) -> f64 {
        f64::from(self.numerator) / f64::from(self.denominator) * OCTAVE_RATIO.powi(self.octave)
    }

    pub fn set_numerator(&mut self, value: i32) -> bool {
        if value > 0 {
            self.numerator = value;
            return true;
        }
        false
    }

    pub fn set_denominator(&mut self, value: i32) -> bool {
        if value > 0 {
            self.denominator = value;
            return true;
        }
        false
    }

    // `value > 0.0` is false for NaN, so NaN is refused too.
    pub fn set_volume_ratio(&mut self, value: f64) -> bool {
        if value > 0.0 && value.is_finite() {
            self.volume_ratio = value;
            return true;
        }
        false
    }

    pub fn set_tempo_ratio(&mut self, value: f64) -> bool {
        if value > 0.0 && value.is_finite() {
            self.tempo_ratio = value;
            return true;
        }
        false
    }

    /// True if every strictly-positive field is strictly positive.
    pub fn is_valid(&self) -> bool {
        self.numerator > 0
            && self.denominator > 0
            && self.volume_ratio > 0.0
            && self.volume_ratio.is_finite()
            && self.tempo_ratio > 0.0
            && self.tempo_ratio.is_finite()
    }
}

/// Interval data of a chord.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupItem {
    pub interval: Interval,
}

/// Interval data of a note, plus the instrument that plays it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeafItem {
    pub interval: Interval,
    pub instrument: String,
}

impl Default for LeafItem {
    fn default() -> Self {
        LeafItem {
            interval: Interval::default(),
            instrument: DEFAULT_INSTRUMENT.to_string(),
        }
    }
}

/// Kind-tagged interval data owned by exactly one tree node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum IntervalItem {
    Group(GroupItem),
    Leaf(LeafItem),
}

impl IntervalItem {
    /// A blank item for a node at `level`. The root carries no item.
    pub fn blank(level: Level) -> Option<IntervalItem> {
        match level {
            Level::Root => None,
            Level::Group => Some(IntervalItem::Group(GroupItem::default())),
            Level::Leaf => Some(IntervalItem::Leaf(LeafItem::default())),
        }
    }

    pub fn level(&self) -> Level {
        match self {
            IntervalItem::Group(_) => Level::Group,
            IntervalItem::Leaf(_) => Level::Leaf,
        }
    }

    pub fn interval(&self) -> &Interval {
        match self {
            IntervalItem::Group(group) => &group.interval,
            IntervalItem::Leaf(leaf) => &leaf.interval,
        }
    }

    pub fn interval_mut(&mut self) -> &mut Interval {
        match self {
            IntervalItem::Group(group) => &mut group.interval,
            IntervalItem::Leaf(leaf) => &mut leaf.interval,
        }
    }

    /// Instrument name for leaves; groups have none.
    pub fn instrument(&self) -> Option<&str> {
        match self {
            IntervalItem::Group(_) => None,
            IntervalItem::Leaf(leaf) => Some(&leaf.instrument),
        }
    }

    pub fn pitch_ratio(&self) -> f64 {
        self.interval().pitch_ratio()
    }

    fn symbol(&self) -> &'static str {
        match self {
            IntervalItem::Group(_) => GROUP_SYMBOL,
            IntervalItem::Leaf(_) => LEAF_SYMBOL,
        }
    }

    /// Whether a user may edit this field on this kind of node.
    pub fn is_editable(&self, field: Field) -> bool {
        match field {
            Field::Symbol => false,
            Field::Instrument => matches!(self, IntervalItem::Leaf(_)),
            _ => true,
        }
    }

    /// Cell value for `field`, or `None` when there is nothing to show.
    pub fn data(&self, field: Field, role: Role) -> Option<CellValue> {
        match role {
            Role::Decoration => return None,
            // The symbol is a glyph, never an editor value.
            Role::Edit if field == Field::Symbol => return None,
            Role::Display | Role::Edit => {}
        }
        let interval = self.interval();
        match field {
            Field::Symbol => Some(CellValue::from(self.symbol())),
            Field::Numerator => Some(CellValue::Int(interval.numerator)),
            Field::Denominator => Some(CellValue::Int(interval.denominator)),
            Field::Octave => Some(CellValue::Int(interval.octave)),
            Field::Beats => Some(CellValue::Int(interval.beats)),
            Field::VolumeRatio => Some(CellValue::Float(interval.volume_ratio)),
            Field::TempoRatio => Some(CellValue::Float(interval.tempo_ratio)),
            Field::Words => Some(CellValue::Text(interval.words.clone())),
            Field::Instrument => self.instrument().map(CellValue::from),
        }
    }

    /// Try to write `value` into `field`. Returns whether the write was
    /// applied; a refused write leaves the item exactly as it was.
    pub fn set_data(&mut self, field: Field, value: &CellValue, role: Role) -> bool {
        if role != Role::Edit {
            return false;
        }
        let is_group = matches!(self, IntervalItem::Group(_));
        match field {
            Field::Symbol => false,
            Field::Numerator => value
                .as_int()
                .is_some_and(|v| self.interval_mut().set_numerator(v)),
            Field::Denominator => value
                .as_int()
                .is_some_and(|v| self.interval_mut().set_denominator(v)),
            Field::Octave => match value.as_int() {
                Some(v) => {
                    self.interval_mut().octave = v;
                    true
                }
                None => false,
            },
            Field::Beats => match value.as_int() {
                // Groups may step the clock backwards; notes can't be negative.
                Some(v) if is_group || v >= 0 => {
                    self.interval_mut().beats = v;
                    true
                }
                _ => false,
            },
            Field::VolumeRatio => value
                .as_float()
                .is_some_and(|v| self.interval_mut().set_volume_ratio(v)),
            Field::TempoRatio => value
                .as_float()
                .is_some_and(|v| self.interval_mut().set_tempo_ratio(v)),
            Field::Words => {
                self.interval_mut().words = value.as_text();
                true
            }
            Field::Instrument => match self {
                IntervalItem::Group(_) => false,
                IntervalItem::Leaf(leaf) => {
                    leaf.instrument = value.as_text();
                    true
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> IntervalItem {
        IntervalItem::blank(Level::Group).unwrap()
    }

    fn leaf() -> IntervalItem {
        IntervalItem::blank(Level::Leaf).unwrap()
    }

    #[test]
    fn pitch_ratio_defaults_to_unison() {
        assert_eq!(leaf().pitch_ratio(), 1.0);
        assert_eq!(group().pitch_ratio(), 1.0);
    }

    #[test]
    fn pitch_ratio_with_octave() {
        let interval = Interval {
            numerator: 3,
            denominator: 2,
            octave: 1,
            ..Interval::default()
        };
        assert_eq!(interval.pitch_ratio(), 3.0);

        let down = Interval {
            octave: -1,
            ..Interval::default()
        };
        assert_eq!(down.pitch_ratio(), 0.5);
    }

    #[test]
    fn root_has_no_item() {
        assert!(IntervalItem::blank(Level::Root).is_none());
        assert_eq!(group().level(), Level::Group);
        assert_eq!(leaf().level(), Level::Leaf);
    }

    #[test]
    fn valid_writes_read_back() {
        for mut item in [group(), leaf()] {
            for (field, value) in [
                (Field::Numerator, CellValue::Int(2)),
                (Field::Denominator, CellValue::Int(2)),
                (Field::Octave, CellValue::Int(-2)),
                (Field::Beats, CellValue::Int(2)),
                (Field::VolumeRatio, CellValue::Float(2.0)),
                (Field::TempoRatio, CellValue::Float(2.0)),
                (Field::Words, CellValue::from("hello")),
            ] {
                assert!(item.set_data(field, &value, Role::Edit), "{field:?}");
                assert_eq!(item.data(field, Role::Display), Some(value), "{field:?}");
            }
        }
    }

    #[test]
    fn non_positive_writes_are_refused() {
        let mut item = leaf();
        let before = item.clone();
        for field in [
            Field::Numerator,
            Field::Denominator,
            Field::VolumeRatio,
            Field::TempoRatio,
        ] {
            assert!(!item.set_data(field, &CellValue::Int(-1), Role::Edit));
            assert!(!item.set_data(field, &CellValue::Int(0), Role::Edit));
        }
        assert!(!item.set_data(Field::VolumeRatio, &CellValue::Float(f64::NAN), Role::Edit));
        assert!(!item.set_data(Field::Numerator, &CellValue::from("abc"), Role::Edit));
        assert_eq!(item, before);
    }

    #[test]
    fn beats_sign_policy_differs_by_kind() {
        let mut note = leaf();
        assert!(!note.set_data(Field::Beats, &CellValue::Int(-1), Role::Edit));
        assert!(note.set_data(Field::Beats, &CellValue::Int(0), Role::Edit));

        let mut chord = group();
        assert!(chord.set_data(Field::Beats, &CellValue::Int(-1), Role::Edit));
        assert_eq!(chord.data(Field::Beats, Role::Display), Some(CellValue::Int(-1)));
    }

    #[test]
    fn instrument_is_leaf_only() {
        let mut note = leaf();
        assert_eq!(
            note.data(Field::Instrument, Role::Display),
            Some(CellValue::from(DEFAULT_INSTRUMENT))
        );
        assert!(note.set_data(Field::Instrument, &CellValue::from("organ"), Role::Edit));
        assert_eq!(note.instrument(), Some("organ"));

        let mut chord = group();
        assert_eq!(chord.data(Field::Instrument, Role::Display), None);
        assert!(!chord.set_data(Field::Instrument, &CellValue::from("organ"), Role::Edit));
        assert!(!chord.is_editable(Field::Instrument));
        assert!(note.is_editable(Field::Instrument));
    }

    #[test]
    fn symbol_is_display_only() {
        let mut chord = group();
        assert_eq!(chord.data(Field::Symbol, Role::Display), Some(CellValue::from("♫")));
        assert_eq!(leaf().data(Field::Symbol, Role::Display), Some(CellValue::from("♪")));
        assert_eq!(chord.data(Field::Symbol, Role::Edit), None);
        assert!(!chord.set_data(Field::Symbol, &CellValue::from("x"), Role::Edit));
        assert!(!chord.is_editable(Field::Symbol));
    }

    #[test]
    fn non_edit_roles_are_ignored() {
        let mut note = leaf();
        assert!(!note.set_data(Field::Numerator, &CellValue::Int(5), Role::Display));
        assert_eq!(note.data(Field::Numerator, Role::Decoration), None);
        assert_eq!(note.interval().numerator, DEFAULT_NUMERATOR);
    }

    #[test]
    fn lenient_value_conversion() {
        let mut note = leaf();
        assert!(note.set_data(Field::Numerator, &CellValue::Float(5.0), Role::Edit));
        assert!(note.set_data(Field::VolumeRatio, &CellValue::Int(3), Role::Edit));
        assert!(note.set_data(Field::Words, &CellValue::Int(12), Role::Edit));
        assert_eq!(note.interval().numerator, 5);
        assert_eq!(note.interval().volume_ratio, 3.0);
        assert_eq!(note.interval().words, "12");
    }
}
