// Persisted field structure for songs.
//
// A song file is one JSON object:
//
//   { "frequency": 220, "volume_percent": 50, "tempo": 200,
//     "children": [ <group>, ... ] }
//
// and every group / leaf is a `NodeRecord` with the interval fields, an
// `instrument` on leaves, and an optional `children` array on groups. Absent
// fields take the same defaults a freshly inserted node has (see `item.rs`),
// so hand-written files can stay short.
//
// Records are plain serde data. Turning them into tree nodes (and rejecting
// records that break the item invariants) happens in `record_to_subtree()`;
// the opposite direction is `subtree_to_record()`. Both are used by
// `tree.rs` for (de)serialization and by `song.rs` for load/save. File I/O is
// left to the caller.

use crate::error::SongError;
use crate::item::{
    DEFAULT_BEATS, DEFAULT_DENOMINATOR, DEFAULT_INSTRUMENT, DEFAULT_NUMERATOR, DEFAULT_OCTAVE,
    DEFAULT_TEMPO_RATIO, DEFAULT_VOLUME_RATIO, GroupItem, Interval, IntervalItem, LeafItem,
};
use crate::tree::Subtree;
use crate::types::{Field, GlobalParameter, Level, TreePath};
use serde::{Deserialize, Serialize};

fn default_numerator() -> i32 {
    DEFAULT_NUMERATOR
}

fn default_denominator() -> i32 {
    DEFAULT_DENOMINATOR
}

fn default_octave() -> i32 {
    DEFAULT_OCTAVE
}

fn default_beats() -> i32 {
    DEFAULT_BEATS
}

fn default_volume_ratio() -> f64 {
    DEFAULT_VOLUME_RATIO
}

fn default_tempo_ratio() -> f64 {
    DEFAULT_TEMPO_RATIO
}

fn default_frequency() -> i32 {
    GlobalParameter::Frequency.default_value()
}

fn default_volume_percent() -> i32 {
    GlobalParameter::VolumePercent.default_value()
}

fn default_tempo() -> i32 {
    GlobalParameter::Tempo.default_value()
}

/// One group or leaf, as stored on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default = "default_numerator")]
    pub numerator: i32,
    #[serde(default = "default_denominator")]
    pub denominator: i32,
    #[serde(default = "default_octave")]
    pub octave: i32,
    #[serde(default = "default_beats")]
    pub beats: i32,
    #[serde(default = "default_volume_ratio")]
    pub volume_ratio: f64,
    #[serde(default = "default_tempo_ratio")]
    pub tempo_ratio: f64,
    #[serde(default)]
    pub words: String,
    /// Leaves only. Written for every leaf; ignored on groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    /// Groups only. Omitted when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeRecord>,
}

impl Default for NodeRecord {
    fn default() -> Self {
        NodeRecord {
            numerator: DEFAULT_NUMERATOR,
            denominator: DEFAULT_DENOMINATOR,
            octave: DEFAULT_OCTAVE,
            beats: DEFAULT_BEATS,
            volume_ratio: DEFAULT_VOLUME_RATIO,
            tempo_ratio: DEFAULT_TEMPO_RATIO,
            words: String::new(),
            instrument: None,
            children: Vec::new(),
        }
    }
}

/// A whole song, as stored on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    #[serde(default = "default_frequency")]
    pub frequency: i32,
    #[serde(default = "default_volume_percent")]
    pub volume_percent: i32,
    #[serde(default = "default_tempo")]
    pub tempo: i32,
    #[serde(default)]
    pub children: Vec<NodeRecord>,
}

impl Default for SongRecord {
    fn default() -> Self {
        SongRecord {
            frequency: default_frequency(),
            volume_percent: default_volume_percent(),
            tempo: default_tempo(),
            children: Vec::new(),
        }
    }
}

impl SongRecord {
    pub fn from_json(json: &str) -> Result<Self, SongError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SongError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn invalid(field: Field, value: impl ToString) -> SongError {
    SongError::InvalidRecord {
        field,
        value: value.to_string(),
    }
}

/// Build a detached subtree at `level` from a record, validating the item
/// invariants on the way. `path` is only used for error messages.
pub fn record_to_subtree(
    record: &NodeRecord,
    level: Level,
    path: &TreePath,
) -> Result<Subtree, SongError> {
    let interval = Interval {
        numerator: record.numerator,
        denominator: record.denominator,
        octave: record.octave,
        beats: record.beats,
        volume_ratio: record.volume_ratio,
        tempo_ratio: record.tempo_ratio,
        words: record.words.clone(),
    };
    if interval.numerator <= 0 {
        return Err(invalid(Field::Numerator, interval.numerator));
    }
    if interval.denominator <= 0 {
        return Err(invalid(Field::Denominator, interval.denominator));
    }
    if !interval.is_valid() {
        let field = if interval.volume_ratio > 0.0 && interval.volume_ratio.is_finite() {
            Field::TempoRatio
        } else {
            Field::VolumeRatio
        };
        let value = match field {
            Field::TempoRatio => interval.tempo_ratio,
            _ => interval.volume_ratio,
        };
        return Err(invalid(field, value));
    }

    let item = match level {
        Level::Group => IntervalItem::Group(GroupItem { interval }),
        Level::Leaf => {
            if interval.beats < 0 {
                return Err(invalid(Field::Beats, interval.beats));
            }
            if !record.children.is_empty() {
                return Err(SongError::LeafHasNoChildren { path: path.clone() });
            }
            IntervalItem::Leaf(LeafItem {
                interval,
                instrument: record
                    .instrument
                    .clone()
                    .unwrap_or_else(|| DEFAULT_INSTRUMENT.to_string()),
            })
        }
        Level::Root => return Err(SongError::IsRoot),
    };

    let mut children = Vec::with_capacity(record.children.len());
    if let Some(child_level) = level.child() {
        for (row, child) in record.children.iter().enumerate() {
            children.push(record_to_subtree(child, child_level, &path.child(row))?);
        }
    }
    Ok(Subtree { item, children })
}

/// Inverse of `record_to_subtree()`.
pub fn subtree_to_record(subtree: &Subtree) -> NodeRecord {
    let interval = subtree.item.interval();
    NodeRecord {
        numerator: interval.numerator,
        denominator: interval.denominator,
        octave: interval.octave,
        beats: interval.beats,
        volume_ratio: interval.volume_ratio,
        tempo_ratio: interval.tempo_ratio,
        words: interval.words.clone(),
        instrument: subtree.item.instrument().map(str::to_string),
        children: subtree.children.iter().map(subtree_to_record).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_take_defaults() {
        let record: NodeRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(record, NodeRecord::default());

        let leaf = record_to_subtree(&record, Level::Leaf, &TreePath::leaf(0, 0)).unwrap();
        assert_eq!(leaf.item.instrument(), Some(DEFAULT_INSTRUMENT));
        assert_eq!(leaf.item.interval(), &Interval::default());

        let song: SongRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(song, SongRecord::default());
        assert_eq!(song.frequency, 220);
        assert_eq!(song.volume_percent, 50);
        assert_eq!(song.tempo, 200);
    }

    #[test]
    fn groups_drop_instrument_and_empty_children() {
        let group = Subtree {
            item: IntervalItem::blank(Level::Group).unwrap(),
            children: Vec::new(),
        };
        let json = serde_json::to_value(subtree_to_record(&group)).unwrap();
        assert!(json.get("instrument").is_none());
        assert!(json.get("children").is_none());

        let leaf = Subtree {
            item: IntervalItem::blank(Level::Leaf).unwrap(),
            children: Vec::new(),
        };
        let json = serde_json::to_value(subtree_to_record(&leaf)).unwrap();
        assert_eq!(json["instrument"], "default");
    }

    #[test]
    fn invalid_records_are_rejected() {
        let path = TreePath::group(0);
        let zero_numerator = NodeRecord {
            numerator: 0,
            ..NodeRecord::default()
        };
        assert!(matches!(
            record_to_subtree(&zero_numerator, Level::Group, &path),
            Err(SongError::InvalidRecord {
                field: Field::Numerator,
                ..
            })
        ));

        let negative_tempo = NodeRecord {
            tempo_ratio: -1.0,
            ..NodeRecord::default()
        };
        assert!(matches!(
            record_to_subtree(&negative_tempo, Level::Group, &path),
            Err(SongError::InvalidRecord {
                field: Field::TempoRatio,
                ..
            })
        ));

        let leaf_with_children = NodeRecord {
            children: vec![NodeRecord::default()],
            ..NodeRecord::default()
        };
        assert!(matches!(
            record_to_subtree(&leaf_with_children, Level::Leaf, &TreePath::leaf(0, 0)),
            Err(SongError::LeafHasNoChildren { .. })
        ));
    }

    #[test]
    fn negative_group_beats_load() {
        let record = NodeRecord {
            beats: -2,
            ..NodeRecord::default()
        };
        let group = record_to_subtree(&record, Level::Group, &TreePath::group(0)).unwrap();
        assert_eq!(group.item.interval().beats, -2);
        assert!(record_to_subtree(&record, Level::Leaf, &TreePath::leaf(0, 0)).is_err());
    }

    #[test]
    fn record_subtree_roundtrip() {
        let json = r#"{
            "numerator": 3, "denominator": 2, "octave": -1, "beats": 4,
            "volume_ratio": 0.5, "tempo_ratio": 1.5, "words": "la",
            "children": [
                {"numerator": 5, "denominator": 4, "instrument": "organ"},
                {"words": "li"}
            ]
        }"#;
        let record: NodeRecord = serde_json::from_str(json).unwrap();
        let subtree = record_to_subtree(&record, Level::Group, &TreePath::group(0)).unwrap();
        assert_eq!(subtree.children.len(), 2);
        assert_eq!(subtree.children[0].item.instrument(), Some("organ"));

        let back = subtree_to_record(&subtree);
        let again = record_to_subtree(&back, Level::Group, &TreePath::group(0)).unwrap();
        assert_eq!(again, subtree);
    }
}
