// The song document: the tree plus the three song-wide globals.
//
// `Song` is the only mutation boundary for a song. Every structural edit,
// field write and global change goes through one of its methods, which
// resolves `TreePath`s to nodes, validates the request against the tree, and
// then reports the change to a `ChangeSink`. The ordering is strict: a method
// either fails before any notification fires, or mutates and emits exactly
// one notification / bracket.
//
// Callers that don't care about notifications pass `&mut ()`.
//
// Persistence is string-in / string-out (`from_json` / `to_json`) over the
// `SongRecord` layout in `record.rs`; reading and writing files is the
// caller's business.
//
// See also: `tree.rs` for the arena operations this wraps, `command.rs` for
// the reversible edits built on top, `playback.rs` for the read-only
// scheduler.

use crate::error::SongError;
use crate::event::ChangeSink;
use crate::record::SongRecord;
use crate::tree::{SongTree, Subtree, subtrees_from_records};
use crate::types::{CellValue, Field, GlobalParameter, Level, Locator, NodeId, Role, TreePath};

/// A song: an interval tree and its starting frequency, volume and tempo.
#[derive(Clone, Debug)]
pub struct Song {
    tree: SongTree,
    frequency: i32,
    volume_percent: i32,
    tempo: i32,
}

impl Default for Song {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject values no song could be played with. Editor controls narrow this
/// further (see `GlobalParameter::range`).
fn check_global(which: GlobalParameter, value: i32) -> Result<(), SongError> {
    let valid = match which {
        GlobalParameter::Frequency | GlobalParameter::Tempo => value > 0,
        GlobalParameter::VolumePercent => value >= 0,
    };
    if valid {
        Ok(())
    } else {
        Err(SongError::InvalidGlobal {
            name: which.name(),
            value,
        })
    }
}

impl Song {
    /// An empty song with default globals.
    pub fn new() -> Self {
        Song {
            tree: SongTree::new(),
            frequency: GlobalParameter::Frequency.default_value(),
            volume_percent: GlobalParameter::VolumePercent.default_value(),
            tempo: GlobalParameter::Tempo.default_value(),
        }
    }

    pub fn tree(&self) -> &SongTree {
        &self.tree
    }

    pub fn frequency(&self) -> i32 {
        self.frequency
    }

    pub fn volume_percent(&self) -> i32 {
        self.volume_percent
    }

    pub fn tempo(&self) -> i32 {
        self.tempo
    }

    pub fn global(&self, which: GlobalParameter) -> i32 {
        match which {
            GlobalParameter::Frequency => self.frequency,
            GlobalParameter::VolumePercent => self.volume_percent,
            GlobalParameter::Tempo => self.tempo,
        }
    }

    pub fn resolve(&self, path: &TreePath) -> Result<NodeId, SongError> {
        self.tree.resolve(path)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Replace the whole document with `record`. The record is validated in
    /// full before anything changes.
    pub fn load(
        &mut self,
        record: &SongRecord,
        sink: &mut dyn ChangeSink,
    ) -> Result<(), SongError> {
        check_global(GlobalParameter::Frequency, record.frequency)?;
        check_global(GlobalParameter::VolumePercent, record.volume_percent)?;
        check_global(GlobalParameter::Tempo, record.tempo)?;
        let subtrees = subtrees_from_records(&record.children, Level::Group, &TreePath::root())?;

        self.set_global(GlobalParameter::Frequency, record.frequency, true, sink)?;
        self.set_global(GlobalParameter::VolumePercent, record.volume_percent, true, sink)?;
        self.set_global(GlobalParameter::Tempo, record.tempo, true, sink)?;
        let root = self.tree.root();
        self.tree.replace_children(root, subtrees)?;
        sink.song_reset();
        log::debug!(
            "loaded song: {} groups, {} nodes",
            record.children.len(),
            self.tree.node_count() - 1
        );
        Ok(())
    }

    pub fn save(&self) -> Result<SongRecord, SongError> {
        Ok(SongRecord {
            frequency: self.frequency,
            volume_percent: self.volume_percent,
            tempo: self.tempo,
            children: self.tree.serialize_children(self.tree.root())?,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, SongError> {
        let record = SongRecord::from_json(json)?;
        let mut song = Song::new();
        song.load(&record, &mut ())?;
        Ok(song)
    }

    pub fn to_json(&self) -> Result<String, SongError> {
        self.save()?.to_json()
    }

    // -----------------------------------------------------------------------
    // Presentation queries
    // -----------------------------------------------------------------------

    pub fn row_count(&self, parent: &TreePath) -> Result<usize, SongError> {
        self.tree.child_count(self.tree.resolve(parent)?)
    }

    pub fn column_count(&self) -> usize {
        Field::COUNT
    }

    /// Horizontal header label for `column`.
    pub fn header(&self, column: usize) -> Option<&'static str> {
        Field::from_column(column)?.header()
    }

    pub fn cell_read(&self, locator: &Locator, role: Role) -> Result<Option<CellValue>, SongError> {
        let id = self.tree.resolve(&locator.path)?;
        self.tree.field_get(id, locator.field, role)
    }

    pub fn is_editable(&self, locator: &Locator) -> Result<bool, SongError> {
        let id = self.tree.resolve(&locator.path)?;
        self.tree.is_editable(id, locator.field)
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Write one cell. `Ok(false)` means the value was refused and nothing
    /// was emitted.
    pub fn cell_write(
        &mut self,
        locator: &Locator,
        value: &CellValue,
        role: Role,
        sink: &mut dyn ChangeSink,
    ) -> Result<bool, SongError> {
        let id = self.tree.resolve(&locator.path)?;
        let accepted = self.tree.field_set(id, locator.field, value, role)?;
        if accepted {
            sink.cell_changed(locator);
        }
        Ok(accepted)
    }

    pub fn insert_blank(
        &mut self,
        parent: &TreePath,
        position: usize,
        count: usize,
        sink: &mut dyn ChangeSink,
    ) -> Result<(), SongError> {
        let id = self.tree.resolve(parent)?;
        self.tree.check_insertable(id, position)?;
        if count == 0 {
            return Err(SongError::EmptyRange {
                parent: parent.clone(),
            });
        }
        sink.begin_insert_rows(parent, position, position + count - 1);
        self.tree.insert_blank(id, position, count)?;
        sink.end_insert_rows();
        Ok(())
    }

    /// Move `subtrees` into the tree at `position`. Drains the vector on
    /// success only.
    pub fn insert_subtrees(
        &mut self,
        parent: &TreePath,
        position: usize,
        subtrees: &mut Vec<Subtree>,
        sink: &mut dyn ChangeSink,
    ) -> Result<usize, SongError> {
        let id = self.tree.resolve(parent)?;
        self.tree.check_subtree_insertion(id, position, subtrees)?;
        let count = subtrees.len();
        sink.begin_insert_rows(parent, position, position + count - 1);
        self.tree.insert_subtrees(id, position, subtrees)?;
        sink.end_insert_rows();
        Ok(count)
    }

    /// Remove `count` children of `parent`. With `removed` the detached
    /// subtrees are appended to it; otherwise they are dropped.
    pub fn remove(
        &mut self,
        parent: &TreePath,
        position: usize,
        count: usize,
        removed: Option<&mut Vec<Subtree>>,
        sink: &mut dyn ChangeSink,
    ) -> Result<(), SongError> {
        let id = self.tree.resolve(parent)?;
        self.tree.check_range(id, position, count)?;
        sink.begin_remove_rows(parent, position, position + count - 1);
        self.tree.remove_range(id, position, count, removed)?;
        sink.end_remove_rows();
        Ok(())
    }

    /// Deep copies of `count` siblings starting at `first`.
    pub fn copy_range(&self, first: &TreePath, count: usize) -> Result<Vec<Subtree>, SongError> {
        let (Some(parent), Some(row)) = (first.parent(), first.row()) else {
            return Err(SongError::IsRoot);
        };
        let id = self.tree.resolve(&parent)?;
        self.tree.deep_copy_range(id, row, count)
    }

    /// Set one global. `notify` controls whether the sink hears about it.
    pub fn set_global(
        &mut self,
        which: GlobalParameter,
        value: i32,
        notify: bool,
        sink: &mut dyn ChangeSink,
    ) -> Result<(), SongError> {
        check_global(which, value)?;
        match which {
            GlobalParameter::Frequency => self.frequency = value,
            GlobalParameter::VolumePercent => self.volume_percent = value,
            GlobalParameter::Tempo => self.tempo = value,
        }
        if notify {
            sink.global_changed(which, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventLog, SongEvent};

    fn song_with(groups: usize, leaves: usize) -> Song {
        let mut song = Song::new();
        song.insert_blank(&TreePath::root(), 0, groups, &mut ()).unwrap();
        for row in 0..groups {
            if leaves > 0 {
                song.insert_blank(&TreePath::group(row), 0, leaves, &mut ()).unwrap();
            }
        }
        song
    }

    #[test]
    fn new_song_has_default_globals() {
        let song = Song::new();
        assert_eq!(song.frequency(), 220);
        assert_eq!(song.volume_percent(), 50);
        assert_eq!(song.tempo(), 200);
        assert_eq!(song.row_count(&TreePath::root()).unwrap(), 0);
        assert_eq!(song.column_count(), 9);
        assert_eq!(song.header(0), None);
        assert_eq!(song.header(4), Some("Beats"));
        assert_eq!(song.header(9), None);
    }

    #[test]
    fn accepted_write_emits_one_cell_change() {
        let mut song = song_with(1, 1);
        let mut log = EventLog::new();
        let locator = Locator::new(TreePath::leaf(0, 0), Field::Numerator);
        assert!(song.cell_write(&locator, &CellValue::Int(3), Role::Edit, &mut log)
            .unwrap());
        assert_eq!(log.events(), &[SongEvent::CellChanged(locator.clone())]);
        assert_eq!(
            song.cell_read(&locator, Role::Display).unwrap(),
            Some(CellValue::Int(3))
        );
    }

    #[test]
    fn rejected_write_emits_nothing() {
        let mut song = song_with(1, 1);
        let mut log = EventLog::new();
        let locator = Locator::new(TreePath::leaf(0, 0), Field::Denominator);
        assert!(!song.cell_write(&locator, &CellValue::Int(0), Role::Edit, &mut log)
            .unwrap());
        assert!(log.is_empty());
        assert_eq!(
            song.cell_read(&locator, Role::Edit).unwrap(),
            Some(CellValue::Int(1))
        );
    }

    #[test]
    fn one_bracket_per_structural_call() {
        let mut song = song_with(1, 0);
        let mut log = EventLog::new();
        song.insert_blank(&TreePath::group(0), 0, 3, &mut log).unwrap();
        assert_eq!(
            log.drain(),
            vec![
                SongEvent::BeginInsertRows {
                    parent: TreePath::group(0),
                    first: 0,
                    last: 2
                },
                SongEvent::EndInsertRows,
            ]
        );

        let mut removed = Vec::new();
        song.remove(&TreePath::group(0), 1, 2, Some(&mut removed), &mut log).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(
            log.drain(),
            vec![
                SongEvent::BeginRemoveRows {
                    parent: TreePath::group(0),
                    first: 1,
                    last: 2
                },
                SongEvent::EndRemoveRows,
            ]
        );
    }

    #[test]
    fn failing_structural_calls_emit_nothing() {
        let mut song = song_with(1, 1);
        let before = song.to_json().unwrap();
        let mut log = EventLog::new();
        assert!(song.insert_blank(&TreePath::leaf(0, 0), 0, 1, &mut log).is_err());
        assert!(song.remove(&TreePath::root(), 0, 5, None, &mut log).is_err());
        let mut wrong_level = song.copy_range(&TreePath::leaf(0, 0), 1).unwrap();
        let inserted = song.insert_subtrees(&TreePath::root(), 0, &mut wrong_level, &mut log);
        assert!(inserted.is_err());
        assert_eq!(wrong_level.len(), 1);
        assert!(log.is_empty());
        assert_eq!(song.to_json().unwrap(), before);
    }

    #[test]
    fn set_global_notifies_on_request() {
        let mut song = Song::new();
        let mut log = EventLog::new();
        song.set_global(GlobalParameter::Tempo, 300, false, &mut log).unwrap();
        assert!(log.is_empty());
        song.set_global(GlobalParameter::Frequency, 330, true, &mut log).unwrap();
        assert_eq!(
            log.events(),
            &[SongEvent::GlobalChanged {
                which: GlobalParameter::Frequency,
                value: 330
            }]
        );
        assert_eq!(song.global(GlobalParameter::Tempo), 300);
        assert!(song
            .set_global(GlobalParameter::Tempo, 0, true, &mut log)
            .is_err());
        assert_eq!(song.tempo(), 300);
    }

    #[test]
    fn load_emits_globals_then_reset() {
        let json = r#"{"frequency": 330, "children": [{"children": [{}]}]}"#;
        let record = SongRecord::from_json(json).unwrap();
        let mut song = song_with(3, 0);
        let mut log = EventLog::new();
        song.load(&record, &mut log).unwrap();

        assert_eq!(song.row_count(&TreePath::root()).unwrap(), 1);
        assert_eq!(song.row_count(&TreePath::group(0)).unwrap(), 1);
        assert_eq!(song.tempo(), 200);
        let events = log.drain();
        assert_eq!(events.len(), 4);
        assert_eq!(events.last(), Some(&SongEvent::Reset));
    }

    #[test]
    fn invalid_load_changes_nothing() {
        let mut song = song_with(2, 1);
        let before = song.to_json().unwrap();
        let mut log = EventLog::new();
        let bad = SongRecord::from_json(r#"{"children": [{"children": [{"beats": -1}]}]}"#)
            .unwrap();
        assert!(song.load(&bad, &mut log).is_err());
        let bad_tempo = SongRecord::from_json(r#"{"tempo": 0}"#).unwrap();
        assert!(song.load(&bad_tempo, &mut log).is_err());
        assert!(log.is_empty());
        assert_eq!(song.to_json().unwrap(), before);
    }

    #[test]
    fn json_roundtrip() {
        let mut song = song_with(2, 2);
        song.cell_write(
            &Locator::new(TreePath::leaf(1, 1), Field::Words),
            &CellValue::from("la"),
            Role::Edit,
            &mut (),
        )
        .unwrap();
        let json = song.to_json().unwrap();
        let again = Song::from_json(&json).unwrap();
        assert_eq!(again.to_json().unwrap(), json);
    }

    #[test]
    fn copy_range_of_root_is_rejected() {
        let song = song_with(1, 0);
        assert!(matches!(
            song.copy_range(&TreePath::root(), 1),
            Err(SongError::IsRoot)
        ));
        assert_eq!(song.copy_range(&TreePath::group(0), 1).unwrap().len(), 1);
    }
}
