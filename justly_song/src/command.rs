// Reversible edits and the linear undo history.
//
// Every user-visible change to a song is a `SongCommand`: a plain value that
// knows how to apply itself to a `Song` and how to revert that application.
// Commands address nodes by `TreePath`, never by `NodeId`. Undo and redo run
// commands in exact reverse / forward order, so the path a command recorded
// when it was first applied points at the same place every time it runs
// again, while arena ids get recycled by every remove/insert.
//
// Commands that move subtrees own them while they are out of the tree:
// - `Remove` starts empty and fills `removed` on apply; revert moves them
//   back in and leaves `removed` empty again.
// - `Insert` is built from a deep copy of the clipboard and holds it until
//   apply moves it in; revert moves the same subtrees back out.
//
// `GlobalChange` carries a `first_apply` flag. The first apply comes from a
// live control (a slider) that already shows the new value, so it runs
// without notifying; every later apply / revert notifies.
//
// `UndoHistory` is a single stack with a pointer. Pushing applies the command
// and drops the redo tail. A command whose first apply is refused (a cell
// edit with a bad value) or fails is not recorded and leaves the redo tail
// alone.
//
// See also: `song.rs` for the operations commands call, `editor.rs` for the
// session that builds commands from user actions.

use crate::error::SongError;
use crate::event::ChangeSink;
use crate::song::Song;
use crate::tree::Subtree;
use crate::types::{CellValue, GlobalParameter, Locator, Role, TreePath};

/// One reversible edit.
#[derive(Clone, Debug)]
pub enum SongCommand {
    CellEdit {
        locator: Locator,
        old: CellValue,
        new: CellValue,
    },
    Remove {
        parent: TreePath,
        position: usize,
        count: usize,
        /// Filled while the nodes are out of the tree.
        removed: Vec<Subtree>,
    },
    Insert {
        parent: TreePath,
        position: usize,
        count: usize,
        /// Filled while the nodes are out of the tree.
        subtrees: Vec<Subtree>,
    },
    InsertBlank {
        parent: TreePath,
        position: usize,
        count: usize,
    },
    GlobalChange {
        which: GlobalParameter,
        old: i32,
        new: i32,
        first_apply: bool,
    },
}

impl SongCommand {
    /// Edit one cell. The current value (Edit role) becomes the undo value.
    pub fn cell_edit(song: &Song, locator: Locator, new: CellValue) -> Result<Self, SongError> {
        let not_editable = || SongError::FieldNotEditable {
            path: locator.path.clone(),
            field: locator.field,
        };
        if !song.is_editable(&locator)? {
            return Err(not_editable());
        }
        let old = song
            .cell_read(&locator, Role::Edit)?
            .ok_or_else(not_editable)?;
        Ok(SongCommand::CellEdit { locator, old, new })
    }

    pub fn remove(parent: TreePath, position: usize, count: usize) -> Self {
        SongCommand::Remove {
            parent,
            position,
            count,
            removed: Vec::new(),
        }
    }

    /// Insert copies of `subtrees`. The copy is taken once, here.
    pub fn insert(parent: TreePath, position: usize, subtrees: &[Subtree]) -> Self {
        SongCommand::Insert {
            parent,
            position,
            count: subtrees.len(),
            subtrees: subtrees.to_vec(),
        }
    }

    pub fn insert_blank(parent: TreePath, position: usize, count: usize) -> Self {
        SongCommand::InsertBlank {
            parent,
            position,
            count,
        }
    }

    /// Change a global, remembering the current value for undo.
    pub fn global_change(song: &Song, which: GlobalParameter, new: i32) -> Self {
        SongCommand::GlobalChange {
            which,
            old: song.global(which),
            new,
            first_apply: true,
        }
    }

    /// Apply the edit. `Ok(false)` means the song refused it and is unchanged.
    pub fn apply(&mut self, song: &mut Song, sink: &mut dyn ChangeSink) -> Result<bool, SongError> {
        match self {
            SongCommand::CellEdit { locator, new, .. } => {
                song.cell_write(locator, new, Role::Edit, sink)
            }
            SongCommand::Remove {
                parent,
                position,
                count,
                removed,
            } => {
                song.remove(parent, *position, *count, Some(removed), sink)?;
                Ok(true)
            }
            SongCommand::Insert {
                parent,
                position,
                subtrees,
                ..
            } => {
                song.insert_subtrees(parent, *position, subtrees, sink)?;
                Ok(true)
            }
            SongCommand::InsertBlank {
                parent,
                position,
                count,
            } => {
                song.insert_blank(parent, *position, *count, sink)?;
                Ok(true)
            }
            SongCommand::GlobalChange {
                which,
                new,
                first_apply,
                ..
            } => {
                song.set_global(*which, *new, !*first_apply, sink)?;
                *first_apply = false;
                Ok(true)
            }
        }
    }

    /// Undo a previous `apply`.
    pub fn revert(&mut self, song: &mut Song, sink: &mut dyn ChangeSink) -> Result<(), SongError> {
        match self {
            SongCommand::CellEdit { locator, old, .. } => {
                song.cell_write(locator, old, Role::Edit, sink)?;
            }
            SongCommand::Remove {
                parent,
                position,
                removed,
                ..
            } => {
                song.insert_subtrees(parent, *position, removed, sink)?;
            }
            SongCommand::Insert {
                parent,
                position,
                count,
                subtrees,
            } => {
                song.remove(parent, *position, *count, Some(subtrees), sink)?;
            }
            SongCommand::InsertBlank {
                parent,
                position,
                count,
            } => {
                song.remove(parent, *position, *count, None, sink)?;
            }
            SongCommand::GlobalChange {
                which,
                old,
                first_apply,
                ..
            } => {
                song.set_global(*which, *old, !*first_apply, sink)?;
            }
        }
        Ok(())
    }
}

/// Linear undo/redo stack. Commands below `applied` are in effect.
#[derive(Clone, Debug, Default)]
pub struct UndoHistory {
    commands: Vec<SongCommand>,
    applied: usize,
}

impl UndoHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `command` and record it. Returns `Ok(false)` (and records
    /// nothing) if the song refused it.
    pub fn push(
        &mut self,
        mut command: SongCommand,
        song: &mut Song,
        sink: &mut dyn ChangeSink,
    ) -> Result<bool, SongError> {
        if !command.apply(song, sink)? {
            return Ok(false);
        }
        self.commands.truncate(self.applied);
        self.commands.push(command);
        self.applied = self.commands.len();
        Ok(true)
    }

    /// Revert the most recent applied command. `Ok(false)` if there is none.
    pub fn undo(&mut self, song: &mut Song, sink: &mut dyn ChangeSink) -> Result<bool, SongError> {
        let Some(index) = self.applied.checked_sub(1) else {
            return Ok(false);
        };
        self.commands[index].revert(song, sink)?;
        self.applied = index;
        Ok(true)
    }

    /// Re-apply the next undone command. `Ok(false)` if there is none.
    pub fn redo(&mut self, song: &mut Song, sink: &mut dyn ChangeSink) -> Result<bool, SongError> {
        let Some(command) = self.commands.get_mut(self.applied) else {
            return Ok(false);
        };
        command.apply(song, sink)?;
        self.applied += 1;
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.applied > 0
    }

    pub fn can_redo(&self) -> bool {
        self.applied < self.commands.len()
    }

    /// Number of recorded commands, undone ones included.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.applied = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventLog, SongEvent};
    use crate::types::Field;

    fn song_with(groups: usize, leaves: usize) -> Song {
        let mut song = Song::new();
        song.insert_blank(&TreePath::root(), 0, groups, &mut ())
            .unwrap();
        if leaves > 0 {
            for row in 0..groups {
                song.insert_blank(&TreePath::group(row), 0, leaves, &mut ())
                    .unwrap();
            }
        }
        // Make rows distinguishable so misplaced restores show up.
        for row in 0..groups {
            song.cell_write(
                &Locator::new(TreePath::group(row), Field::Numerator),
                &CellValue::Int(row as i32 + 1),
                Role::Edit,
                &mut (),
            )
            .unwrap();
        }
        song
    }

    fn every_kind(song: &Song) -> Vec<SongCommand> {
        vec![
            SongCommand::cell_edit(
                song,
                Locator::new(TreePath::leaf(1, 0), Field::Octave),
                CellValue::Int(-1),
            )
            .unwrap(),
            SongCommand::remove(TreePath::root(), 0, 2),
            SongCommand::remove(TreePath::group(2), 1, 1),
            SongCommand::insert(
                TreePath::root(),
                3,
                &song.copy_range(&TreePath::group(0), 2).unwrap(),
            ),
            SongCommand::insert_blank(TreePath::group(0), 2, 3),
            SongCommand::global_change(song, GlobalParameter::Tempo, 400),
        ]
    }

    #[test]
    fn apply_then_revert_restores_state() {
        let template = song_with(3, 2);
        for mut command in every_kind(&template) {
            let mut song = template.clone();
            let before = song.to_json().unwrap();
            assert!(command.apply(&mut song, &mut ()).unwrap(), "{command:?}");
            assert_ne!(song.to_json().unwrap(), before, "{command:?}");
            command.revert(&mut song, &mut ()).unwrap();
            assert_eq!(song.to_json().unwrap(), before, "{command:?}");
        }
    }

    #[test]
    fn apply_revert_apply_matches_single_apply() {
        let template = song_with(3, 2);
        for (mut once, mut thrice) in every_kind(&template)
            .into_iter()
            .zip(every_kind(&template))
        {
            let mut expected = template.clone();
            once.apply(&mut expected, &mut ()).unwrap();

            let mut song = template.clone();
            thrice.apply(&mut song, &mut ()).unwrap();
            thrice.revert(&mut song, &mut ()).unwrap();
            thrice.apply(&mut song, &mut ()).unwrap();
            assert_eq!(song.to_json().unwrap(), expected.to_json().unwrap(), "{thrice:?}");
        }
    }

    #[test]
    fn cell_edit_on_uneditable_field_fails() {
        let song = song_with(1, 1);
        let err = SongCommand::cell_edit(
            &song,
            Locator::new(TreePath::group(0), Field::Instrument),
            CellValue::from("organ"),
        )
        .unwrap_err();
        assert!(matches!(err, SongError::FieldNotEditable { .. }));
        assert!(SongCommand::cell_edit(
            &song,
            Locator::new(TreePath::leaf(0, 0), Field::Symbol),
            CellValue::from("x"),
        )
        .is_err());
    }

    #[test]
    fn global_change_notifies_after_first_apply() {
        let mut song = song_with(1, 0);
        let mut log = EventLog::new();
        let mut command = SongCommand::global_change(&song, GlobalParameter::Frequency, 330);
        command.apply(&mut song, &mut log).unwrap();
        assert!(log.is_empty());
        command.revert(&mut song, &mut log).unwrap();
        command.apply(&mut song, &mut log).unwrap();
        assert_eq!(
            log.drain(),
            vec![
                SongEvent::GlobalChanged {
                    which: GlobalParameter::Frequency,
                    value: 220
                },
                SongEvent::GlobalChanged {
                    which: GlobalParameter::Frequency,
                    value: 330
                },
            ]
        );
    }

    #[test]
    fn history_undo_redo() {
        let mut song = song_with(2, 1);
        let initial = song.to_json().unwrap();
        let mut history = UndoHistory::new();
        assert!(!history.can_undo());
        assert!(!history.undo(&mut song, &mut ()).unwrap());

        history
            .push(SongCommand::insert_blank(TreePath::root(), 2, 1), &mut song, &mut ())
            .unwrap();
        let after_insert = song.to_json().unwrap();
        history
            .push(SongCommand::remove(TreePath::root(), 0, 1), &mut song, &mut ())
            .unwrap();
        let after_remove = song.to_json().unwrap();
        assert_eq!(history.len(), 2);

        assert!(history.undo(&mut song, &mut ()).unwrap());
        assert_eq!(song.to_json().unwrap(), after_insert);
        assert!(history.undo(&mut song, &mut ()).unwrap());
        assert_eq!(song.to_json().unwrap(), initial);
        assert!(!history.undo(&mut song, &mut ()).unwrap());

        assert!(history.redo(&mut song, &mut ()).unwrap());
        assert!(history.redo(&mut song, &mut ()).unwrap());
        assert_eq!(song.to_json().unwrap(), after_remove);
        assert!(!history.redo(&mut song, &mut ()).unwrap());
    }

    #[test]
    fn push_discards_redo_tail() {
        let mut song = song_with(1, 0);
        let mut history = UndoHistory::new();
        history
            .push(SongCommand::insert_blank(TreePath::root(), 0, 1), &mut song, &mut ())
            .unwrap();
        history
            .push(SongCommand::insert_blank(TreePath::root(), 0, 1), &mut song, &mut ())
            .unwrap();
        history.undo(&mut song, &mut ()).unwrap();
        assert!(history.can_redo());

        history
            .push(SongCommand::remove(TreePath::root(), 0, 1), &mut song, &mut ())
            .unwrap();
        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn refused_or_failed_push_keeps_history() {
        let mut song = song_with(1, 1);
        let mut history = UndoHistory::new();
        history
            .push(SongCommand::insert_blank(TreePath::root(), 1, 1), &mut song, &mut ())
            .unwrap();
        history.undo(&mut song, &mut ()).unwrap();

        let refused = SongCommand::cell_edit(
            &song,
            Locator::new(TreePath::leaf(0, 0), Field::Numerator),
            CellValue::Int(0),
        )
        .unwrap();
        assert!(!history.push(refused, &mut song, &mut ()).unwrap());
        assert!(history
            .push(SongCommand::remove(TreePath::root(), 4, 1), &mut song, &mut ())
            .is_err());
        assert!(history.can_redo());
        assert_eq!(history.len(), 1);
    }
}
