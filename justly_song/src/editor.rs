// An editing session over one song.
//
// `Editor` bundles what an interactive front end needs around a `Song`: the
// undo history, a clipboard of copied subtrees, and an `EventLog` that
// collects change notifications until the front end drains them. Every edit
// goes through a `SongCommand` so it can be undone.
//
// Selection-relative operations mirror the usual menu actions:
// - insert / paste *before* a selection land at its first row,
// - insert / paste *after* land just past its last row,
// - insert / paste *into* a node land at row 0 of its children.
//
// Paste is refused (returns `false`, nothing recorded) when the clipboard is
// empty or holds nodes of the wrong level for the target, since those are
// states a menu would simply grey out. Global changes are refused outside
// the ranges the editor's controls offer.
//
// Loading replaces the document and clears the history; there is nothing
// sensible to undo back into.

use crate::command::{SongCommand, UndoHistory};
use crate::error::SongError;
use crate::event::{EventLog, SongEvent};
use crate::playback::{AudioTransport, Player};
use crate::record::SongRecord;
use crate::song::Song;
use crate::tree::Subtree;
use crate::types::{CellValue, GlobalParameter, Level, Locator, Selection, TreePath};

#[derive(Clone, Debug, Default)]
pub struct Editor {
    song: Song,
    history: UndoHistory,
    clipboard: Vec<Subtree>,
    events: EventLog,
}

/// Parent path and first row of a non-empty selection.
fn anchor(selection: &Selection) -> Result<(TreePath, usize), SongError> {
    if selection.is_empty() {
        return Err(SongError::EmptySelection);
    }
    match (selection.first.parent(), selection.first.row()) {
        (Some(parent), Some(row)) => Ok((parent, row)),
        _ => Err(SongError::IsRoot),
    }
}

impl Editor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_song(song: Song) -> Self {
        Editor {
            song,
            ..Self::default()
        }
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn history(&self) -> &UndoHistory {
        &self.history
    }

    pub fn clipboard(&self) -> &[Subtree] {
        &self.clipboard
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<SongEvent> {
        self.events.drain()
    }

    fn push(&mut self, command: SongCommand) -> Result<bool, SongError> {
        self.history.push(command, &mut self.song, &mut self.events)
    }

    // -----------------------------------------------------------------------
    // Cells and globals
    // -----------------------------------------------------------------------

    /// Edit one cell. `Ok(false)` if the value was refused.
    pub fn set_cell(&mut self, locator: Locator, value: CellValue) -> Result<bool, SongError> {
        let command = SongCommand::cell_edit(&self.song, locator, value)?;
        self.push(command)
    }

    /// Change a global from an editor control. Values outside the control's
    /// range are refused.
    pub fn set_global(&mut self, which: GlobalParameter, value: i32) -> Result<bool, SongError> {
        if !which.in_range(value) {
            log::debug!("refusing {} {value}: outside {:?}", which.name(), which.range());
            return Ok(false);
        }
        let command = SongCommand::global_change(&self.song, which, value);
        self.push(command)
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    pub fn insert_before(&mut self, selection: &Selection) -> Result<(), SongError> {
        let (parent, row) = anchor(selection)?;
        self.push(SongCommand::insert_blank(parent, row, 1))?;
        Ok(())
    }

    pub fn insert_after(&mut self, selection: &Selection) -> Result<(), SongError> {
        let (parent, row) = anchor(selection)?;
        self.push(SongCommand::insert_blank(parent, row + selection.count, 1))?;
        Ok(())
    }

    /// Insert one blank child at the top of `parent` (the root for an empty
    /// song).
    pub fn insert_into(&mut self, parent: &TreePath) -> Result<(), SongError> {
        self.push(SongCommand::insert_blank(parent.clone(), 0, 1))?;
        Ok(())
    }

    pub fn remove(&mut self, selection: &Selection) -> Result<(), SongError> {
        let (parent, row) = anchor(selection)?;
        self.push(SongCommand::remove(parent, row, selection.count))?;
        Ok(())
    }

    /// Replace the clipboard with copies of the selection. Returns how many
    /// nodes were copied.
    pub fn copy(&mut self, selection: &Selection) -> Result<usize, SongError> {
        anchor(selection)?;
        self.clipboard = self.song.copy_range(&selection.first, selection.count)?;
        Ok(self.clipboard.len())
    }

    fn paste(&mut self, parent: TreePath, position: usize) -> Result<bool, SongError> {
        let Some(first) = self.clipboard.first() else {
            return Ok(false);
        };
        let parent_level = self.song.tree().level(self.song.resolve(&parent)?)?;
        if parent_level.child() != Some(first.level()) {
            return Ok(false);
        }
        let command = SongCommand::insert(parent, position, &self.clipboard);
        self.push(command)
    }

    pub fn paste_before(&mut self, selection: &Selection) -> Result<bool, SongError> {
        let (parent, row) = anchor(selection)?;
        self.paste(parent, row)
    }

    pub fn paste_after(&mut self, selection: &Selection) -> Result<bool, SongError> {
        let (parent, row) = anchor(selection)?;
        self.paste(parent, row + selection.count)
    }

    pub fn paste_into(&mut self, parent: &TreePath) -> Result<bool, SongError> {
        self.paste(parent.clone(), 0)
    }

    /// Level the clipboard would paste at, if it holds anything.
    pub fn clipboard_level(&self) -> Option<Level> {
        self.clipboard.first().map(Subtree::level)
    }

    // -----------------------------------------------------------------------
    // History, persistence, playback
    // -----------------------------------------------------------------------

    pub fn undo(&mut self) -> Result<bool, SongError> {
        self.history.undo(&mut self.song, &mut self.events)
    }

    pub fn redo(&mut self) -> Result<bool, SongError> {
        self.history.redo(&mut self.song, &mut self.events)
    }

    /// Replace the song with a parsed document. The history is cleared; the
    /// clipboard survives.
    pub fn load_json(&mut self, json: &str) -> Result<(), SongError> {
        let record = SongRecord::from_json(json)?;
        self.song.load(&record, &mut self.events)?;
        self.history.clear();
        Ok(())
    }

    pub fn save_json(&self) -> Result<String, SongError> {
        self.song.to_json()
    }

    pub fn play(
        &self,
        selection: &Selection,
        player: &Player,
        transport: &mut dyn AudioTransport,
    ) -> Result<f64, SongError> {
        player.play(&self.song, selection, transport)
    }
}
