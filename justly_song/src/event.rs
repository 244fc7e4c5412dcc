// Change notifications emitted by the song document.
//
// Every mutation that goes through `Song` reports itself to a `ChangeSink`
// so a presentation layer can keep its view in step with the tree. The
// contract is one notification (or one begin/end bracket) per logical
// operation, however many rows it touches:
//
// - `cell_changed` after a single accepted field write;
// - `begin_insert_rows` / `end_insert_rows` around a structural insert;
// - `begin_remove_rows` / `end_remove_rows` around a structural removal;
// - `global_changed` when one of the three song-wide values moves;
// - `song_reset` after a whole-document load.
//
// Rows are given as `first..=last` under a parent path, matching how list
// views number their rows. A rejected or failing operation emits nothing.
//
// `EventLog` is the recording sink used by the edit session and by tests;
// `()` is the sink that ignores everything.

use crate::types::{GlobalParameter, Locator, TreePath};
use serde::{Deserialize, Serialize};

/// A recorded change notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SongEvent {
    CellChanged(Locator),
    BeginInsertRows {
        parent: TreePath,
        first: usize,
        last: usize,
    },
    EndInsertRows,
    BeginRemoveRows {
        parent: TreePath,
        first: usize,
        last: usize,
    },
    EndRemoveRows,
    GlobalChanged {
        which: GlobalParameter,
        value: i32,
    },
    Reset,
}

/// Receiver for document change notifications. Every method defaults to a
/// no-op so sinks only implement what they care about.
pub trait ChangeSink {
    fn cell_changed(&mut self, _locator: &Locator) {}
    fn begin_insert_rows(&mut self, _parent: &TreePath, _first: usize, _last: usize) {}
    fn end_insert_rows(&mut self) {}
    fn begin_remove_rows(&mut self, _parent: &TreePath, _first: usize, _last: usize) {}
    fn end_remove_rows(&mut self) {}
    fn global_changed(&mut self, _which: GlobalParameter, _value: i32) {}
    fn song_reset(&mut self) {}
}

impl ChangeSink for () {}

/// Sink that records every notification in order.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<SongEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SongEvent] {
        &self.events
    }

    /// Take everything recorded so far.
    pub fn drain(&mut self) -> Vec<SongEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl ChangeSink for EventLog {
    fn cell_changed(&mut self, locator: &Locator) {
        self.events.push(SongEvent::CellChanged(locator.clone()));
    }

    fn begin_insert_rows(&mut self, parent: &TreePath, first: usize, last: usize) {
        self.events.push(SongEvent::BeginInsertRows {
            parent: parent.clone(),
            first,
            last,
        });
    }

    fn end_insert_rows(&mut self) {
        self.events.push(SongEvent::EndInsertRows);
    }

    fn begin_remove_rows(&mut self, parent: &TreePath, first: usize, last: usize) {
        self.events.push(SongEvent::BeginRemoveRows {
            parent: parent.clone(),
            first,
            last,
        });
    }

    fn end_remove_rows(&mut self) {
        self.events.push(SongEvent::EndRemoveRows);
    }

    fn global_changed(&mut self, which: GlobalParameter, value: i32) {
        self.events.push(SongEvent::GlobalChanged { which, value });
    }

    fn song_reset(&mut self) {
        self.events.push(SongEvent::Reset);
    }
}
