//! Navigation history.
//!
//! The router never touches a real browser history. It talks to a
//! [`History`], which owns the list of visited locations and tells its
//! listeners when the current entry changes underneath the router (back and
//! forward). [`MemoryHistory`] is the in-process implementation.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::rc::Rc;

/// Handle returned by [`History::listen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

pub type Listener = Rc<dyn Fn()>;

/// Navigation primitive the router is driven by.
///
/// Entries are stored as a path followed by an optional `?query`.
pub trait History: Debug {
    /// Adds `entry` after the current one and drops any forward entries.
    fn push_entry(&self, entry: &str);

    /// Overwrites the current entry.
    fn replace_entry(&self, entry: &str);

    /// Moves one entry back, notifying listeners if it moved.
    fn go_back(&self);

    /// Moves one entry forward, notifying listeners if it moved.
    fn go_forward(&self);

    /// Path of the current entry, without the query.
    fn current_path(&self) -> String;

    /// Query of the current entry, without the leading `?`.
    fn current_search(&self) -> String;

    /// Registers a callback fired on location changes not caused by
    /// `push_entry` or `replace_entry`.
    fn listen(&self, listener: Listener) -> ListenerId;

    fn unlisten(&self, id: ListenerId);
}

/// History kept in memory.
pub struct MemoryHistory {
    entries: RefCell<Vec<String>>,
    index: Cell<usize>,
    listeners: RefCell<BTreeMap<ListenerId, Listener>>,
    next_id: Cell<u64>,
}

impl MemoryHistory {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            entries: RefCell::new(vec![initial.into()]),
            index: Cell::new(0),
            listeners: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(0),
        }
    }

    /// Every entry, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }

    /// Position of the current entry in [`entries`](Self::entries).
    pub fn index(&self) -> usize {
        self.index.get()
    }

    fn current(&self) -> String {
        self.entries.borrow()[self.index.get()].clone()
    }

    fn go(&self, index: usize) {
        self.index.set(index);
        tracing::debug!(entry = %self.current(), "history moved");

        // listeners may subscribe or unsubscribe while being notified
        let listeners: Vec<Listener> = self.listeners.borrow().values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Debug for MemoryHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHistory")
            .field("entries", &self.entries.borrow())
            .field("index", &self.index.get())
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl History for MemoryHistory {
    fn push_entry(&self, entry: &str) {
        let mut entries = self.entries.borrow_mut();
        entries.truncate(self.index.get() + 1);
        entries.push(entry.to_string());
        self.index.set(entries.len() - 1);
    }

    fn replace_entry(&self, entry: &str) {
        self.entries.borrow_mut()[self.index.get()] = entry.to_string();
    }

    fn go_back(&self) {
        if let Some(index) = self.index.get().checked_sub(1) {
            self.go(index);
        }
    }

    fn go_forward(&self) {
        let index = self.index.get() + 1;
        if index < self.entries.borrow().len() {
            self.go(index);
        }
    }

    fn current_path(&self) -> String {
        let entry = self.current();
        match entry.split_once('?') {
            Some((path, _)) => path.to_string(),
            None => entry,
        }
    }

    fn current_search(&self) -> String {
        self.current()
            .split_once('?')
            .map(|(_, query)| query.to_string())
            .unwrap_or_default()
    }

    fn listen(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().insert(id, listener);
        id
    }

    fn unlisten(&self, id: ListenerId) {
        self.listeners.borrow_mut().remove(&id);
    }
}
