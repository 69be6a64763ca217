#![forbid(unsafe_code)]

//! Positional reconciliation of derived entries against a list wrapper.
//!
//! A [`Reconciler`] keeps an [`EntryList`] (one entry per source element,
//! each tagged with that element as its context) aligned with an
//! [`ArrayModel`] by replaying the list's `add`, `remove`, `move` and `sort`
//! events. Entry construction and teardown are delegated to an
//! [`EntryLifecycle`].
//!
//! # Invariants
//!
//! 1. After each source event has been handled, `entries.len()` equals the
//!    source length and `entries[i]` has `source[i]` as its context.
//! 2. Entries are repositioned on move and sort, never recreated.
//! 3. Resorting an already ordered list performs zero moves.
//!
//! # Failure Modes
//!
//! - Lifecycle callbacks and earlier source listeners that mutate the source
//!   list re-enter the reconciler before the current step finished. Alignment
//!   is checked only once the outermost source event has been handled: debug
//!   builds assert, release builds log a warning.
//! - Dropping the [`Reconciler`] unbinds it; keep it alive as long as the
//!   entries should follow the source.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use dview_core::{Result, Value};
use tracing::{debug, debug_span, trace, warn};

use super::emitter::{Callback, Emitter};
use super::entity::{Entity, listen_entity};
use super::model::ArrayModel;

/// Collaborator that builds and tears down derived entries.
pub trait EntryLifecycle: 'static {
    type Entry: Clone + 'static;

    /// Build the entry for `item`, about to be inserted at `index`.
    fn create_entry(&self, item: &Value, index: usize) -> Self::Entry;

    /// Tear down an entry that is about to leave position `index`.
    fn destroy_entry(&self, entry: &Self::Entry, index: usize);

    /// An entry moved from `old` to `index`.
    fn reposition_entry(&self, entry: &Self::Entry, index: usize, old: usize);

    /// The entry is in place at `index`.
    fn added(&self, _entry: &Self::Entry, _index: usize) {}

    /// Called before [`EntryLifecycle::destroy_entry`].
    fn removing(&self, _entry: &Self::Entry, _index: usize) {}

    /// Whether entries carry their own position and need re-stamping.
    fn tracks_index(&self) -> bool {
        false
    }

    fn stamp_index(&self, _entry: &Self::Entry, _index: usize) {}
}

// ---------------------------------------------------------------------------
// EntryList
// ---------------------------------------------------------------------------

/// Ordered entries, each tagged with the source element it derives from.
#[derive(Clone)]
pub struct EntryList<E> {
    slots: Vec<(Value, E)>,
}

impl<E> Default for EntryList<E> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<E: Clone> EntryList<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Insert at `index`, clamped to the length. Returns the position used.
    pub fn insert(&mut self, index: usize, context: Value, entry: E) -> usize {
        let at = index.min(self.slots.len());
        self.slots.insert(at, (context, entry));
        at
    }

    pub fn remove_at(&mut self, index: usize) -> Option<(Value, E)> {
        (index < self.slots.len()).then(|| self.slots.remove(index))
    }

    /// Move the entry at `old` to `new`. Returns the moved entry.
    pub fn move_from(&mut self, old: usize, new: usize) -> Option<E> {
        if old >= self.slots.len() || new >= self.slots.len() || old == new {
            return None;
        }
        let slot = self.slots.remove(old);
        let entry = slot.1.clone();
        self.slots.insert(new, slot);
        Some(entry)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&E> {
        self.slots.get(index).map(|(_, entry)| entry)
    }

    #[must_use]
    pub fn context_at(&self, index: usize) -> Option<&Value> {
        self.slots.get(index).map(|(context, _)| context)
    }

    /// Position of the entry whose context is `item`.
    #[must_use]
    pub fn index_by_context(&self, item: &Value) -> Option<usize> {
        self.index_by_context_from(item, 0)
    }

    /// Like [`EntryList::index_by_context`], searching from `from` onward.
    #[must_use]
    pub fn index_by_context_from(&self, item: &Value, from: usize) -> Option<usize> {
        self.slots
            .iter()
            .skip(from)
            .position(|(context, _)| context.same(item))
            .map(|offset| from + offset)
    }

    #[must_use]
    pub fn entry_of(&self, item: &Value) -> Option<&E> {
        self.index_by_context(item).and_then(|i| self.get(i))
    }

    #[must_use]
    pub fn entries(&self) -> Vec<E> {
        self.slots.iter().map(|(_, entry)| entry.clone()).collect()
    }

    #[must_use]
    pub fn contexts(&self) -> Vec<Value> {
        self.slots.iter().map(|(context, _)| context.clone()).collect()
    }
}

impl<E> fmt::Debug for EntryList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.slots.iter().map(|(context, _)| context))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Reconciliation state
// ---------------------------------------------------------------------------

struct State<L: EntryLifecycle> {
    lifecycle: L,
    entries: RefCell<EntryList<L::Entry>>,
    source: ArrayModel,
}

impl<L: EntryLifecycle> State<L> {
    fn entry_at(&self, index: usize) -> Option<L::Entry> {
        self.entries.borrow().get(index).cloned()
    }

    fn insert(&self, item: Value, index: usize) -> usize {
        let entry = self.lifecycle.create_entry(&item, index);
        let at = self.entries.borrow_mut().insert(index, item, entry.clone());
        self.lifecycle.added(&entry, at);
        at
    }

    fn on_add(&self, item: Value, index: usize) {
        let at = self.insert(item, index);
        debug!(index = at, "reconcile add");
        self.restamp();
        self.check_aligned("add");
    }

    fn on_remove(&self, index: usize) {
        let Some(entry) = self.entry_at(index) else {
            #[cfg(debug_assertions)]
            debug!(index, "reconcile remove: no entry");
            return;
        };
        debug!(index, "reconcile remove");
        self.lifecycle.removing(&entry, index);
        self.lifecycle.destroy_entry(&entry, index);
        self.entries.borrow_mut().remove_at(index);
        self.restamp();
        self.check_aligned("remove");
    }

    fn on_move(&self, index: usize, old: usize) {
        self.reposition(index, old);
        self.restamp();
        self.check_aligned("move");
    }

    fn reposition(&self, index: usize, old: usize) -> bool {
        let moved = self.entries.borrow_mut().move_from(old, index);
        match moved {
            Some(entry) => {
                trace!(from = old, to = index, "reconcile move");
                self.lifecycle.reposition_entry(&entry, index, old);
                true
            }
            None => false,
        }
    }

    fn on_sort(&self) {
        let items = self.source.to_vec();
        let _span = debug_span!("reconcile.sort", len = items.len()).entered();
        let mut moves = 0usize;
        for (i, item) in items.iter().enumerate() {
            let found = self.entries.borrow().index_by_context_from(item, i);
            match found {
                Some(at) if at != i => {
                    if self.reposition(i, at) {
                        moves += 1;
                    }
                }
                Some(_) => {}
                None => warn!(index = i, "reconcile sort: no entry for source element"),
            }
        }
        debug!(moves, "reconcile sort");
        self.restamp();
        self.check_aligned("sort");
    }

    fn restamp(&self) {
        if !self.lifecycle.tracks_index() {
            return;
        }
        let entries = self.entries.borrow().entries();
        for (index, entry) in entries.iter().enumerate() {
            self.lifecycle.stamp_index(entry, index);
        }
    }

    fn check_aligned(&self, op: &str) {
        // Inside a nested source event the outer step is still pending.
        if self.source.emitter().dispatch_depth() > 1 {
            trace!(op, "alignment check deferred to outer event");
            return;
        }
        let entries = self.entries.borrow();
        let aligned = self.source.context().with(|items| {
            entries.len() == items.len()
                && (!cfg!(debug_assertions)
                    || items
                        .iter()
                        .enumerate()
                        .all(|(i, item)| entries.context_at(i).is_some_and(|c| c.same(item))))
        });
        debug_assert!(aligned, "derived entries diverged from source after {op}");
        if !aligned {
            warn!(op, entries = entries.len(), source = self.source.len(), "derived entries diverged from source");
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Live binding between a list wrapper and its derived entries.
pub struct Reconciler<L: EntryLifecycle> {
    state: Rc<State<L>>,
    owner: Emitter,
    handlers: Vec<(&'static str, Callback)>,
}

impl<L: EntryLifecycle> Reconciler<L> {
    /// Create entries for the current elements of `source` and follow its
    /// mutations through `owner`'s ledger.
    pub fn bind<O: Entity>(owner: &O, source: &ArrayModel, lifecycle: L) -> Result<Self> {
        let state = Rc::new(State {
            lifecycle,
            entries: RefCell::new(EntryList::new()),
            source: source.clone(),
        });
        for (index, item) in source.to_vec().into_iter().enumerate() {
            state.insert(item, index);
        }
        state.restamp();

        let mut reconciler = Self {
            state,
            owner: owner.emitter().clone(),
            handlers: Vec::new(),
        };
        let weak = Rc::downgrade(&reconciler.state);
        reconciler.follow(source, "add", &weak, |state, args| {
            if let Some(index) = args.get(1).and_then(Value::as_index) {
                state.on_add(args[0].clone(), index);
            }
        })?;
        reconciler.follow(source, "remove", &weak, |state, args| {
            if let Some(index) = args.get(1).and_then(Value::as_index) {
                state.on_remove(index);
            }
        })?;
        reconciler.follow(source, "move", &weak, |state, args| {
            let index = args.get(1).and_then(Value::as_index);
            let old = args.get(2).and_then(Value::as_index);
            if let (Some(index), Some(old)) = (index, old) {
                state.on_move(index, old);
            }
        })?;
        reconciler.follow(source, "sort", &weak, |state, _| state.on_sort())?;

        debug!(owner = %reconciler.owner.id(), source = %source.id(), len = source.len(), "reconciler bound");
        Ok(reconciler)
    }

    fn follow(
        &mut self,
        source: &ArrayModel,
        event: &'static str,
        state: &Weak<State<L>>,
        handle: fn(&State<L>, &[Value]),
    ) -> Result<()> {
        let state = Weak::clone(state);
        let callback = Callback::new(move |args| {
            if let Some(state) = state.upgrade() {
                handle(&state, args);
            }
        });
        listen_entity(&self.owner, source, event, callback.clone(), None, false)?;
        self.handlers.push((event, callback));
        Ok(())
    }

    fn detach(&mut self) {
        let target = self.state.source.target_key();
        for (event, callback) in self.handlers.drain(..) {
            self.owner.stop_listening_callback(target, event, &callback);
        }
    }

    /// Stop following the source. The entries are handed back as they are.
    pub fn unbind(mut self) -> EntryList<L::Entry> {
        self.detach();
        debug!(owner = %self.owner.id(), "reconciler unbound");
        self.state.entries.replace(EntryList::new())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.entries.borrow().is_empty()
    }

    /// Snapshot of the entries in order.
    #[must_use]
    pub fn entries(&self) -> Vec<L::Entry> {
        self.state.entries.borrow().entries()
    }

    /// Snapshot of the entry contexts in order.
    #[must_use]
    pub fn contexts(&self) -> Vec<Value> {
        self.state.entries.borrow().contexts()
    }

    #[must_use]
    pub fn entry_at(&self, index: usize) -> Option<L::Entry> {
        self.state.entry_at(index)
    }

    #[must_use]
    pub fn entry_of(&self, item: &Value) -> Option<L::Entry> {
        self.state.entries.borrow().entry_of(item).cloned()
    }

    #[must_use]
    pub fn index_of(&self, item: &Value) -> Option<usize> {
        self.state.entries.borrow().index_by_context(item)
    }

    #[must_use]
    pub fn lifecycle(&self) -> &L {
        &self.state.lifecycle
    }

    #[must_use]
    pub fn source(&self) -> &ArrayModel {
        &self.state.source
    }
}

impl<L: EntryLifecycle> Drop for Reconciler<L> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<L: EntryLifecycle> fmt::Debug for Reconciler<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("owner", &self.owner.id())
            .field("source", &self.state.source.id())
            .field("entries", &*self.state.entries.borrow())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
