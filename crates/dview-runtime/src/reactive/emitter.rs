#![forbid(unsafe_code)]

//! Per-entity event registry.
//!
//! An [`Emitter`] maps event names to ordered lists of subscription records.
//! It is the raw layer: names are taken literally. Sigil specs (`=x`,
//! `!flag`, ...) are resolved by [`Entity`](super::Entity) before they reach
//! the registry.
//!
//! # Invariants
//!
//! 1. Records of one event are kept in registration order; every record
//!    carries a sequence number strictly greater than those before it.
//! 2. `trigger` invokes only records that existed when it started. Records
//!    added during dispatch wait for the next trigger; records removed during
//!    dispatch are skipped.
//! 3. A `once` record is removed *before* its handler runs, so a nested
//!    trigger of the same event cannot run it twice.
//! 4. An event whose record list becomes empty is removed from the map.
//!
//! # Failure Modes
//!
//! - A panicking handler unwinds out of `trigger`; the remaining handlers of
//!   that dispatch do not run. No borrow is held across the call, so the
//!   registry stays usable.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use dview_core::Value;
use indexmap::IndexMap;
use tracing::{debug, trace};

use super::ledger::Ledger;

// ---------------------------------------------------------------------------
// Callback
// ---------------------------------------------------------------------------

/// Shared event handler. Identity (for `off` and `stop_listening`) is the
/// identity of the underlying `Rc`, so clones compare equal.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&[Value])>);

impl Callback {
    pub fn new(f: impl Fn(&[Value]) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke the handler.
    #[inline]
    pub fn call(&self, args: &[Value]) {
        (self.0)(args);
    }

    /// Whether both callbacks are clones of the same handler.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Rc::as_ptr(&self.0).cast::<()>())
    }
}

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

static ENTITY_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    fn next() -> Self {
        Self(ENTITY_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// One subscription record.
pub(crate) struct Listener {
    seq: u64,
    once: bool,
    /// Identity used by `off`.
    callback: Callback,
    /// What `trigger` invokes. Differs from `callback` for path, negated or
    /// ledger-wrapped subscriptions.
    handler: Callback,
}

type Events = IndexMap<String, Vec<Rc<Listener>>, ahash::RandomState>;

pub(crate) struct EmitterInner {
    id: EntityId,
    events: RefCell<Events>,
    next_seq: Cell<u64>,
    depth: Cell<usize>,
    pub(crate) ledger: RefCell<Ledger>,
}

/// Counts one level of [`Emitter::trigger`] nesting; unwinds on drop.
struct DepthGuard<'a>(&'a Cell<usize>);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Event registry plus listener ledger of a single entity.
///
/// Cloning shares the registry.
#[derive(Clone)]
pub struct Emitter(pub(crate) Rc<EmitterInner>);

impl Emitter {
    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(EmitterInner {
            id: EntityId::next(),
            events: RefCell::new(Events::default()),
            next_seq: Cell::new(0),
            depth: Cell::new(0),
            ledger: RefCell::new(Ledger::default()),
        }))
    }

    #[must_use]
    pub fn id(&self) -> EntityId {
        self.0.id
    }

    pub(crate) fn downgrade(&self) -> Weak<EmitterInner> {
        Rc::downgrade(&self.0)
    }

    /// Append a record under `event`.
    ///
    /// `callback` is the identity `remove_callback` matches against;
    /// `handler` is what `trigger` invokes.
    pub fn register(&self, event: &str, once: bool, callback: Callback, handler: Callback) {
        let seq = self.0.next_seq.get();
        self.0.next_seq.set(seq + 1);
        self.0
            .events
            .borrow_mut()
            .entry(event.to_owned())
            .or_default()
            .push(Rc::new(Listener {
                seq,
                once,
                callback,
                handler,
            }));
        debug!(entity = %self.0.id, event, once, "registered listener");
    }

    /// Drop every record of every event.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.0.events.borrow_mut());
        if !removed.is_empty() {
            debug!(entity = %self.0.id, events = removed.len(), "cleared registry");
        }
    }

    /// Drop every record registered under `event`.
    pub fn remove_event(&self, event: &str) {
        self.0.events.borrow_mut().shift_remove(event);
    }

    /// Drop the first record under `event` whose callback is `callback`.
    ///
    /// Returns whether a record was removed.
    pub fn remove_callback(&self, event: &str, callback: &Callback) -> bool {
        let mut events = self.0.events.borrow_mut();
        let Some(list) = events.get_mut(event) else {
            return false;
        };
        let Some(pos) = list.iter().position(|l| l.callback.ptr_eq(callback)) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            events.shift_remove(event);
        }
        true
    }

    /// Invoke every record registered under `event` with `args`.
    pub fn trigger(&self, event: &str, args: &[Value]) {
        let _depth = DepthGuard::enter(&self.0.depth);
        let ceiling = self.0.next_seq.get();
        let mut cursor: Option<u64> = None;
        let mut dispatched = 0usize;

        loop {
            let next = {
                let mut events = self.0.events.borrow_mut();
                let Some(list) = events.get_mut(event) else {
                    break;
                };
                let start = cursor.map_or(0, |c| list.partition_point(|l| l.seq <= c));
                match list.get(start) {
                    Some(listener) if listener.seq < ceiling => {
                        let listener = Rc::clone(listener);
                        if listener.once {
                            list.remove(start);
                        }
                        listener
                    }
                    _ => break,
                }
            };
            cursor = Some(next.seq);
            dispatched += 1;
            next.handler.call(args);
        }

        let mut events = self.0.events.borrow_mut();
        if events.get(event).is_some_and(Vec::is_empty) {
            events.shift_remove(event);
        }
        drop(events);

        if dispatched > 0 {
            trace!(entity = %self.0.id, event, dispatched, "triggered");
        } else {
            #[cfg(debug_assertions)]
            debug!(entity = %self.0.id, event, "trigger without listeners");
        }
    }

    /// Number of [`Emitter::trigger`] calls currently running on this
    /// registry, counting nested ones.
    #[must_use]
    pub(crate) fn dispatch_depth(&self) -> usize {
        self.0.depth.get()
    }

    /// Whether any record is registered under `event`.
    #[must_use]
    pub fn has_listeners(&self, event: &str) -> bool {
        self.0.events.borrow().contains_key(event)
    }

    /// Number of records under `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.0.events.borrow().get(event).map_or(0, Vec::len)
    }

    /// Registered event names in first-registration order.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        self.0.events.borrow().keys().cloned().collect()
    }

    /// Whether the registry holds no records at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.events.borrow().is_empty()
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("id", &self.0.id)
            .field("events", &self.event_names())
            .field("listening", &self.listening_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<Cell<u32>>, Callback) {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        (count, Callback::new(move |_| c.set(c.get() + 1)))
    }

    fn register(emitter: &Emitter, event: &str, once: bool, callback: &Callback) {
        emitter.register(event, once, callback.clone(), callback.clone());
    }

    #[test]
    fn dispatch_depth_counts_nested_triggers() {
        let emitter = Emitter::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let inner = emitter.clone();
        let log = Rc::clone(&seen);
        register(
            &emitter,
            "outer",
            false,
            &Callback::new(move |_| {
                log.borrow_mut().push(inner.dispatch_depth());
                inner.trigger("inner", &[]);
            }),
        );
        let nested = emitter.clone();
        let log = Rc::clone(&seen);
        register(
            &emitter,
            "inner",
            false,
            &Callback::new(move |_| log.borrow_mut().push(nested.dispatch_depth())),
        );

        assert_eq!(emitter.dispatch_depth(), 0);
        emitter.trigger("outer", &[]);
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(emitter.dispatch_depth(), 0);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(Emitter::new().id(), Emitter::new().id());
    }

    #[test]
    fn trigger_invokes_in_registration_order() {
        let emitter = Emitter::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let log = Rc::clone(&log);
            register(
                &emitter,
                "ping",
                false,
                &Callback::new(move |_| log.borrow_mut().push(tag)),
            );
        }
        emitter.trigger("ping", &[]);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn trigger_passes_args() {
        let emitter = Emitter::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        register(
            &emitter,
            "set/x",
            false,
            &Callback::new(move |args| s.borrow_mut().extend_from_slice(args)),
        );
        emitter.trigger("set/x", &[Value::from(2), Value::from(1)]);
        assert_eq!(*seen.borrow(), vec![Value::from(2), Value::from(1)]);
    }

    #[test]
    fn once_fires_exactly_once() {
        let emitter = Emitter::new();
        let (count, cb) = counter();
        register(&emitter, "e", true, &cb);
        emitter.trigger("e", &[]);
        emitter.trigger("e", &[]);
        assert_eq!(count.get(), 1);
        assert!(!emitter.has_listeners("e"), "empty list is deleted");
    }

    #[test]
    fn once_survives_nested_trigger() {
        let emitter = Emitter::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let inner = emitter.clone();
        register(
            &emitter,
            "e",
            true,
            &Callback::new(move |_| {
                c.set(c.get() + 1);
                inner.trigger("e", &[]);
            }),
        );
        emitter.trigger("e", &[]);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn records_added_during_dispatch_wait() {
        let emitter = Emitter::new();
        let (late_count, late) = counter();
        let inner = emitter.clone();
        register(
            &emitter,
            "e",
            false,
            &Callback::new(move |_| register(&inner, "e", false, &late)),
        );
        emitter.trigger("e", &[]);
        assert_eq!(late_count.get(), 0);
        emitter.trigger("e", &[]);
        assert_eq!(late_count.get(), 1);
    }

    #[test]
    fn records_removed_during_dispatch_are_skipped() {
        let emitter = Emitter::new();
        let (second_count, second) = counter();
        let inner = emitter.clone();
        let victim = second.clone();
        register(
            &emitter,
            "e",
            false,
            &Callback::new(move |_| {
                inner.remove_callback("e", &victim);
            }),
        );
        register(&emitter, "e", false, &second);
        emitter.trigger("e", &[]);
        assert_eq!(second_count.get(), 0);
    }

    #[test]
    fn remove_callback_removes_first_match_only() {
        let emitter = Emitter::new();
        let (count, cb) = counter();
        register(&emitter, "e", false, &cb);
        register(&emitter, "e", false, &cb);
        assert!(emitter.remove_callback("e", &cb));
        emitter.trigger("e", &[]);
        assert_eq!(count.get(), 1);
        assert!(emitter.remove_callback("e", &cb));
        assert!(!emitter.has_listeners("e"));
        assert!(!emitter.remove_callback("e", &cb));
    }

    #[test]
    fn clear_empties_registry() {
        let emitter = Emitter::new();
        let (_, cb) = counter();
        register(&emitter, "a", false, &cb);
        register(&emitter, "b", false, &cb);
        emitter.clear();
        assert!(emitter.is_empty());
    }

    #[test]
    fn unknown_event_is_noop() {
        let emitter = Emitter::new();
        emitter.trigger("nothing", &[Value::Null]);
        assert!(emitter.is_empty());
    }

    #[test]
    fn event_names_keep_registration_order() {
        let emitter = Emitter::new();
        let (_, cb) = counter();
        for name in ["z", "a", "m"] {
            register(&emitter, name, false, &cb);
        }
        assert_eq!(emitter.event_names(), vec!["z", "a", "m"]);
    }
}
