#![forbid(unsafe_code)]

//! Reference fixtures for dview tests.
//!
//! - [`CallLog`]: records every delivery to a [`Callback`].
//! - [`RecordingLifecycle`]: an [`EntryLifecycle`] that logs every step and
//!   tracks entry liveness and stamped positions.
//! - [`ListOp`]: the ordered-collection operations as data, applicable to a
//!   live [`ArrayModel`] and to a plain `Vec<f64>` reference model, plus
//!   proptest strategies generating them.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;

use dview_core::{List, Record, Value, index};
use dview_runtime::{ArrayModel, Callback, EntryLifecycle, View};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Root view over a JSON object literal.
///
/// # Panics
///
/// Panics if `json` is not an object.
#[must_use]
pub fn view_from_json(json: serde_json::Value) -> View {
    match Value::from(json) {
        Value::Record(record) => View::new(record),
        other => panic!("view data must be an object, got {other:?}"),
    }
}

/// Standalone list wrapper over numbers.
#[must_use]
pub fn number_list(items: &[i32]) -> ArrayModel {
    ArrayModel::new(items.iter().copied().collect::<List>())
}

/// Numbers held by `model`, skipping anything else.
#[must_use]
pub fn numbers(model: &ArrayModel) -> Vec<f64> {
    model.to_vec().iter().filter_map(Value::as_f64).collect()
}

/// Record with a single `id` field, for identity-sensitive tests.
#[must_use]
pub fn tagged(id: i32) -> Value {
    Value::Record(Record::from_iter([("id", id)]))
}

// ---------------------------------------------------------------------------
// CallLog
// ---------------------------------------------------------------------------

/// Shared log of the argument lists a callback received.
#[derive(Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<Vec<Value>>>>);

impl CallLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A new callback appending to this log. Each call returns a distinct
    /// callback identity.
    #[must_use]
    pub fn callback(&self) -> Callback {
        let sink = Rc::clone(&self.0);
        Callback::new(move |args| sink.borrow_mut().push(args.to_vec()))
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Vec<Value>> {
        self.0.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// First argument of every call (`Null` for empty calls).
    #[must_use]
    pub fn firsts(&self) -> Vec<Value> {
        self.0
            .borrow()
            .iter()
            .map(|args| args.first().cloned().unwrap_or_default())
            .collect()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

// ---------------------------------------------------------------------------
// RecordingLifecycle
// ---------------------------------------------------------------------------

/// One derived entry created by [`RecordingLifecycle`].
#[derive(Debug)]
pub struct RecordedEntry {
    pub id: usize,
    pub context: Value,
    pub index: Cell<usize>,
    pub alive: Cell<bool>,
}

pub type EntryRef = Rc<RecordedEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Created { id: usize, index: usize },
    Added { id: usize, index: usize },
    Removing { id: usize, index: usize },
    Destroyed { id: usize, index: usize },
    Repositioned { id: usize, from: usize, to: usize },
}

#[derive(Default)]
pub struct RecordingLifecycle {
    events: RefCell<Vec<LifecycleEvent>>,
    next_id: Cell<usize>,
    track_index: bool,
}

impl RecordingLifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lifecycle that asks for index stamping.
    #[must_use]
    pub fn tracking_index() -> Self {
        Self {
            track_index: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.borrow().clone()
    }

    pub fn take_events(&self) -> Vec<LifecycleEvent> {
        self.events.take()
    }

    /// Number of repositionings recorded.
    #[must_use]
    pub fn moves(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, LifecycleEvent::Repositioned { .. }))
            .count()
    }

    fn log(&self, event: LifecycleEvent) {
        tracing::trace!(?event, "lifecycle");
        self.events.borrow_mut().push(event);
    }
}

impl EntryLifecycle for RecordingLifecycle {
    type Entry = EntryRef;

    fn create_entry(&self, item: &Value, index: usize) -> EntryRef {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.log(LifecycleEvent::Created { id, index });
        Rc::new(RecordedEntry {
            id,
            context: item.clone(),
            index: Cell::new(index),
            alive: Cell::new(true),
        })
    }

    fn destroy_entry(&self, entry: &EntryRef, index: usize) {
        entry.alive.set(false);
        self.log(LifecycleEvent::Destroyed { id: entry.id, index });
    }

    fn reposition_entry(&self, entry: &EntryRef, index: usize, old: usize) {
        self.log(LifecycleEvent::Repositioned {
            id: entry.id,
            from: old,
            to: index,
        });
    }

    fn added(&self, entry: &EntryRef, index: usize) {
        self.log(LifecycleEvent::Added { id: entry.id, index });
    }

    fn removing(&self, entry: &EntryRef, index: usize) {
        self.log(LifecycleEvent::Removing { id: entry.id, index });
    }

    fn tracks_index(&self) -> bool {
        self.track_index
    }

    fn stamp_index(&self, entry: &EntryRef, index: usize) {
        entry.index.set(index);
    }
}

// ---------------------------------------------------------------------------
// ListOp
// ---------------------------------------------------------------------------

/// An ordered-collection operation over numeric lists.
#[derive(Debug, Clone, PartialEq)]
pub enum ListOp {
    Add { value: i32, index: Option<isize> },
    AddAll { values: Vec<i32>, index: Option<isize> },
    Remove(i32),
    RemoveAt(isize),
    RemoveAtMany(Vec<isize>),
    RemoveAll,
    Replace { old: i32, new: i32 },
    ReplaceAt { index: isize, value: i32 },
    MoveFrom { old: isize, new: isize },
    MoveItem { value: i32, index: isize },
    Sort { descending: bool },
    Reset(Vec<i32>),
    SetAt { index: usize, value: i32 },
}

fn num(v: i32) -> Value {
    Value::from(f64::from(v))
}

fn by_number(descending: bool) -> impl Fn(&Value, &Value) -> Ordering {
    move |a, b| {
        let ord = a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal);
        if descending { ord.reverse() } else { ord }
    }
}

fn position(items: &[f64], value: i32) -> Option<usize> {
    items.iter().position(|&x| x == f64::from(value))
}

impl ListOp {
    /// Apply to a live list wrapper.
    pub fn apply(&self, model: &ArrayModel) {
        match self {
            Self::Add { value, index } => {
                model.add(num(*value), *index);
            }
            Self::AddAll { values, index } => {
                model.add_all(values.iter().copied().map(num), *index);
            }
            Self::Remove(value) => {
                model.remove(&num(*value));
            }
            Self::RemoveAt(index) => {
                model.remove_at(*index);
            }
            Self::RemoveAtMany(indices) => {
                model.remove_at_many(indices);
            }
            Self::RemoveAll => {
                model.remove_all();
            }
            Self::Replace { old, new } => {
                model.replace(&num(*old), num(*new));
            }
            Self::ReplaceAt { index, value } => {
                model.replace_at(*index, num(*value));
            }
            Self::MoveFrom { old, new } => {
                model.move_from(*old, *new);
            }
            Self::MoveItem { value, index } => {
                model.move_item(&num(*value), *index);
            }
            Self::Sort { descending } => {
                model.sort_by(by_number(*descending));
            }
            Self::Reset(values) => {
                model.reset(values.iter().copied().map(num));
            }
            Self::SetAt { index, value } => {
                model.set_at(*index, num(*value));
            }
        }
    }

    /// Apply to a plain vector with the documented semantics.
    pub fn apply_reference(&self, items: &mut Vec<f64>) {
        let len = items.len();
        match self {
            Self::Add { value, index } => {
                items.insert(index::insertion(*index, len), f64::from(*value));
            }
            Self::AddAll { values, index } => {
                let at = index::insertion(*index, len);
                for (offset, value) in values.iter().enumerate() {
                    items.insert(at + offset, f64::from(*value));
                }
            }
            Self::Remove(value) => {
                if let Some(i) = position(items, *value) {
                    items.remove(i);
                }
            }
            Self::RemoveAt(index) => {
                if let Some(i) = index::resolve(*index, len) {
                    items.remove(i);
                }
            }
            Self::RemoveAtMany(indices) => {
                for i in index::removal_order(indices, len) {
                    items.remove(i);
                }
            }
            Self::RemoveAll => items.clear(),
            Self::Replace { old, new } => {
                if let Some(i) = position(items, *old) {
                    items[i] = f64::from(*new);
                }
            }
            Self::ReplaceAt { index, value } => {
                if let Some(i) = index::resolve(*index, len) {
                    items[i] = f64::from(*value);
                }
            }
            Self::MoveFrom { old, new } => {
                if let Some((from, to)) = index::movement(*old, *new, len) {
                    let item = items.remove(from);
                    items.insert(to, item);
                }
            }
            Self::MoveItem { value, index } => {
                let moved = position(items, *value)
                    .and_then(|from| index::movement(from as isize, *index, len));
                if let Some((from, to)) = moved {
                    let item = items.remove(from);
                    items.insert(to, item);
                }
            }
            Self::Sort { descending } => {
                items.sort_by(|a, b| {
                    let ord = a.partial_cmp(b).unwrap_or(Ordering::Equal);
                    if *descending { ord.reverse() } else { ord }
                });
            }
            Self::Reset(values) => {
                *items = values.iter().copied().map(f64::from).collect();
            }
            Self::SetAt { index, value } => {
                if let Some(slot) = items.get_mut(*index) {
                    *slot = f64::from(*value);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Small values so that removals by value and duplicates actually occur.
pub fn arb_value() -> impl Strategy<Value = i32> {
    0i32..16
}

pub fn arb_index() -> impl Strategy<Value = isize> {
    -12isize..12
}

pub fn arb_items(max: usize) -> impl Strategy<Value = Vec<i32>> {
    proptest::collection::vec(arb_value(), 0..=max)
}

pub fn arb_list_op() -> impl Strategy<Value = ListOp> {
    prop_oneof![
        4 => (arb_value(), proptest::option::of(arb_index()))
            .prop_map(|(value, index)| ListOp::Add { value, index }),
        1 => (arb_items(4), proptest::option::of(arb_index()))
            .prop_map(|(values, index)| ListOp::AddAll { values, index }),
        2 => arb_value().prop_map(ListOp::Remove),
        2 => arb_index().prop_map(ListOp::RemoveAt),
        1 => proptest::collection::vec(arb_index(), 0..5).prop_map(ListOp::RemoveAtMany),
        1 => Just(ListOp::RemoveAll),
        1 => (arb_value(), arb_value()).prop_map(|(old, new)| ListOp::Replace { old, new }),
        1 => (arb_index(), arb_value()).prop_map(|(index, value)| ListOp::ReplaceAt { index, value }),
        2 => (arb_index(), arb_index()).prop_map(|(old, new)| ListOp::MoveFrom { old, new }),
        1 => (arb_value(), arb_index()).prop_map(|(value, index)| ListOp::MoveItem { value, index }),
        1 => any::<bool>().prop_map(|descending| ListOp::Sort { descending }),
        1 => arb_items(6).prop_map(ListOp::Reset),
        1 => (0usize..10, arb_value()).prop_map(|(index, value)| ListOp::SetAt { index, value }),
    ]
}

pub fn arb_list_ops(max: usize) -> impl Strategy<Value = Vec<ListOp>> {
    proptest::collection::vec(arb_list_op(), 0..=max)
}

/// Operations that change the list's shape or order. Slot assignment is left
/// out: it replaces an element without an `add`/`remove` pair, so derived
/// entries keep the old context.
pub fn arb_structural_op() -> impl Strategy<Value = ListOp> {
    arb_list_op().prop_filter("slot assignment", |op| !matches!(op, ListOp::SetAt { .. }))
}

pub fn arb_structural_ops(max: usize) -> impl Strategy<Value = Vec<ListOp>> {
    proptest::collection::vec(arb_structural_op(), 0..=max)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
