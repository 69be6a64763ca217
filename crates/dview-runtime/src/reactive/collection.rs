#![forbid(unsafe_code)]

//! Ordered-collection operations on [`ArrayModel`].
//!
//! Every mutation emits its specific event followed by a generic `change`
//! event whose first argument is the operation name:
//!
//! | Operation | Event | Arguments |
//! |-----------|-------|-----------|
//! | insertion | `add` | `(item, index)` |
//! | removal | `remove` | `(item, index)` |
//! | move | `move` | `(item, new_index, old_index)` |
//! | sort | `sort` | `()` |
//!
//! Indices in events are always resolved, non-negative positions.
//!
//! # Invariants
//!
//! 1. One event pair per element touched; batch operations emit in the order
//!    the list is changed.
//! 2. The list is already in its new state when handlers run.
//! 3. A removed element's cached wrapper is cleared before `remove` fires.
//!
//! # Failure Modes
//!
//! - Comparators passed to [`ArrayModel::sort_by`] must not read the list
//!   being sorted; doing so panics on the `RefCell` borrow.

use std::cmp::Ordering;

use dview_core::{Key, Value, index};
#[cfg(debug_assertions)]
use tracing::debug;

use super::entity::Entity;
use super::model::{ArrayModel, Model};

/// `(key, value)` pairs a record element must match by identity.
pub type Criteria<'a> = [(&'a str, Value)];

fn matches(item: &Value, criteria: &Criteria<'_>) -> bool {
    if criteria.is_empty() {
        return true;
    }
    item.as_record().is_some_and(|record| {
        criteria
            .iter()
            .all(|(key, value)| record.get(key).is_some_and(|v| v.same(value)))
    })
}

impl ArrayModel {
    // ---- reads ----

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.context.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.context.is_empty()
    }

    /// Element at `index`; negative positions count from the end.
    #[must_use]
    pub fn at(&self, index: isize) -> Option<Value> {
        index::resolve(index, self.len()).and_then(|i| self.0.context.get(i))
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.context.to_vec()
    }

    #[must_use]
    pub fn index_of(&self, item: &Value) -> Option<usize> {
        self.0.context.index_of(item)
    }

    #[must_use]
    pub fn contains(&self, item: &Value) -> bool {
        self.0.context.contains(item)
    }

    // ---- queries ----

    /// Elements matching every criterion. Empty criteria match everything.
    #[must_use]
    pub fn filter_where(&self, criteria: &Criteria<'_>) -> Vec<Value> {
        self.0
            .context
            .with(|items| items.iter().filter(|item| matches(item, criteria)).cloned().collect())
    }

    /// First element matching every criterion.
    #[must_use]
    pub fn find_where(&self, criteria: &Criteria<'_>) -> Option<Value> {
        self.0
            .context
            .with(|items| items.iter().find(|item| matches(item, criteria)).cloned())
    }

    /// Position of the first element matching every criterion.
    #[must_use]
    pub fn index_where(&self, criteria: &Criteria<'_>) -> Option<usize> {
        self.0
            .context
            .with(|items| items.iter().position(|item| matches(item, criteria)))
    }

    /// Wrapper for an element of this list. Requires an owning view.
    #[must_use]
    pub fn model_of(&self, item: &Value) -> Option<Model> {
        let index = self.index_of(item)?;
        self.child_model(&Key::Index(index)).ok().flatten()
    }

    /// Wrapper for the first element matching `criteria`.
    #[must_use]
    pub fn model_where(&self, criteria: &Criteria<'_>) -> Option<Model> {
        let item = self.find_where(criteria)?;
        self.model_of(&item)
    }

    // ---- insertion ----

    /// Insert `item` at `index` (default: end). Out-of-range positions clamp
    /// to the end; negative ones count from the end.
    pub fn add(&self, item: impl Into<Value>, index: Option<isize>) -> &Self {
        self.add_all([item.into()], index)
    }

    /// Append `item`.
    pub fn push(&self, item: impl Into<Value>) -> &Self {
        self.add_all([item.into()], None)
    }

    /// Insert `items` consecutively starting at `index`.
    pub fn add_all(&self, items: impl IntoIterator<Item = Value>, index: Option<isize>) -> &Self {
        let mut at = index::insertion(index, self.len());
        for item in items {
            self.0.context.insert(at, item.clone());
            self.emit("add", &[item, Value::from(at)]);
            at += 1;
        }
        self
    }

    // ---- removal ----

    /// Remove the first occurrence of `item`. Returns whether it was found.
    pub fn remove(&self, item: &Value) -> bool {
        match self.index_of(item) {
            Some(index) => self.remove_index(index).is_some(),
            None => {
                #[cfg(debug_assertions)]
                debug!(entity = %self.id(), "remove: item not found");
                false
            }
        }
    }

    /// Remove the first occurrence of each of `items`.
    pub fn remove_all_of(&self, items: &[Value]) -> &Self {
        for item in items {
            self.remove(item);
        }
        self
    }

    /// Remove the element at `index`.
    pub fn remove_at(&self, index: isize) -> Option<Value> {
        let resolved = index::resolve(index, self.len());
        #[cfg(debug_assertions)]
        if resolved.is_none() {
            debug!(entity = %self.id(), index, len = self.len(), "remove_at: invalid index");
        }
        self.remove_index(resolved?)
    }

    /// Remove several positions, all resolved against the current length.
    pub fn remove_at_many(&self, indices: &[isize]) -> &Self {
        for index in index::removal_order(indices, self.len()) {
            self.remove_index(index);
        }
        self
    }

    /// Remove every element, last first.
    pub fn remove_all(&self) -> &Self {
        while let Some(last) = self.len().checked_sub(1) {
            self.remove_index(last);
        }
        self
    }

    fn remove_index(&self, index: usize) -> Option<Value> {
        let item = self.0.context.get(index)?;
        self.invalidate_value(&item);
        self.0.context.remove(index);
        self.emit("remove", &[item.clone(), Value::from(index)]);
        Some(item)
    }

    // ---- replacement ----

    /// Replace the first occurrence of `old` with `new`, in place.
    pub fn replace(&self, old: &Value, new: impl Into<Value>) -> &Self {
        if let Some(index) = self.index_of(old) {
            self.replace_index(index, new.into());
        }
        self
    }

    /// Replace the element at `index` with `new`.
    pub fn replace_at(&self, index: isize, new: impl Into<Value>) -> &Self {
        if let Some(index) = index::resolve(index, self.len()) {
            self.replace_index(index, new.into());
        }
        self
    }

    fn replace_index(&self, index: usize, new: Value) {
        if self.remove_index(index).is_some() {
            self.add_all([new], Some(index as isize));
        }
    }

    // ---- ordering ----

    /// Move the first occurrence of `item` to `index`.
    pub fn move_item(&self, item: &Value, index: isize) -> &Self {
        match self.index_of(item) {
            Some(old) => self.move_from(old as isize, index),
            None => self,
        }
    }

    /// Move the element at `old` to `new`.
    pub fn move_from(&self, old: isize, new: isize) -> &Self {
        let Some((from, to)) = index::movement(old, new, self.len()) else {
            #[cfg(debug_assertions)]
            debug!(entity = %self.id(), old, new, len = self.len(), "move: no-op");
            return self;
        };
        let Some(item) = self.0.context.remove(from) else {
            return self;
        };
        self.0.context.insert(to, item.clone());
        self.emit("move", &[item, Value::from(to), Value::from(from)]);
        self
    }

    /// Stable in-place sort.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) -> &Self {
        self.0.context.sort_by(compare);
        self.emit("sort", &[]);
        self
    }

    /// Replace the contents: `remove_all` then `add_all`.
    pub fn reset(&self, items: impl IntoIterator<Item = Value>) -> &Self {
        self.remove_all();
        self.add_all(items, None)
    }

    /// Assign the slot at `index`, emitting `set/<index>` and `set`.
    pub fn set_at(&self, index: usize, value: impl Into<Value>) -> &Self {
        let value = value.into();
        let Some(old) = self.0.context.get(index) else {
            #[cfg(debug_assertions)]
            debug!(entity = %self.id(), index, len = self.len(), "set: index out of range");
            return self;
        };
        if old.same(&value) {
            return self;
        }
        self.invalidate_value(&old);
        self.0.context.set(index, value.clone());

        let key = Key::Index(index);
        self.0
            .emitter
            .trigger(&key.set_event(), &[value.clone(), old.clone()]);
        self.0
            .emitter
            .trigger("set", &[Value::from(index), value, old]);
        self
    }

    fn emit(&self, op: &str, args: &[Value]) {
        self.0.emitter.trigger(op, args);

        let mut change = Vec::with_capacity(args.len() + 1);
        change.push(Value::from(op));
        change.extend_from_slice(args);
        self.0.emitter.trigger("change", &change);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
