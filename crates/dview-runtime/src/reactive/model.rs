#![forbid(unsafe_code)]

//! Observable wrappers around nested records and lists.
//!
//! A wrapper presents exactly one context value. Wrappers created through a
//! [`View`] are *scoped*: they remember the view (weakly) and their path
//! from it, resolve their own child models through the view's cache, and
//! invalidate cached wrappers of values they overwrite. Standalone wrappers
//! ([`ObjectModel::new`], [`ArrayModel::new`]) emit the same events but
//! cannot resolve child models.
//!
//! # Invariants
//!
//! 1. A wrapper never changes its context.
//! 2. After [`Model::invalidate`] the wrapper is detached: it is no longer in
//!    its view's cache, the view no longer listens to it, it no longer
//!    listens to anything, and the same holds recursively for the cached
//!    wrappers of its children.
//! 3. Invalidation happens before the events of the write that caused it.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use dview_core::{BindError, Key, List, PropPath, Record, Result, Value};
use tracing::debug;

use super::emitter::Emitter;
use super::entity::{AssignMode, Entity};
use super::view::{View, ViewInner};

pub(crate) struct Scope {
    view: Weak<ViewInner>,
    path: PropPath,
}

pub(crate) struct ModelInner<C> {
    pub(crate) emitter: Emitter,
    pub(crate) context: C,
    scope: RefCell<Option<Scope>>,
}

impl<C> ModelInner<C> {
    fn new(context: C, scope: Option<Scope>) -> Rc<Self> {
        Rc::new(Self {
            emitter: Emitter::new(),
            context,
            scope: RefCell::new(scope),
        })
    }

    pub(crate) fn view(&self) -> Option<View> {
        self.scope
            .borrow()
            .as_ref()
            .and_then(|scope| scope.view.upgrade())
            .map(View)
    }

    fn path(&self) -> Option<PropPath> {
        self.scope.borrow().as_ref().map(|scope| scope.path.clone())
    }

    /// Owning view and path, or `Detached`.
    fn scoped(&self) -> Result<(View, PropPath)> {
        let scope = self.scope.borrow();
        let scope = scope.as_ref().ok_or(BindError::Detached)?;
        let view = scope.view.upgrade().ok_or(BindError::Detached)?;
        Ok((View(view), scope.path.clone()))
    }

    fn take_scope(&self) -> Option<Scope> {
        self.scope.borrow_mut().take()
    }
}

/// Write `value` into `record[key]` with invalidation and `set` events.
pub(crate) fn write_slot(
    emitter: &Emitter,
    record: &Record,
    key: &Key,
    value: Value,
    view: Option<&View>,
) {
    let name = key.to_string();
    let old = record.get(&name).unwrap_or_default();
    if old.same(&value) {
        return;
    }
    if let Some(view) = view {
        view.invalidate_value(&old);
    }
    record.insert(name.clone(), value.clone());

    emitter.trigger(&key.set_event(), &[value.clone(), old.clone()]);
    emitter.trigger("set", &[Value::from(name), value, old]);
}

// ---------------------------------------------------------------------------
// ObjectModel
// ---------------------------------------------------------------------------

/// Wrapper around a [`Record`].
#[derive(Clone)]
pub struct ObjectModel(pub(crate) Rc<ModelInner<Record>>);

impl ObjectModel {
    /// Standalone wrapper with no owning view.
    #[must_use]
    pub fn new(record: Record) -> Self {
        Self(ModelInner::new(record, None))
    }

    pub(crate) fn scoped(record: Record, view: &View, path: PropPath) -> Self {
        Self(ModelInner::new(
            record,
            Some(Scope {
                view: view.downgrade(),
                path,
            }),
        ))
    }

    /// The wrapped record.
    #[must_use]
    pub fn context(&self) -> Record {
        self.0.context.clone()
    }

    /// Path from the owning view, while attached.
    #[must_use]
    pub fn path(&self) -> Option<PropPath> {
        self.0.path()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.0.scope.borrow().is_some()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Detach from the owning view. See [`Model::invalidate`].
    pub fn invalidate(&self) {
        Model::Object(self.clone()).invalidate();
    }
}

impl Entity for ObjectModel {
    fn emitter(&self) -> &Emitter {
        &self.0.emitter
    }

    fn source(&self) -> Value {
        Value::Record(self.0.context.clone())
    }

    fn child_model(&self, key: &Key) -> Result<Option<Model>> {
        let (view, path) = self.0.scoped()?;
        let raw = self.source().get_key(key);
        Ok(view.model_for(&raw, path.child(key.clone())))
    }

    fn set_key(&self, key: &Key, value: Value) {
        let view = self.0.view();
        write_slot(&self.0.emitter, &self.0.context, key, value, view.as_ref());
    }
}

impl fmt::Debug for ObjectModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectModel")
            .field("id", &self.0.emitter.id())
            .field("path", &self.path())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ArrayModel
// ---------------------------------------------------------------------------

/// Wrapper around a [`List`]. The ordered-collection operations live in
/// [`collection`](super::collection).
#[derive(Clone)]
pub struct ArrayModel(pub(crate) Rc<ModelInner<List>>);

impl ArrayModel {
    /// Standalone wrapper with no owning view.
    #[must_use]
    pub fn new(list: List) -> Self {
        Self(ModelInner::new(list, None))
    }

    pub(crate) fn scoped(list: List, view: &View, path: PropPath) -> Self {
        Self(ModelInner::new(
            list,
            Some(Scope {
                view: view.downgrade(),
                path,
            }),
        ))
    }

    /// The wrapped list.
    #[must_use]
    pub fn context(&self) -> List {
        self.0.context.clone()
    }

    #[must_use]
    pub fn path(&self) -> Option<PropPath> {
        self.0.path()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.0.scope.borrow().is_some()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<ModelInner<List>> {
        Rc::downgrade(&self.0)
    }

    /// Detach from the owning view. See [`Model::invalidate`].
    pub fn invalidate(&self) {
        Model::Array(self.clone()).invalidate();
    }

    /// Clear the cached wrapper of a value that left the list.
    pub(crate) fn invalidate_value(&self, old: &Value) {
        if let Some(view) = self.0.view() {
            view.invalidate_value(old);
        }
    }
}

impl Entity for ArrayModel {
    fn emitter(&self) -> &Emitter {
        &self.0.emitter
    }

    fn source(&self) -> Value {
        Value::List(self.0.context.clone())
    }

    fn child_model(&self, key: &Key) -> Result<Option<Model>> {
        let (view, path) = self.0.scoped()?;
        let raw = self.source().get_key(key);
        Ok(view.model_for(&raw, path.child(key.clone())))
    }

    fn set_key(&self, key: &Key, value: Value) {
        match key {
            Key::Index(index) => {
                self.set_at(*index, value);
            }
            Key::Name(name) => {
                debug!(entity = %self.0.emitter.id(), name, "named slot on a list ignored");
            }
        }
    }
}

impl fmt::Debug for ArrayModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayModel")
            .field("id", &self.0.emitter.id())
            .field("path", &self.path())
            .field("len", &self.0.context.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Either kind of wrapper.
#[derive(Clone, Debug)]
pub enum Model {
    Object(ObjectModel),
    Array(ArrayModel),
}

impl Model {
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectModel> {
        match self {
            Self::Object(model) => Some(model),
            Self::Array(_) => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayModel> {
        match self {
            Self::Array(model) => Some(model),
            Self::Object(_) => None,
        }
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<PropPath> {
        match self {
            Self::Object(model) => model.path(),
            Self::Array(model) => model.path(),
        }
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        match self {
            Self::Object(model) => model.is_attached(),
            Self::Array(model) => model.is_attached(),
        }
    }

    /// Replace this wrapper's contents with `value`.
    ///
    /// Record wrappers deep-merge a record; list wrappers `reset` to the
    /// items of a list. Any other combination is `NotAModel`.
    pub fn assign(&self, value: &Value, mode: AssignMode) -> Result<()> {
        match (self, value) {
            (Self::Object(model), Value::Record(props)) => {
                model.assign(props, mode)?;
                Ok(())
            }
            (Self::Array(model), Value::List(items)) => {
                model.reset(items.to_vec());
                Ok(())
            }
            _ => Err(BindError::not_a_model(
                self.path().map(|p| p.to_string()).unwrap_or_default(),
            )),
        }
    }

    /// Detach this wrapper from its view.
    ///
    /// The view stops listening to it, it stops listening to everything, it
    /// is removed from the view's cache, and the cached wrappers of its
    /// children are invalidated recursively. No-op on detached wrappers.
    pub fn invalidate(&self) {
        let (scope, children) = match self {
            Self::Object(model) => (model.0.take_scope(), model.0.context.values()),
            Self::Array(model) => (model.0.take_scope(), model.0.context.to_vec()),
        };
        let Some(scope) = scope else {
            return;
        };
        debug!(entity = %self.id(), path = %scope.path, "invalidating wrapper");

        self.stop_listening_all();
        let Some(view) = scope.view.upgrade().map(View) else {
            return;
        };
        view.stop_listening(self.target_key());
        view.evict(self);

        for child in children.iter().filter(|v| v.is_object()) {
            if let Some(model) = view.model_of(child) {
                model.invalidate();
            }
        }
    }
}

impl Entity for Model {
    fn emitter(&self) -> &Emitter {
        match self {
            Self::Object(model) => model.emitter(),
            Self::Array(model) => model.emitter(),
        }
    }

    fn source(&self) -> Value {
        match self {
            Self::Object(model) => model.source(),
            Self::Array(model) => model.source(),
        }
    }

    fn child_model(&self, key: &Key) -> Result<Option<Model>> {
        match self {
            Self::Object(model) => model.child_model(key),
            Self::Array(model) => model.child_model(key),
        }
    }

    fn set_key(&self, key: &Key, value: Value) {
        match self {
            Self::Object(model) => model.set_key(key, value),
            Self::Array(model) => model.set_key(key, value),
        }
    }
}

impl From<ObjectModel> for Model {
    fn from(model: ObjectModel) -> Self {
        Self::Object(model)
    }
}

impl From<ArrayModel> for Model {
    fn from(model: ArrayModel) -> Self {
        Self::Array(model)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::emitter::Callback;
    use serde_json::json;
    use std::cell::Cell;
    use tracing_test::traced_test;

    fn view(json: serde_json::Value) -> View {
        View::new(Value::from(json).as_record().cloned().expect("object literal"))
    }

    #[test]
    #[traced_test]
    fn named_key_on_list_is_ignored() {
        let model = ArrayModel::new(List::from_iter([1, 2]));
        let fired = Rc::new(Cell::new(0));
        let f = Rc::clone(&fired);
        model
            .on("set change", Callback::new(move |_| f.set(f.get() + 1)))
            .expect("on");

        model.set_key(&Key::from("title"), Value::from("x"));
        assert_eq!(model.len(), 2);
        assert_eq!(fired.get(), 0);
        assert!(logs_contain("named slot on a list ignored"));
    }

    #[test]
    fn standalone_object_emits_set_events() {
        let model = ObjectModel::new(Record::from_iter([("x", 1)]));
        let fired = Rc::new(Cell::new(0));
        let f = Rc::clone(&fired);
        model
            .on("set/x set", Callback::new(move |_| f.set(f.get() + 1)))
            .expect("subscribe");

        model.set("x", 2).expect("set");
        assert_eq!(fired.get(), 2);
        model.set("x", 2).expect("set");
        assert_eq!(fired.get(), 2, "same value is a no-op");
    }

    #[test]
    fn standalone_wrapper_cannot_resolve_children() {
        let model = ObjectModel::new(Record::from_iter([("a", Value::record([("b", 1)]))]));
        assert_eq!(model.model("a").err(), Some(BindError::Detached));
    }

    #[test]
    fn scoped_wrapper_records_path() {
        let v = view(json!({"a": {"b": {"c": 1}}}));
        let b = v.model("a.b").expect("model").expect("record");
        assert_eq!(b.path(), Some(PropPath::from("a.b")));
        assert!(b.is_attached());
    }

    #[test]
    fn invalidate_detaches_children_recursively() {
        let v = view(json!({"a": {"b": {"c": 1}}}));
        let a = v.model("a").expect("model").expect("record");
        let b = v.model("a.b").expect("model").expect("record");

        a.invalidate();
        assert!(!a.is_attached());
        assert!(!b.is_attached());
        assert_eq!(v.cached_count(), 0);
    }

    #[test]
    fn invalidate_stops_view_listening() {
        let v = view(json!({"a": {"b": 1}}));
        let a = v.model("a").expect("model").expect("record");
        v.listen_on(&a, "set/b", Callback::new(|_| {})).expect("listen");
        assert!(v.is_listening_to(a.target_key()));

        a.invalidate();
        assert!(!v.is_listening_to(a.target_key()));
        assert!(a.emitter().is_empty(), "target registry is cleaned by the off adapter");
    }

    #[test]
    fn list_wrapper_set_assigns_slot() {
        let v = view(json!({"items": [1, 2, 3]}));
        let items = v.model("items").expect("model").expect("list");
        items.set("1", 20).expect("set");
        assert_eq!(v.get("items.1"), Value::from(20));
    }

    #[test]
    fn model_assign_rejects_shape_mismatch() {
        let v = view(json!({"a": {"b": 1}}));
        let a = v.model("a").expect("model").expect("record");
        assert!(a.assign(&Value::list([1]), AssignMode::Overwrite).is_err());
        a.assign(&Value::record([("b", 2)]), AssignMode::Overwrite)
            .expect("assign");
        assert_eq!(v.get("a.b"), Value::from(2));
    }
}
