#![forbid(unsafe_code)]

//! The root entity.
//!
//! A [`View`] owns a data record and the wrapper cache for everything nested
//! inside it. Wrappers are created on first `model()` lookup, memoized by
//! source identity, and invalidated when the slot holding their source is
//! overwritten.
//!
//! # Invariants
//!
//! 1. `model(p)` returns the same wrapper until the value at `p` is replaced.
//! 2. The cache holds at most one wrapper per source reference.
//!
//! # Failure Modes
//!
//! - A [`WrapperFactory`] that returns a wrapper for a different source than
//!   it was asked about breaks invariant 1 for that path.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use dview_core::{Key, PropPath, Record, Result, Value};
use tracing::debug;

use super::cache::{WrapperCache, WrapperSeed};
use super::emitter::Emitter;
use super::entity::Entity;
use super::model::{ArrayModel, Model, ObjectModel, write_slot};

/// Hook for customizing the wrappers a view creates.
///
/// Return `None` to fall back to [`View::default_wrapper`].
pub trait WrapperFactory {
    fn wrap(&self, view: &View, raw: &Value, path: &PropPath) -> Option<Model>;
}

// ---------------------------------------------------------------------------
// ViewOptions
// ---------------------------------------------------------------------------

/// Construction options for a [`View`].
#[derive(Clone, Default)]
pub struct ViewOptions {
    /// Initial data. A fresh empty record when absent.
    pub data: Option<Record>,
    /// Pre-populated wrapper cache.
    pub wrappers: Option<WrapperSeed>,
    pub factory: Option<Rc<dyn WrapperFactory>>,
}

impl ViewOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_data(mut self, data: Record) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_wrappers(mut self, seed: WrapperSeed) -> Self {
        self.wrappers = Some(seed);
        self
    }

    #[must_use]
    pub fn with_factory(mut self, factory: impl WrapperFactory + 'static) -> Self {
        self.factory = Some(Rc::new(factory));
        self
    }

    /// Layer `over` on top of `self`.
    ///
    /// Data entries are merged into a fresh record, base first. The other
    /// fields take the override when present.
    #[must_use]
    pub fn merge(&self, over: &ViewOptions) -> ViewOptions {
        let data = match (&self.data, &over.data) {
            (None, None) => None,
            (base, top) => {
                let merged = Record::new();
                for (key, value) in base.iter().chain(top.iter()).flat_map(Record::entries) {
                    merged.insert(key, value);
                }
                Some(merged)
            }
        };
        ViewOptions {
            data,
            wrappers: over.wrappers.clone().or_else(|| self.wrappers.clone()),
            factory: over.factory.clone().or_else(|| self.factory.clone()),
        }
    }

    /// Reject options that cannot build a view.
    pub fn validate(&self) -> Result<()> {
        match &self.wrappers {
            Some(seed) => seed.check(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ViewOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewOptions")
            .field("data", &self.data)
            .field("wrappers", &self.wrappers)
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

pub(crate) struct ViewInner {
    emitter: Emitter,
    data: Record,
    cache: RefCell<WrapperCache>,
    factory: Option<Rc<dyn WrapperFactory>>,
    parent: RefCell<Option<Weak<ViewInner>>>,
}

/// Root entity over a data record.
#[derive(Clone)]
pub struct View(pub(crate) Rc<ViewInner>);

impl View {
    /// View presenting `data`. The record handle is adopted, not copied.
    #[must_use]
    pub fn new(data: Record) -> Self {
        Self::build(data, WrapperCache::new(), None)
    }

    pub fn with_options(options: ViewOptions) -> Result<Self> {
        options.validate()?;
        let cache = match options.wrappers {
            Some(seed) => WrapperCache::seeded(seed)?,
            None => WrapperCache::new(),
        };
        Ok(Self::build(
            options.data.unwrap_or_default(),
            cache,
            options.factory,
        ))
    }

    fn build(data: Record, cache: WrapperCache, factory: Option<Rc<dyn WrapperFactory>>) -> Self {
        Self(Rc::new(ViewInner {
            emitter: Emitter::new(),
            data,
            cache: RefCell::new(cache),
            factory,
            parent: RefCell::new(None),
        }))
    }

    #[must_use]
    pub fn data(&self) -> Record {
        self.0.data.clone()
    }

    #[must_use]
    pub fn get_path(&self, path: &PropPath) -> Value {
        self.source().get_path(path)
    }

    #[must_use]
    pub fn parent(&self) -> Option<View> {
        self.0.parent.borrow().as_ref().and_then(Weak::upgrade).map(View)
    }

    pub fn set_parent(&self, parent: Option<&View>) {
        *self.0.parent.borrow_mut() = parent.map(View::downgrade);
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &View) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<ViewInner> {
        Rc::downgrade(&self.0)
    }

    // ---- wrapper cache ----

    /// Cached wrapper for `raw`, by identity.
    #[must_use]
    pub fn model_of(&self, raw: &Value) -> Option<Model> {
        self.0.cache.borrow().get(raw)
    }

    /// Build (but do not cache) a wrapper for `raw` found at `path`.
    #[must_use]
    pub fn wrapper(&self, raw: &Value, path: &PropPath) -> Option<Model> {
        match &self.0.factory {
            Some(factory) => factory
                .wrap(self, raw, path)
                .or_else(|| self.default_wrapper(raw, path)),
            None => self.default_wrapper(raw, path),
        }
    }

    /// Plain wrapper scoped to this view: records become [`ObjectModel`],
    /// lists [`ArrayModel`], primitives nothing.
    #[must_use]
    pub fn default_wrapper(&self, raw: &Value, path: &PropPath) -> Option<Model> {
        match raw {
            Value::Record(record) => Some(Model::Object(ObjectModel::scoped(
                record.clone(),
                self,
                path.clone(),
            ))),
            Value::List(list) => Some(Model::Array(ArrayModel::scoped(
                list.clone(),
                self,
                path.clone(),
            ))),
            _ => None,
        }
    }

    /// Memoized wrapper for `raw`, created on first use.
    pub(crate) fn model_for(&self, raw: &Value, path: PropPath) -> Option<Model> {
        if !raw.is_object() {
            return None;
        }
        if let Some(model) = self.model_of(raw) {
            return Some(model);
        }

        let model = self.wrapper(raw, &path)?;
        let mut cache = self.0.cache.borrow_mut();
        // The factory may have resolved (and cached) the same source.
        if let Some(existing) = cache.get(raw) {
            return Some(existing);
        }
        debug!(view = %self.id(), entity = %model.id(), %path, "caching wrapper");
        cache.insert(raw.clone(), model.clone());
        Some(model)
    }

    /// Clear the cached wrapper of `old`, if any.
    pub(crate) fn invalidate_value(&self, old: &Value) {
        if !old.is_object() {
            return;
        }
        let Some(model) = self.model_of(old) else {
            return;
        };
        model.invalidate();
        // Seeded wrappers are scoped to another view.
        self.evict(&model);
    }

    pub(crate) fn evict(&self, model: &Model) -> bool {
        self.0.cache.borrow_mut().remove_model(model)
    }

    /// Number of wrappers currently cached.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.0.cache.borrow().len()
    }

    /// Stop every ledger subscription and drop every local handler.
    pub fn dispose(&self) {
        debug!(view = %self.id(), "disposing view");
        self.stop_listening_all();
        self.off_all();
    }
}

impl Entity for View {
    fn emitter(&self) -> &Emitter {
        &self.0.emitter
    }

    fn source(&self) -> Value {
        Value::Record(self.0.data.clone())
    }

    fn child_model(&self, key: &Key) -> Result<Option<Model>> {
        let raw = self.source().get_key(key);
        Ok(self.model_for(&raw, PropPath::from(key.clone())))
    }

    fn set_key(&self, key: &Key, value: Value) {
        write_slot(&self.0.emitter, &self.0.data, key, value, Some(self));
    }
}

impl Default for View {
    fn default() -> Self {
        Self::new(Record::new())
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("id", &self.0.emitter.id())
            .field("data", &self.0.data)
            .field("cached", &self.cached_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::emitter::Callback;
    use crate::reactive::entity::AssignMode;
    use dview_core::BindError;
    use serde_json::json;
    use std::cell::Cell;

    fn view(json: serde_json::Value) -> View {
        View::new(Value::from(json).as_record().cloned().expect("object literal"))
    }

    type Calls = Rc<RefCell<Vec<Vec<Value>>>>;

    fn recorder() -> (Calls, Callback) {
        let calls: Calls = Rc::default();
        let sink = Rc::clone(&calls);
        (
            calls,
            Callback::new(move |args| sink.borrow_mut().push(args.to_vec())),
        )
    }

    fn firsts(calls: &Calls) -> Vec<Value> {
        calls
            .borrow()
            .iter()
            .map(|args| args.first().cloned().unwrap_or_default())
            .collect()
    }

    #[test]
    fn same_value_set_is_noop() {
        let v = view(json!({"x": 1}));
        let (calls, cb) = recorder();
        v.on("set/x", cb).expect("on");

        v.set("x", 1).expect("set");
        assert!(calls.borrow().is_empty());

        v.set("x", 2).expect("set");
        assert_eq!(*calls.borrow(), vec![vec![Value::from(2), Value::from(1)]]);
    }

    #[test]
    fn generic_set_event_carries_name() {
        let v = view(json!({"x": 1}));
        let (calls, cb) = recorder();
        v.on("set", cb).expect("on");
        v.set("x", 5).expect("set");
        assert_eq!(
            *calls.borrow(),
            vec![vec![Value::from("x"), Value::from(5), Value::from(1)]]
        );
    }

    #[test]
    fn current_value_fires_now_then_on_change() {
        let v = view(json!({"x": 1}));
        let (calls, cb) = recorder();
        v.on("=x", cb).expect("on");
        assert_eq!(firsts(&calls), vec![Value::from(1)]);

        v.set("x", 2).expect("set");
        v.set("x", 3).expect("set");
        assert_eq!(firsts(&calls), vec![Value::from(1), Value::from(2), Value::from(3)]);
    }

    #[test]
    fn watch_now_on_nested_path() {
        let v = view(json!({"a": {"b": 1}}));
        let (calls, cb) = recorder();
        v.on("@a.b", cb).expect("on");
        v.set("a.b", 5).expect("set");
        assert_eq!(firsts(&calls), vec![Value::from(1), Value::from(5)]);
    }

    #[test]
    fn watch_does_not_fire_now() {
        let v = view(json!({"a": {"b": 1}}));
        let (calls, cb) = recorder();
        v.on("/a.b", cb).expect("on");
        assert!(calls.borrow().is_empty());
        v.set("a.b", 2).expect("set");
        assert_eq!(firsts(&calls), vec![Value::from(2)]);
    }

    #[test]
    fn negated_flag_delivers_inverse() {
        let v = view(json!({"flag": false}));
        let (calls, cb) = recorder();
        v.on("!flag", cb).expect("on");
        v.set("flag", true).expect("set");
        assert_eq!(firsts(&calls), vec![Value::from(false)]);
    }

    #[test]
    fn negated_plain_event_inverts_first_argument() {
        let v = view(json!({}));
        let (calls, cb) = recorder();
        v.on("!ping/", cb).expect("on");
        v.trigger("ping/", &[Value::from(0)]);
        assert_eq!(firsts(&calls), vec![Value::from(true)]);
    }

    #[test]
    fn negated_bare_name_without_slot_is_plain_event() {
        let v = view(json!({}));
        let (calls, cb) = recorder();
        v.on("!ping", cb.clone()).expect("on");
        assert!(v.emitter().has_listeners("ping"));

        v.trigger("ping", &[Value::from(1)]);
        assert_eq!(firsts(&calls), vec![Value::from(false)]);

        v.off_callback("!ping", &cb);
        assert!(v.emitter().is_empty());
    }

    #[test]
    fn now_marker_calls_without_registering() {
        let v = view(json!({}));
        let (calls, cb) = recorder();
        v.on(">", cb).expect("on");
        assert_eq!(calls.borrow().len(), 1);
        assert!(v.emitter().is_empty());
    }

    #[test]
    fn list_path_retargets_to_change() {
        let v = view(json!({"items": [1, 2, 3]}));
        let (calls, cb) = recorder();
        v.on("/items", cb).expect("on");

        let items = v.model("items").expect("model").expect("list");
        items.as_array().expect("array").push(4);

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert!(calls[0][0].as_list().is_some());
        assert_eq!(calls[0][1], Value::from("add"));
    }

    #[test]
    fn wrapper_identity_until_reassigned() {
        let v = view(json!({"a": {"b": 1}}));
        let first = v.model("a").expect("model").expect("record");
        let again = v.model("a").expect("model").expect("record");
        assert!(first.ptr_eq(&again));

        v.set("a", Value::record([("b", 2)])).expect("set");
        assert!(!first.is_attached());
        let fresh = v.model("a").expect("model").expect("record");
        assert!(!fresh.ptr_eq(&first));
        assert_eq!(v.cached_count(), 1);
    }

    #[test]
    fn reassignment_drops_retargeted_subscriptions() {
        let v = view(json!({"a": {"b": 1}}));
        let (calls, cb) = recorder();
        v.on("/a.b", cb).expect("on");
        assert_eq!(v.listening_count(), 1);

        let old = v.model("a").expect("model").expect("record");
        v.set("a", Value::record([("b", 2)])).expect("set");
        assert_eq!(v.listening_count(), 0);
        assert!(old.emitter().is_empty());

        old.set("b", 3).expect("set");
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn nested_invalidation_is_recursive() {
        let v = view(json!({"a": {"b": {"c": 1}}}));
        let a = v.model("a").expect("model").expect("record");
        let b = v.model("a.b").expect("model").expect("record");
        assert_eq!(v.cached_count(), 2);

        v.set("a", Value::Null).expect("set");
        assert!(!a.is_attached());
        assert!(!b.is_attached());
        assert_eq!(v.cached_count(), 0);
    }

    #[test]
    fn model_errors() {
        let v = view(json!({"x": 1, "a": {}}));
        assert!(matches!(v.model("missing"), Err(BindError::UndefinedModel { .. })));
        assert!(matches!(v.model("a.missing"), Err(BindError::UndefinedModel { .. })));
        assert!(matches!(v.model("x.y"), Err(BindError::NotAModel { .. })));
        assert!(v.model("x").expect("model").is_none());
        assert!(matches!(v.on("=missing.deep", Callback::new(|_| {})), Err(BindError::UndefinedModel { .. })));
    }

    #[test]
    fn model_by_prop_returns_holder_or_value_wrapper() {
        let v = view(json!({"x": 1, "a": {"b": {"c": 1}, "d": 2}}));
        let a = v.model("a").expect("model").expect("record");
        let b = v.model("a.b").expect("model").expect("record");

        assert!(v.model_by_prop("x").expect("lookup").is_none());
        assert!(v.model_by_prop("a").expect("lookup").is_some_and(|m| m.ptr_eq(&a)));
        assert!(v.model_by_prop("a.d").expect("lookup").is_some_and(|m| m.ptr_eq(&a)));
        assert!(v.model_by_prop("a.b").expect("lookup").is_some_and(|m| m.ptr_eq(&b)));
    }

    #[test]
    fn model_of_is_reverse_lookup() {
        let v = view(json!({"a": {"b": 1}}));
        let raw = v.get("a");
        assert!(v.model_of(&raw).is_none());
        let a = v.model("a").expect("model").expect("record");
        assert!(v.model_of(&raw).is_some_and(|m| m.ptr_eq(&a)));
    }

    #[test]
    fn assign_defaults_skips_missing_keys() {
        let v = view(json!({"n": 1, "a": {"b": 1}}));
        let a = v.model("a").expect("model").expect("record");
        let patch = Value::from(json!({"n": 2, "z": 9, "a": {"b": 2, "c": 3}}));
        v.assign(patch.as_record().expect("record"), AssignMode::Defaults)
            .expect("assign");

        assert_eq!(v.get("n"), Value::from(2));
        assert!(!v.has("z"));
        assert_eq!(v.get("a.b"), Value::from(2));
        assert!(v.get("a.c").is_null());
        assert!(a.is_attached(), "nested records merge in place");
    }

    #[test]
    fn assign_overwrite_sets_everything() {
        let v = view(json!({"list": [1, 2]}));
        let list = v.model("list").expect("model").expect("list");
        let patch = Value::from(json!({"z": 9, "list": [3]}));
        v.assign(patch.as_record().expect("record"), AssignMode::Overwrite)
            .expect("assign");

        assert_eq!(v.get("z"), Value::from(9));
        assert_eq!(v.get("list.0"), Value::from(3));
        assert!(list.is_attached(), "lists are reset, not replaced");
    }

    #[test]
    fn off_callback_removes_retargeted_subscription() {
        let v = view(json!({"a": {"b": 1}}));
        let (_, cb) = recorder();
        v.on("/a.b", cb.clone()).expect("on");
        let a = v.model("a").expect("model").expect("record");
        assert!(!a.emitter().is_empty());

        v.off_callback("/a.b", &cb);
        assert_eq!(v.listening_count(), 0);
        assert!(a.emitter().is_empty());
    }

    #[test]
    fn off_callback_leaves_other_targets_alone() {
        let v = view(json!({"a": {"b": 1}}));
        let other = view(json!({}));
        let (calls, cb) = recorder();
        v.listen_on(&other, "change", cb.clone()).expect("listen");
        v.on("/a.b", cb.clone()).expect("on");
        assert_eq!(v.listening_count(), 2);

        v.off_callback("/a.b", &cb);
        assert_eq!(v.listening_count(), 1);
        assert!(v.is_listening_to(other.target_key()));

        other.trigger("change", &[]);
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn off_callback_on_list_path_targets_the_list() {
        let v = view(json!({"items": [1], "other": []}));
        let other = v.model("other").expect("model").expect("list");
        let (calls, cb) = recorder();
        v.listen_on(&other, "change", cb.clone()).expect("listen");
        v.on("/items", cb.clone()).expect("on");

        v.off_callback("/items", &cb);
        assert_eq!(v.listening_count(), 1);
        other.trigger("change", &[]);
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn off_path_spec_removes_local_event() {
        let v = view(json!({"x": 1}));
        let (calls, cb) = recorder();
        v.on("/x", cb).expect("on");
        v.off("/x");
        v.set("x", 2).expect("set");
        assert!(calls.borrow().is_empty());
        assert!(v.emitter().is_empty());
    }

    #[test]
    fn dispose_releases_everything() {
        let v = view(json!({"x": 1, "a": {"b": 1}}));
        v.on("set/x", Callback::new(|_| {})).expect("on");
        v.on("/a.b", Callback::new(|_| {})).expect("on");
        let a = v.model("a").expect("model").expect("record");

        v.dispose();
        assert!(v.emitter().is_empty());
        assert_eq!(v.listening_count(), 0);
        assert!(a.emitter().is_empty());
    }

    struct CountingFactory(Rc<Cell<u32>>);

    impl WrapperFactory for CountingFactory {
        fn wrap(&self, view: &View, raw: &Value, path: &PropPath) -> Option<Model> {
            self.0.set(self.0.get() + 1);
            view.default_wrapper(raw, path)
        }
    }

    #[test]
    fn factory_is_consulted_once_per_source() {
        let built = Rc::new(Cell::new(0));
        let options = ViewOptions::new()
            .with_data(Value::from(json!({"a": {}})).as_record().cloned().expect("record"))
            .with_factory(CountingFactory(Rc::clone(&built)));
        let v = View::with_options(options).expect("view");

        v.model("a").expect("model");
        v.model("a").expect("model");
        assert_eq!(built.get(), 1);
    }

    #[test]
    fn seed_mismatch_is_rejected() {
        let options = ViewOptions::new().with_wrappers(WrapperSeed {
            sources: vec![Value::record([("k", 1)])],
            targets: Vec::new(),
        });
        assert!(matches!(
            View::with_options(options),
            Err(BindError::SeedMismatch { sources: 1, targets: 0 })
        ));
    }

    #[test]
    fn seeded_view_shares_wrapper() {
        let owner = view(json!({"items": [{"name": "a"}]}));
        let item = owner.get("items.0");
        let items = owner.model("items").expect("model").expect("list");
        let shared = items.model("0").expect("model").expect("record");

        let mut seed = WrapperSeed::new();
        seed.push(item.clone(), shared.clone());
        let child = View::with_options(
            ViewOptions::new()
                .with_data(Record::from_iter([("item", item)]))
                .with_wrappers(seed),
        )
        .expect("view");

        let via_child = child.model("item").expect("model").expect("record");
        assert!(via_child.ptr_eq(&shared));
    }

    #[test]
    fn merge_is_base_then_override() {
        let base = ViewOptions::new().with_data(Record::from_iter([("x", 1), ("y", 1)]));
        let over = ViewOptions::new().with_data(Record::from_iter([("y", 2)]));
        let merged = base.merge(&over);
        let data = merged.data.expect("data");

        assert_eq!(data.get("x"), Some(Value::from(1)));
        assert_eq!(data.get("y"), Some(Value::from(2)));
        assert_eq!(base.data.expect("data").get("y"), Some(Value::from(1)));
    }

    #[test]
    fn parent_is_weak() {
        let child = View::default();
        {
            let parent = View::default();
            child.set_parent(Some(&parent));
            assert!(child.parent().is_some_and(|p| p.ptr_eq(&parent)));
        }
        assert!(child.parent().is_none());
    }
}
