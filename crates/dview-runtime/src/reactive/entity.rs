#![forbid(unsafe_code)]

//! The shared surface of views and wrappers.
//!
//! [`Entity`] has four required methods (registry access, backing data,
//! child-model resolution and single-slot assignment); everything else,
//! including sigil subscription specs and cross-entity listening, is
//! provided on top of them.
//!
//! # Subscription specs
//!
//! `on` accepts whitespace-separated names. Each is parsed once into an
//! [`EventSpec`]:
//!
//! - `name`: plain event.
//! - `!name`: plain event, first argument replaced by its negation.
//! - `=path` / `@path`: deliver the current value now, then on every change.
//! - `/path`: deliver on every change.
//! - `!flag`: shorthand for `!/flag` when the entity owns a `flag` slot at
//!   subscription time, otherwise the negated plain event `flag`.
//! - `>`: call the handler now, register nothing.
//!
//! A single-segment path whose value is not a list registers `set/<prop>`
//! locally. Longer paths, and paths whose value is a list, are re-targeted
//! through the ledger onto the nested wrapper: a list's `change` event, or
//! the parent record's `set/<last>` event.
//!
//! # Failure Modes
//!
//! - Path specs naming a missing slot fail with `UndefinedModel`; names
//!   registered earlier in the same call stay registered.
//! - Ledger adapters hold their target strongly. An entity listening on an
//!   ancestor that transitively owns it keeps both alive until
//!   `stop_listening_all` (or `View::dispose`) runs.

use std::rc::Rc;

use dview_core::{BindError, EventSpec, Key, PropPath, Record, Result, SpecKind, Value};

use super::emitter::{Callback, Emitter, EntityId};
use super::ledger::{ListenTo, TargetKey};
use super::model::Model;

/// How [`Entity::assign`] treats keys missing from the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssignMode {
    /// Set every key.
    #[default]
    Overwrite,
    /// Skip keys the target does not already have.
    Defaults,
}

/// Anything that emits events and presents a record or list.
pub trait Entity: Clone + 'static {
    /// The entity's registry and ledger.
    fn emitter(&self) -> &Emitter;

    /// Handle to the data this entity presents.
    fn source(&self) -> Value;

    /// Memoized wrapper for the value in slot `key`, created on first use.
    ///
    /// Returns `Ok(None)` for primitive values and `Err(Detached)` for
    /// wrappers that have no owning view.
    fn child_model(&self, key: &Key) -> Result<Option<Model>>;

    /// Assign one slot, invalidating the wrapper of the value it replaces
    /// and emitting `set/<key>` and `set`. Same-value writes are no-ops.
    fn set_key(&self, key: &Key, value: Value);

    // ---- identity ----

    fn id(&self) -> EntityId {
        self.emitter().id()
    }

    fn target_key(&self) -> TargetKey {
        TargetKey::Entity(self.id())
    }

    // ---- data access ----

    /// Value at `path`, or `Null` when any segment is missing.
    fn get(&self, path: impl Into<PropPath>) -> Value {
        self.source().get_path(&path.into())
    }

    /// Whether `key` is an own slot.
    fn has(&self, key: impl Into<Key>) -> bool {
        self.source().has_key(&key.into())
    }

    /// Assign the value at `path`.
    ///
    /// Multi-segment paths write through the wrapper of the parent value.
    fn set(&self, path: impl Into<PropPath>, value: impl Into<Value>) -> Result<&Self> {
        let path = path.into();
        let value = value.into();
        match path.segments() {
            [] => return Err(BindError::undefined(&path)),
            [key] => self.set_key(key, value),
            [.., last] => {
                let parent = path.parent();
                let holder = self
                    .model(parent.clone())?
                    .ok_or_else(|| BindError::not_a_model(&parent))?;
                holder.set_key(last, value);
            }
        }
        Ok(self)
    }

    /// Assign every entry of `props` as a single-segment key.
    fn set_all(&self, props: &Record) -> &Self {
        for (name, value) in props.entries() {
            self.set_key(&Key::from(name), value);
        }
        self
    }

    /// Deep merge of `props` into this entity's record.
    ///
    /// Nested records merge into the existing record's wrapper; nested lists
    /// reset the existing list's wrapper; everything else is `set`.
    fn assign(&self, props: &Record, mode: AssignMode) -> Result<&Self> {
        assign_record(self, props, mode)?;
        Ok(self)
    }

    // ---- models ----

    /// Wrapper for the value at `path`.
    ///
    /// Every traversed segment must exist, otherwise `UndefinedModel`.
    /// Primitive end values yield `Ok(None)`.
    fn model(&self, path: impl Into<PropPath>) -> Result<Option<Model>> {
        let path = path.into();
        let Some((first, rest)) = path.segments().split_first() else {
            return Err(BindError::undefined(&path));
        };
        if !self.has(first.clone()) {
            return Err(BindError::undefined(&path));
        }

        let mut current = self.child_model(first)?;
        for key in rest {
            let model = current.ok_or_else(|| BindError::not_a_model(&path))?;
            if !model.has(key.clone()) {
                return Err(BindError::undefined(&path));
            }
            current = model.child_model(key)?;
        }
        Ok(current)
    }

    /// Wrapper that owns the last segment of `path`.
    ///
    /// If the value at `path` is a record or list, that value's wrapper is
    /// returned. Otherwise the wrapper holding the slot is returned, or
    /// `Ok(None)` when the slot belongs to this entity itself.
    fn model_by_prop(&self, path: impl Into<PropPath>) -> Result<Option<Model>> {
        let path = path.into();
        let Some(last) = path.last() else {
            return Ok(None);
        };

        if path.len() == 1 {
            return if self.get(path.clone()).is_object() {
                self.child_model(last)
            } else {
                Ok(None)
            };
        }

        let parent = path.parent();
        let holder = self
            .model(parent.clone())?
            .ok_or_else(|| BindError::not_a_model(&parent))?;
        if holder.get(last.clone()).is_object() {
            holder.child_model(last)
        } else {
            Ok(Some(holder))
        }
    }

    // ---- event registry ----

    fn on(&self, events: &str, callback: Callback) -> Result<&Self> {
        self.on_with(events, callback, false)
    }

    fn once(&self, events: &str, callback: Callback) -> Result<&Self> {
        self.on_with(events, callback, true)
    }

    /// Subscribe `callback` to every spec in `events`.
    fn on_with(&self, events: &str, callback: Callback, once: bool) -> Result<&Self> {
        for spec in EventSpec::parse_all(events)? {
            subscribe(self, &resolve_spec(self, spec), &callback, once)?;
        }
        Ok(self)
    }

    /// Remove every registration of every event.
    fn off_all(&self) -> &Self {
        self.emitter().clear();
        self
    }

    /// Remove every registration of the listed events.
    ///
    /// Path specs address the local `set/<prop>` event they register; their
    /// re-targeted subscriptions are removed by [`Entity::off_callback`].
    fn off(&self, events: &str) -> &Self {
        for spec in parse_lenient(self, events) {
            if let Some(event) = local_event(&spec) {
                self.emitter().remove_event(&event);
            }
        }
        self
    }

    /// Remove the first registration per listed event created with
    /// `callback`, including re-targeted path subscriptions.
    ///
    /// Re-targeted subscriptions are looked up on the wrapper the path
    /// currently resolves to; listeners on other targets are left alone.
    fn off_callback(&self, events: &str, callback: &Callback) -> &Self {
        for spec in parse_lenient(self, events) {
            if let Some(event) = local_event(&spec) {
                self.emitter().remove_callback(&event, callback);
            }
            let Some(path) = spec.path() else {
                continue;
            };
            let is_list = self.get(path.clone()).as_list().is_some();
            if path.len() == 1 && !is_list {
                continue;
            }
            if let Ok((holder, event)) = retarget(self, path, is_list) {
                self.emitter()
                    .stop_listening_callback(holder.target_key(), &event, callback);
            }
        }
        self
    }

    fn trigger(&self, event: &str, args: &[Value]) -> &Self {
        self.emitter().trigger(event, args);
        self
    }

    // ---- listener ledger ----

    /// Subscribe to `events` on another entity through this entity's ledger.
    fn listen_on<T: Entity>(&self, target: &T, events: &str, callback: Callback) -> Result<&Self> {
        listen_entity(self.emitter(), target, events, callback, None, false)?;
        Ok(self)
    }

    /// Like [`Entity::listen_on`], torn down after the first delivery.
    fn listen_once<T: Entity>(
        &self,
        target: &T,
        events: &str,
        callback: Callback,
    ) -> Result<&Self> {
        listen_entity(self.emitter(), target, events, callback, None, true)?;
        Ok(self)
    }

    /// Subscribe through caller-supplied adapters.
    fn listen_to(&self, params: ListenTo) -> Result<&Self> {
        self.emitter().listen_to(params)?;
        Ok(self)
    }

    fn stop_listening_all(&self) -> &Self {
        self.emitter().stop_listening_all();
        self
    }

    fn stop_listening(&self, target: TargetKey) -> &Self {
        self.emitter().stop_listening(target);
        self
    }

    fn stop_listening_events(&self, target: TargetKey, events: &str) -> &Self {
        self.emitter().stop_listening_events(target, events);
        self
    }

    fn stop_listening_callback(
        &self,
        target: TargetKey,
        events: &str,
        callback: &Callback,
    ) -> &Self {
        self.emitter()
            .stop_listening_callback(target, events, callback);
        self
    }

    /// Number of targets this entity currently listens to.
    fn listening_count(&self) -> usize {
        self.emitter().listening_count()
    }

    fn is_listening_to(&self, target: TargetKey) -> bool {
        self.emitter().is_listening_to(target)
    }
}

// ---------------------------------------------------------------------------
// Subscription internals
// ---------------------------------------------------------------------------

fn subscribe<E: Entity>(entity: &E, spec: &EventSpec, callback: &Callback, once: bool) -> Result<()> {
    let emitter = entity.emitter();

    let path = match &spec.kind {
        SpecKind::Now => {
            callback.call(&[]);
            return Ok(());
        }
        SpecKind::Event(name) => {
            let handler = if spec.negate {
                deliverer(entity.source(), None, true, callback)
            } else {
                callback.clone()
            };
            emitter.register(name, once, callback.clone(), handler);
            return Ok(());
        }
        SpecKind::Current(path) | SpecKind::Watch(path) | SpecKind::WatchNow(path) => path,
    };

    let data = entity.source();
    let current = data.get_path(path);

    if spec.fires_now() {
        callback.call(&[present(&current, spec.negate)]);
    }

    let handler = deliverer(data, Some(path.clone()), spec.negate, callback);
    let Some(last) = path.last() else {
        return Err(BindError::EmptyEventSpec);
    };

    let is_list = current.as_list().is_some();
    if path.len() == 1 && !is_list {
        emitter.register(&last.set_event(), once, callback.clone(), handler);
        return Ok(());
    }

    let (holder, event) = retarget(entity, path, is_list)?;
    listen_entity(emitter, &holder, &event, callback.clone(), Some(handler), once)
}

/// Wrapper and event a nested or list-valued path subscribes through: the
/// list's own `change`, or `set/<last>` on the parent record.
fn retarget<E: Entity>(entity: &E, path: &PropPath, is_list: bool) -> Result<(Model, String)> {
    let last = path.last().ok_or(BindError::EmptyEventSpec)?;
    let (holder, event) = if is_list {
        (entity.model(path.clone())?, "change".to_owned())
    } else {
        (entity.model(path.parent())?, last.set_event())
    };
    let holder = holder.ok_or_else(|| BindError::not_a_model(path))?;
    Ok((holder, event))
}

/// Read `!name` as a watch on the entity's own `name` slot, if it has one.
fn resolve_spec<E: Entity>(entity: &E, spec: EventSpec) -> EventSpec {
    let watch = spec
        .negated_name()
        .filter(|name| entity.has(*name))
        .map(PropPath::from);
    match watch {
        Some(path) => EventSpec {
            kind: SpecKind::Watch(path),
            negate: true,
        },
        None => spec,
    }
}

/// Handler that delivers the current value of `path` (or the event's first
/// argument) followed by the event arguments.
///
/// The first original argument is dropped when it equals the delivered
/// value, unless the value is negated.
fn deliverer(data: Value, path: Option<PropPath>, negate: bool, callback: &Callback) -> Callback {
    let callback = callback.clone();
    Callback::new(move |args| {
        let raw = match &path {
            Some(path) => data.get_path(path),
            None => args.first().cloned().unwrap_or_default(),
        };
        let value = present(&raw, negate);
        let skip = usize::from(!negate && args.first().is_some_and(|first| first.same(&value)));

        let mut delivered = Vec::with_capacity(args.len() + 1 - skip);
        delivered.push(value);
        delivered.extend_from_slice(&args[skip..]);
        callback.call(&delivered);
    })
}

fn present(value: &Value, negate: bool) -> Value {
    if negate {
        Value::Bool(!value.truthy())
    } else {
        value.clone()
    }
}

/// Event name a spec registers on the entity itself, if any.
fn local_event(spec: &EventSpec) -> Option<String> {
    match &spec.kind {
        SpecKind::Now => None,
        SpecKind::Event(name) => Some(name.clone()),
        SpecKind::Current(path) | SpecKind::Watch(path) | SpecKind::WatchNow(path) => {
            (path.len() == 1).then(|| path.last().map(Key::set_event)).flatten()
        }
    }
}

fn parse_lenient<'a, E: Entity>(entity: &'a E, events: &'a str) -> impl Iterator<Item = EventSpec> + 'a {
    dview_core::split_events(events)
        .filter_map(|raw| EventSpec::parse(raw).ok())
        .map(move |spec| resolve_spec(entity, spec))
}

/// Ledger subscription on an entity target, driven through the target's
/// own `on_with` / `off_callback`.
pub(crate) fn listen_entity<T: Entity>(
    subscriber: &Emitter,
    target: &T,
    events: &str,
    callback: Callback,
    handler: Option<Callback>,
    once: bool,
) -> Result<()> {
    let on_target = target.clone();
    let off_target = target.clone();
    subscriber.listen_to(ListenTo {
        target: target.target_key(),
        events: events.to_owned(),
        callback,
        handler,
        once,
        on: Rc::new(move |event: &str, handler: Callback, once: bool| {
            on_target.on_with(event, handler, once).map(|_| ())
        }),
        off: Rc::new(move |event: &str, handler: &Callback| {
            off_target.off_callback(event, handler);
        }),
    })
}

fn assign_record<E: Entity>(entity: &E, props: &Record, mode: AssignMode) -> Result<()> {
    for (name, value) in props.entries() {
        let key = Key::from(name);
        let exists = entity.has(key.clone());
        if !exists && mode == AssignMode::Defaults {
            continue;
        }

        if exists && value.is_object() {
            match (entity.child_model(&key)?, &value) {
                (Some(Model::Object(model)), Value::Record(nested)) => {
                    assign_record(&model, nested, mode)?;
                    continue;
                }
                (Some(Model::Array(model)), Value::List(items)) => {
                    model.reset(items.to_vec());
                    continue;
                }
                _ => {}
            }
        }

        entity.set_key(&key, value);
    }
    Ok(())
}
