#![forbid(unsafe_code)]

//! Cross-entity listener ledger.
//!
//! Every subscription an entity places on *another* target goes through the
//! ledger, so it can later be torn down by target, by event or by the
//! callback that created it, without the caller keeping handles around.
//!
//! The ledger is target-agnostic: a target is identified by a [`TargetKey`]
//! and driven through two adapters, `on` (install a handler) and `off`
//! (remove it). Entities get adapters derived from their own `on`/`off`
//! (see [`Entity::listen_on`](super::Entity::listen_on)); any other
//! [`Subscribable`] is wired with [`Emitter::listen_to_foreign`].
//!
//! # Invariants
//!
//! 1. Every ledger-created subscription is reachable from exactly one entry,
//!    and there is at most one entry per target.
//! 2. An entry whose event map becomes empty is removed.
//! 3. `off` adapters run after the ledger borrow is released, so a target
//!    may call back into the subscriber while being detached.
//! 4. A `once` subscription removes its own ledger record when it fires.
//! 5. A foreign target is kept alive by its entry's `off` adapter, so its
//!    address (the [`TargetKey::Foreign`] value) cannot be reused by another
//!    allocation while the entry exists.

use std::rc::Rc;

use dview_core::{BindError, Result, split_events};
use indexmap::IndexMap;
use tracing::debug;

use super::emitter::{Callback, Emitter, EntityId};

/// Identity of a listened-to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKey {
    /// Another emitter, identified by its id.
    Entity(EntityId),
    /// A foreign subscribable, identified by the address of its `Rc`.
    Foreign(usize),
}

impl TargetKey {
    /// Key of a foreign target held in an `Rc`.
    #[must_use]
    pub fn foreign<T: ?Sized>(target: &Rc<T>) -> Self {
        Self::Foreign(Rc::as_ptr(target).cast::<()>() as usize)
    }
}

/// Installs `handler` for `event` on the target; the flag is `once`.
pub type OnAdapter = Rc<dyn Fn(&str, Callback, bool) -> Result<()>>;

/// Removes a handler previously installed by the matching [`OnAdapter`].
pub type OffAdapter = Rc<dyn Fn(&str, &Callback)>;

/// Parameters of [`Emitter::listen_to`].
#[derive(Clone)]
pub struct ListenTo {
    pub target: TargetKey,
    /// Whitespace-separated event names, passed to `on` one at a time.
    pub events: String,
    /// Identity of the subscription for `stop_listening_callback`.
    pub callback: Callback,
    /// Invoked instead of `callback` when set.
    pub handler: Option<Callback>,
    pub once: bool,
    pub on: OnAdapter,
    pub off: OffAdapter,
}

/// Minimal interface of an event source that is not an entity.
pub trait Subscribable {
    fn subscribe(&self, event: &str, once: bool, handler: Callback);
    fn unsubscribe(&self, event: &str, handler: &Callback);
}

impl Subscribable for Emitter {
    fn subscribe(&self, event: &str, once: bool, handler: Callback) {
        self.register(event, once, handler.clone(), handler);
    }

    fn unsubscribe(&self, event: &str, handler: &Callback) {
        self.remove_callback(event, handler);
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

pub(crate) struct Registration {
    origin: Callback,
    wrapper: Callback,
}

struct LedgerEntry {
    target: TargetKey,
    off: OffAdapter,
    events: IndexMap<String, Vec<Registration>, ahash::RandomState>,
}

#[derive(Default)]
pub(crate) struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    fn entry_mut(&mut self, target: TargetKey, off: &OffAdapter) -> &mut LedgerEntry {
        let pos = match self.entries.iter().position(|e| e.target == target) {
            Some(pos) => pos,
            None => {
                self.entries.push(LedgerEntry {
                    target,
                    off: Rc::clone(off),
                    events: IndexMap::default(),
                });
                self.entries.len() - 1
            }
        };
        &mut self.entries[pos]
    }
}

// ---------------------------------------------------------------------------
// Emitter: listening side
// ---------------------------------------------------------------------------

impl Emitter {
    /// Subscribe to `params.events` on `params.target` and record the
    /// subscription in this emitter's ledger.
    pub fn listen_to(&self, params: ListenTo) -> Result<()> {
        let names: Vec<&str> = split_events(&params.events).collect();
        if names.is_empty() {
            return Err(BindError::EmptyEventSpec);
        }

        let target = params.target;
        let invoke = params
            .handler
            .clone()
            .unwrap_or_else(|| params.callback.clone());

        for event in names {
            let wrapper = if params.once {
                let subscriber = self.downgrade();
                let origin = params.callback.clone();
                let invoke = invoke.clone();
                let event = event.to_owned();
                Callback::new(move |args| {
                    if let Some(inner) = subscriber.upgrade() {
                        Emitter(inner).stop_listening_callback(target, &event, &origin);
                    }
                    invoke.call(args);
                })
            } else {
                invoke.clone()
            };

            self.0
                .ledger
                .borrow_mut()
                .entry_mut(target, &params.off)
                .events
                .entry(event.to_owned())
                .or_default()
                .push(Registration {
                    origin: params.callback.clone(),
                    wrapper: wrapper.clone(),
                });
            debug!(entity = %self.id(), ?target, event, once = params.once, "listening");

            if let Err(err) = (params.on)(event, wrapper.clone(), params.once) {
                self.detach_where(|key, name, reg| {
                    key == target && name == event && reg.wrapper.ptr_eq(&wrapper)
                });
                return Err(err);
            }
        }

        Ok(())
    }

    /// Listen to a foreign [`Subscribable`] held in an `Rc`.
    ///
    /// The ledger holds `target` until every subscription on it is stopped.
    pub fn listen_to_foreign<T: Subscribable + 'static>(
        &self,
        target: &Rc<T>,
        events: &str,
        callback: Callback,
        once: bool,
    ) -> Result<()> {
        let on_target = Rc::clone(target);
        let off_target = Rc::clone(target);
        self.listen_to(ListenTo {
            target: TargetKey::foreign(target),
            events: events.to_owned(),
            callback,
            handler: None,
            once,
            on: Rc::new(move |event: &str, handler: Callback, once: bool| {
                on_target.subscribe(event, once, handler);
                Ok(())
            }),
            off: Rc::new(move |event: &str, handler: &Callback| {
                off_target.unsubscribe(event, handler);
            }),
        })
    }

    /// Tear down every subscription in the ledger.
    pub fn stop_listening_all(&self) {
        let n = self.detach_where(|_, _, _| true);
        if n > 0 {
            debug!(entity = %self.id(), removed = n, "stopped listening to all targets");
        }
    }

    /// Tear down every subscription on `target`.
    pub fn stop_listening(&self, target: TargetKey) {
        self.detach_where(|key, _, _| key == target);
    }

    /// Tear down the subscriptions on `target` for the listed events.
    pub fn stop_listening_events(&self, target: TargetKey, events: &str) {
        let names: Vec<&str> = split_events(events).collect();
        self.detach_where(|key, event, _| key == target && names.contains(&event));
    }

    /// Tear down the subscriptions on `target` for the listed events that
    /// were created with `callback`.
    pub fn stop_listening_callback(&self, target: TargetKey, events: &str, callback: &Callback) {
        let names: Vec<&str> = split_events(events).collect();
        self.detach_where(|key, event, reg| {
            key == target && names.contains(&event) && reg.origin.ptr_eq(callback)
        });
    }

    /// Number of targets with at least one live subscription.
    #[must_use]
    pub fn listening_count(&self) -> usize {
        self.0.ledger.borrow().entries.len()
    }

    #[must_use]
    pub fn is_listening_to(&self, target: TargetKey) -> bool {
        self.0
            .ledger
            .borrow()
            .entries
            .iter()
            .any(|e| e.target == target)
    }

    /// Event names with live subscriptions on `target`.
    #[must_use]
    pub fn listened_events(&self, target: TargetKey) -> Vec<String> {
        self.0
            .ledger
            .borrow()
            .entries
            .iter()
            .find(|e| e.target == target)
            .map(|e| e.events.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove every registration matching `pred`, prune emptied groups and
    /// entries, then run the `off` adapters. Returns how many were removed.
    fn detach_where(&self, mut pred: impl FnMut(TargetKey, &str, &Registration) -> bool) -> usize {
        let mut removed: Vec<(OffAdapter, String, Callback)> = Vec::new();
        {
            let mut ledger = self.0.ledger.borrow_mut();
            ledger.entries.retain_mut(|entry| {
                let target = entry.target;
                let off = Rc::clone(&entry.off);
                entry.events.retain(|event, regs| {
                    regs.retain(|reg| {
                        if pred(target, event.as_str(), reg) {
                            removed.push((Rc::clone(&off), event.clone(), reg.wrapper.clone()));
                            false
                        } else {
                            true
                        }
                    });
                    !regs.is_empty()
                });
                !entry.events.is_empty()
            });
        }

        for (off, event, wrapper) in &removed {
            off(event, wrapper);
        }
        removed.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use dview_core::Value;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, Callback) {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        (count, Callback::new(move |_| c.set(c.get() + 1)))
    }

    #[test]
    fn foreign_listen_and_stop() {
        let subscriber = Emitter::new();
        let target = Rc::new(Emitter::new());
        let (count, cb) = counter();

        subscriber
            .listen_to_foreign(&target, "a b", cb, false)
            .expect("listen");
        assert_eq!(subscriber.listening_count(), 1);
        assert_eq!(subscriber.listened_events(TargetKey::foreign(&target)), vec!["a", "b"]);

        target.trigger("a", &[]);
        target.trigger("b", &[]);
        assert_eq!(count.get(), 2);

        subscriber.stop_listening_all();
        assert_eq!(subscriber.listening_count(), 0);
        assert!(target.is_empty(), "target registry is free of ledger wrappers");
        target.trigger("a", &[]);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn stop_listening_events_deletes_each_group() {
        let subscriber = Emitter::new();
        let target = Rc::new(Emitter::new());
        let (_, cb) = counter();
        subscriber
            .listen_to_foreign(&target, "a b c", cb, false)
            .expect("listen");
        let key = TargetKey::foreign(&target);

        subscriber.stop_listening_events(key, "a b");
        assert_eq!(subscriber.listened_events(key), vec!["c"]);
        assert!(!target.has_listeners("a"));
        assert!(!target.has_listeners("b"));
        assert!(target.has_listeners("c"));

        subscriber.stop_listening_events(key, "c");
        assert!(!subscriber.is_listening_to(key), "emptied entry is removed");
    }

    #[test]
    fn stop_listening_callback_matches_origin() {
        let subscriber = Emitter::new();
        let target = Rc::new(Emitter::new());
        let (count_a, a) = counter();
        let (count_b, b) = counter();
        subscriber.listen_to_foreign(&target, "e", a.clone(), false).expect("listen");
        subscriber.listen_to_foreign(&target, "e", b, false).expect("listen");
        let key = TargetKey::foreign(&target);

        subscriber.stop_listening_callback(key, "e", &a);
        target.trigger("e", &[]);
        assert_eq!((count_a.get(), count_b.get()), (0, 1));
        assert!(subscriber.is_listening_to(key));
    }

    #[test]
    fn once_tears_down_its_ledger_record() {
        let subscriber = Emitter::new();
        let target = Rc::new(Emitter::new());
        let (count, cb) = counter();
        subscriber.listen_to_foreign(&target, "e", cb, true).expect("listen");

        target.trigger("e", &[Value::from(1)]);
        target.trigger("e", &[Value::from(2)]);
        assert_eq!(count.get(), 1);
        assert_eq!(subscriber.listening_count(), 0);
    }

    #[test]
    fn empty_events_are_rejected() {
        let subscriber = Emitter::new();
        let target = Rc::new(Emitter::new());
        let (_, cb) = counter();
        assert_eq!(
            subscriber.listen_to_foreign(&target, "  ", cb, false),
            Err(BindError::EmptyEventSpec)
        );
        assert_eq!(subscriber.listening_count(), 0);
    }

    #[test]
    fn failing_on_adapter_rolls_back() {
        let subscriber = Emitter::new();
        let (_, cb) = counter();
        let result = subscriber.listen_to(ListenTo {
            target: TargetKey::Foreign(7),
            events: "e".into(),
            callback: cb,
            handler: None,
            once: false,
            on: Rc::new(|_: &str, _: Callback, _: bool| Err(BindError::undefined("x"))),
            off: Rc::new(|_: &str, _: &Callback| {}),
        });
        assert!(result.is_err());
        assert_eq!(subscriber.listening_count(), 0);
    }

    #[test]
    fn off_adapter_may_reenter_subscriber() {
        let subscriber = Emitter::new();
        let inner = subscriber.clone();
        let (_, cb) = counter();
        subscriber
            .listen_to(ListenTo {
                target: TargetKey::Foreign(1),
                events: "e".into(),
                callback: cb,
                handler: None,
                once: false,
                on: Rc::new(|_: &str, _: Callback, _: bool| Ok(())),
                off: Rc::new(move |_: &str, _: &Callback| {
                    let _ = inner.listening_count();
                }),
            })
            .expect("listen");
        subscriber.stop_listening(TargetKey::Foreign(1));
        assert_eq!(subscriber.listening_count(), 0);
    }

    #[test]
    fn foreign_target_is_held_while_listened() {
        let subscriber = Emitter::new();
        let (count, cb) = counter();
        let target = Rc::new(Emitter::new());
        let weak = Rc::downgrade(&target);
        let key = TargetKey::foreign(&target);
        subscriber.listen_to_foreign(&target, "e", cb, false).expect("listen");
        drop(target);

        let held = weak.upgrade().expect("ledger keeps the target alive");
        held.trigger("e", &[]);
        assert_eq!(count.get(), 1);
        drop(held);

        // A fresh target can never share the key of a live entry.
        let other = Rc::new(Emitter::new());
        assert_ne!(TargetKey::foreign(&other), key);

        subscriber.stop_listening_all();
        assert_eq!(subscriber.listening_count(), 0);
        assert!(weak.upgrade().is_none(), "released once the entry is gone");
    }
}
