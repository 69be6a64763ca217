#![forbid(unsafe_code)]

//! Reactive bindings over plain nested data.
//!
//! This module provides:
//!
//! - [`Emitter`]: per-entity event registry (`on`/`off`/`trigger`) plus the
//!   ledger of subscriptions the entity holds on *other* targets.
//! - [`Entity`]: the shared surface of everything that emits events and
//!   presents data: sigil specs (`=x`, `/a.b`, `@x`, `!flag`, `>`), model
//!   lookup and cross-entity listening.
//! - [`View`]: the root entity. Owns a data record and the wrapper cache.
//! - [`ObjectModel`] / [`ArrayModel`]: lazily created, memoized wrappers for
//!   nested records and lists. List wrappers carry the ordered-collection
//!   operations (`add`, `remove_at`, `move_from`, `sort_by`, ...).
//! - [`Reconciler`]: keeps an [`EntryList`] of derived entries positionally
//!   aligned with a list wrapper; [`bind_each`] builds one that produces
//!   item views.
//!
//! # Architecture
//!
//! All shared state is `Rc<..>` with interior mutability. Wrappers refer
//! back to their view through `Weak`, so the view's cache owns them and not
//! the other way round. Handlers stored in registries capture data handles,
//! never the entity that registered them.
//!
//! # Invariants
//!
//! 1. Handlers run in registration order; `once` records are removed before
//!    they run.
//! 2. No `RefCell` borrow is held while user code runs. Registries, ledgers,
//!    caches and derived lists are borrowed only for bookkeeping.
//! 3. A view caches at most one wrapper per distinct source reference.
//! 4. After each list mutation has been dispatched, a bound [`EntryList`] has
//!    the same length and order as its source.
//! 5. `stop_listening_all()` leaves the ledger empty and removes every
//!    handler it installed on other targets.

pub mod cache;
pub mod collection;
pub mod each;
pub mod emitter;
pub mod entity;
pub mod ledger;
pub mod model;
pub mod reconcile;
pub mod view;

pub use cache::{WrapperCache, WrapperSeed};
pub use collection::Criteria;
pub use each::{
    EachLifecycle, EachOptions, ItemHook, ItemView, ItemViewChoice, MoveHook, bind_each,
};
pub use emitter::{Callback, Emitter, EntityId};
pub use entity::{AssignMode, Entity};
pub use ledger::{ListenTo, OffAdapter, OnAdapter, Subscribable, TargetKey};
pub use model::{ArrayModel, Model, ObjectModel};
pub use reconcile::{EntryLifecycle, EntryList, Reconciler};
pub use view::{View, ViewOptions, WrapperFactory};
