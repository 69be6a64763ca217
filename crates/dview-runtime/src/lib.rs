#![forbid(unsafe_code)]

//! Runtime for dview: observable views over plain nested data.
//!
//! Everything lives in [`reactive`]. The crate is single-threaded; all
//! shared state is `Rc`-based and none of the public types are `Send`.

pub mod reactive;

pub use reactive::{
    ArrayModel, AssignMode, Callback, EachOptions, Emitter, Entity, EntityId, EntryLifecycle,
    EntryList, ItemView, ItemViewChoice, ListenTo, Model, ObjectModel, Reconciler, Subscribable,
    TargetKey, View, ViewOptions, WrapperFactory, WrapperSeed, bind_each,
};
