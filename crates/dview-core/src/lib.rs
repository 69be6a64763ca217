#![forbid(unsafe_code)]

//! Core data types for dview.
//!
//! This crate provides:
//! - [`Value`], [`Record`] and [`List`]: shared plain data with identity semantics
//! - [`Key`] and [`PropPath`] for addressing nested values
//! - [`EventSpec`] for parsed subscription specs (`=x`, `!flag`, `@a.b`, ...)
//! - [`index`] helpers implementing negative-index resolution for ordered lists
//! - [`BindError`], the contract-violation taxonomy shared by the runtime

pub mod error;
pub mod event_spec;
pub mod index;
pub mod path;
pub mod value;

pub use error::{BindError, Result};
pub use event_spec::{EventSpec, SpecKind, split_events};
pub use path::{Key, PropPath};
pub use value::{List, Record, Value};
