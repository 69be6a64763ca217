#![forbid(unsafe_code)]

//! dview public facade.
//!
//! Re-exports the data model from `dview-core` and, with the `runtime`
//! feature (on by default), the reactive runtime from `dview-runtime`.
//!
//! ```
//! use dview::prelude::*;
//!
//! # fn main() -> dview::Result<()> {
//! let view = View::new(Record::from_iter([("count", 1)]));
//! view.set("count", 2)?;
//! assert_eq!(view.get("count"), Value::from(2));
//! # Ok(())
//! # }
//! ```

pub use dview_core as core;
pub use dview_core::{BindError, EventSpec, Key, List, PropPath, Record, Result, Value};

#[cfg(feature = "runtime")]
pub use dview_runtime as runtime;
#[cfg(feature = "runtime")]
pub use dview_runtime::{
    ArrayModel, AssignMode, Callback, EachOptions, Entity, EntryLifecycle, ItemView,
    ItemViewChoice, Model, ObjectModel, Reconciler, View, ViewOptions, WrapperFactory, bind_each,
};

/// Everything needed to build and observe views.
pub mod prelude {
    pub use dview_core::{BindError, Key, List, PropPath, Record, Value};

    #[cfg(feature = "runtime")]
    pub use dview_runtime::{
        ArrayModel, Callback, EachOptions, Entity, Model, ObjectModel, View, ViewOptions,
        bind_each,
    };
}
