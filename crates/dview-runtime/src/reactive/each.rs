#![forbid(unsafe_code)]

//! One item view per list element.
//!
//! [`bind_each`] reconciles a list in the owner's data against a list of
//! child [`View`]s. Each item view gets its own data record built from the
//! element:
//!
//! - with `data_prop`, the element is stored under that key, and record or
//!   list elements share their wrapper with the owner through a seeded
//!   cache;
//! - otherwise record elements are shallow-copied, list elements are copied
//!   under their indices, and primitives are stored under `value`.
//!
//! With `data_index_prop`, the element's position is stored under that key
//! and kept current as the list changes.
//!
//! Item views have the owner as parent. They receive an `added` event once
//! positioned and a `removing` event before they are disposed.

use std::fmt;
use std::rc::Rc;

use dview_core::{BindError, Key, PropPath, Record, Result, Value};
use tracing::{debug, warn};

use super::cache::WrapperSeed;
use super::entity::Entity;
use super::model::{ArrayModel, Model};
use super::reconcile::{EntryLifecycle, Reconciler};
use super::view::{View, ViewOptions};

/// Hook receiving `(owner, item_view, index)`.
pub type ItemHook = Rc<dyn Fn(&View, &View, usize)>;

/// Hook receiving `(owner, item_view, new_index, old_index)`.
pub type MoveHook = Rc<dyn Fn(&View, &View, usize, usize)>;

/// What a factory decided for one element.
pub enum ItemViewChoice {
    /// Build a view from these options plus the element's data.
    Descriptor(ViewOptions),
    /// Use this view as is.
    Instance(View),
}

/// How item views are built.
#[derive(Clone)]
pub enum ItemView {
    Descriptor(ViewOptions),
    /// Called with `(owner, element)` for every element.
    Factory(Rc<dyn Fn(&View, &Value) -> ItemViewChoice>),
}

impl ItemView {
    pub fn factory(f: impl Fn(&View, &Value) -> ItemViewChoice + 'static) -> Self {
        Self::Factory(Rc::new(f))
    }
}

impl Default for ItemView {
    fn default() -> Self {
        Self::Descriptor(ViewOptions::default())
    }
}

impl fmt::Debug for ItemView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Descriptor(options) => f.debug_tuple("Descriptor").field(options).finish(),
            Self::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// Options for [`bind_each`].
#[derive(Clone, Default)]
pub struct EachOptions {
    pub view: ItemView,
    pub data_prop: Option<String>,
    pub data_index_prop: Option<String>,
    pub on_add: Option<ItemHook>,
    pub on_remove: Option<ItemHook>,
    pub on_move: Option<MoveHook>,
}

impl EachOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn view(mut self, view: ItemView) -> Self {
        self.view = view;
        self
    }

    #[must_use]
    pub fn data_prop(mut self, prop: impl Into<String>) -> Self {
        self.data_prop = Some(prop.into());
        self
    }

    #[must_use]
    pub fn data_index_prop(mut self, prop: impl Into<String>) -> Self {
        self.data_index_prop = Some(prop.into());
        self
    }

    #[must_use]
    pub fn on_add(mut self, hook: impl Fn(&View, &View, usize) + 'static) -> Self {
        self.on_add = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn on_remove(mut self, hook: impl Fn(&View, &View, usize) + 'static) -> Self {
        self.on_remove = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn on_move(mut self, hook: impl Fn(&View, &View, usize, usize) + 'static) -> Self {
        self.on_move = Some(Rc::new(hook));
        self
    }

    pub fn validate(&self) -> Result<()> {
        match &self.view {
            ItemView::Descriptor(options) => options.validate(),
            ItemView::Factory(_) => Ok(()),
        }
    }
}

impl fmt::Debug for EachOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EachOptions")
            .field("view", &self.view)
            .field("data_prop", &self.data_prop)
            .field("data_index_prop", &self.data_index_prop)
            .finish_non_exhaustive()
    }
}

/// [`EntryLifecycle`] producing item views.
pub struct EachLifecycle {
    owner: View,
    list: ArrayModel,
    options: EachOptions,
}

impl EachLifecycle {
    #[must_use]
    pub fn options(&self) -> &EachOptions {
        &self.options
    }

    fn build_view(&self, item: &Value, index: usize) -> View {
        let descriptor = match &self.options.view {
            ItemView::Descriptor(options) => options.clone(),
            ItemView::Factory(factory) => match factory(&self.owner, item) {
                ItemViewChoice::Descriptor(options) => options,
                ItemViewChoice::Instance(view) => return view,
            },
        };

        let data = Record::new();
        let mut seed = WrapperSeed::new();
        match &self.options.data_prop {
            Some(prop) => {
                data.insert(prop.clone(), item.clone());
                if let Some(model) = self.list.model_of(item) {
                    seed.push(item.clone(), model);
                }
            }
            None => match item {
                Value::Record(record) => {
                    for (key, value) in record.entries() {
                        data.insert(key, value);
                    }
                }
                Value::List(list) => {
                    for (i, value) in list.to_vec().into_iter().enumerate() {
                        data.insert(i.to_string(), value);
                    }
                }
                other => {
                    data.insert("value", other.clone());
                }
            },
        }
        if let Some(prop) = &self.options.data_index_prop {
            data.insert(prop.clone(), index);
        }

        let item_options = ViewOptions {
            data: Some(data.clone()),
            wrappers: (!seed.is_empty()).then_some(seed),
            factory: None,
        };
        View::with_options(descriptor.merge(&item_options)).unwrap_or_else(|err| {
            warn!(%err, index, "item view options rejected, using a plain view");
            View::new(data)
        })
    }
}

impl EntryLifecycle for EachLifecycle {
    type Entry = View;

    fn create_entry(&self, item: &Value, index: usize) -> View {
        let view = self.build_view(item, index);
        view.set_parent(Some(&self.owner));
        debug!(owner = %self.owner.id(), item_view = %view.id(), index, "item view created");
        view
    }

    fn added(&self, view: &View, index: usize) {
        if let Some(hook) = &self.options.on_add {
            hook(&self.owner, view, index);
        }
        view.trigger("added", &[Value::from(index)]);
    }

    fn removing(&self, view: &View, index: usize) {
        view.trigger("removing", &[Value::from(index)]);
    }

    fn destroy_entry(&self, view: &View, index: usize) {
        if let Some(hook) = &self.options.on_remove {
            hook(&self.owner, view, index);
        }
        view.dispose();
        view.set_parent(None);
    }

    fn reposition_entry(&self, view: &View, index: usize, old: usize) {
        if let Some(hook) = &self.options.on_move {
            hook(&self.owner, view, index, old);
        }
    }

    fn tracks_index(&self) -> bool {
        self.options.data_index_prop.is_some()
    }

    fn stamp_index(&self, view: &View, index: usize) {
        if let Some(prop) = &self.options.data_index_prop {
            view.set_key(&Key::from(prop.as_str()), Value::from(index));
        }
    }
}

/// Keep one item view per element of the list at `path` in `owner`.
///
/// Fails with `NotAList` when `path` holds anything but a list, and with the
/// descriptor's validation error when its options are inconsistent.
pub fn bind_each(
    owner: &View,
    path: impl Into<PropPath>,
    options: EachOptions,
) -> Result<Reconciler<EachLifecycle>> {
    let path = path.into();
    options.validate()?;
    let list = match owner.model(path.clone())? {
        Some(Model::Array(list)) => list,
        _ => {
            return Err(BindError::NotAList {
                path: path.to_string(),
            });
        }
    };

    let lifecycle = EachLifecycle {
        owner: owner.clone(),
        list: list.clone(),
        options,
    };
    Reconciler::bind(owner, &list, lifecycle)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
