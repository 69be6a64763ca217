#![forbid(unsafe_code)]

//! Identity-keyed wrapper cache.
//!
//! Two index-aligned sequences: `sources` holds raw record/list handles,
//! `targets` holds the wrapper created for each. Lookup is a linear scan by
//! reference identity ([`Value::same`]); caches stay small because only
//! values someone asked a model for are ever wrapped.
//!
//! # Invariants
//!
//! 1. `sources.len() == targets.len()`.
//! 2. No source appears twice (asserted in debug builds on insertion).

use dview_core::{BindError, Result, Value};

use super::model::Model;

/// Initial cache contents for a new view.
#[derive(Clone, Default)]
pub struct WrapperSeed {
    pub sources: Vec<Value>,
    pub targets: Vec<Model>,
}

impl WrapperSeed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one source/wrapper pair.
    pub fn push(&mut self, source: Value, target: Model) {
        self.sources.push(source);
        self.targets.push(target);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.targets.is_empty()
    }

    /// Both halves must have the same length.
    pub fn check(&self) -> Result<()> {
        if self.sources.len() == self.targets.len() {
            Ok(())
        } else {
            Err(BindError::SeedMismatch {
                sources: self.sources.len(),
                targets: self.targets.len(),
            })
        }
    }
}

impl std::fmt::Debug for WrapperSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrapperSeed")
            .field("sources", &self.sources.len())
            .field("targets", &self.targets.len())
            .finish()
    }
}

/// Per-view wrapper cache.
#[derive(Default)]
pub struct WrapperCache {
    sources: Vec<Value>,
    targets: Vec<Model>,
}

impl WrapperCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache pre-populated from `seed`.
    pub fn seeded(seed: WrapperSeed) -> Result<Self> {
        seed.check()?;
        let mut cache = Self::new();
        for (source, target) in seed.sources.into_iter().zip(seed.targets) {
            cache.insert(source, target);
        }
        Ok(cache)
    }

    fn position(&self, source: &Value) -> Option<usize> {
        self.sources.iter().position(|s| s.same(source))
    }

    /// Wrapper cached for `source`.
    #[must_use]
    pub fn get(&self, source: &Value) -> Option<Model> {
        self.position(source).map(|i| self.targets[i].clone())
    }

    #[must_use]
    pub fn contains(&self, source: &Value) -> bool {
        self.position(source).is_some()
    }

    pub fn insert(&mut self, source: Value, target: Model) {
        debug_assert!(
            self.position(&source).is_none(),
            "source {source:?} already has a cached wrapper"
        );
        self.sources.push(source);
        self.targets.push(target);
    }

    /// Remove the entry whose wrapper is `target`.
    pub fn remove_model(&mut self, target: &Model) -> bool {
        match self.targets.iter().position(|t| t.ptr_eq(target)) {
            Some(i) => {
                self.sources.remove(i);
                self.targets.remove(i);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
