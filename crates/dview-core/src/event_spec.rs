#![forbid(unsafe_code)]

//! Parsed subscription specs.
//!
//! An event spec string is one or more whitespace-separated names. Each name
//! is parsed once, at subscription time, into an [`EventSpec`]:
//!
//! | Spec | Kind | Meaning |
//! |------|------|---------|
//! | `>` | [`SpecKind::Now`] | call the handler immediately, register nothing |
//! | `change` | [`SpecKind::Event`] | plain event name |
//! | `=x.y` | [`SpecKind::Current`] | fire now with the value of `x.y`, then on every change |
//! | `/x.y` | [`SpecKind::Watch`] | fire on every change of `x.y` |
//! | `@x.y` | [`SpecKind::WatchNow`] | fire now, then on every change of `x.y` |
//! | `!...` | any of the above with `negate` | deliver the negated value |
//!
//! A negated bare name without `/` (`!flag`) parses as a negated plain
//! event. Entities that own a `flag` slot read it as the property watch
//! `!/flag` instead; see [`EventSpec::negated_name`].

use crate::error::{BindError, Result};
use crate::path::PropPath;

/// What a single spec subscribes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpecKind {
    Now,
    Event(String),
    Current(PropPath),
    Watch(PropPath),
    WatchNow(PropPath),
}

/// A single parsed spec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventSpec {
    pub kind: SpecKind,
    pub negate: bool,
}

impl EventSpec {
    /// Parse one event name.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw == ">" {
            return Ok(Self {
                kind: SpecKind::Now,
                negate: false,
            });
        }

        let (negate, rest) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        if rest.is_empty() {
            return Err(BindError::EmptyEventSpec);
        }

        let kind = match rest.as_bytes()[0] {
            b'=' => SpecKind::Current(parse_path(&rest[1..])?),
            b'/' => SpecKind::Watch(parse_path(&rest[1..])?),
            b'@' => SpecKind::WatchNow(parse_path(&rest[1..])?),
            _ => SpecKind::Event(rest.to_owned()),
        };

        Ok(Self { kind, negate })
    }

    /// Parse a whitespace-separated list of names.
    pub fn parse_all(spec: &str) -> Result<Vec<Self>> {
        let specs = split_events(spec)
            .map(Self::parse)
            .collect::<Result<Vec<_>>>()?;
        if specs.is_empty() {
            return Err(BindError::EmptyEventSpec);
        }
        Ok(specs)
    }

    /// The property path this spec reads, if any.
    #[must_use]
    pub fn path(&self) -> Option<&PropPath> {
        match &self.kind {
            SpecKind::Current(path) | SpecKind::Watch(path) | SpecKind::WatchNow(path) => {
                Some(path)
            }
            SpecKind::Now | SpecKind::Event(_) => None,
        }
    }

    /// The name of a negated plain event without `/`, which an entity may
    /// read as a watch on its own slot of that name.
    #[must_use]
    pub fn negated_name(&self) -> Option<&str> {
        match &self.kind {
            SpecKind::Event(name) if self.negate && !name.contains('/') => Some(name),
            _ => None,
        }
    }

    /// Whether registration delivers the current value immediately.
    #[must_use]
    pub fn fires_now(&self) -> bool {
        matches!(self.kind, SpecKind::Current(_) | SpecKind::WatchNow(_))
    }
}

/// Split a spec string into individual names.
pub fn split_events(spec: &str) -> impl Iterator<Item = &str> {
    spec.split_whitespace()
}

fn parse_path(raw: &str) -> Result<PropPath> {
    let path = PropPath::from(raw);
    if path.is_empty() {
        return Err(BindError::EmptyEventSpec);
    }
    Ok(path)
}
