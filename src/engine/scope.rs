//! Scope chain.
//!
//! Every recursive pipeline call runs against a [`Scope`]: the data it
//! expands, the iteration specials (`@index` / `@key`) and a link to the
//! enclosing scope. `../` in a path climbs exactly one link.

use crate::value::{Object, Value};

#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub data: &'a Value,
    pub specials: Option<&'a Object>,
    pub parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    /// Outermost scope of a render.
    pub fn root(data: &'a Value) -> Self {
        Scope { data, specials: None, parent: None }
    }

    /// Nested scope over `data`, linked to `self`.
    pub fn child<'b>(&'b self, data: &'b Value, specials: Option<&'b Object>) -> Scope<'b>
    where
        'a: 'b,
    {
        Scope { data, specials, parent: Some(self) }
    }

    /// Same chain position, different data. Used after computed fields have
    /// been flattened into a snapshot.
    pub fn with_data<'b>(&self, data: &'b Value) -> Scope<'b>
    where
        'a: 'b,
    {
        Scope { data, specials: self.specials, parent: self.parent }
    }

    pub fn special(&self, name: &str) -> Option<&'a Value> {
        self.specials.and_then(|s| s.get(name))
    }

    /// Data of the enclosing scope, if any.
    pub fn parent_data(&self) -> Option<&'a Value> {
        self.parent.map(|p| p.data)
    }
}
