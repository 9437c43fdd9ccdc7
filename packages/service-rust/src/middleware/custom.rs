//! Array-backed stack: a mutable ordered collection with no runner of its own.
//!
//! Configuration code builds these; commit turns them into a runnable
//! [`CompiledStack`](super::CompiledStack).

use std::fmt;

use super::{debug_entries, same_ids, Entry, MiddlewareStack};

/// Plain ordered list of middlewares.
pub struct ArrayStack<Env, Out> {
    entries: Vec<Entry<Env, Out>>,
}

impl<Env: 'static, Out: 'static> ArrayStack<Env, Out> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_entries(entries: Vec<Entry<Env, Out>>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<Entry<Env, Out>> {
        self.entries
    }
}

impl<Env: 'static, Out: 'static> MiddlewareStack<Env, Out> for ArrayStack<Env, Out> {
    fn entries(&self) -> &[Entry<Env, Out>] {
        &self.entries
    }

    fn entries_mut(&mut self) -> &mut Vec<Entry<Env, Out>> {
        &mut self.entries
    }
}

impl<Env: 'static, Out: 'static> Default for ArrayStack<Env, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Env, Out> Clone for ArrayStack<Env, Out> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<Env: 'static, Out: 'static> PartialEq for ArrayStack<Env, Out> {
    fn eq(&self, other: &Self) -> bool {
        same_ids(&self.entries, &other.entries)
    }
}

impl<Env: 'static, Out: 'static> fmt::Debug for ArrayStack<Env, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_entries(f, "ArrayStack", &self.entries)
    }
}
