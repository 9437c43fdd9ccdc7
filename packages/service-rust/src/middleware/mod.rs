//! Middleware stacks wrapped around method calls.
//!
//! - [`custom`]: array-backed stack, a plain ordered collection
//! - [`rack`]: nested closures built with `tower::Layer`
//! - [`stateful`]: cursor-based runner advancing an index per call
//! - [`compiled`]: the runnable backend chosen at commit time
//!
//! All stacks share the [`MiddlewareStack`] contract. In every backend the
//! first entry is the outermost middleware, and the terminal (the original
//! method) runs after the last entry calls [`Chain::next`].

pub mod compiled;
pub mod custom;
pub mod rack;
pub mod stateful;

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{raise, Error};

pub use compiled::CompiledStack;
pub use custom::ArrayStack;
pub use rack::RackStack;
pub use stateful::StatefulStack;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum IdKind {
    Type(TypeId),
    Instance(u64),
}

/// Identity of a middleware inside a stack.
///
/// Middleware types are identified by their type, closures wrapped in
/// [`FnMiddleware`] by their instance.
#[derive(Clone, Copy)]
pub struct MiddlewareId {
    kind: IdKind,
    name: &'static str,
}

impl MiddlewareId {
    /// Identity of a middleware type.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            kind: IdKind::Type(TypeId::of::<T>()),
            name: std::any::type_name::<T>(),
        }
    }

    /// A fresh identity, distinct from every other.
    #[must_use]
    pub fn unique(name: &'static str) -> Self {
        Self {
            kind: IdKind::Instance(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)),
            name,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for MiddlewareId {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for MiddlewareId {}

impl fmt::Debug for MiddlewareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ---------------------------------------------------------------------------
// Middleware + Chain
// ---------------------------------------------------------------------------

/// Behavior composed around a call.
///
/// `call` receives the packaged call (`env`) and the continuation. Calling
/// `chain.next(env)` runs the rest of the stack; returning without calling it
/// short-circuits the chain.
pub trait Middleware<Env, Out>: Send + Sync + 'static {
    fn id(&self) -> MiddlewareId {
        MiddlewareId::of::<Self>()
    }

    /// Runs the middleware.
    ///
    /// # Errors
    ///
    /// Propagates errors from the rest of the chain or raised by the middleware.
    fn call(&self, env: Env, chain: Chain<'_, Env, Out>) -> Result<Out, Error>;
}

/// Shared handle to a middleware stored in a stack.
pub type Entry<Env, Out> = Arc<dyn Middleware<Env, Out>>;

/// Terminal handler invoked after the last middleware.
pub type Terminal<'t, Env, Out> = &'t dyn Fn(Env) -> Result<Out, Error>;

/// The part of a chain that runs after the current middleware.
pub trait Next<Env, Out> {
    /// Runs the rest of the chain.
    ///
    /// # Errors
    ///
    /// Propagates errors raised further down the chain.
    fn next(&self, env: Env) -> Result<Out, Error>;
}

/// Continuation handed to a middleware.
pub struct Chain<'a, Env, Out> {
    rest: &'a dyn Next<Env, Out>,
}

impl<'a, Env, Out> Chain<'a, Env, Out> {
    pub fn new(rest: &'a dyn Next<Env, Out>) -> Self {
        Self { rest }
    }

    /// Continues with the next middleware, or the terminal after the last one.
    ///
    /// # Errors
    ///
    /// Propagates errors raised further down the chain.
    pub fn next(&self, env: Env) -> Result<Out, Error> {
        self.rest.next(env)
    }
}

impl<Env, Out> Clone for Chain<'_, Env, Out> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Env, Out> Copy for Chain<'_, Env, Out> {}

pub(crate) struct TerminalNext<'t, Env, Out>(pub(crate) Terminal<'t, Env, Out>);

impl<Env, Out> Next<Env, Out> for TerminalNext<'_, Env, Out> {
    fn next(&self, env: Env) -> Result<Out, Error> {
        (self.0)(env)
    }
}

// ---------------------------------------------------------------------------
// FnMiddleware
// ---------------------------------------------------------------------------

/// Middleware backed by a closure. Each instance has its own identity.
pub struct FnMiddleware<F, Env, Out> {
    id: MiddlewareId,
    body: F,
    _marker: PhantomData<fn(Env) -> Out>,
}

impl<F, Env, Out> FnMiddleware<F, Env, Out>
where
    F: for<'c> Fn(Env, Chain<'c, Env, Out>) -> Result<Out, Error> + Send + Sync + 'static,
    Env: 'static,
    Out: 'static,
{
    pub fn new(name: &'static str, body: F) -> Self {
        Self {
            id: MiddlewareId::unique(name),
            body,
            _marker: PhantomData,
        }
    }

    /// Wraps the closure straight into a stack entry.
    pub fn entry(name: &'static str, body: F) -> Entry<Env, Out> {
        Arc::new(Self::new(name, body))
    }
}

impl<F, Env, Out> Middleware<Env, Out> for FnMiddleware<F, Env, Out>
where
    F: for<'c> Fn(Env, Chain<'c, Env, Out>) -> Result<Out, Error> + Send + Sync + 'static,
    Env: 'static,
    Out: 'static,
{
    fn id(&self) -> MiddlewareId {
        self.id
    }

    fn call(&self, env: Env, chain: Chain<'_, Env, Out>) -> Result<Out, Error> {
        (self.body)(env, chain)
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Where an insert/replace/delete applies: a literal index or the position
/// of a middleware already in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Index(usize),
    Middleware(MiddlewareId),
}

impl From<usize> for Position {
    fn from(index: usize) -> Self {
        Position::Index(index)
    }
}

impl From<MiddlewareId> for Position {
    fn from(id: MiddlewareId) -> Self {
        Position::Middleware(id)
    }
}

impl<Env: 'static, Out: 'static> From<&Entry<Env, Out>> for Position {
    fn from(entry: &Entry<Env, Out>) -> Self {
        Position::Middleware(entry.id())
    }
}

// ---------------------------------------------------------------------------
// MiddlewareStack contract
// ---------------------------------------------------------------------------

/// Ordered, mutable collection of middlewares shared by every backend.
pub trait MiddlewareStack<Env: 'static, Out: 'static> {
    fn entries(&self) -> &[Entry<Env, Out>];

    fn entries_mut(&mut self) -> &mut Vec<Entry<Env, Out>>;

    /// Appends a middleware (the innermost position).
    fn push(&mut self, middleware: Entry<Env, Out>) -> &mut Self {
        self.entries_mut().push(middleware);
        self
    }

    /// Prepends a middleware (the outermost position).
    fn unshift(&mut self, middleware: Entry<Env, Out>) -> &mut Self {
        self.entries_mut().insert(0, middleware);
        self
    }

    /// Inserts `middleware` at `position`, shifting the rest inward.
    ///
    /// # Errors
    ///
    /// Raises `InvalidStackIndex` or `MissingMiddleware` when `position` does
    /// not resolve.
    fn insert(
        &mut self,
        position: impl Into<Position>,
        middleware: Entry<Env, Out>,
    ) -> Result<&mut Self, Error> {
        let index = self.cast_insert_index(position.into())?;
        self.entries_mut().insert(index, middleware);
        Ok(self)
    }

    /// Same as [`MiddlewareStack::insert`].
    ///
    /// # Errors
    ///
    /// See [`MiddlewareStack::insert`].
    fn insert_before(
        &mut self,
        position: impl Into<Position>,
        middleware: Entry<Env, Out>,
    ) -> Result<&mut Self, Error> {
        self.insert(position, middleware)
    }

    /// Inserts `middleware` right after `position`.
    ///
    /// # Errors
    ///
    /// Raises `InvalidStackIndex` or `MissingMiddleware` when `position` does
    /// not resolve to an existing entry.
    fn insert_after(
        &mut self,
        position: impl Into<Position>,
        middleware: Entry<Env, Out>,
    ) -> Result<&mut Self, Error> {
        let index = self.cast_index(position.into())?;
        self.entries_mut().insert(index + 1, middleware);
        Ok(self)
    }

    /// Replaces the entry at `position`.
    ///
    /// # Errors
    ///
    /// Raises `InvalidStackIndex` or `MissingMiddleware` when `position` does
    /// not resolve to an existing entry.
    fn replace(
        &mut self,
        position: impl Into<Position>,
        middleware: Entry<Env, Out>,
    ) -> Result<&mut Self, Error> {
        let index = self.cast_index(position.into())?;
        self.entries_mut()[index] = middleware;
        Ok(self)
    }

    /// Removes and returns the entry at `position`.
    ///
    /// # Errors
    ///
    /// Raises `InvalidStackIndex` or `MissingMiddleware` when `position` does
    /// not resolve to an existing entry.
    fn delete(&mut self, position: impl Into<Position>) -> Result<Entry<Env, Out>, Error> {
        let index = self.cast_index(position.into())?;
        Ok(self.entries_mut().remove(index))
    }

    /// Identity-based membership (`has?`).
    fn contains(&self, id: MiddlewareId) -> bool {
        self.entries().iter().any(|entry| entry.id() == id)
    }

    fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn ids(&self) -> Vec<MiddlewareId> {
        self.entries().iter().map(|entry| entry.id()).collect()
    }

    /// Entries in call order (`to_a`).
    fn to_vec(&self) -> Vec<Entry<Env, Out>> {
        self.entries().to_vec()
    }

    /// Resolves `position` to the index of an existing entry.
    ///
    /// # Errors
    ///
    /// Raises `InvalidStackIndex` for an index past the last entry and
    /// `MissingMiddleware` for a middleware that is not in the stack.
    fn cast_index(&self, position: Position) -> Result<usize, Error> {
        match position {
            Position::Index(index) if index < self.len() => Ok(index),
            Position::Index(index) => Err(raise(Error::InvalidStackIndex {
                index,
                len: self.len(),
            })),
            Position::Middleware(id) => self
                .entries()
                .iter()
                .position(|entry| entry.id() == id)
                .ok_or_else(|| {
                    raise(Error::MissingMiddleware {
                        middleware: id.name().to_string(),
                    })
                }),
        }
    }

    /// Like [`MiddlewareStack::cast_index`], but an index equal to the length
    /// (append position) is accepted.
    ///
    /// # Errors
    ///
    /// See [`MiddlewareStack::cast_index`].
    fn cast_insert_index(&self, position: Position) -> Result<usize, Error> {
        match position {
            Position::Index(index) if index == self.len() => Ok(index),
            other => self.cast_index(other),
        }
    }
}

pub(crate) fn same_ids<Env: 'static, Out: 'static>(
    a: &[Entry<Env, Out>],
    b: &[Entry<Env, Out>],
) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.id() == y.id())
}

pub(crate) fn debug_entries<Env: 'static, Out: 'static>(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    entries: &[Entry<Env, Out>],
) -> fmt::Result {
    f.debug_tuple(name)
        .field(&entries.iter().map(|entry| entry.id()).collect::<Vec<_>>())
        .finish()
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn type_identity_is_stable() {
        assert_eq!(entry(First).id(), MiddlewareId::of::<First>());
        assert_ne!(entry(First).id(), entry(Second).id());
    }

    #[test]
    fn fn_middlewares_have_instance_identity() {
        let a = FnMiddleware::entry("a", |env: Probe, chain: Chain<'_, Probe, i64>| chain.next(env));
        let b = FnMiddleware::entry("a", |env: Probe, chain: Chain<'_, Probe, i64>| chain.next(env));
        assert_eq!(a.id(), a.id());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().name(), "a");
    }

    #[test]
    fn position_conversions() {
        assert_eq!(Position::from(2), Position::Index(2));
        let first = entry(First);
        assert_eq!(
            Position::from(&first),
            Position::Middleware(MiddlewareId::of::<First>())
        );
    }
}
