//! Stateful backend: a cursor advances through the stack on every `next`.
//!
//! The cursor lives on the stack itself, so one instance runs one call at a
//! time. A second call while the first is in flight raises
//! [`Error::StackInUse`]; callers that need concurrency run a [`dup`] per
//! invocation.
//!
//! [`dup`]: StatefulStack::dup

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};

use super::{debug_entries, same_ids, Chain, Entry, MiddlewareStack, Next, Terminal};
use crate::error::{raise, Error};

pub struct StatefulStack<Env, Out> {
    entries: Vec<Entry<Env, Out>>,
    index: AtomicIsize,
    running: AtomicBool,
}

impl<Env: 'static, Out: 'static> StatefulStack<Env, Out> {
    #[must_use]
    pub fn new(entries: Vec<Entry<Env, Out>>) -> Self {
        Self {
            entries,
            index: AtomicIsize::new(-1),
            running: AtomicBool::new(false),
        }
    }

    /// Copy with the same entries and a fresh cursor.
    #[must_use]
    pub fn dup(&self) -> Self {
        Self::new(self.entries.clone())
    }

    /// Runs `env` through the stack, ending in `terminal`.
    ///
    /// # Errors
    ///
    /// Raises [`Error::StackInUse`] when this instance is already running and
    /// propagates errors raised by any middleware or the terminal.
    pub fn call(&self, env: Env, terminal: Terminal<'_, Env, Out>) -> Result<Out, Error> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(raise(Error::StackInUse));
        }
        let _reset = ResetGuard { stack: self };
        self.index.store(-1, Ordering::Release);

        Cursor {
            stack: self,
            terminal,
        }
        .next(env)
    }
}

/// Rewinds the cursor once the call unwinds, whatever the outcome.
struct ResetGuard<'s, Env, Out> {
    stack: &'s StatefulStack<Env, Out>,
}

impl<Env, Out> Drop for ResetGuard<'_, Env, Out> {
    fn drop(&mut self) {
        self.stack.index.store(-1, Ordering::Release);
        self.stack.running.store(false, Ordering::Release);
    }
}

struct Cursor<'s, 't, Env, Out> {
    stack: &'s StatefulStack<Env, Out>,
    terminal: Terminal<'t, Env, Out>,
}

impl<Env: 'static, Out: 'static> Next<Env, Out> for Cursor<'_, '_, Env, Out> {
    fn next(&self, env: Env) -> Result<Out, Error> {
        let index = self.stack.index.fetch_add(1, Ordering::AcqRel) + 1;
        let entry = usize::try_from(index)
            .ok()
            .and_then(|index| self.stack.entries.get(index));
        match entry {
            Some(middleware) => middleware.call(env, Chain::new(self)),
            None => (self.terminal)(env),
        }
    }
}

impl<Env: 'static, Out: 'static> MiddlewareStack<Env, Out> for StatefulStack<Env, Out> {
    fn entries(&self) -> &[Entry<Env, Out>] {
        &self.entries
    }

    fn entries_mut(&mut self) -> &mut Vec<Entry<Env, Out>> {
        &mut self.entries
    }
}

impl<Env: 'static, Out: 'static> Clone for StatefulStack<Env, Out> {
    fn clone(&self) -> Self {
        self.dup()
    }
}

impl<Env: 'static, Out: 'static> PartialEq for StatefulStack<Env, Out> {
    fn eq(&self, other: &Self) -> bool {
        same_ids(&self.entries, &other.entries)
    }
}

impl<Env: 'static, Out: 'static> fmt::Debug for StatefulStack<Env, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_entries(f, "StatefulStack", &self.entries)
    }
}
