//! Rack-style backend: every middleware wraps the rest of the stack.
//!
//! The stack is folded into nested [`Next`] values through [`tower::Layer`],
//! innermost first, so the first entry ends up outermost. Nothing is shared
//! between invocations, so a rack stack can run concurrently and reentrantly.

use std::fmt;
use std::sync::Arc;

use tower::Layer;

use super::{debug_entries, same_ids, Chain, Entry, MiddlewareStack, Next, Terminal, TerminalNext};
use crate::error::Error;

type BoxNext<'t, Env, Out> = Box<dyn Next<Env, Out> + 't>;

/// One middleware bound to the rest of the chain.
struct Layered<'t, Env, Out> {
    middleware: Entry<Env, Out>,
    inner: BoxNext<'t, Env, Out>,
}

impl<Env: 'static, Out: 'static> Next<Env, Out> for Layered<'_, Env, Out> {
    fn next(&self, env: Env) -> Result<Out, Error> {
        self.middleware.call(env, Chain::new(self.inner.as_ref()))
    }
}

struct MiddlewareLayer<Env, Out>(Entry<Env, Out>);

impl<'t, Env: 'static, Out: 'static> Layer<BoxNext<'t, Env, Out>> for MiddlewareLayer<Env, Out> {
    type Service = BoxNext<'t, Env, Out>;

    fn layer(&self, inner: BoxNext<'t, Env, Out>) -> Self::Service {
        Box::new(Layered {
            middleware: Arc::clone(&self.0),
            inner,
        })
    }
}

/// Stack that builds a fresh nest of layers for every call.
pub struct RackStack<Env, Out> {
    entries: Vec<Entry<Env, Out>>,
}

impl<Env: 'static, Out: 'static> RackStack<Env, Out> {
    #[must_use]
    pub fn new(entries: Vec<Entry<Env, Out>>) -> Self {
        Self { entries }
    }

    /// Runs `env` through the stack, ending in `terminal`.
    ///
    /// # Errors
    ///
    /// Propagates errors raised by any middleware or the terminal.
    pub fn call(&self, env: Env, terminal: Terminal<'_, Env, Out>) -> Result<Out, Error> {
        self.build(terminal).next(env)
    }

    fn build<'t>(&self, terminal: Terminal<'t, Env, Out>) -> BoxNext<'t, Env, Out> {
        let innermost: BoxNext<'t, Env, Out> = Box::new(TerminalNext(terminal));
        self.entries.iter().rev().fold(innermost, |inner, entry| {
            MiddlewareLayer(Arc::clone(entry)).layer(inner)
        })
    }
}

impl<Env: 'static, Out: 'static> MiddlewareStack<Env, Out> for RackStack<Env, Out> {
    fn entries(&self) -> &[Entry<Env, Out>] {
        &self.entries
    }

    fn entries_mut(&mut self) -> &mut Vec<Entry<Env, Out>> {
        &mut self.entries
    }
}

impl<Env, Out> Clone for RackStack<Env, Out> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<Env: 'static, Out: 'static> PartialEq for RackStack<Env, Out> {
    fn eq(&self, other: &Self) -> bool {
        same_ids(&self.entries, &other.entries)
    }
}

impl<Env: 'static, Out: 'static> fmt::Debug for RackStack<Env, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_entries(f, "RackStack", &self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::FnMiddleware;
    use super::*;

    #[test]
    fn first_entry_is_outermost() {
        let stack = RackStack::new(vec![entry(First), entry(Second), entry(Third)]);
        let probe = Probe::new(1);
        let out = stack.call(probe.clone(), &terminal).unwrap();

        assert_eq!(out, 1000);
        assert_eq!(
            *probe.log.lock(),
            vec!["First", "Second", "Third", "terminal"]
        );
    }

    #[test]
    fn empty_stack_calls_terminal() {
        let stack = RackStack::<Probe, i64>::new(Vec::new());
        assert_eq!(stack.call(Probe::new(5), &terminal).unwrap(), 5);
    }

    #[test]
    fn halting_middleware_skips_the_rest() {
        let stack = RackStack::new(vec![entry(First), entry(Halt), entry(Second)]);
        let probe = Probe::new(1);
        assert_eq!(stack.call(probe.clone(), &terminal).unwrap(), -1);
        assert_eq!(*probe.log.lock(), vec!["First", "Halt"]);
    }

    #[test]
    fn middleware_sees_the_value_returned_by_next() {
        let doubling = FnMiddleware::entry("double", |env: Probe, chain: Chain<'_, Probe, i64>| {
            Ok(chain.next(env)? * 2)
        });
        let stack = RackStack::new(vec![doubling, entry(First)]);
        assert_eq!(stack.call(Probe::new(3), &terminal).unwrap(), 60);
    }

    #[test]
    fn reentrant_calls_are_independent() {
        let stack = Arc::new(RackStack::new(vec![entry(First)]));
        let inner_stack = Arc::clone(&stack);
        let nested = move |env: Probe| -> Result<i64, Error> {
            let inner = inner_stack.call(Probe::new(env.x), &terminal)?;
            Ok(env.x + inner)
        };
        assert_eq!(stack.call(Probe::new(1), &nested).unwrap(), 10 + 100);
    }
}
