//! Runnable stacks produced when a config is committed.

use std::fmt;

use super::{ArrayStack, Entry, MiddlewareStack, RackStack, StatefulStack, Terminal};
use crate::config::StackBackend;
use crate::error::Error;

/// A frozen stack on the backend chosen by [`StackBackend`].
pub enum CompiledStack<Env, Out> {
    Rack(RackStack<Env, Out>),
    Stateful(StatefulStack<Env, Out>),
}

impl<Env: 'static, Out: 'static> CompiledStack<Env, Out> {
    #[must_use]
    pub fn compile(stack: &ArrayStack<Env, Out>, backend: StackBackend) -> Self {
        match backend {
            StackBackend::Rack => CompiledStack::Rack(RackStack::new(stack.to_vec())),
            StackBackend::Stateful => CompiledStack::Stateful(StatefulStack::new(stack.to_vec())),
        }
    }

    #[must_use]
    pub fn backend(&self) -> StackBackend {
        match self {
            CompiledStack::Rack(_) => StackBackend::Rack,
            CompiledStack::Stateful(_) => StackBackend::Stateful,
        }
    }

    /// Runs `env` through the stack, ending in `terminal`.
    ///
    /// Stateful stacks are duplicated per invocation, so a method may call
    /// itself (or be called from several threads) through the same chain.
    ///
    /// # Errors
    ///
    /// Propagates errors raised by any middleware or the terminal.
    pub fn call(&self, env: Env, terminal: Terminal<'_, Env, Out>) -> Result<Out, Error> {
        match self {
            CompiledStack::Rack(stack) => stack.call(env, terminal),
            CompiledStack::Stateful(stack) => stack.dup().call(env, terminal),
        }
    }
}

impl<Env: 'static, Out: 'static> MiddlewareStack<Env, Out> for CompiledStack<Env, Out> {
    fn entries(&self) -> &[Entry<Env, Out>] {
        match self {
            CompiledStack::Rack(stack) => stack.entries(),
            CompiledStack::Stateful(stack) => stack.entries(),
        }
    }

    fn entries_mut(&mut self) -> &mut Vec<Entry<Env, Out>> {
        match self {
            CompiledStack::Rack(stack) => stack.entries_mut(),
            CompiledStack::Stateful(stack) => stack.entries_mut(),
        }
    }
}

impl<Env: 'static, Out: 'static> fmt::Debug for CompiledStack<Env, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompiledStack::Rack(stack) => fmt::Debug::fmt(stack, f),
            CompiledStack::Stateful(stack) => fmt::Debug::fmt(stack, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::super::test_support::*;
    use super::*;

    fn pick(choice: u8) -> Entry<Probe, i64> {
        match choice {
            0 => entry(First),
            1 => entry(Second),
            _ => entry(Third),
        }
    }

    #[test]
    fn compile_keeps_order_and_backend() {
        let mut array = ArrayStack::new();
        array.push(entry(First)).push(entry(Second));

        let rack = CompiledStack::compile(&array, StackBackend::Rack);
        let stateful = CompiledStack::compile(&array, StackBackend::Stateful);
        assert_eq!(rack.backend(), StackBackend::Rack);
        assert_eq!(stateful.backend(), StackBackend::Stateful);
        assert_eq!(rack.ids(), array.ids());
        assert_eq!(stateful.ids(), array.ids());
    }

    #[test]
    fn compiled_stateful_stack_is_reentrant() {
        let mut array = ArrayStack::new();
        array.push(entry(First));
        let stack = Arc::new(CompiledStack::compile(&array, StackBackend::Stateful));

        let inner = Arc::clone(&stack);
        let nested = move |env: Probe| -> Result<i64, Error> {
            if env.x >= 100 {
                return Ok(env.x);
            }
            inner.call(env, &terminal)
        };
        assert_eq!(stack.call(Probe::new(1), &nested).unwrap(), 100);
    }

    proptest! {
        #[test]
        fn backends_agree_on_order_and_threading(
            choices in proptest::collection::vec(0u8..3, 0..6),
            x in -100i64..100,
        ) {
            let mut array = ArrayStack::new();
            for choice in &choices {
                array.push(pick(*choice));
            }

            let mut outcomes = Vec::new();
            for backend in [StackBackend::Rack, StackBackend::Stateful] {
                let stack = CompiledStack::compile(&array, backend);
                let terminal_calls = AtomicUsize::new(0);
                let counted = |env: Probe| {
                    terminal_calls.fetch_add(1, Ordering::SeqCst);
                    terminal(env)
                };
                let probe = Probe::new(x);
                let out = stack.call(probe.clone(), &counted).unwrap();
                let log = probe.log.lock().clone();
                outcomes.push((out, log, terminal_calls.load(Ordering::SeqCst)));
            }

            prop_assert_eq!(&outcomes[0], &outcomes[1]);
            prop_assert_eq!(outcomes[0].2, 1);
            prop_assert_eq!(outcomes[0].1.len(), choices.len() + 1);
        }
    }
}
