//! Before/after/around callbacks registered per method.
//!
//! Callbacks are collected while a class is configured and compiled, at
//! commit, into one [`CallbacksMiddleware`] per method.

mod middleware;

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use convenient_core::{Arguments, ServiceResult};

use crate::error::{raise, Error};
use crate::service::ServiceInstance;

pub use middleware::{CallbacksConcern, CallbacksMiddleware};

pub type BeforeFn = Arc<dyn Fn(&ServiceInstance, &Arguments) -> Result<(), Error> + Send + Sync>;
pub type AfterFn =
    Arc<dyn Fn(&ServiceInstance, &ServiceResult, &Arguments) -> Result<(), Error> + Send + Sync>;
pub type AroundFn =
    Arc<dyn Fn(&ServiceInstance, &AroundChain<'_>, &Arguments) -> Result<(), Error> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Before,
    After,
    Around,
}

#[derive(Clone)]
pub enum CallbackBody {
    Before(BeforeFn),
    After(AfterFn),
    Around(AroundFn),
}

impl CallbackBody {
    #[must_use]
    pub fn kind(&self) -> CallbackKind {
        match self {
            CallbackBody::Before(_) => CallbackKind::Before,
            CallbackBody::After(_) => CallbackKind::After,
            CallbackBody::Around(_) => CallbackKind::Around,
        }
    }
}

/// One registered callback with the source location it was declared at.
#[derive(Clone)]
pub struct Callback {
    method: String,
    location: String,
    body: CallbackBody,
}

impl Callback {
    pub fn new(method: impl Into<String>, location: impl Into<String>, body: CallbackBody) -> Self {
        Self {
            method: method.into(),
            location: location.into(),
            body,
        }
    }

    #[must_use]
    pub fn kind(&self) -> CallbackKind {
        self.body.kind()
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Declaration site as `file:line`.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub fn body(&self) -> &CallbackBody {
        &self.body
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("kind", &self.kind())
            .field("method", &self.method)
            .field("location", &self.location)
            .finish()
    }
}

/// Callbacks of a class in registration order.
#[derive(Debug, Clone, Default)]
pub struct CallbackCollection {
    callbacks: Vec<Arc<Callback>>,
}

impl CallbackCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, callback: Callback) {
        self.callbacks.push(Arc::new(callback));
    }

    /// Callbacks of `kind` for `method`, in registration order.
    #[must_use]
    pub fn for_method(&self, kind: CallbackKind, method: &str) -> Vec<Arc<Callback>> {
        self.callbacks
            .iter()
            .filter(|callback| callback.kind() == kind && callback.method() == method)
            .cloned()
            .collect()
    }

    /// Methods that have at least one callback.
    #[must_use]
    pub fn methods(&self) -> BTreeSet<String> {
        self.callbacks
            .iter()
            .map(|callback| callback.method().to_string())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

pub(crate) type Continuation<'a> = Box<dyn FnOnce() -> Result<ServiceResult, Error> + 'a>;

/// Continuation handed to an around callback.
///
/// [`AroundChain::yield_`] runs the next around callback, or the method
/// itself for the innermost one. It may be called only once.
pub struct AroundChain<'a> {
    continuation: RefCell<Option<Continuation<'a>>>,
    value: RefCell<Option<ServiceResult>>,
}

impl<'a> AroundChain<'a> {
    pub(crate) fn new(continuation: Continuation<'a>) -> Self {
        Self {
            continuation: RefCell::new(Some(continuation)),
            value: RefCell::new(None),
        }
    }

    /// Continues the chain and returns the method's value.
    ///
    /// # Errors
    ///
    /// Propagates errors raised further down the chain. A second call raises
    /// [`Error::AroundCallbackChainAlreadyContinued`].
    pub fn yield_(&self) -> Result<ServiceResult, Error> {
        let continuation = self.continuation.borrow_mut().take();
        let Some(continuation) = continuation else {
            return Err(raise(Error::AroundCallbackChainAlreadyContinued));
        };
        let value = continuation()?;
        *self.value.borrow_mut() = Some(value.clone());
        Ok(value)
    }

    #[must_use]
    pub fn is_continued(&self) -> bool {
        self.continuation.borrow().is_none()
    }

    /// Value of the chain once the callback declared at `location` returned.
    pub(crate) fn finish(self, location: &str) -> Result<ServiceResult, Error> {
        if !self.is_continued() {
            return Err(raise(Error::AroundCallbackChainNotContinued {
                location: location.to_string(),
            }));
        }
        self.value.into_inner().ok_or_else(|| {
            raise(Error::Internal(anyhow::anyhow!(
                "around callback at `{location}` returned after its chain failed"
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use convenient_core::{ServiceRef, Status};

    use super::*;

    fn value() -> ServiceResult {
        ServiceResult::builder(Status::Success, ServiceRef::new(1, "Around")).build()
    }

    #[test]
    fn second_yield_is_raised() {
        let runs = Cell::new(0);
        let chain = AroundChain::new(Box::new(|| {
            runs.set(runs.get() + 1);
            Ok(value())
        }));
        assert!(!chain.is_continued());
        assert!(chain.yield_().unwrap().is_success());
        assert!(matches!(
            chain.yield_(),
            Err(Error::AroundCallbackChainAlreadyContinued)
        ));
        assert_eq!(runs.get(), 1);
        assert!(chain.finish("here.rs:1").is_ok());
    }

    #[test]
    fn finish_without_yield_names_the_location() {
        let chain = AroundChain::new(Box::new(|| Ok(value())));
        let err = chain.finish("src/services.rs:42").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Around callback chain is NOT continued from `src/services.rs:42`"
        );
    }

    #[test]
    fn collection_filters_by_kind_and_method() {
        let noop_before: BeforeFn = Arc::new(|_: &ServiceInstance, _: &Arguments| Ok(()));
        let noop_after: AfterFn =
            Arc::new(|_: &ServiceInstance, _: &ServiceResult, _: &Arguments| Ok(()));
        let mut collection = CallbackCollection::new();
        collection.push(Callback::new(
            "result",
            "a.rs:1",
            CallbackBody::Before(Arc::clone(&noop_before)),
        ));
        collection.push(Callback::new("result", "a.rs:2", CallbackBody::After(noop_after)));
        collection.push(Callback::new(
            "validate",
            "a.rs:3",
            CallbackBody::Before(noop_before),
        ));

        let befores = collection.for_method(CallbackKind::Before, "result");
        assert_eq!(befores.len(), 1);
        assert_eq!(befores[0].location(), "a.rs:1");
        assert_eq!(
            collection.methods().into_iter().collect::<Vec<_>>(),
            vec!["result".to_string(), "validate".to_string()]
        );
        assert_eq!(collection.len(), 3);
    }
}
