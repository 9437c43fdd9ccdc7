//! Framework error taxonomy and the central raise indirection.
//!
//! Every framework error is created through [`raise`], which logs it and
//! notifies the observers registered on the current thread. Business
//! outcomes (a step failing, a service returning `failure`) are never
//! errors; they travel as [`ServiceResult`](convenient_core::ServiceResult)
//! statuses.

use std::cell::{Cell, RefCell};

use convenient_core::ResultError;

/// Errors raised for programmer or configuration mistakes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config of `{service}` is committed, it can NOT be modified")]
    ConfigCommitted { service: String },

    #[error("Config of `{service}` is NOT committed, call `commit_config` before invoking it")]
    ConfigNotCommitted { service: String },

    #[error("Middleware `{middleware}` is NOT found in the stack")]
    MissingMiddleware { middleware: String },

    #[error("Index {index} is out of bounds for a stack of {len} middlewares")]
    InvalidStackIndex { index: usize, len: usize },

    #[error("Middleware stack is already running, a stack can NOT be invoked concurrently")]
    StackInUse,

    #[error("Around callback chain is NOT continued from `{location}`")]
    AroundCallbackChainNotContinued { location: String },

    #[error("Around callback chain is already continued, it can be continued only once")]
    AroundCallbackChainAlreadyContinued,

    #[error("Step action `{action}` of `{service}` does NOT resolve to any method")]
    StepActionNotFound { service: String, action: String },

    #[error("Method `{method}` is NOT defined in `{service}`")]
    MethodNotDefined { service: String, method: String },

    #[error("Attribute `{attribute}` is NOT defined in `{service}`")]
    AttributeNotFound { service: String, attribute: String },

    #[error("Missing keyword argument `{argument}` for `{service}#{method}`")]
    MissingArgument {
        service: String,
        method: String,
        argument: String,
    },

    #[error("Step {step_index} of `{service}` returned no `{key}` output")]
    MissingStepOutput {
        service: String,
        step_index: usize,
        key: String,
    },

    #[error("Step index {index} is out of range, `{service}` has {len} steps")]
    InvalidStepIndex {
        service: String,
        index: usize,
        len: usize,
    },

    #[error("`{service}` does NOT define a fallback result `{method}`")]
    FallbackNotDefined { service: String, method: String },

    #[error("Module `{module}` can NOT export dependencies")]
    NotExportableModule { module: String },

    #[error("Scope `{scope}` is NOT valid, expected `instance` or `class`")]
    InvalidScope { scope: String },

    #[error("`{slug}` with scope `{scope}` is NOT exported from `{module}`")]
    NotExportedMethod {
        module: String,
        slug: String,
        scope: String,
    },

    #[error(transparent)]
    Result(#[from] ResultError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

// ---------------------------------------------------------------------------
// Raise indirection
// ---------------------------------------------------------------------------

type Observer = Box<dyn Fn(&Error)>;

thread_local! {
    static OBSERVERS: RefCell<Vec<(u64, Observer)>> = const { RefCell::new(Vec::new()) };
    static NEXT_OBSERVER_ID: Cell<u64> = const { Cell::new(0) };
}

/// Single choke point for framework errors.
///
/// Returns the error unchanged so call sites read `Err(raise(Error::...))`.
pub fn raise(error: Error) -> Error {
    tracing::warn!(error = %error, "framework error raised");
    OBSERVERS.with(|observers| {
        for (_, observer) in observers.borrow().iter() {
            observer(&error);
        }
    });
    error
}

/// Registers `observer` for errors raised on the current thread until the
/// returned guard is dropped.
pub fn observe_raised<F>(observer: F) -> RaiseObserverGuard
where
    F: Fn(&Error) + 'static,
{
    let id = NEXT_OBSERVER_ID.with(|next| {
        next.set(next.get() + 1);
        next.get()
    });
    OBSERVERS.with(|observers| observers.borrow_mut().push((id, Box::new(observer))));
    RaiseObserverGuard { id }
}

/// Unregisters its observer on drop.
#[must_use = "the observer is removed as soon as the guard is dropped"]
pub struct RaiseObserverGuard {
    id: u64,
}

impl Drop for RaiseObserverGuard {
    fn drop(&mut self) {
        let id = self.id;
        OBSERVERS.with(|observers| observers.borrow_mut().retain(|(other, _)| *other != id));
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    #[test]
    fn observers_see_raised_errors() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let guard = observe_raised({
            let seen = Rc::clone(&seen);
            move |err| seen.borrow_mut().push(err.to_string())
        });

        let err = raise(Error::StackInUse);
        assert!(matches!(err, Error::StackInUse));
        assert_eq!(seen.borrow().len(), 1);

        drop(guard);
        let _ = raise(Error::StackInUse);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn around_message_embeds_location() {
        let err = Error::AroundCallbackChainNotContinued {
            location: "src/service.rs:12".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Around callback chain is NOT continued from `src/service.rs:12`"
        );
    }
}
