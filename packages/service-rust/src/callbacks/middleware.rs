use std::sync::Arc;

use convenient_core::{Arguments, ServiceResult};

use super::{AroundChain, Callback, CallbackBody, CallbackCollection, CallbackKind, Continuation};
use crate::error::Error;
use crate::method_chain::{ClassSetup, Concern, MethodEnv, Scope};
use crate::middleware::{Chain, Middleware, MiddlewareStack};
use crate::service::ServiceInstance;

/// Runs the callbacks of one method around the rest of its chain.
///
/// Before callbacks run in registration order, then around callbacks nest
/// with the first registered outermost, then after callbacks run in reverse
/// registration order with the method's value.
pub struct CallbacksMiddleware {
    method: String,
    before: Vec<Arc<Callback>>,
    around: Vec<Arc<Callback>>,
    after: Vec<Arc<Callback>>,
}

impl CallbacksMiddleware {
    #[must_use]
    pub fn new(method: &str, callbacks: &CallbackCollection) -> Self {
        Self {
            method: method.to_string(),
            before: callbacks.for_method(CallbackKind::Before, method),
            around: callbacks.for_method(CallbackKind::Around, method),
            after: callbacks.for_method(CallbackKind::After, method),
        }
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl Middleware<MethodEnv, ServiceResult> for CallbacksMiddleware {
    fn call(
        &self,
        env: MethodEnv,
        chain: Chain<'_, MethodEnv, ServiceResult>,
    ) -> Result<ServiceResult, Error> {
        let Some(instance) = env.receiver.instance().cloned() else {
            return chain.next(env);
        };
        let arguments = env.arguments.clone();

        for callback in &self.before {
            if let CallbackBody::Before(body) = callback.body() {
                body(&instance, &arguments)?;
            }
        }

        let innermost: Continuation<'_> = Box::new(move || chain.next(env));
        let value = run_around(&self.around, &instance, &arguments, innermost)?;

        for callback in self.after.iter().rev() {
            if let CallbackBody::After(body) = callback.body() {
                body(&instance, &value, &arguments)?;
            }
        }
        Ok(value)
    }
}

fn run_around<'a>(
    arounds: &'a [Arc<Callback>],
    instance: &'a ServiceInstance,
    arguments: &'a Arguments,
    innermost: Continuation<'a>,
) -> Result<ServiceResult, Error> {
    let Some((callback, rest)) = arounds.split_first() else {
        return innermost();
    };
    let CallbackBody::Around(body) = callback.body() else {
        return run_around(rest, instance, arguments, innermost);
    };

    let chain = AroundChain::new(Box::new(move || {
        run_around(rest, instance, arguments, innermost)
    }));
    body(instance, &chain, arguments)?;
    chain.finish(callback.location())
}

/// Installs a [`CallbacksMiddleware`] as the outermost middleware of every
/// method that has callbacks.
pub struct CallbacksConcern;

impl Concern for CallbacksConcern {
    fn included(&self, setup: &ClassSetup<'_>) -> Result<(), Error> {
        let callbacks = setup.class().callbacks();
        for method in callbacks.methods() {
            let middleware = Arc::new(CallbacksMiddleware::new(&method, &callbacks));
            setup.middlewares(&method, Scope::Instance, |stack| {
                stack.unshift(middleware);
                Ok(())
            })?;
        }
        Ok(())
    }
}
