use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use convenient_core::{Arguments, ResultBuilder, ServiceResult, Status, Value};
use parking_lot::RwLock;

use super::{ServiceClass, RESULT_METHOD};
use crate::context::Context;
use crate::error::{raise, Error};
use crate::method_chain::{MethodEnv, Receiver, Scope};
use crate::steps::Step;

struct InstanceInner {
    class: ServiceClass,
    context: Context,
    arguments: Arguments,
    attributes: RwLock<BTreeMap<String, Value>>,
    steps: OnceLock<Vec<Step>>,
}

/// One call's worth of service state.
///
/// Keyword arguments given at construction become attributes; step outputs
/// are written next to them. Cheap to clone, clones share state.
#[derive(Clone)]
pub struct ServiceInstance {
    inner: Arc<InstanceInner>,
}

impl ServiceInstance {
    pub(crate) fn new(class: ServiceClass, context: Context, arguments: Arguments) -> Self {
        let attributes = arguments.kwargs().clone();
        Self {
            inner: Arc::new(InstanceInner {
                class,
                context,
                arguments,
                attributes: RwLock::new(attributes),
                steps: OnceLock::new(),
            }),
        }
    }

    #[must_use]
    pub fn class(&self) -> &ServiceClass {
        &self.inner.class
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// Arguments the instance was created with.
    #[must_use]
    pub fn arguments(&self) -> &Arguments {
        &self.inner.arguments
    }

    /// Looks up an attribute: stored values (constructor keywords and step
    /// outputs) first, computed attributes of the class second.
    ///
    /// # Errors
    ///
    /// Raises [`Error::AttributeNotFound`] when neither has `name`; errors of
    /// a computed attribute propagate.
    pub fn attribute(&self, name: &str) -> Result<Value, Error> {
        if let Some(value) = self.inner.attributes.read().get(name) {
            return Ok(value.clone());
        }
        match self.inner.class.attribute_def(name) {
            Some(compute) => compute(self),
            None => Err(raise(Error::AttributeNotFound {
                service: self.inner.class.name().to_string(),
                attribute: name.to_string(),
            })),
        }
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .attributes
            .write()
            .insert(name.into(), value.into());
    }

    pub fn success(&self) -> ResultBuilder {
        ServiceResult::builder(Status::Success, self.inner.class.service_ref())
    }

    pub fn failure(&self) -> ResultBuilder {
        ServiceResult::builder(Status::Failure, self.inner.class.service_ref())
    }

    pub fn error(&self) -> ResultBuilder {
        ServiceResult::builder(Status::Error, self.inner.class.service_ref())
    }

    /// Runs the instance-scope `result` chain.
    ///
    /// # Errors
    ///
    /// Framework errors raised anywhere in the chain.
    pub fn result(&self) -> Result<ServiceResult, Error> {
        self.call_method(RESULT_METHOD, Arguments::new())
    }

    /// Calls an instance method through its chain.
    ///
    /// # Errors
    ///
    /// Raises [`Error::MethodNotDefined`] when the class has no such method,
    /// plus anything raised by the chain or the body.
    pub fn call_method(&self, method: &str, arguments: Arguments) -> Result<ServiceResult, Error> {
        let env = MethodEnv::new(
            Receiver::Instance(self.clone()),
            method,
            arguments,
            self.inner.context.clone(),
        );
        self.inner
            .class
            .run_chain(method, Scope::Instance, env, &|env: MethodEnv| {
                self.invoke_raw(&env.method, &env.arguments)
            })
    }

    /// Calls the method body directly, skipping its chain.
    pub(crate) fn invoke_raw(
        &self,
        method: &str,
        arguments: &Arguments,
    ) -> Result<ServiceResult, Error> {
        let definition = self.inner.class.method_def(method).ok_or_else(|| {
            raise(Error::MethodNotDefined {
                service: self.inner.class.name().to_string(),
                method: method.to_string(),
            })
        })?;
        definition.invoke(self, arguments)
    }

    /// Steps of this organizer, built once per instance.
    pub fn steps(&self) -> &[Step] {
        self.inner.steps.get_or_init(|| {
            let organizer = self.inner.class.service_ref();
            self.inner
                .class
                .steps()
                .into_iter()
                .enumerate()
                .map(|(index, definition)| Step::new(definition, index, organizer.clone()))
                .collect()
        })
    }

    /// Calls an instance-scope imported dependency.
    ///
    /// # Errors
    ///
    /// Raises [`Error::MethodNotDefined`] when nothing named `name` is
    /// imported with instance scope.
    pub fn call_dependency(&self, name: &str, arguments: &Arguments) -> Result<Value, Error> {
        self.inner
            .class
            .resolve_dependency(name, Scope::Instance, arguments)
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("class", &self.inner.class.name())
            .field("arguments", &self.inner.arguments)
            .finish_non_exhaustive()
    }
}
