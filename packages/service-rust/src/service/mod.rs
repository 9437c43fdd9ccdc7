//! Service classes and instances.
//!
//! A [`ServiceClass`] is configured through its DSL methods, committed once,
//! and then called. Calls go through the class-scope `result` chain (stubs),
//! create a [`ServiceInstance`], and run the instance-scope `result` chain
//! (tracing, callbacks, user middlewares, steps) down to the `result` method.

mod instance;
mod method;

use std::collections::HashMap;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use convenient_core::{Arguments, ResultBuilder, ServiceRef, ServiceResult, Status, StepRef, Value};
use parking_lot::RwLock;

use crate::callbacks::{
    AroundChain, Callback, CallbackBody, CallbackCollection, CallbacksConcern,
};
use crate::config::FrameworkConfig;
use crate::container::{ImportOptions, Imports};
use crate::context::Context;
use crate::error::{raise, Error};
use crate::method_chain::{Concerns, Config, MethodEnv, Receiver, Scope};
use crate::middleware::ArrayStack;
use crate::steps::{StepDef, StepsConcern};
use crate::stubs::StubsConcern;
use crate::telemetry::TracingConcern;

pub use instance::ServiceInstance;
pub use method::{MethodBody, MethodDef, Param};

pub const RESULT_METHOD: &str = "result";
pub const FALLBACK_RESULT_METHOD: &str = "fallback_result";

pub type AttributeFn = Arc<dyn Fn(&ServiceInstance) -> Result<Value, Error> + Send + Sync>;

static NEXT_SERVICE_ID: AtomicU64 = AtomicU64::new(1);

struct ClassInner {
    id: u64,
    name: Arc<str>,
    framework: FrameworkConfig,
    config: Config,
    methods: RwLock<HashMap<String, Arc<MethodDef>>>,
    attributes: RwLock<HashMap<String, AttributeFn>>,
    steps: RwLock<Vec<Arc<StepDef>>>,
    callbacks: RwLock<CallbackCollection>,
    imports: RwLock<Imports>,
}

/// A service class: its methods, steps, callbacks and method-chain config.
///
/// Cheap to clone; clones share the same class. Equality is identity.
#[derive(Clone)]
pub struct ServiceClass {
    inner: Arc<ClassInner>,
}

impl ServiceClass {
    /// Creates an uncommitted class with the default [`FrameworkConfig`].
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::with_config(name, FrameworkConfig::default())
    }

    pub fn with_config(name: impl Into<Arc<str>>, framework: FrameworkConfig) -> Self {
        let name = name.into();
        let concerns = builtin_concerns(&framework);
        Self {
            inner: Arc::new(ClassInner {
                id: NEXT_SERVICE_ID.fetch_add(1, Ordering::Relaxed),
                config: Config::with_concerns(Arc::clone(&name), concerns),
                name,
                framework,
                methods: RwLock::new(HashMap::new()),
                attributes: RwLock::new(HashMap::new()),
                steps: RwLock::new(Vec::new()),
                callbacks: RwLock::new(CallbackCollection::new()),
                imports: RwLock::new(Imports::default()),
            }),
        }
    }

    /// Creates a class, configures it with `body` and commits it.
    ///
    /// # Errors
    ///
    /// Propagates errors from `body` and from the commit.
    pub fn define<F>(name: impl Into<Arc<str>>, body: F) -> Result<Self, Error>
    where
        F: FnOnce(&ServiceClass) -> Result<(), Error>,
    {
        Self::define_with_config(name, FrameworkConfig::default(), body)
    }

    /// [`ServiceClass::define`] with an explicit framework config.
    ///
    /// # Errors
    ///
    /// Propagates errors from `body` and from the commit.
    pub fn define_with_config<F>(
        name: impl Into<Arc<str>>,
        framework: FrameworkConfig,
        body: F,
    ) -> Result<Self, Error>
    where
        F: FnOnce(&ServiceClass) -> Result<(), Error>,
    {
        let class = Self::with_config(name, framework);
        body(&class)?;
        class.commit_config()?;
        Ok(class)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn framework(&self) -> &FrameworkConfig {
        &self.inner.framework
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    #[must_use]
    pub fn service_ref(&self) -> ServiceRef {
        ServiceRef::new(self.inner.id, Arc::clone(&self.inner.name))
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.inner.config.is_committed()
    }

    /// Includes concerns and compiles method chains. `true` only for the
    /// call that performed the commit.
    ///
    /// # Errors
    ///
    /// Propagates errors raised by concerns, e.g. step validation.
    pub fn commit_config(&self) -> Result<bool, Error> {
        self.inner.config.commit(self)
    }

    // -- DSL ----------------------------------------------------------------

    /// Defines (or redefines) an instance method.
    ///
    /// # Errors
    ///
    /// Raises [`Error::ConfigCommitted`] once the class is committed.
    pub fn define_method<F>(
        &self,
        name: impl Into<String>,
        params: Vec<Param>,
        body: F,
    ) -> Result<&Self, Error>
    where
        F: Fn(&ServiceInstance, &Arguments) -> Result<ServiceResult, Error> + Send + Sync + 'static,
    {
        self.inner.config.assert_not_committed()?;
        let name = name.into();
        let method = MethodDef::new(name.clone(), params, Arc::new(body));
        self.inner.methods.write().insert(name, Arc::new(method));
        Ok(self)
    }

    /// Defines the `result` method.
    ///
    /// # Errors
    ///
    /// Raises [`Error::ConfigCommitted`] once the class is committed.
    pub fn result_method<F>(&self, body: F) -> Result<&Self, Error>
    where
        F: Fn(&ServiceInstance, &Arguments) -> Result<ServiceResult, Error> + Send + Sync + 'static,
    {
        self.define_method(RESULT_METHOD, Vec::new(), body)
    }

    /// Defines the `fallback_result` method used by fallback service steps.
    ///
    /// # Errors
    ///
    /// Raises [`Error::ConfigCommitted`] once the class is committed.
    pub fn fallback_result_method<F>(&self, body: F) -> Result<&Self, Error>
    where
        F: Fn(&ServiceInstance, &Arguments) -> Result<ServiceResult, Error> + Send + Sync + 'static,
    {
        self.define_method(FALLBACK_RESULT_METHOD, Vec::new(), body)
    }

    /// Defines a computed attribute, evaluated on each access.
    ///
    /// # Errors
    ///
    /// Raises [`Error::ConfigCommitted`] once the class is committed.
    pub fn attribute<F>(&self, name: impl Into<String>, compute: F) -> Result<&Self, Error>
    where
        F: Fn(&ServiceInstance) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.inner.config.assert_not_committed()?;
        self.inner
            .attributes
            .write()
            .insert(name.into(), Arc::new(compute));
        Ok(self)
    }

    /// Appends a step.
    ///
    /// # Errors
    ///
    /// Raises [`Error::ConfigCommitted`] once the class is committed.
    pub fn step(&self, step: StepDef) -> Result<&Self, Error> {
        self.inner.config.assert_not_committed()?;
        self.inner.steps.write().push(Arc::new(step));
        Ok(self)
    }

    /// Registers a callback run before `method`.
    ///
    /// # Errors
    ///
    /// Raises [`Error::ConfigCommitted`] once the class is committed.
    #[track_caller]
    pub fn before<F>(&self, method: &str, body: F) -> Result<&Self, Error>
    where
        F: Fn(&ServiceInstance, &Arguments) -> Result<(), Error> + Send + Sync + 'static,
    {
        let location = caller_location();
        self.add_callback(Callback::new(
            method,
            location,
            CallbackBody::Before(Arc::new(body)),
        ))
    }

    /// Registers a callback run after `method` with its value.
    ///
    /// # Errors
    ///
    /// Raises [`Error::ConfigCommitted`] once the class is committed.
    #[track_caller]
    pub fn after<F>(&self, method: &str, body: F) -> Result<&Self, Error>
    where
        F: Fn(&ServiceInstance, &ServiceResult, &Arguments) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        let location = caller_location();
        self.add_callback(Callback::new(
            method,
            location,
            CallbackBody::After(Arc::new(body)),
        ))
    }

    /// Registers a callback wrapping `method`. The body must call
    /// [`AroundChain::yield_`] exactly once; returning without yielding
    /// raises [`Error::AroundCallbackChainNotContinued`] naming the line this
    /// was called from.
    ///
    /// # Errors
    ///
    /// Raises [`Error::ConfigCommitted`] once the class is committed.
    #[track_caller]
    pub fn around<F>(&self, method: &str, body: F) -> Result<&Self, Error>
    where
        F: Fn(&ServiceInstance, &AroundChain<'_>, &Arguments) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        let location = caller_location();
        self.add_callback(Callback::new(
            method,
            location,
            CallbackBody::Around(Arc::new(body)),
        ))
    }

    fn add_callback(&self, callback: Callback) -> Result<&Self, Error> {
        self.inner.config.assert_not_committed()?;
        self.inner.callbacks.write().push(callback);
        Ok(self)
    }

    /// Edits the concerns queued for commit.
    ///
    /// # Errors
    ///
    /// Raises [`Error::ConfigCommitted`] once the class is committed.
    pub fn concerns<F>(&self, configure: F) -> Result<&Self, Error>
    where
        F: FnOnce(&mut Concerns),
    {
        self.inner.config.concerns(configure)?;
        Ok(self)
    }

    /// Edits the middleware stack of `(method, scope)`.
    ///
    /// # Errors
    ///
    /// Raises [`Error::ConfigCommitted`] once the class is committed and
    /// propagates errors returned by `configure`.
    pub fn middlewares<F>(&self, method: &str, scope: Scope, configure: F) -> Result<&Self, Error>
    where
        F: FnOnce(&mut ArrayStack<MethodEnv, ServiceResult>) -> Result<(), Error>,
    {
        self.inner.config.assert_not_committed()?;
        self.inner.config.configure(method, scope, configure)?;
        Ok(self)
    }

    /// Imports an exported dependency.
    ///
    /// # Errors
    ///
    /// Raises [`Error::ConfigCommitted`] once the class is committed, and the
    /// container errors of [`Imports::import`].
    pub fn import(&self, slug: &str, options: ImportOptions) -> Result<&Self, Error> {
        self.inner.config.assert_not_committed()?;
        self.inner.imports.write().import(slug, options)?;
        Ok(self)
    }

    // -- Introspection ------------------------------------------------------

    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.inner.methods.read().contains_key(name)
    }

    #[must_use]
    pub fn method_def(&self, name: &str) -> Option<Arc<MethodDef>> {
        self.inner.methods.read().get(name).cloned()
    }

    #[must_use]
    pub fn attribute_def(&self, name: &str) -> Option<AttributeFn> {
        self.inner.attributes.read().get(name).cloned()
    }

    #[must_use]
    pub fn steps(&self) -> Vec<Arc<StepDef>> {
        self.inner.steps.read().clone()
    }

    #[must_use]
    pub fn has_steps(&self) -> bool {
        !self.inner.steps.read().is_empty()
    }

    /// Reference to the step declared at `index`.
    ///
    /// # Errors
    ///
    /// Raises [`Error::InvalidStepIndex`] when there is no such step.
    pub fn step_ref(&self, index: usize) -> Result<StepRef, Error> {
        let steps = self.inner.steps.read();
        let step = steps.get(index).ok_or_else(|| {
            raise(Error::InvalidStepIndex {
                service: self.name().to_string(),
                index,
                len: steps.len(),
            })
        })?;
        Ok(StepRef {
            organizer: self.service_ref(),
            index,
            action: step.action_name(),
        })
    }

    #[must_use]
    pub fn callbacks(&self) -> CallbackCollection {
        self.inner.callbacks.read().clone()
    }

    // -- Invocation ---------------------------------------------------------

    /// Calls the service with a fresh [`Context`].
    ///
    /// # Errors
    ///
    /// See [`ServiceClass::call`].
    pub fn result(&self, arguments: Arguments) -> Result<ServiceResult, Error> {
        self.call(&Context::default(), arguments)
    }

    /// Calls the service: the class-scope `result` chain, then a new instance
    /// built from `arguments`, then its `result`.
    ///
    /// # Errors
    ///
    /// Raises [`Error::ConfigNotCommitted`] before commit. Framework errors
    /// from the chain propagate; business failures come back as results.
    pub fn call(&self, context: &Context, arguments: Arguments) -> Result<ServiceResult, Error> {
        self.inner.config.assert_committed()?;
        let env = MethodEnv::new(
            Receiver::Class(self.clone()),
            RESULT_METHOD,
            arguments,
            context.clone(),
        );
        self.run_chain(RESULT_METHOD, Scope::Class, env, &|env: MethodEnv| {
            self.instantiate(env.context, env.arguments).result()
        })
    }

    /// Calls the `fallback_result` method on a new instance.
    ///
    /// # Errors
    ///
    /// Raises [`Error::ConfigNotCommitted`] before commit and
    /// [`Error::FallbackNotDefined`] when the class has no fallback.
    pub fn fallback_result(
        &self,
        context: &Context,
        arguments: Arguments,
    ) -> Result<ServiceResult, Error> {
        self.inner.config.assert_committed()?;
        if !self.has_method(FALLBACK_RESULT_METHOD) {
            return Err(raise(Error::FallbackNotDefined {
                service: self.name().to_string(),
                method: FALLBACK_RESULT_METHOD.to_string(),
            }));
        }
        self.instantiate(context.clone(), arguments)
            .call_method(FALLBACK_RESULT_METHOD, Arguments::new())
    }

    /// Calls a class-scope imported dependency.
    ///
    /// # Errors
    ///
    /// Raises [`Error::MethodNotDefined`] when nothing named `name` is
    /// imported with class scope.
    pub fn call_dependency(&self, name: &str, arguments: &Arguments) -> Result<Value, Error> {
        self.resolve_dependency(name, Scope::Class, arguments)
    }

    pub fn success(&self) -> ResultBuilder {
        ServiceResult::builder(Status::Success, self.service_ref())
    }

    pub fn failure(&self) -> ResultBuilder {
        ServiceResult::builder(Status::Failure, self.service_ref())
    }

    pub fn error(&self) -> ResultBuilder {
        ServiceResult::builder(Status::Error, self.service_ref())
    }

    pub(crate) fn resolve_dependency(
        &self,
        name: &str,
        scope: Scope,
        arguments: &Arguments,
    ) -> Result<Value, Error> {
        let export = self.inner.imports.read().resolve(name, scope);
        match export {
            Some(export) => export(arguments),
            None => Err(raise(Error::MethodNotDefined {
                service: self.name().to_string(),
                method: name.to_string(),
            })),
        }
    }

    pub(crate) fn instantiate(&self, context: Context, arguments: Arguments) -> ServiceInstance {
        ServiceInstance::new(self.clone(), context, arguments)
    }

    /// Runs `env` through the committed chain of `(method, scope)`, or
    /// straight into `terminal` when no middleware wraps it.
    pub(crate) fn run_chain(
        &self,
        method: &str,
        scope: Scope,
        env: MethodEnv,
        terminal: &dyn Fn(MethodEnv) -> Result<ServiceResult, Error>,
    ) -> Result<ServiceResult, Error> {
        match self.inner.config.chain(method, scope) {
            Some(chain) => chain.call(env, terminal),
            None => terminal(env),
        }
    }
}

impl PartialEq for ServiceClass {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ServiceClass {}

impl fmt::Debug for ServiceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClass")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("committed", &self.is_committed())
            .finish_non_exhaustive()
    }
}

/// Concerns every class starts with. Steps push the innermost middleware;
/// the others unshift, so tracing ends up outermost.
fn builtin_concerns(framework: &FrameworkConfig) -> Concerns {
    let mut concerns = Concerns::new();
    concerns
        .push(Arc::new(StepsConcern))
        .push(Arc::new(CallbacksConcern));
    if framework.trace_calls {
        concerns.push(Arc::new(TracingConcern));
    }
    if framework.stubs_enabled {
        concerns.push(Arc::new(StubsConcern));
    }
    concerns
}

#[track_caller]
fn caller_location() -> String {
    let location = Location::caller();
    format!("{}:{}", location.file(), location.line())
}
