//! Stubbed service results for tests.
//!
//! A [`StubRegistry`] lives on the [`Context`](crate::Context), so stubs are
//! scoped to the call trees started from that context instead of the whole
//! process. [`StubsMiddleware`] consults it on the class-scope `result`
//! chain before the service runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use convenient_core::{Arguments, ResultOverrides, ServiceRef, ServiceResult, Status, Value};
use dashmap::DashMap;
use serde::Deserialize;

use crate::error::{raise, Error};
use crate::method_chain::{ClassSetup, Concern, MethodEnv, Receiver, Scope};
use crate::middleware::{Chain, Middleware, MiddlewareStack};
use crate::service::{ServiceClass, RESULT_METHOD};

/// Recipe for a stubbed result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultSpec {
    pub status: Status,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl ResultSpec {
    #[must_use]
    pub fn new(status: Status) -> Self {
        Self {
            status,
            data: BTreeMap::new(),
            message: None,
            code: None,
        }
    }

    #[must_use]
    pub fn success() -> Self {
        Self::new(Status::Success)
    }

    #[must_use]
    pub fn failure() -> Self {
        Self::new(Status::Failure)
    }

    #[must_use]
    pub fn error() -> Self {
        Self::new(Status::Error)
    }

    /// Parses a JSend object, e.g. a fixture file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when `json` is not a JSend object.
    pub fn from_jsend(json: serde_json::Value) -> Result<Self, Error> {
        serde_json::from_value(json).map_err(|err| raise(Error::Internal(err.into())))
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Builds the stubbed result of `service`.
    #[must_use]
    pub fn materialize(&self, service: ServiceRef) -> ServiceResult {
        let mut builder = ServiceResult::builder(self.status, service).with_data(self.data.clone());
        if let Some(message) = &self.message {
            builder = builder.message(message.clone());
        }
        if let Some(code) = &self.code {
            builder = builder.code(code.clone());
        }
        builder.build().copy(ResultOverrides {
            stubbed: Some(true),
            ..ResultOverrides::default()
        })
    }
}

#[derive(Debug, Clone)]
struct StubEntry {
    /// `None` matches any arguments.
    arguments: Option<Arguments>,
    spec: ResultSpec,
}

/// Stubs keyed by service class, then by argument fingerprint.
#[derive(Debug, Default)]
pub struct StubRegistry {
    stubs: DashMap<u64, Vec<StubEntry>>,
}

impl StubRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stub. `arguments: None` matches every call. A second
    /// registration for the same key replaces the first.
    pub fn stub(&self, service: &ServiceClass, arguments: Option<Arguments>, spec: ResultSpec) {
        let mut entries = self.stubs.entry(service.id()).or_default();
        entries.retain(|entry| entry.arguments != arguments);
        entries.push(StubEntry { arguments, spec });
    }

    /// Removes the stub registered under exactly this key. Returns whether
    /// one was removed.
    pub fn unstub(&self, service: &ServiceClass, arguments: Option<&Arguments>) -> bool {
        let Some(mut entries) = self.stubs.get_mut(&service.id()) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.arguments.as_ref() != arguments);
        before != entries.len()
    }

    /// Removes every stub of every service.
    pub fn reset(&self) {
        self.stubs.clear();
    }

    /// The stub for a call: an exact argument match first, the
    /// any-arguments stub second.
    #[must_use]
    pub fn fetch(&self, service: &ServiceClass, arguments: &Arguments) -> Option<ResultSpec> {
        let entries = self.stubs.get(&service.id())?;
        entries
            .iter()
            .find(|entry| entry.arguments.as_ref() == Some(arguments))
            .or_else(|| entries.iter().find(|entry| entry.arguments.is_none()))
            .map(|entry| entry.spec.clone())
    }

    /// Number of registered stubs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stubs.iter().map(|entry| entry.value().len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns the stubbed result of a service call, if one is registered.
pub struct StubsMiddleware;

impl Middleware<MethodEnv, ServiceResult> for StubsMiddleware {
    fn call(
        &self,
        env: MethodEnv,
        chain: Chain<'_, MethodEnv, ServiceResult>,
    ) -> Result<ServiceResult, Error> {
        if let Receiver::Class(class) = &env.receiver {
            if let Some(spec) = env.context.stubs().fetch(class, &env.arguments) {
                tracing::debug!(
                    service = class.name(),
                    status = %spec.status,
                    "returning stubbed result"
                );
                return Ok(spec.materialize(class.service_ref()));
            }
        }
        chain.next(env)
    }
}

/// Installs [`StubsMiddleware`] as the outermost class-scope `result`
/// middleware.
pub struct StubsConcern;

impl Concern for StubsConcern {
    fn included(&self, setup: &ClassSetup<'_>) -> Result<(), Error> {
        setup.middlewares(RESULT_METHOD, Scope::Class, |stack| {
            stack.unshift(Arc::new(StubsMiddleware));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ServiceClass {
        ServiceClass::new("Payments")
    }

    #[test]
    fn exact_arguments_win_over_any() {
        let registry = StubRegistry::new();
        let class = service();
        let specific = Arguments::new().kwarg("foo", 1);

        registry.stub(&class, None, ResultSpec::failure());
        registry.stub(&class, Some(specific.clone()), ResultSpec::success());

        assert_eq!(registry.fetch(&class, &specific), Some(ResultSpec::success()));
        assert_eq!(
            registry.fetch(&class, &Arguments::new().kwarg("foo", 2)),
            Some(ResultSpec::failure())
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn last_registration_wins() {
        let registry = StubRegistry::new();
        let class = service();
        registry.stub(&class, None, ResultSpec::failure());
        registry.stub(&class, None, ResultSpec::error());
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.fetch(&class, &Arguments::new()),
            Some(ResultSpec::error())
        );
    }

    #[test]
    fn unstub_and_reset() {
        let registry = StubRegistry::new();
        let class = service();
        let other = ServiceClass::new("Other");
        registry.stub(&class, None, ResultSpec::success());
        registry.stub(&other, None, ResultSpec::success());

        assert!(registry.unstub(&class, None));
        assert!(!registry.unstub(&class, None));
        assert!(registry.fetch(&class, &Arguments::new()).is_none());

        registry.reset();
        assert!(registry.is_empty());
    }

    #[test]
    fn materialized_results_are_marked_stubbed() {
        let class = service();
        let result = ResultSpec::failure()
            .with_data("card", "declined")
            .with_code("card_declined")
            .materialize(class.service_ref());
        assert!(result.is_failure());
        assert!(result.is_stubbed());
        assert_eq!(result.code().as_str(), "card_declined");
        assert_eq!(result.get("card").unwrap(), &Value::from("declined"));
    }

    #[test]
    fn spec_from_jsend_fixture() {
        let spec = ResultSpec::from_jsend(serde_json::json!({
            "status": "failure",
            "data": { "email": "is taken" },
            "message": "Invalid input",
        }))
        .unwrap();
        assert_eq!(
            spec,
            ResultSpec::failure()
                .with_data("email", "is taken")
                .with_message("Invalid input")
        );
        assert!(ResultSpec::from_jsend(serde_json::json!({ "status": "maybe" })).is_err());
    }
}
