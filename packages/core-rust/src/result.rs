//! JSend-style result entity.
//!
//! A [`ServiceResult`] carries a fixed [`Status`] plus data, message and code.
//! Raw fields are stored as supplied by the producer; the typed wrappers
//! ([`Data`], [`Message`], [`Code`]) are built on first access and cached.
//! Results are never mutated after creation: [`ServiceResult::copy`] produces
//! a new result with overridden fields.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::matcher::ResultPattern;
use crate::origin::{ServiceRef, StepRef};
use crate::value::Value;

pub const DEFAULT_SUCCESS_CODE: &str = "default_success";
pub const DEFAULT_FAILURE_CODE: &str = "default_failure";
pub const DEFAULT_ERROR_CODE: &str = "default_error";

/// Errors raised by result accessors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultError {
    #[error("Data attribute `{key}` does NOT exist. Make sure the corresponding result returns it")]
    NotExistingAttribute { key: String },
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// JSend status of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
    Error,
}

impl Status {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failure => "failure",
            Status::Error => "error",
        }
    }

    /// Code used when the producer does not supply one.
    #[must_use]
    pub fn default_code(self) -> &'static str {
        match self {
            Status::Success => DEFAULT_SUCCESS_CODE,
            Status::Failure => DEFAULT_FAILURE_CODE,
            Status::Error => DEFAULT_ERROR_CODE,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Typed wrappers
// ---------------------------------------------------------------------------

/// Result data: keys that the producer supplied, and their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Data(BTreeMap<String, Value>);

impl Data {
    /// Returns the value for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ResultError::NotExistingAttribute`] when the producer never
    /// supplied `key`. A key supplied with `Value::Null` exists.
    pub fn get(&self, key: &str) -> Result<&Value, ResultError> {
        self.0
            .get(key)
            .ok_or_else(|| ResultError::NotExistingAttribute {
                key: key.to_string(),
            })
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.0.clone()
    }
}

/// Result message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message(String);

impl Message {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result code, a symbol-like identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code(String);

impl Code {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ServiceResult
// ---------------------------------------------------------------------------

/// Outcome of a service call.
#[derive(Debug, Clone)]
pub struct ServiceResult {
    status: Status,
    raw_data: BTreeMap<String, Value>,
    raw_message: String,
    raw_code: String,
    service: ServiceRef,
    step: Option<StepRef>,
    stubbed: bool,
    data: OnceLock<Data>,
    message: OnceLock<Message>,
    code: OnceLock<Code>,
}

impl ServiceResult {
    /// Starts building a result with the given status for `service`.
    #[must_use]
    pub fn builder(status: Status, service: ServiceRef) -> ResultBuilder {
        ResultBuilder {
            status,
            service,
            data: BTreeMap::new(),
            message: String::new(),
            code: None,
            step: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status == Status::Failure
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }

    #[must_use]
    pub fn is_not_success(&self) -> bool {
        !self.is_success()
    }

    #[must_use]
    pub fn is_not_failure(&self) -> bool {
        !self.is_failure()
    }

    #[must_use]
    pub fn is_not_error(&self) -> bool {
        !self.is_error()
    }

    /// Typed data, cast on first access.
    pub fn data(&self) -> &Data {
        self.data.get_or_init(|| Data(self.raw_data.clone()))
    }

    /// Typed message, cast on first access.
    pub fn message(&self) -> &Message {
        self.message
            .get_or_init(|| Message(self.raw_message.clone()))
    }

    /// Typed code, cast on first access.
    pub fn code(&self) -> &Code {
        self.code.get_or_init(|| Code(self.raw_code.clone()))
    }

    /// Raw data as supplied by the producer, without casting.
    #[must_use]
    pub fn unsafe_data(&self) -> &BTreeMap<String, Value> {
        &self.raw_data
    }

    /// Raw message as supplied by the producer, without casting.
    #[must_use]
    pub fn unsafe_message(&self) -> &str {
        &self.raw_message
    }

    /// Raw code as supplied by the producer, without casting.
    #[must_use]
    pub fn unsafe_code(&self) -> &str {
        &self.raw_code
    }

    /// Shorthand for `data().get(key)`.
    ///
    /// # Errors
    ///
    /// Returns [`ResultError::NotExistingAttribute`] when `key` was never supplied.
    pub fn get(&self, key: &str) -> Result<&Value, ResultError> {
        self.data().get(key)
    }

    /// The service that computed this result.
    #[must_use]
    pub fn service(&self) -> &ServiceRef {
        &self.service
    }

    /// The step that produced this result, if it came through a step.
    #[must_use]
    pub fn step(&self) -> Option<&StepRef> {
        self.step.as_ref()
    }

    #[must_use]
    pub fn step_index(&self) -> Option<usize> {
        self.step.as_ref().map(|step| step.index)
    }

    /// Whether the result was materialized by a stub instead of a real call.
    #[must_use]
    pub fn is_stubbed(&self) -> bool {
        self.stubbed
    }

    /// Produces a new result with the given fields overridden.
    #[must_use]
    pub fn copy(&self, overrides: ResultOverrides) -> ServiceResult {
        ServiceResult::from_parts(
            overrides.status.unwrap_or(self.status),
            overrides.data.unwrap_or_else(|| self.raw_data.clone()),
            overrides.message.unwrap_or_else(|| self.raw_message.clone()),
            overrides.code.unwrap_or_else(|| self.raw_code.clone()),
            overrides.service.unwrap_or_else(|| self.service.clone()),
            overrides.step.unwrap_or_else(|| self.step.clone()),
            overrides.stubbed.unwrap_or(self.stubbed),
        )
    }

    /// Copy of this result attributed to `step`.
    #[must_use]
    pub fn with_step(&self, step: StepRef) -> ServiceResult {
        self.copy(ResultOverrides {
            step: Some(Some(step)),
            ..ResultOverrides::default()
        })
    }

    /// Partial comparison (the `===` mode): every field set in `pattern`
    /// must match, literal fields by equality and matcher fields by
    /// delegating to the matcher.
    #[must_use]
    pub fn matches_pattern(&self, pattern: &ResultPattern) -> bool {
        if pattern.status.is_some_and(|status| status != self.status) {
            return false;
        }
        if let Some(data) = &pattern.data {
            if !data.check(&self.raw_data) {
                return false;
            }
        }
        if let Some(message) = &pattern.message {
            if !message.check(&Value::from(self.raw_message.as_str())) {
                return false;
            }
        }
        if let Some(code) = &pattern.code {
            if !code.check(&Value::from(self.raw_code.as_str())) {
                return false;
            }
        }
        if let Some(service) = &pattern.service {
            if service != &self.service {
                return false;
            }
        }
        if let Some(step) = &pattern.step {
            if step.as_ref() != self.step.as_ref() {
                return false;
            }
        }
        true
    }

    /// JSend representation.
    #[must_use]
    pub fn to_jsend(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status,
            "data": Value::Map(self.raw_data.clone()).to_json(),
            "message": self.raw_message,
            "code": self.raw_code,
        })
    }

    fn from_parts(
        status: Status,
        data: BTreeMap<String, Value>,
        message: String,
        code: String,
        service: ServiceRef,
        step: Option<StepRef>,
        stubbed: bool,
    ) -> Self {
        Self {
            status,
            raw_data: data,
            raw_message: message,
            raw_code: code,
            service,
            step,
            stubbed,
            data: OnceLock::new(),
            message: OnceLock::new(),
            code: OnceLock::new(),
        }
    }
}

impl PartialEq for ServiceResult {
    fn eq(&self, other: &Self) -> bool {
        self.service == other.service
            && self.status == other.status
            && self.raw_data == other.raw_data
            && self.raw_message == other.raw_message
            && self.raw_code == other.raw_code
            && self.step == other.step
    }
}

impl fmt::Display for ServiceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.service, self.to_jsend())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Collects the fields of a result before creation.
#[derive(Debug, Clone)]
#[must_use]
pub struct ResultBuilder {
    status: Status,
    service: ServiceRef,
    data: BTreeMap<String, Value>,
    message: String,
    code: Option<String>,
    step: Option<StepRef>,
}

impl ResultBuilder {
    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, data: BTreeMap<String, Value>) -> Self {
        self.data.extend(data);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn step(mut self, step: StepRef) -> Self {
        self.step = Some(step);
        self
    }

    #[must_use]
    pub fn build(self) -> ServiceResult {
        let code = self
            .code
            .unwrap_or_else(|| self.status.default_code().to_string());
        ServiceResult::from_parts(
            self.status,
            self.data,
            self.message,
            code,
            self.service,
            self.step,
            false,
        )
    }
}

impl From<ResultBuilder> for ServiceResult {
    fn from(builder: ResultBuilder) -> Self {
        builder.build()
    }
}

/// Fields to override in [`ServiceResult::copy`]. `None` keeps the original.
#[derive(Debug, Clone, Default)]
pub struct ResultOverrides {
    pub status: Option<Status>,
    pub data: Option<BTreeMap<String, Value>>,
    pub message: Option<String>,
    pub code: Option<String>,
    pub service: Option<ServiceRef>,
    pub step: Option<Option<StepRef>>,
    pub stubbed: Option<bool>,
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::matcher::{any_value, DataMode, Expect};

    fn service() -> ServiceRef {
        ServiceRef::new(7, "CreateUser")
    }

    #[test]
    fn status_predicates() {
        let result = ServiceResult::builder(Status::Failure, service()).build();
        assert!(result.is_failure());
        assert!(result.is_not_success());
        assert!(result.is_not_error());
        assert!(!result.is_success());
    }

    #[test]
    fn default_codes_follow_status() {
        let success = ServiceResult::builder(Status::Success, service()).build();
        let error = ServiceResult::builder(Status::Error, service()).build();
        assert_eq!(success.code().as_str(), "default_success");
        assert_eq!(error.unsafe_code(), "default_error");
    }

    #[test]
    fn missing_data_key_does_not_exist() {
        let result = ServiceResult::builder(Status::Success, service())
            .data("present", Value::Null)
            .build();
        assert_eq!(result.get("present").unwrap(), &Value::Null);
        let err = result.get("missing_key").unwrap_err();
        assert_eq!(
            err,
            ResultError::NotExistingAttribute {
                key: "missing_key".to_string()
            }
        );
        assert!(err.to_string().contains("does NOT exist"));
    }

    #[test]
    fn typed_wrappers_are_cached() {
        let result = ServiceResult::builder(Status::Success, service())
            .message("hello")
            .build();
        let first: *const Message = result.message();
        let second: *const Message = result.message();
        assert_eq!(first, second);
        assert_eq!(result.message().as_str(), "hello");
    }

    #[test]
    fn equality_covers_step_and_service() {
        let a = ServiceResult::builder(Status::Success, service())
            .data("x", 1)
            .build();
        let b = ServiceResult::builder(Status::Success, service())
            .data("x", 1)
            .build();
        assert_eq!(a, b);

        let other_service = ServiceResult::builder(Status::Success, ServiceRef::new(8, "Other"))
            .data("x", 1)
            .build();
        assert_ne!(a, other_service);

        let stepped = a.with_step(StepRef {
            organizer: service(),
            index: 0,
            action: "x".to_string(),
        });
        assert_ne!(a, stepped);
    }

    #[test]
    fn copy_overrides_selected_fields() {
        let original = ServiceResult::builder(Status::Failure, service())
            .data("x", 1)
            .message("bad")
            .build();
        let stubbed = original.copy(ResultOverrides {
            stubbed: Some(true),
            ..ResultOverrides::default()
        });
        assert!(stubbed.is_stubbed());
        assert!(!original.is_stubbed());
        assert_eq!(stubbed.unsafe_message(), "bad");

        let recovered = original.copy(ResultOverrides {
            status: Some(Status::Success),
            ..ResultOverrides::default()
        });
        assert!(recovered.is_success());
        assert_eq!(recovered.get("x").unwrap(), &Value::Int(1));
    }

    #[test]
    fn pattern_with_matcher_in_data() {
        let result = ServiceResult::builder(Status::Success, service())
            .data("id", 42)
            .data("name", "John")
            .build();

        let pattern = ResultPattern::new()
            .status(Status::Success)
            .data_matching("id", any_value())
            .data("name", "John");
        assert!(result.matches_pattern(&pattern));

        let partial = ResultPattern::new()
            .data_mode(DataMode::Subset)
            .data("name", "John");
        assert!(result.matches_pattern(&partial));

        let wrong = ResultPattern::new().message(Expect::value("nope"));
        assert!(!result.matches_pattern(&wrong));
    }

    #[test]
    fn jsend_shape() {
        let result = ServiceResult::builder(Status::Failure, service())
            .data("email", "is invalid")
            .code("invalid_email")
            .build();
        assert_eq!(
            result.to_jsend(),
            serde_json::json!({
                "status": "failure",
                "data": { "email": "is invalid" },
                "message": "",
                "code": "invalid_email",
            })
        );
    }

    proptest! {
        #[test]
        fn exact_pattern_agrees_with_equality(
            entries in proptest::collection::btree_map("[a-z]{1,4}", any::<i64>(), 0..6),
            message in "[a-z ]{0,8}",
        ) {
            let data: BTreeMap<String, Value> =
                entries.into_iter().map(|(k, v)| (k, Value::Int(v))).collect();
            let result = ServiceResult::builder(Status::Success, service())
                .with_data(data.clone())
                .message(message.clone())
                .build();

            let mut pattern = ResultPattern::new()
                .status(Status::Success)
                .data_mode(DataMode::Exact)
                .message(Expect::value(message));
            for (key, value) in data {
                pattern = pattern.data(key, value);
            }
            prop_assert!(result.matches_pattern(&pattern));
        }
    }
}
