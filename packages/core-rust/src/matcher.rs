//! Partial expectations over results.
//!
//! A result compared with `==` must match field by field. A result checked
//! with [`ServiceResult::matches_pattern`](crate::ServiceResult::matches_pattern)
//! is compared against a [`ResultPattern`] whose fields are either literal
//! values or [`Matcher`]s.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::origin::{ServiceRef, StepRef};
use crate::result::Status;
use crate::value::Value;

/// A predicate over a single value.
pub trait Matcher: Send + Sync {
    fn matches(&self, value: &Value) -> bool;

    /// Human-readable description used in failure messages.
    fn description(&self) -> String;
}

/// Matches every value.
#[derive(Debug, Clone, Copy)]
pub struct AnyValue;

impl Matcher for AnyValue {
    fn matches(&self, _value: &Value) -> bool {
        true
    }

    fn description(&self) -> String {
        "anything".to_string()
    }
}

/// Matches values of a given kind (see [`Value::kind`]).
#[derive(Debug, Clone, Copy)]
pub struct KindOf(pub &'static str);

impl Matcher for KindOf {
    fn matches(&self, value: &Value) -> bool {
        value.kind() == self.0
    }

    fn description(&self) -> String {
        format!("a {}", self.0)
    }
}

/// Matches values accepted by a closure.
pub struct Satisfies<F> {
    description: String,
    predicate: F,
}

impl<F> Matcher for Satisfies<F>
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    fn matches(&self, value: &Value) -> bool {
        (self.predicate)(value)
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

#[must_use]
pub fn any_value() -> Arc<dyn Matcher> {
    Arc::new(AnyValue)
}

#[must_use]
pub fn kind_of(kind: &'static str) -> Arc<dyn Matcher> {
    Arc::new(KindOf(kind))
}

pub fn satisfies<F>(description: impl Into<String>, predicate: F) -> Arc<dyn Matcher>
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    Arc::new(Satisfies {
        description: description.into(),
        predicate,
    })
}

/// Expectation for one field: a literal or a matcher.
#[derive(Clone)]
pub enum Expect {
    Exact(Value),
    Matching(Arc<dyn Matcher>),
}

impl Expect {
    pub fn value(value: impl Into<Value>) -> Self {
        Expect::Exact(value.into())
    }

    #[must_use]
    pub fn matching(matcher: Arc<dyn Matcher>) -> Self {
        Expect::Matching(matcher)
    }

    #[must_use]
    pub fn check(&self, value: &Value) -> bool {
        match self {
            Expect::Exact(expected) => expected == value,
            Expect::Matching(matcher) => matcher.matches(value),
        }
    }
}

impl fmt::Debug for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expect::Exact(value) => write!(f, "{value:?}"),
            Expect::Matching(matcher) => write!(f, "<{}>", matcher.description()),
        }
    }
}

/// How a data pattern treats keys it does not mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataMode {
    /// The result data must have exactly the pattern's keys.
    #[default]
    Exact,
    /// The result data may have extra keys.
    Subset,
}

/// Expectation over result data.
#[derive(Debug, Clone, Default)]
pub struct DataPattern {
    entries: BTreeMap<String, Expect>,
    mode: DataMode,
}

impl DataPattern {
    #[must_use]
    pub fn new(mode: DataMode) -> Self {
        Self {
            entries: BTreeMap::new(),
            mode,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, expect: Expect) {
        self.entries.insert(key.into(), expect);
    }

    #[must_use]
    pub fn mode(&self) -> DataMode {
        self.mode
    }

    #[must_use]
    pub fn check(&self, data: &BTreeMap<String, Value>) -> bool {
        if self.mode == DataMode::Exact && data.len() != self.entries.len() {
            return false;
        }
        self.entries
            .iter()
            .all(|(key, expect)| data.get(key).is_some_and(|value| expect.check(value)))
    }
}

/// Partial expectation over a whole result. Unset fields are not checked.
#[derive(Debug, Clone, Default)]
pub struct ResultPattern {
    pub status: Option<Status>,
    pub data: Option<DataPattern>,
    pub message: Option<Expect>,
    pub code: Option<Expect>,
    pub service: Option<ServiceRef>,
    /// `Some(None)` requires the result to come from no step.
    pub step: Option<Option<StepRef>>,
}

impl ResultPattern {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Expects a data key with a literal value. Switches data to exact mode
    /// unless a mode was already chosen through [`ResultPattern::data_mode`].
    #[must_use]
    pub fn data(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data_expect(key, Expect::value(value))
    }

    #[must_use]
    pub fn data_matching(self, key: impl Into<String>, matcher: Arc<dyn Matcher>) -> Self {
        self.data_expect(key, Expect::matching(matcher))
    }

    #[must_use]
    pub fn data_expect(mut self, key: impl Into<String>, expect: Expect) -> Self {
        self.data
            .get_or_insert_with(|| DataPattern::new(DataMode::Exact))
            .insert(key, expect);
        self
    }

    #[must_use]
    pub fn data_mode(mut self, mode: DataMode) -> Self {
        let pattern = self.data.get_or_insert_with(|| DataPattern::new(mode));
        pattern.mode = mode;
        self
    }

    #[must_use]
    pub fn message(mut self, expect: Expect) -> Self {
        self.message = Some(expect);
        self
    }

    #[must_use]
    pub fn code(mut self, expect: Expect) -> Self {
        self.code = Some(expect);
        self
    }

    #[must_use]
    pub fn service(mut self, service: ServiceRef) -> Self {
        self.service = Some(service);
        self
    }

    #[must_use]
    pub fn step(mut self, step: Option<StepRef>) -> Self {
        self.step = Some(step);
        self
    }
}
