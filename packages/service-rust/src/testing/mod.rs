//! Helpers for testing services: result matchers and stub registration.

use std::fmt::Write as _;
use std::sync::Arc;

use convenient_core::{
    Arguments, DataMode, Expect, Matcher, ResultPattern, ServiceResult, Status, Value,
};

use crate::context::Context;
use crate::error::Error;
use crate::service::ServiceClass;
use crate::stubs::{ResultSpec, StubRegistry};

#[derive(Debug, Clone)]
enum StepExpectation {
    At(ServiceClass, usize),
    Absent,
}

/// Expectation over a [`ServiceResult`], built fluently:
///
/// ```ignore
/// be_failure().with_data("email", "is invalid").of_step(&organizer, 1)
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct ResultMatcher {
    pattern: ResultPattern,
    step: Option<StepExpectation>,
    description: String,
}

pub fn be_success() -> ResultMatcher {
    ResultMatcher::new(Status::Success)
}

pub fn be_failure() -> ResultMatcher {
    ResultMatcher::new(Status::Failure)
}

pub fn be_error() -> ResultMatcher {
    ResultMatcher::new(Status::Error)
}

impl ResultMatcher {
    fn new(status: Status) -> Self {
        Self {
            pattern: ResultPattern::new().status(status),
            step: None,
            description: format!("be {status}"),
        }
    }

    /// Expects `key` in the data. Data is compared exactly unless
    /// [`ResultMatcher::with_partial_data`] is used.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        let _ = write!(self.description, " with data {key}: {value:?}");
        self.pattern = self.pattern.data(key, value);
        self
    }

    pub fn with_data_matching(mut self, key: impl Into<String>, matcher: Arc<dyn Matcher>) -> Self {
        let key = key.into();
        let _ = write!(self.description, " with data {key}: {}", matcher.description());
        self.pattern = self.pattern.data_matching(key, matcher);
        self
    }

    /// Allows data keys the matcher does not mention.
    pub fn with_partial_data(mut self) -> Self {
        self.pattern = self.pattern.data_mode(DataMode::Subset);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        let _ = write!(self.description, " with message {message:?}");
        self.pattern = self.pattern.message(Expect::value(message));
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        let code = code.into();
        let _ = write!(self.description, " with code {code:?}");
        self.pattern = self.pattern.code(Expect::value(code));
        self
    }

    pub fn of_service(mut self, service: &ServiceClass) -> Self {
        let _ = write!(self.description, " of service {}", service.name());
        self.pattern = self.pattern.service(service.service_ref());
        self
    }

    /// Expects the result to come from step `index` of `organizer`.
    pub fn of_step(mut self, organizer: &ServiceClass, index: usize) -> Self {
        let _ = write!(self.description, " of step {index} of {}", organizer.name());
        self.step = Some(StepExpectation::At(organizer.clone(), index));
        self
    }

    pub fn without_step(mut self) -> Self {
        self.description.push_str(" without step");
        self.step = Some(StepExpectation::Absent);
        self
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether `result` meets every expectation.
    ///
    /// # Errors
    ///
    /// Raises [`Error::InvalidStepIndex`] when [`ResultMatcher::of_step`]
    /// names a step the organizer does not declare.
    pub fn check(&self, result: &ServiceResult) -> Result<bool, Error> {
        let mut pattern = self.pattern.clone();
        match &self.step {
            Some(StepExpectation::At(organizer, index)) => {
                pattern = pattern.step(Some(organizer.step_ref(*index)?));
            }
            Some(StepExpectation::Absent) => pattern = pattern.step(None),
            None => {}
        }
        Ok(result.matches_pattern(&pattern))
    }

    #[must_use]
    pub fn failure_message(&self, result: &ServiceResult) -> String {
        format!("expected {result} to {}", self.description)
    }
}

/// Starts registering a stub of `service` on `context`.
pub fn stub_service<'a>(context: &'a Context, service: &'a ServiceClass) -> StubBuilder<'a> {
    StubBuilder {
        registry: context.stubs(),
        service,
        arguments: None,
    }
}

/// Fluent stub registration, see [`stub_service`].
#[must_use]
pub struct StubBuilder<'a> {
    registry: &'a StubRegistry,
    service: &'a ServiceClass,
    arguments: Option<Arguments>,
}

impl StubBuilder<'_> {
    pub fn with_arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = Some(arguments);
        self
    }

    pub fn with_any_arguments(mut self) -> Self {
        self.arguments = None;
        self
    }

    pub fn to_return(self, spec: ResultSpec) {
        self.registry.stub(self.service, self.arguments, spec);
    }

    /// Removes the stub registered under the same arguments.
    pub fn unstub(self) -> bool {
        self.registry.unstub(self.service, self.arguments.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use convenient_core::matcher::kind_of;

    use super::*;
    use crate::steps::StepDef;

    fn organizer() -> (ServiceClass, ServiceClass) {
        let validate = ServiceClass::define("Validate", |class| {
            class.result_method(|instance, _| {
                Ok(instance
                    .failure()
                    .data("email", "is invalid")
                    .message("Invalid input")
                    .code("invalid_email")
                    .build())
            })?;
            Ok(())
        })
        .unwrap();
        let signup = ServiceClass::define("Signup", |class| {
            class.step(StepDef::service(&validate))?;
            Ok(())
        })
        .unwrap();
        (signup, validate)
    }

    #[test]
    fn matcher_checks_every_expectation() {
        let (signup, validate) = organizer();
        let result = signup.result(Arguments::new()).unwrap();

        let matcher = be_failure()
            .with_data("email", "is invalid")
            .with_message("Invalid input")
            .with_code("invalid_email")
            .of_service(&validate)
            .of_step(&signup, 0);
        assert!(matcher.check(&result).unwrap());
        assert!(!be_success().check(&result).unwrap());
        assert!(!be_failure().without_step().check(&result).unwrap());
        assert!(be_failure()
            .with_data_matching("email", kind_of("string"))
            .check(&result)
            .unwrap());
    }

    #[test]
    fn matcher_rejects_unknown_step_index() {
        let (signup, _) = organizer();
        let result = signup.result(Arguments::new()).unwrap();
        let err = be_failure().of_step(&signup, 5).check(&result).unwrap_err();
        assert!(matches!(err, Error::InvalidStepIndex { index: 5, len: 1, .. }));
    }

    #[test]
    fn failure_message_describes_the_expectation() {
        let (signup, _) = organizer();
        let result = signup.result(Arguments::new()).unwrap();
        let matcher = be_success().with_code("ok");
        assert!(matcher
            .failure_message(&result)
            .ends_with("to be success with code \"ok\""));
    }

    #[test]
    fn stub_builder_registers_on_the_context() {
        let (_, validate) = organizer();
        let context = Context::default();
        stub_service(&context, &validate)
            .with_any_arguments()
            .to_return(ResultSpec::success());

        let result = validate.call(&context, Arguments::new()).unwrap();
        assert!(result.is_stubbed());
        assert!(stub_service(&context, &validate).unstub());
        assert!(!validate.call(&context, Arguments::new()).unwrap().is_stubbed());
    }
}
