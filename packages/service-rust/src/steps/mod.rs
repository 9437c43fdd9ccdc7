//! Step declarations and their per-organizer instances.
//!
//! A step runs either another service ([`StepAction::Service`]), an own
//! method of the organizer ([`StepAction::Method`]) or the organizer's own
//! `result` method ([`StepAction::OwnResult`]). Inputs are read from the
//! organizer before the step runs; outputs are written back after it
//! succeeds.

mod engine;

use std::fmt;
use std::sync::Arc;

use convenient_core::{Arguments, ServiceRef, ServiceResult, StepRef, Value};

use crate::error::{raise, Error};
use crate::service::{ServiceClass, ServiceInstance, FALLBACK_RESULT_METHOD, RESULT_METHOD};

pub use engine::{StepsConcern, StepsMiddleware};

pub type InputFn = Arc<dyn Fn(&ServiceInstance) -> Result<Value, Error> + Send + Sync>;

/// What a step runs.
#[derive(Clone)]
pub enum StepAction {
    Service(ServiceClass),
    Method(String),
    OwnResult,
}

impl StepAction {
    /// Label used in step references and logs.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            StepAction::Service(class) => class.name().to_string(),
            StepAction::Method(method) => method.clone(),
            StepAction::OwnResult => RESULT_METHOD.to_string(),
        }
    }
}

impl fmt::Debug for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepAction::Service(class) => write!(f, "Service({})", class.name()),
            StepAction::Method(method) => write!(f, "Method({method})"),
            StepAction::OwnResult => f.write_str("OwnResult"),
        }
    }
}

/// Where an input value comes from.
#[derive(Clone)]
pub enum InputSource {
    /// An organizer attribute.
    Attribute(String),
    /// A literal.
    Value(Value),
    /// A closure evaluated against the organizer.
    Proc(InputFn),
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Attribute(name) => write!(f, "Attribute({name})"),
            InputSource::Value(value) => write!(f, "Value({value:?})"),
            InputSource::Proc(_) => f.write_str("Proc"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InputSpec {
    pub key: String,
    pub source: InputSource,
}

/// Copies result data `key` into organizer attribute `attribute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub key: String,
    pub attribute: String,
}

/// How a non-success result of the step is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tolerance {
    /// The organizer stops and returns the step's result.
    #[default]
    Strict,
    /// The result is turned into a success and the organizer continues.
    Try,
    /// The step's fallback runs in its place.
    Fallback,
}

/// A declared step.
#[derive(Debug, Clone)]
#[must_use]
pub struct StepDef {
    action: StepAction,
    inputs: Vec<InputSpec>,
    outputs: Vec<OutputSpec>,
    tolerance: Tolerance,
}

impl StepDef {
    pub fn new(action: StepAction) -> Self {
        Self {
            action,
            inputs: Vec::new(),
            outputs: Vec::new(),
            tolerance: Tolerance::Strict,
        }
    }

    pub fn service(class: &ServiceClass) -> Self {
        Self::new(StepAction::Service(class.clone()))
    }

    /// A step calling an organizer method. Naming `result` runs the
    /// organizer's own `result` method, see [`StepDef::own_result`].
    pub fn method(name: impl Into<String>) -> Self {
        let name = name.into();
        if name == RESULT_METHOD {
            return Self::own_result();
        }
        Self::new(StepAction::Method(name))
    }

    pub fn own_result() -> Self {
        Self::new(StepAction::OwnResult)
    }

    /// Passes the organizer attribute `name` as `name`.
    pub fn input(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.input_source(name.clone(), InputSource::Attribute(name))
    }

    /// Passes the organizer attribute `attribute` as `key`.
    pub fn input_from(self, key: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.input_source(key, InputSource::Attribute(attribute.into()))
    }

    pub fn input_value(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input_source(key, InputSource::Value(value.into()))
    }

    pub fn input_with<F>(self, key: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&ServiceInstance) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.input_source(key, InputSource::Proc(Arc::new(compute)))
    }

    pub fn input_source(mut self, key: impl Into<String>, source: InputSource) -> Self {
        self.inputs.push(InputSpec {
            key: key.into(),
            source,
        });
        self
    }

    /// Writes result data `key` into the organizer attribute of the same name.
    pub fn output(self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.output_as(key.clone(), key)
    }

    pub fn output_as(mut self, key: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.outputs.push(OutputSpec {
            key: key.into(),
            attribute: attribute.into(),
        });
        self
    }

    pub fn try_step(mut self) -> Self {
        self.tolerance = Tolerance::Try;
        self
    }

    pub fn fallback(mut self) -> Self {
        self.tolerance = Tolerance::Fallback;
        self
    }

    #[must_use]
    pub fn action(&self) -> &StepAction {
        &self.action
    }

    #[must_use]
    pub fn action_name(&self) -> String {
        self.action.name()
    }

    #[must_use]
    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    #[must_use]
    pub fn outputs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    #[must_use]
    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// Name of the method the fallback of this step calls on the organizer.
    fn fallback_method(&self) -> Option<String> {
        match &self.action {
            StepAction::Service(_) => None,
            StepAction::Method(method) => Some(format!("{method}_fallback")),
            StepAction::OwnResult => Some(FALLBACK_RESULT_METHOD.to_string()),
        }
    }
}

/// A step bound to its organizer class and position.
#[derive(Debug, Clone)]
pub struct Step {
    definition: Arc<StepDef>,
    index: usize,
    organizer: ServiceRef,
}

impl Step {
    #[must_use]
    pub fn new(definition: Arc<StepDef>, index: usize, organizer: ServiceRef) -> Self {
        Self {
            definition,
            index,
            organizer,
        }
    }

    #[must_use]
    pub fn definition(&self) -> &StepDef {
        &self.definition
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn step_ref(&self) -> StepRef {
        StepRef {
            organizer: self.organizer.clone(),
            index: self.index,
            action: self.definition.action_name(),
        }
    }

    /// Evaluates the step's inputs against `organizer`.
    ///
    /// # Errors
    ///
    /// Raises [`Error::AttributeNotFound`] for an attribute the organizer
    /// does not have; errors of input closures propagate.
    pub fn resolve_inputs(&self, organizer: &ServiceInstance) -> Result<Arguments, Error> {
        let mut arguments = Arguments::new();
        for input in &self.definition.inputs {
            let value = match &input.source {
                InputSource::Attribute(name) => organizer.attribute(name)?,
                InputSource::Value(value) => value.clone(),
                InputSource::Proc(compute) => compute(organizer)?,
            };
            arguments = arguments.kwarg(input.key.clone(), value);
        }
        Ok(arguments)
    }

    /// Runs the action with `inputs`.
    ///
    /// # Errors
    ///
    /// Framework errors raised by the action.
    pub fn run_action(
        &self,
        organizer: &ServiceInstance,
        inputs: Arguments,
    ) -> Result<ServiceResult, Error> {
        match &self.definition.action {
            StepAction::Service(class) => class.call(organizer.context(), inputs),
            StepAction::Method(method) if method != RESULT_METHOD => {
                organizer.call_method(method, inputs)
            }
            StepAction::Method(_) | StepAction::OwnResult => {
                organizer.invoke_raw(RESULT_METHOD, &inputs)
            }
        }
    }

    /// Runs the fallback of the action with `inputs`.
    ///
    /// # Errors
    ///
    /// Raises [`Error::FallbackNotDefined`] when there is none.
    pub fn run_fallback(
        &self,
        organizer: &ServiceInstance,
        inputs: Arguments,
    ) -> Result<ServiceResult, Error> {
        if let StepAction::Service(class) = &self.definition.action {
            return class.fallback_result(organizer.context(), inputs);
        }
        let method = self.definition.fallback_method().unwrap_or_default();
        if !organizer.class().has_method(&method) {
            return Err(raise(Error::FallbackNotDefined {
                service: organizer.class().name().to_string(),
                method,
            }));
        }
        organizer.call_method(&method, inputs)
    }

    /// Copies the declared outputs from `result` into the organizer.
    ///
    /// # Errors
    ///
    /// Raises [`Error::MissingStepOutput`] for a key `result` does not carry.
    pub fn write_outputs(
        &self,
        organizer: &ServiceInstance,
        result: &ServiceResult,
    ) -> Result<(), Error> {
        for output in &self.definition.outputs {
            let value = result.unsafe_data().get(&output.key).ok_or_else(|| {
                raise(Error::MissingStepOutput {
                    service: organizer.class().name().to_string(),
                    step_index: self.index,
                    key: output.key.clone(),
                })
            })?;
            organizer.set_attribute(output.attribute.clone(), value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_inputs_and_outputs() {
        let step = StepDef::method("validate")
            .input("email")
            .input_from("login", "username")
            .input_value("strict", true)
            .output("user")
            .output_as("token", "session_token")
            .try_step();

        assert_eq!(step.action_name(), "validate");
        assert_eq!(step.inputs().len(), 3);
        assert!(matches!(&step.inputs()[1].source, InputSource::Attribute(name) if name == "username"));
        assert_eq!(
            step.outputs()[1],
            OutputSpec {
                key: "token".to_string(),
                attribute: "session_token".to_string(),
            }
        );
        assert_eq!(step.tolerance(), Tolerance::Try);
    }

    #[test]
    fn fallback_method_names() {
        assert_eq!(
            StepDef::method("charge").fallback_method().as_deref(),
            Some("charge_fallback")
        );
        assert_eq!(
            StepDef::own_result().fallback_method().as_deref(),
            Some("fallback_result")
        );
        let other = ServiceClass::new("Other");
        assert_eq!(StepDef::service(&other).fallback_method(), None);
    }
}
