use std::sync::Arc;

use convenient_core::{ResultOverrides, ServiceResult, Status};

use super::{Step, StepAction, Tolerance};
use crate::error::{raise, Error};
use crate::method_chain::{ClassSetup, Concern, MethodEnv, Scope};
use crate::middleware::{Chain, Middleware, MiddlewareStack};
use crate::service::{ServiceInstance, RESULT_METHOD};

/// Innermost middleware of an organizer's `result`: runs the steps in
/// order instead of the `result` method.
pub struct StepsMiddleware;

impl Middleware<MethodEnv, ServiceResult> for StepsMiddleware {
    fn call(
        &self,
        env: MethodEnv,
        chain: Chain<'_, MethodEnv, ServiceResult>,
    ) -> Result<ServiceResult, Error> {
        if let Some(organizer) = env.receiver.instance() {
            if !organizer.steps().is_empty() {
                return run_steps(organizer);
            }
        }
        chain.next(env)
    }
}

/// Runs every step of `organizer` in order.
///
/// The first non-success result (after `try`/`fallback` handling) becomes the
/// organizer's result and the remaining steps never run. Otherwise the last
/// step's result is returned.
///
/// # Errors
///
/// Framework errors raised while resolving inputs, running actions or
/// writing outputs.
pub fn run_steps(organizer: &ServiceInstance) -> Result<ServiceResult, Error> {
    let mut last = None;
    for step in organizer.steps() {
        let (result, write_outputs) = run_step(step, organizer)?;
        tracing::debug!(
            service = organizer.class().name(),
            step = step.index(),
            action = %step.definition().action_name(),
            status = %result.status(),
            "step finished"
        );
        if result.is_not_success() {
            return Ok(result);
        }
        if write_outputs {
            step.write_outputs(organizer, &result)?;
        }
        last = Some(result);
    }
    last.ok_or_else(|| {
        raise(Error::MethodNotDefined {
            service: organizer.class().name().to_string(),
            method: RESULT_METHOD.to_string(),
        })
    })
}

/// Runs one step, returning its result attributed to the step and whether
/// its outputs should be written.
fn run_step(step: &Step, organizer: &ServiceInstance) -> Result<(ServiceResult, bool), Error> {
    let inputs = step.resolve_inputs(organizer)?;
    let result = step.run_action(organizer, inputs.clone())?;

    let (result, write_outputs) = if result.is_success() {
        (result, true)
    } else {
        match step.definition().tolerance() {
            Tolerance::Strict => (result, false),
            Tolerance::Try => (
                result.copy(ResultOverrides {
                    status: Some(Status::Success),
                    ..ResultOverrides::default()
                }),
                false,
            ),
            Tolerance::Fallback => (step.run_fallback(organizer, inputs)?, true),
        }
    };
    Ok((result.with_step(step.step_ref()), write_outputs))
}

/// Validates steps at commit and installs [`StepsMiddleware`] as the
/// innermost middleware of `result` when the class has steps.
pub struct StepsConcern;

impl Concern for StepsConcern {
    fn included(&self, setup: &ClassSetup<'_>) -> Result<(), Error> {
        let class = setup.class();
        let steps = class.steps();
        if steps.is_empty() {
            return Ok(());
        }
        for step in &steps {
            let method = match step.action() {
                StepAction::Service(_) => continue,
                StepAction::Method(method) => method.as_str(),
                StepAction::OwnResult => RESULT_METHOD,
            };
            if !class.has_method(method) {
                return Err(raise(Error::StepActionNotFound {
                    service: class.name().to_string(),
                    action: method.to_string(),
                }));
            }
        }
        setup.middlewares(RESULT_METHOD, Scope::Instance, |stack| {
            stack.push(Arc::new(StepsMiddleware));
            Ok(())
        })
    }
}
