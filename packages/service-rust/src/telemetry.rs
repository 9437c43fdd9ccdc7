//! Logging setup and per-call tracing.
//!
//! Service calls are recorded as `tracing` spans.

use std::sync::Arc;
use std::time::Instant;

use convenient_core::ServiceResult;
use tracing::info_span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::{raise, Error};
use crate::method_chain::{ClassSetup, Concern, MethodEnv, Scope};
use crate::middleware::{Chain, Middleware, MiddlewareStack};
use crate::service::RESULT_METHOD;

/// Installs a global fmt subscriber filtered by `filter` (`EnvFilter`
/// syntax, e.g. `"convenient_service=debug"`).
///
/// Returns `Ok(false)` when a global subscriber is already installed.
///
/// # Errors
///
/// Returns [`Error::Internal`] when `filter` does not parse.
pub fn init_tracing(filter: &str) -> Result<bool, Error> {
    let filter = EnvFilter::try_new(filter).map_err(|err| raise(Error::Internal(err.into())))?;
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .is_ok();
    Ok(installed)
}

/// Wraps a call in a span recording service, method, status and duration.
pub struct TracingMiddleware;

impl Middleware<MethodEnv, ServiceResult> for TracingMiddleware {
    fn call(
        &self,
        env: MethodEnv,
        chain: Chain<'_, MethodEnv, ServiceResult>,
    ) -> Result<ServiceResult, Error> {
        let service = env.receiver.class().name().to_string();
        let method = env.method.clone();
        let span = info_span!(
            "service_call",
            service = %service,
            method = %method,
            status = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );
        let _entered = span.enter();

        let start = Instant::now();
        let outcome = chain.next(env);
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;

        let status = match &outcome {
            Ok(result) => result.status().as_str(),
            Err(_) => "raised",
        };
        span.record("status", status);
        span.record("duration_ms", duration_ms);
        tracing::debug!(
            service = %service,
            method = %method,
            status,
            duration_ms,
            "service call complete"
        );
        outcome
    }
}

/// Installs [`TracingMiddleware`] as the outermost instance-scope `result`
/// middleware.
pub struct TracingConcern;

impl Concern for TracingConcern {
    fn included(&self, setup: &ClassSetup<'_>) -> Result<(), Error> {
        setup.middlewares(RESULT_METHOD, Scope::Instance, |stack| {
            stack.unshift(Arc::new(TracingMiddleware));
            Ok(())
        })
    }
}
