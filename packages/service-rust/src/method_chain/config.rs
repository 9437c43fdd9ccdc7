//! Per-class config: concerns, method middlewares and the commit transition.

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use convenient_core::ServiceResult;
use parking_lot::{ReentrantMutex, RwLock};

use super::concern::{ClassSetup, Concerns};
use super::{CompiledChain, MethodEnv, Scope};
use crate::config::StackBackend;
use crate::error::{raise, Error};
use crate::middleware::{ArrayStack, CompiledStack, MiddlewareStack};
use crate::service::ServiceClass;

/// Middlewares configured for one `(method, scope)` pair.
#[derive(Debug, Clone)]
pub struct MethodMiddlewares {
    method: String,
    scope: Scope,
    stack: ArrayStack<MethodEnv, ServiceResult>,
}

impl MethodMiddlewares {
    #[must_use]
    pub fn new(method: impl Into<String>, scope: Scope) -> Self {
        Self {
            method: method.into(),
            scope,
            stack: ArrayStack::new(),
        }
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    #[must_use]
    pub fn stack(&self) -> &ArrayStack<MethodEnv, ServiceResult> {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut ArrayStack<MethodEnv, ServiceResult> {
        &mut self.stack
    }

    /// Freezes the stack into a runnable chain.
    #[must_use]
    pub fn define(&self, backend: StackBackend) -> CompiledChain {
        CompiledStack::compile(&self.stack, backend)
    }
}

/// Config of one service class.
///
/// Mutable until [`Config::commit`] succeeds, frozen afterwards.
pub struct Config {
    service: Arc<str>,
    committed: AtomicBool,
    /// Held while committing; the flag marks a commit in progress so a
    /// concern calling back into commit on the same thread returns early.
    commit_lock: ReentrantMutex<Cell<bool>>,
    concerns: RwLock<Concerns>,
    middlewares: RwLock<BTreeMap<(String, Scope), MethodMiddlewares>>,
    chains: OnceLock<HashMap<(String, Scope), CompiledChain>>,
}

impl Config {
    #[must_use]
    pub fn new(service: Arc<str>) -> Self {
        Self::with_concerns(service, Concerns::new())
    }

    /// Config with `concerns` already queued.
    #[must_use]
    pub fn with_concerns(service: Arc<str>, concerns: Concerns) -> Self {
        Self {
            service,
            committed: AtomicBool::new(false),
            commit_lock: ReentrantMutex::new(Cell::new(false)),
            concerns: RwLock::new(concerns),
            middlewares: RwLock::new(BTreeMap::new()),
            chains: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    /// # Errors
    ///
    /// Raises [`Error::ConfigCommitted`] once the config is committed.
    pub fn assert_not_committed(&self) -> Result<(), Error> {
        if self.is_committed() {
            return Err(raise(Error::ConfigCommitted {
                service: self.service.to_string(),
            }));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Raises [`Error::ConfigNotCommitted`] until the config is committed.
    pub fn assert_committed(&self) -> Result<(), Error> {
        if !self.is_committed() {
            return Err(raise(Error::ConfigNotCommitted {
                service: self.service.to_string(),
            }));
        }
        Ok(())
    }

    /// Edits the queued concerns.
    ///
    /// # Errors
    ///
    /// Raises [`Error::ConfigCommitted`] once the config is committed.
    pub fn concerns<F>(&self, configure: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Concerns),
    {
        self.assert_not_committed()?;
        configure(&mut self.concerns.write());
        Ok(())
    }

    /// Edits the middleware stack of `(method, scope)`, creating it on first
    /// use. Does not check the committed state; the class DSL does.
    ///
    /// # Errors
    ///
    /// Propagates errors returned by `configure`.
    pub fn configure<F>(&self, method: &str, scope: Scope, configure: F) -> Result<(), Error>
    where
        F: FnOnce(&mut ArrayStack<MethodEnv, ServiceResult>) -> Result<(), Error>,
    {
        let mut middlewares = self.middlewares.write();
        let entry = middlewares
            .entry((method.to_string(), scope))
            .or_insert_with(|| MethodMiddlewares::new(method, scope));
        configure(entry.stack_mut())
    }

    /// Snapshot of the middlewares configured for `(method, scope)`.
    #[must_use]
    pub fn method_middlewares(&self, method: &str, scope: Scope) -> Option<MethodMiddlewares> {
        self.middlewares
            .read()
            .get(&(method.to_string(), scope))
            .cloned()
    }

    /// The committed chain of `(method, scope)`, if any middleware wraps it.
    #[must_use]
    pub fn chain(&self, method: &str, scope: Scope) -> Option<&CompiledChain> {
        self.chains.get()?.get(&(method.to_string(), scope))
    }

    /// Includes the queued concerns, compiles every method chain and marks
    /// the config committed.
    ///
    /// Returns `true` for the call that committed and `false` for every later
    /// call. Concurrent callers serialize on the commit lock; only one of them
    /// observes the uncommitted state. A concern that commits the class again
    /// from `included` gets `false`.
    ///
    /// # Errors
    ///
    /// Propagates the first error raised by a concern. The config stays
    /// uncommitted and concerns included so far are not included again.
    pub fn commit(&self, class: &ServiceClass) -> Result<bool, Error> {
        if self.is_committed() {
            return Ok(false);
        }
        let in_progress = self.commit_lock.lock();
        if self.is_committed() || in_progress.get() {
            return Ok(false);
        }

        let included = {
            in_progress.set(true);
            let _reset = CommitReset(&in_progress);
            self.include_pending(class)?
        };

        let backend = class.framework().stack_backend;
        let chains = self
            .middlewares
            .read()
            .iter()
            .filter(|(_, middlewares)| !middlewares.stack().is_empty())
            .map(|(key, middlewares)| (key.clone(), middlewares.define(backend)))
            .collect::<HashMap<_, _>>();
        let chain_count = chains.len();
        let _ = self.chains.set(chains);

        self.committed.store(true, Ordering::Release);
        tracing::info!(
            service = %self.service,
            concerns = included,
            chains = chain_count,
            backend = ?backend,
            "config committed"
        );
        Ok(true)
    }

    /// Includes queued concerns until none is pending. No lock on the
    /// concerns is held while a concern runs, so concerns may queue more.
    fn include_pending(&self, class: &ServiceClass) -> Result<usize, Error> {
        let setup = ClassSetup::new(class);
        let mut count = 0;
        loop {
            let pending = self.concerns.read().pending();
            if pending.is_empty() {
                return Ok(count);
            }
            for concern in pending {
                if self.concerns.read().is_included(concern.id()) {
                    continue;
                }
                concern.included(&setup)?;
                if self.concerns.write().mark_included(concern.id()) {
                    count += 1;
                    tracing::debug!(
                        service = class.name(),
                        concern = concern.name(),
                        "concern included"
                    );
                }
            }
        }
    }
}

struct CommitReset<'a>(&'a Cell<bool>);

impl Drop for CommitReset<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("service", &self.service)
            .field("committed", &self.is_committed())
            .field("concerns", &*self.concerns.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::method_chain::Concern;
    use crate::middleware::{Chain, FnMiddleware};

    struct Marker(Arc<AtomicUsize>);

    impl Concern for Marker {
        fn included(&self, _setup: &ClassSetup<'_>) -> Result<(), Error> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn commit_returns_true_exactly_once() {
        let class = ServiceClass::new("Committer");
        let counter = Arc::new(AtomicUsize::new(0));
        class
            .concerns({
                let counter = Arc::clone(&counter);
                move |concerns| {
                    concerns.push(Arc::new(Marker(counter)));
                }
            })
            .unwrap();

        let config = class.config();
        assert!(!config.is_committed());
        assert!(config.commit(&class).unwrap());
        for _ in 0..3 {
            assert!(!config.commit(&class).unwrap());
        }
        assert!(config.is_committed());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    struct Outer(Arc<AtomicUsize>);

    impl Concern for Outer {
        fn included(&self, setup: &ClassSetup<'_>) -> Result<(), Error> {
            assert!(!setup.class().commit_config()?);
            let counter = Arc::clone(&self.0);
            setup.class().concerns(move |concerns| {
                concerns.push(Arc::new(Marker(counter)));
            })?;
            Ok(())
        }
    }

    #[test]
    fn concerns_can_queue_concerns_and_recommit() {
        let class = ServiceClass::new("Nested");
        let counter = Arc::new(AtomicUsize::new(0));
        class
            .concerns({
                let counter = Arc::clone(&counter);
                move |concerns| {
                    concerns.push(Arc::new(Outer(counter)));
                }
            })
            .unwrap();

        assert!(class.commit_config().unwrap());
        assert!(class.is_committed());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(class.config().concerns(|_| {}).is_err());
    }

    #[test]
    fn failed_commit_can_be_retried() {
        struct Failing;
        impl Concern for Failing {
            fn included(&self, _setup: &ClassSetup<'_>) -> Result<(), Error> {
                Err(Error::StackInUse)
            }
        }

        let class = ServiceClass::new("Retried");
        class
            .concerns(|concerns| {
                concerns.push(Arc::new(Failing));
            })
            .unwrap();
        assert!(class.commit_config().is_err());
        assert!(!class.is_committed());
        assert!(class.commit_config().is_err());
    }

    #[test]
    fn committed_config_rejects_changes() {
        let class = ServiceClass::new("Frozen");
        class.commit_config().unwrap();

        let err = class.config().concerns(|_| {}).unwrap_err();
        assert!(matches!(err, Error::ConfigCommitted { ref service } if service == "Frozen"));
        assert!(class.config().assert_committed().is_ok());
    }

    #[test]
    fn only_configured_methods_get_chains() {
        let class = ServiceClass::new("Chained");
        class
            .middlewares("greet", Scope::Instance, |stack| {
                stack.push(FnMiddleware::entry(
                    "pass",
                    |env: MethodEnv, chain: Chain<'_, MethodEnv, ServiceResult>| chain.next(env),
                ));
                Ok(())
            })
            .unwrap();
        class.commit_config().unwrap();

        let config = class.config();
        assert!(config.chain("greet", Scope::Instance).is_some());
        assert!(config.chain("greet", Scope::Class).is_none());
        assert_eq!(
            config
                .method_middlewares("greet", Scope::Instance)
                .map(|middlewares| middlewares.stack().len()),
            Some(1)
        );
    }
}
