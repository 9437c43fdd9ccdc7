//! Concerns: units of class behavior included once, at commit time.

use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use convenient_core::ServiceResult;

use super::{MethodEnv, Scope};
use crate::error::Error;
use crate::middleware::ArrayStack;
use crate::service::ServiceClass;

/// Behavior contributed to a service class when its config is committed.
///
/// Concerns are identified by type: including the same concern type twice is
/// a no-op.
pub trait Concern: Send + Sync + 'static {
    fn id(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Called once, while the class is being committed.
    ///
    /// # Errors
    ///
    /// Any error aborts the commit.
    fn included(&self, setup: &ClassSetup<'_>) -> Result<(), Error>;
}

/// Handle given to concerns during commit.
///
/// Unlike the class DSL it does not reject changes: the class is not
/// committed until every concern has been included.
pub struct ClassSetup<'a> {
    class: &'a ServiceClass,
}

impl<'a> ClassSetup<'a> {
    pub(crate) fn new(class: &'a ServiceClass) -> Self {
        Self { class }
    }

    #[must_use]
    pub fn class(&self) -> &'a ServiceClass {
        self.class
    }

    /// Edits the middleware stack of `(method, scope)`.
    ///
    /// # Errors
    ///
    /// Propagates errors returned by `configure`.
    pub fn middlewares<F>(&self, method: &str, scope: Scope, configure: F) -> Result<(), Error>
    where
        F: FnOnce(&mut ArrayStack<MethodEnv, ServiceResult>) -> Result<(), Error>,
    {
        self.class.config().configure(method, scope, configure)
    }
}

/// Ordered list of concerns queued for inclusion.
#[derive(Default)]
pub struct Concerns {
    entries: Vec<Arc<dyn Concern>>,
    included: HashSet<TypeId>,
}

impl Concerns {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a concern. Queuing a type that is already queued is ignored.
    pub fn push(&mut self, concern: Arc<dyn Concern>) -> &mut Self {
        if !self.contains(concern.id()) {
            self.entries.push(concern);
        }
        self
    }

    #[must_use]
    pub fn contains(&self, id: TypeId) -> bool {
        self.entries.iter().any(|entry| entry.id() == id)
    }

    #[must_use]
    pub fn is_included(&self, id: TypeId) -> bool {
        self.included.contains(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued concerns not included yet, in queue order.
    #[must_use]
    pub fn pending(&self) -> Vec<Arc<dyn Concern>> {
        self.entries
            .iter()
            .filter(|entry| !self.included.contains(&entry.id()))
            .cloned()
            .collect()
    }

    /// Records `id` as included. Returns `false` when it already was.
    pub fn mark_included(&mut self, id: TypeId) -> bool {
        self.included.insert(id)
    }

    /// Includes one concern. Returns `false` when it was already included.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by [`Concern::included`]; the concern
    /// stays not included.
    pub fn include(
        &mut self,
        concern: &Arc<dyn Concern>,
        setup: &ClassSetup<'_>,
    ) -> Result<bool, Error> {
        let id = concern.id();
        if self.included.contains(&id) {
            return Ok(false);
        }
        concern.included(setup)?;
        self.mark_included(id);
        tracing::debug!(
            service = setup.class().name(),
            concern = concern.name(),
            "concern included"
        );
        Ok(true)
    }

    /// Includes every queued concern in order, returning how many were
    /// included by this call.
    ///
    /// # Errors
    ///
    /// Stops at the first concern that fails.
    pub fn include_all(&mut self, setup: &ClassSetup<'_>) -> Result<usize, Error> {
        let mut count = 0;
        for concern in self.entries.clone() {
            if self.include(&concern, setup)? {
                count += 1;
            }
        }
        Ok(count)
    }
}

impl fmt::Debug for Concerns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| entry.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Counting(Arc<AtomicUsize>);

    impl Concern for Counting {
        fn included(&self, _setup: &ClassSetup<'_>) -> Result<(), Error> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn include_is_idempotent() {
        let class = ServiceClass::new("Owner");
        let setup = ClassSetup::new(&class);
        let counter = Arc::new(AtomicUsize::new(0));
        let concern: Arc<dyn Concern> = Arc::new(Counting(Arc::clone(&counter)));

        let mut concerns = Concerns::new();
        concerns.push(Arc::clone(&concern));
        assert!(concerns.include(&concern, &setup).unwrap());
        assert!(!concerns.include(&concern, &setup).unwrap());
        assert_eq!(concerns.include_all(&setup).unwrap(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(concerns.is_included(TypeId::of::<Counting>()));
    }

    #[test]
    fn pending_skips_included_concerns() {
        let class = ServiceClass::new("Owner");
        let setup = ClassSetup::new(&class);
        let counter = Arc::new(AtomicUsize::new(0));
        let concern: Arc<dyn Concern> = Arc::new(Counting(counter));

        let mut concerns = Concerns::new();
        concerns.push(Arc::clone(&concern));
        assert_eq!(concerns.pending().len(), 1);
        concerns.include(&concern, &setup).unwrap();
        assert!(concerns.pending().is_empty());
        assert!(!concerns.mark_included(TypeId::of::<Counting>()));
    }

    #[test]
    fn push_ignores_duplicate_types() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut concerns = Concerns::new();
        concerns
            .push(Arc::new(Counting(Arc::clone(&counter))))
            .push(Arc::new(Counting(counter)));
        assert_eq!(concerns.len(), 1);
    }
}
