use std::fmt;
use std::sync::Arc;

/// Lookup-only reference to the service class that produced a result.
///
/// Equality is by class identity: two refs are equal when they point at the
/// same service class, regardless of the instance that ran.
#[derive(Debug, Clone)]
pub struct ServiceRef {
    id: u64,
    name: Arc<str>,
}

impl ServiceRef {
    #[must_use]
    pub fn new(id: u64, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for ServiceRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceRef {}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Lookup-only reference to the step that produced a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRef {
    /// The organizer class declaring the step.
    pub organizer: ServiceRef,
    /// Position among the organizer's declared steps.
    pub index: usize,
    /// Human-readable action label (service name or method name).
    pub action: String,
}

impl fmt::Display for StepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#steps[{}] ({})", self.organizer, self.index, self.action)
    }
}
