//! Per-invocation context shared by a call tree.

use std::sync::Arc;

use crate::stubs::StubRegistry;

/// State threaded from a service call into every nested call it makes.
///
/// Step services receive the organizer's context, so stubs registered on a
/// context apply to the whole tree of calls started from it.
#[derive(Debug, Clone, Default)]
pub struct Context {
    stubs: Arc<StubRegistry>,
}

impl Context {
    #[must_use]
    pub fn new(stubs: Arc<StubRegistry>) -> Self {
        Self { stubs }
    }

    #[must_use]
    pub fn stubs(&self) -> &Arc<StubRegistry> {
        &self.stubs
    }
}
