//! Packaged call arguments: positional args, keyword args and an optional block.
//!
//! `Arguments` is both the payload threaded through method chains and the
//! fingerprint stubs are registered under, so equality compares blocks by
//! identity rather than by behavior.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::value::Value;

static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);

type BlockFn = dyn Fn(&[Value]) -> Value + Send + Sync;

/// A callable passed alongside a call, compared by identity.
#[derive(Clone)]
pub struct Block {
    id: u64,
    body: Arc<BlockFn>,
}

impl Block {
    /// Wraps a closure into a block with a fresh identity.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self {
            id: NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed),
            body: Arc::new(body),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Invokes the block.
    #[must_use]
    pub fn call(&self, args: &[Value]) -> Value {
        (self.body)(args)
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Arguments of a single call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
    block: Option<Block>,
}

impl Arguments {
    /// Creates an empty argument list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds arguments holding only keyword arguments.
    pub fn from_kwargs<K, V, I>(kwargs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            kwargs: kwargs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Sets a keyword argument, replacing a previous value for the same key.
    #[must_use]
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Attaches a block.
    #[must_use]
    pub fn with_block(mut self, block: Block) -> Self {
        self.block = Some(block);
        self
    }

    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    #[must_use]
    pub fn kwargs(&self) -> &BTreeMap<String, Value> {
        &self.kwargs
    }

    #[must_use]
    pub fn block(&self) -> Option<&Block> {
        self.block.as_ref()
    }

    /// Looks up a keyword argument.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.kwargs.contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty() && self.block.is_none()
    }

    /// Decomposes into positional args, keyword args and block.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Value>, BTreeMap<String, Value>, Option<Block>) {
        (self.args, self.kwargs, self.block)
    }
}

impl fmt::Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.args.iter().map(ToString::to_string).collect();
        parts.extend(self.kwargs.iter().map(|(k, v)| format!("{k}: {v}")));
        if let Some(block) = &self.block {
            parts.push(format!("&block#{}", block.id));
        }
        write!(f, "({})", parts.join(", "))
    }
}
