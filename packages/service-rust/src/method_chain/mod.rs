//! Method-chain core: per-method middleware configuration and commit.
//!
//! Every method call on a committed service is packaged into a
//! [`MethodEnv`] and run through the [`CompiledChain`] built for its
//! `(method, scope)` pair. The chain's terminal calls the method body.

pub mod concern;
pub mod config;

use std::fmt;
use std::str::FromStr;

use convenient_core::{Arguments, ServiceRef, ServiceResult};

use crate::context::Context;
use crate::error::{raise, Error};
use crate::middleware::{CompiledStack, Entry};
use crate::service::{ServiceClass, ServiceInstance};

pub use concern::{ClassSetup, Concern, Concerns};
pub use config::{Config, MethodMiddlewares};

/// Stack entry for method chains.
pub type MethodEntry = Entry<MethodEnv, ServiceResult>;

/// Runnable chain of one `(method, scope)` pair.
pub type CompiledChain = CompiledStack<MethodEnv, ServiceResult>;

/// Whether a method is called on the service class or on an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Scope {
    #[default]
    Instance,
    Class,
}

impl Scope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Instance => "instance",
            Scope::Class => "class",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instance" => Ok(Scope::Instance),
            "class" => Ok(Scope::Class),
            other => Err(raise(Error::InvalidScope {
                scope: other.to_string(),
            })),
        }
    }
}

/// The object a method is called on.
#[derive(Debug, Clone)]
pub enum Receiver {
    Instance(ServiceInstance),
    Class(ServiceClass),
}

impl Receiver {
    #[must_use]
    pub fn class(&self) -> &ServiceClass {
        match self {
            Receiver::Instance(instance) => instance.class(),
            Receiver::Class(class) => class,
        }
    }

    #[must_use]
    pub fn instance(&self) -> Option<&ServiceInstance> {
        match self {
            Receiver::Instance(instance) => Some(instance),
            Receiver::Class(_) => None,
        }
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        match self {
            Receiver::Instance(_) => Scope::Instance,
            Receiver::Class(_) => Scope::Class,
        }
    }

    #[must_use]
    pub fn service_ref(&self) -> ServiceRef {
        self.class().service_ref()
    }
}

/// A packaged method call travelling through a chain.
#[derive(Debug, Clone)]
pub struct MethodEnv {
    pub receiver: Receiver,
    pub method: String,
    pub arguments: Arguments,
    pub context: Context,
}

impl MethodEnv {
    pub fn new(
        receiver: Receiver,
        method: impl Into<String>,
        arguments: Arguments,
        context: Context,
    ) -> Self {
        Self {
            receiver,
            method: method.into(),
            arguments,
            context,
        }
    }
}
