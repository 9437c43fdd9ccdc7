//! Method definitions and keyword binding.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use convenient_core::{Arguments, ServiceResult, Value};

use super::ServiceInstance;
use crate::error::{raise, Error};

pub type MethodBody =
    Arc<dyn Fn(&ServiceInstance, &Arguments) -> Result<ServiceResult, Error> + Send + Sync>;

/// A declared keyword parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// Must be present among the call's keyword arguments.
    Required(String),
    /// Filled from the call when present, from the default otherwise.
    Optional(String, Value),
    /// Accepts every keyword argument not declared otherwise.
    Rest,
}

impl Param {
    pub fn required(name: impl Into<String>) -> Self {
        Param::Required(name.into())
    }

    pub fn optional(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Param::Optional(name.into(), default.into())
    }

    #[must_use]
    pub fn rest() -> Self {
        Param::Rest
    }
}

/// An instance method of a service class.
pub struct MethodDef {
    name: String,
    params: Vec<Param>,
    body: MethodBody,
}

impl MethodDef {
    pub fn new(name: impl Into<String>, params: Vec<Param>, body: MethodBody) -> Self {
        Self {
            name: name.into(),
            params,
            body,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Keeps only the keyword arguments the method declares, filling
    /// optional ones from their defaults. Positional arguments and the block
    /// pass through.
    ///
    /// # Errors
    ///
    /// Raises [`Error::MissingArgument`] for a required parameter absent from
    /// `arguments`.
    pub fn bind(&self, service: &str, arguments: &Arguments) -> Result<Arguments, Error> {
        let mut bound = BTreeMap::new();
        for param in &self.params {
            match param {
                Param::Required(name) => {
                    let value = arguments.get(name).cloned().ok_or_else(|| {
                        raise(Error::MissingArgument {
                            service: service.to_string(),
                            method: self.name.clone(),
                            argument: name.clone(),
                        })
                    })?;
                    bound.insert(name.clone(), value);
                }
                Param::Optional(name, default) => {
                    let value = arguments.get(name).unwrap_or(default).clone();
                    bound.insert(name.clone(), value);
                }
                Param::Rest => {}
            }
        }
        if self.params.contains(&Param::Rest) {
            for (key, value) in arguments.kwargs() {
                bound.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        let mut result = Arguments::from_kwargs(bound);
        for value in arguments.args() {
            result = result.arg(value.clone());
        }
        if let Some(block) = arguments.block() {
            result = result.with_block(block.clone());
        }
        Ok(result)
    }

    /// Binds `arguments` and runs the body.
    ///
    /// # Errors
    ///
    /// See [`MethodDef::bind`]; errors of the body propagate.
    pub fn invoke(
        &self,
        instance: &ServiceInstance,
        arguments: &Arguments,
    ) -> Result<ServiceResult, Error> {
        let bound = self.bind(instance.class().name(), arguments)?;
        (self.body)(instance, &bound)
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
