//! Dependency container: modules export named callables, service classes
//! import them.
//!
//! An import binds a module's export to a name on the importing class, with
//! instance or class scope. When several imports share a name, prepended
//! imports win over appended ones, and within each group the latest import
//! wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use convenient_core::{Arguments, Value};
use parking_lot::RwLock;

use crate::error::{raise, Error};
use crate::method_chain::Scope;

pub type ExportFn = Arc<dyn Fn(&Arguments) -> Result<Value, Error> + Send + Sync>;

struct ModuleInner {
    name: String,
    exportable: bool,
    exports: RwLock<HashMap<(String, Scope), ExportFn>>,
}

/// A named container of exports.
#[derive(Clone)]
pub struct DependencyModule {
    inner: Arc<ModuleInner>,
}

impl DependencyModule {
    /// A module that can export dependencies.
    pub fn exporting(name: impl Into<String>) -> Self {
        Self::build(name.into(), true)
    }

    /// A plain module. Exporting from it, or importing from it, is an error.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), false)
    }

    fn build(name: String, exportable: bool) -> Self {
        Self {
            inner: Arc::new(ModuleInner {
                name,
                exportable,
                exports: RwLock::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn is_exportable(&self) -> bool {
        self.inner.exportable
    }

    /// Exports `body` as `slug` with `scope`, replacing a previous export of
    /// the same slug and scope.
    ///
    /// # Errors
    ///
    /// Raises [`Error::NotExportableModule`] for a plain module.
    pub fn export<F>(&self, slug: impl Into<String>, scope: Scope, body: F) -> Result<&Self, Error>
    where
        F: Fn(&Arguments) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.assert_exportable()?;
        self.inner
            .exports
            .write()
            .insert((slug.into(), scope), Arc::new(body));
        Ok(self)
    }

    /// The export registered as `slug` with `scope`.
    ///
    /// # Errors
    ///
    /// Raises [`Error::NotExportableModule`] for a plain module and
    /// [`Error::NotExportedMethod`] when nothing matches.
    pub fn fetch(&self, slug: &str, scope: Scope) -> Result<ExportFn, Error> {
        self.assert_exportable()?;
        self.inner
            .exports
            .read()
            .get(&(slug.to_string(), scope))
            .cloned()
            .ok_or_else(|| {
                raise(Error::NotExportedMethod {
                    module: self.inner.name.clone(),
                    slug: slug.to_string(),
                    scope: scope.to_string(),
                })
            })
    }

    fn assert_exportable(&self) -> Result<(), Error> {
        if self.inner.exportable {
            return Ok(());
        }
        Err(raise(Error::NotExportableModule {
            module: self.inner.name.clone(),
        }))
    }
}

impl fmt::Debug for DependencyModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyModule")
            .field("name", &self.inner.name)
            .field("exportable", &self.inner.exportable)
            .finish_non_exhaustive()
    }
}

/// How an export is imported.
#[derive(Debug, Clone)]
#[must_use]
pub struct ImportOptions {
    module: DependencyModule,
    scope: Scope,
    alias: Option<String>,
    prepend: bool,
}

impl ImportOptions {
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Name to import under instead of the slug.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn prepend(mut self, prepend: bool) -> Self {
        self.prepend = prepend;
        self
    }
}

impl From<&DependencyModule> for ImportOptions {
    fn from(module: &DependencyModule) -> Self {
        Self {
            module: module.clone(),
            scope: Scope::Instance,
            alias: None,
            prepend: false,
        }
    }
}

struct Import {
    name: String,
    scope: Scope,
    prepend: bool,
    export: ExportFn,
}

/// Imports of one service class, in import order.
#[derive(Default)]
pub struct Imports {
    entries: Vec<Import>,
}

impl Imports {
    /// Resolves `slug` in the options' module and records the import.
    ///
    /// # Errors
    ///
    /// Raises [`Error::NotExportableModule`] or [`Error::NotExportedMethod`].
    pub fn import(&mut self, slug: &str, options: ImportOptions) -> Result<(), Error> {
        let export = options.module.fetch(slug, options.scope)?;
        let name = options.alias.unwrap_or_else(|| slug.to_string());
        tracing::debug!(
            module = options.module.name(),
            slug,
            name = %name,
            scope = %options.scope,
            prepend = options.prepend,
            "dependency imported"
        );
        self.entries.push(Import {
            name,
            scope: options.scope,
            prepend: options.prepend,
            export,
        });
        Ok(())
    }

    /// The export bound to `name` with `scope`.
    #[must_use]
    pub fn resolve(&self, name: &str, scope: Scope) -> Option<ExportFn> {
        let matching = |prepend: bool| {
            self.entries
                .iter()
                .rev()
                .find(|import| {
                    import.prepend == prepend && import.scope == scope && import.name == name
                })
                .map(|import| Arc::clone(&import.export))
        };
        matching(true).or_else(|| matching(false))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: &'static str) -> impl Fn(&Arguments) -> Result<Value, Error> {
        move |_| Ok(Value::from(value))
    }

    #[test]
    fn plain_modules_can_not_export() {
        let module = DependencyModule::new("Helpers");
        let err = module
            .export("format", Scope::Instance, constant("x"))
            .unwrap_err();
        assert!(matches!(err, Error::NotExportableModule { ref module } if module == "Helpers"));

        let err = Imports::default()
            .import("format", ImportOptions::from(&module))
            .unwrap_err();
        assert!(matches!(err, Error::NotExportableModule { .. }));
    }

    #[test]
    fn import_requires_a_matching_export() {
        let module = DependencyModule::exporting("Commands");
        module
            .export("assert_valid", Scope::Class, constant("class"))
            .unwrap();

        let mut imports = Imports::default();
        let err = imports
            .import("assert_valid", ImportOptions::from(&module))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "`assert_valid` with scope `instance` is NOT exported from `Commands`"
        );
        imports
            .import(
                "assert_valid",
                ImportOptions::from(&module).scope(Scope::Class),
            )
            .unwrap();
        assert_eq!(imports.len(), 1);
    }

    #[test]
    fn prepended_imports_win_then_latest() {
        let first = DependencyModule::exporting("First");
        let second = DependencyModule::exporting("Second");
        let third = DependencyModule::exporting("Third");
        first.export("call", Scope::Instance, constant("first")).unwrap();
        second.export("call", Scope::Instance, constant("second")).unwrap();
        third.export("call", Scope::Instance, constant("third")).unwrap();

        let mut imports = Imports::default();
        imports
            .import("call", ImportOptions::from(&first).prepend(true))
            .unwrap();
        imports.import("call", ImportOptions::from(&second)).unwrap();
        imports.import("call", ImportOptions::from(&third)).unwrap();

        let resolved = imports.resolve("call", Scope::Instance).unwrap();
        assert_eq!(resolved(&Arguments::new()).unwrap(), Value::from("first"));
        assert!(imports.resolve("call", Scope::Class).is_none());
    }

    #[test]
    fn alias_renames_the_import() {
        let module = DependencyModule::exporting("Formatting");
        module
            .export("format", Scope::Instance, |arguments: &Arguments| {
                Ok(Value::from(format!("<{}>", arguments.args().len())))
            })
            .unwrap();

        let mut imports = Imports::default();
        imports
            .import("format", ImportOptions::from(&module).alias("render"))
            .unwrap();
        assert!(imports.resolve("format", Scope::Instance).is_none());
        let render = imports.resolve("render", Scope::Instance).unwrap();
        assert_eq!(
            render(&Arguments::new().arg(1).arg(2)).unwrap(),
            Value::from("<2>")
        );
    }
}
