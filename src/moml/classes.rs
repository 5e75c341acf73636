//! Resolving the class of an `entity` or `class` element.
//!
//! ```text
//! class reference
//!   ├── MoML class definition in scope (or imported)  → instantiate
//!   ├── registered type id                             → construct
//!   ├── explicit `source` document                     → load, instantiate
//!   ├── a/b/C.xml, then a/b/C.moml                      → load, instantiate
//!   └── otherwise                                      → missing class
//! ```
//!
//! Documents loaded for their class are parsed by a nested handler into
//! a toplevel of their own, marked as a class definition and remembered
//! in the import cache.

use tracing::{debug, trace, warn};

use super::error::{MomlError, MomlResult};
use super::handler::DocumentHandler;
use super::resolve::resolve;
use crate::kernel::{Category, ObjId};

/// Suffixes probed when a class reference names a file by convention.
const CLASS_FILE_SUFFIXES: [&str; 2] = ["xml", "moml"];

impl DocumentHandler<'_> {
    /// Create `name` in `container` from `class_ref`. Returns `None` when
    /// the class cannot be found; it is then recorded as missing.
    pub(crate) fn instantiate_class(
        &mut self,
        class_ref: &str,
        source: Option<&str>,
        container: Option<ObjId>,
        name: &str,
        as_class: bool,
    ) -> MomlResult<Option<ObjId>> {
        if let Some(source) = source {
            let class = self.load_external(source)?;
            return Ok(Some(self.ws.instantiate(class, container, name, as_class)?));
        }

        if let Some(class) = self.find_moml_class(class_ref)? {
            trace!(class = %self.ws.full_name(class), "instantiating MoML class");
            return Ok(Some(self.ws.instantiate(class, container, name, as_class)?));
        }

        let config = self.config;
        if config.registry().contains(class_ref) {
            let entity = config
                .registry()
                .construct(self.ws, container, name, class_ref, Category::Entity)?;
            if as_class {
                self.ws.set_class_definition(entity, true)?;
            }
            if let Some(icons) = config.icon_loader()
                && let Err(e) = icons.load_icon(self.ws, class_ref, entity)
            {
                warn!(class = class_ref, error = %e, "icon could not be loaded");
            }
            return Ok(Some(entity));
        }

        let stem = class_ref.replace('.', "/");
        for suffix in CLASS_FILE_SUFFIXES {
            match self.load_external(&format!("{stem}.{suffix}")) {
                Ok(class) => return Ok(Some(self.ws.instantiate(class, container, name, as_class)?)),
                Err(MomlError::Unresolved(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        self.record_missing(class_ref);
        Ok(None)
    }

    /// A class definition named by `class_ref` that is visible from the
    /// cursor: absolute, in the cursor or any of its containers, or
    /// imported.
    fn find_moml_class(&mut self, class_ref: &str) -> MomlResult<Option<ObjId>> {
        if class_ref.starts_with('.') {
            let Some(scope) = self.current.or(self.toplevel) else {
                return Ok(None);
            };
            let found = self.ws.lookup(scope, class_ref, Category::Entity)?;
            return Ok(found.filter(|c| self.ws.is_class_definition(*c)));
        }

        let mut scope = self.current;
        while let Some(s) = scope {
            if let Some(class) = self.ws.lookup(s, class_ref, Category::Entity)?
                && self.ws.is_class_definition(class)
            {
                return Ok(Some(class));
            }
            scope = self.ws.container(s);
        }

        let imported = self.imports.iter().copied().find(|class| {
            let name = self.ws.name(*class);
            self.ws.contains(*class) && (name == class_ref || class_ref.ends_with(&format!(".{name}")))
        });
        Ok(imported)
    }

    /// Load the document at `reference` as a class definition, or return the
    /// one loaded earlier.
    pub(crate) fn load_external(&mut self, reference: &str) -> MomlResult<ObjId> {
        let config = self.config;
        let resolved = resolve(config, self.base.as_deref(), reference)?;
        if let Some(cached) = config.import_cache().get(self.ws, &resolved.location) {
            trace!(location = %resolved.location, "class found in import cache");
            return Ok(cached);
        }

        debug!(location = %resolved.location, "loading class document");
        let nested_config = config.without_error_handler();
        let mut nested = DocumentHandler::new(
            &mut *self.ws,
            &nested_config,
            None,
            Some(resolved.location.clone()),
            false,
        );
        let outcome = nested.parse(&resolved.text);
        let report = nested.into_report();
        for element in report.unrecognized {
            if !self.report.unrecognized.contains(&element) {
                self.report.unrecognized.push(element);
            }
        }
        let class = match outcome {
            Ok(Some(class)) => class,
            Ok(None) => {
                return Err(MomlError::structural(format!(
                    "{} does not define a class",
                    resolved.location
                )));
            }
            Err(MomlError::MissingClasses { classes, toplevel }) => {
                for class in &classes {
                    self.record_missing(class);
                }
                toplevel.ok_or_else(|| MomlError::Unresolved(reference.to_string()))?
            }
            Err(e) => return Err(e),
        };

        self.ws.set_class_definition(class, true)?;
        self.ws.set_source(class, Some(resolved.location.clone()))?;
        config.import_cache().insert(self.ws, &resolved.location, class);
        Ok(class)
    }

    pub(crate) fn record_missing(&mut self, class: &str) {
        if !self.report.missing_classes.iter().any(|c| c == class) {
            debug!(class, "class not found");
            self.report.missing_classes.push(class.to_string());
        }
    }
}
