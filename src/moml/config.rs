//! Parser configuration.
//!
//! Everything a parse consults besides the workspace itself: the type
//! registry, filters, the error handler, icon loading, the evaluator for
//! `if` tests and how referenced files are found. A [`ParserConfig`] is
//! immutable once built and cheap to clone; nested parses (inputs,
//! external classes, libraries) share their parent's configuration.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use super::error::ErrorHandler;
use super::expr::{ExpressionEvaluator, SimpleEvaluator};
use super::filter::MomlFilter;
use super::resolve::{DenyRemote, FileLoader, ImportCache, RemoteApproval, ResourceLoader};
use crate::kernel::{ObjId, TypeRegistry, Workspace};

/// Gives freshly constructed entities their icon.
pub trait IconLoader: Send + Sync {
    /// Called after an entity of registry type `class_name` is created.
    /// Returns whether an icon was attached.
    fn load_icon(&self, ws: &mut Workspace, class_name: &str, entity: ObjId) -> Result<bool, String>;
}

#[derive(Clone)]
pub struct ParserConfig {
    registry: Arc<TypeRegistry>,
    filters: Vec<Arc<dyn MomlFilter>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    icon_loader: Option<Arc<dyn IconLoader>>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    loader: Arc<dyn ResourceLoader>,
    search_paths: Vec<PathBuf>,
    input_skip: Arc<FxHashSet<String>>,
    remote_approval: Arc<dyn RemoteApproval>,
    approved: Arc<Mutex<FxHashSet<String>>>,
    import_cache: Arc<ImportCache>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for ParserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserConfig")
            .field("filters", &self.filters.len())
            .field("error_handler", &self.error_handler.is_some())
            .field("icon_loader", &self.icon_loader.is_some())
            .field("search_paths", &self.search_paths)
            .field("input_skip", &self.input_skip)
            .finish_non_exhaustive()
    }
}

impl ParserConfig {
    pub fn builder() -> ParserConfigBuilder {
        ParserConfigBuilder::default()
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn filters(&self) -> &[Arc<dyn MomlFilter>] {
        &self.filters
    }

    pub fn error_handler(&self) -> Option<&Arc<dyn ErrorHandler>> {
        self.error_handler.as_ref()
    }

    pub fn icon_loader(&self) -> Option<&Arc<dyn IconLoader>> {
        self.icon_loader.as_ref()
    }

    pub fn evaluator(&self) -> &dyn ExpressionEvaluator {
        self.evaluator.as_ref()
    }

    pub fn loader(&self) -> &dyn ResourceLoader {
        self.loader.as_ref()
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn import_cache(&self) -> &ImportCache {
        &self.import_cache
    }

    /// Whether an `input` of `location` should be ignored. Matches the
    /// whole location or its final path segment.
    pub fn skips_input(&self, location: &str) -> bool {
        if self.input_skip.contains(location) {
            return true;
        }
        let file = location.rsplit(['/', '\\']).next().unwrap_or(location);
        self.input_skip.contains(file)
    }

    /// Ask once per location whether remote content may be loaded.
    pub(crate) fn approve_remote(&self, location: &str) -> bool {
        if self.approved.lock().contains(location) {
            return true;
        }
        let approved = self.remote_approval.approve(location);
        if approved {
            self.approved.lock().insert(location.to_string());
        }
        approved
    }

    /// A copy with the error handler removed, for nested parses whose
    /// errors are reported by the enclosing element.
    pub(crate) fn without_error_handler(&self) -> Self {
        Self {
            error_handler: None,
            ..self.clone()
        }
    }
}

/// Builder for [`ParserConfig`].
#[derive(Default)]
pub struct ParserConfigBuilder {
    registry: Option<TypeRegistry>,
    filters: Vec<Arc<dyn MomlFilter>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    icon_loader: Option<Arc<dyn IconLoader>>,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    loader: Option<Arc<dyn ResourceLoader>>,
    search_paths: Vec<PathBuf>,
    input_skip: FxHashSet<String>,
    remote_approval: Option<Arc<dyn RemoteApproval>>,
    import_cache: Option<Arc<ImportCache>>,
}

impl ParserConfigBuilder {
    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Append a filter. Filters run in the order they were added.
    pub fn with_filter(mut self, filter: impl MomlFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn with_icon_loader(mut self, loader: Arc<dyn IconLoader>) -> Self {
        self.icon_loader = Some(loader);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn with_resource_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Add a directory searched for class files and relative references.
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Ignore `input` elements naming this file.
    pub fn with_input_skip(mut self, file: impl Into<String>) -> Self {
        self.input_skip.insert(file.into());
        self
    }

    pub fn with_remote_approval(mut self, approval: Arc<dyn RemoteApproval>) -> Self {
        self.remote_approval = Some(approval);
        self
    }

    /// Share an import cache between configurations.
    pub fn with_import_cache(mut self, cache: Arc<ImportCache>) -> Self {
        self.import_cache = Some(cache);
        self
    }

    pub fn build(self) -> ParserConfig {
        ParserConfig {
            registry: Arc::new(self.registry.unwrap_or_default()),
            filters: self.filters,
            error_handler: self.error_handler,
            icon_loader: self.icon_loader,
            evaluator: self.evaluator.unwrap_or_else(|| Arc::new(SimpleEvaluator)),
            loader: self.loader.unwrap_or_else(|| Arc::new(FileLoader)),
            search_paths: self.search_paths,
            input_skip: Arc::new(self.input_skip),
            remote_approval: self.remote_approval.unwrap_or_else(|| Arc::new(DenyRemote)),
            approved: Arc::new(Mutex::new(FxHashSet::default())),
            import_cache: self.import_cache.unwrap_or_default(),
        }
    }
}
