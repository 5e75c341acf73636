//! Attribute filters applied while reading.
//!
//! Filters rewrite attribute values before elements are dispatched, mostly
//! to keep old documents loading after classes were renamed or removed.
//! A filter can also drop an element outright by returning `None`.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::kernel::{KernelResult, ObjId, Workspace};

pub trait MomlFilter: Send + Sync {
    /// Return the value to use for `attribute` of `element`, or `None` to
    /// skip the element and everything inside it.
    fn filter_attribute_value(
        &self,
        ws: &Workspace,
        container: Option<ObjId>,
        element: &str,
        attribute: &str,
        value: &str,
        source: Option<&str>,
    ) -> Option<String>;

    /// Called after `element` closes with the object it produced, if any.
    /// Returns whether the filter changed anything.
    fn filter_end_element(
        &self,
        _ws: &mut Workspace,
        _object: Option<ObjId>,
        _element: &str,
        _source: Option<&str>,
    ) -> KernelResult<bool> {
        Ok(false)
    }
}

// ============================================================================
// CLASS CHANGES
// ============================================================================

/// Replaces class ids that have been renamed.
#[derive(Debug, Clone, Default)]
pub struct ClassChanges {
    renames: FxHashMap<String, String>,
}

impl ClassChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_change(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.renames.insert(old.into(), new.into());
        self
    }
}

impl MomlFilter for ClassChanges {
    fn filter_attribute_value(
        &self,
        _ws: &Workspace,
        _container: Option<ObjId>,
        element: &str,
        attribute: &str,
        value: &str,
        _source: Option<&str>,
    ) -> Option<String> {
        if matches!(attribute, "class" | "extends")
            && let Some(replacement) = self.renames.get(value)
        {
            debug!(element, from = value, to = %replacement, "class renamed by filter");
            return Some(replacement.clone());
        }
        Some(value.to_string())
    }
}

// ============================================================================
// REMOVE CLASSES
// ============================================================================

/// Drops elements whose class is listed, such as graphical attributes in
/// a headless run.
#[derive(Debug, Clone, Default)]
pub struct RemoveClasses {
    classes: FxHashSet<String>,
}

impl RemoveClasses {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }
}

impl MomlFilter for RemoveClasses {
    fn filter_attribute_value(
        &self,
        _ws: &Workspace,
        _container: Option<ObjId>,
        element: &str,
        attribute: &str,
        value: &str,
        _source: Option<&str>,
    ) -> Option<String> {
        if attribute == "class" && self.classes.contains(value) {
            debug!(element, class = value, "element removed by filter");
            return None;
        }
        Some(value.to_string())
    }
}
