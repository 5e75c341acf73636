//! Locating referenced documents and remembering loaded ones.
//!
//! A reference from a `source`, `input` or external class is tried, in
//! order, as given (absolute paths and URLs), relative to the referring
//! document, under each class search path, and relative to the current
//! directory. Remote locations need approval unless they live next to the
//! referring document.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use super::config::ParserConfig;
use super::error::{MomlError, MomlResult};
use crate::kernel::{ObjId, Workspace};

/// Reads the text behind a location.
pub trait ResourceLoader: Send + Sync {
    fn read(&self, location: &str) -> std::io::Result<String>;
}

/// Reads local files. Remote locations are unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl ResourceLoader for FileLoader {
    fn read(&self, location: &str) -> std::io::Result<String> {
        if is_remote(location) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("cannot fetch remote location {location}"),
            ));
        }
        let path = location.strip_prefix("file:").unwrap_or(location);
        std::fs::read_to_string(path)
    }
}

/// Asks whether content may be loaded from a remote location.
pub trait RemoteApproval: Send + Sync {
    fn approve(&self, location: &str) -> bool;
}

/// Refuses every remote location.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyRemote;

impl RemoteApproval for DenyRemote {
    fn approve(&self, _location: &str) -> bool {
        false
    }
}

/// Approves every remote location.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowRemote;

impl RemoteApproval for AllowRemote {
    fn approve(&self, _location: &str) -> bool {
        true
    }
}

pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Directory part of a document location, with a trailing separator for
/// URLs.
fn base_directory(base: &str) -> Option<String> {
    if is_remote(base) {
        return base.rfind('/').map(|i| base[..=i].to_string());
    }
    let path = Path::new(base.strip_prefix("file:").unwrap_or(base));
    path.parent().map(|p| p.to_string_lossy().into_owned())
}

fn join(dir: &str, reference: &str) -> String {
    if is_remote(dir) {
        format!("{dir}{reference}")
    } else {
        PathBuf::from(dir).join(reference).to_string_lossy().into_owned()
    }
}

/// Locations to try for `reference`, most specific first.
pub fn candidates(base: Option<&str>, reference: &str, search_paths: &[PathBuf]) -> Vec<String> {
    if is_remote(reference) || Path::new(reference).is_absolute() {
        return vec![reference.to_string()];
    }
    let mut out = Vec::new();
    if let Some(dir) = base.and_then(base_directory) {
        out.push(join(&dir, reference));
    }
    for path in search_paths {
        out.push(path.join(reference).to_string_lossy().into_owned());
    }
    out.push(reference.to_string());
    let mut seen = FxHashSet::default();
    out.retain(|c| seen.insert(c.clone()));
    out
}

/// A located document.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub location: String,
    pub text: String,
}

/// Find and read the document `reference` names, relative to `base`.
pub fn resolve(config: &ParserConfig, base: Option<&str>, reference: &str) -> MomlResult<Resolved> {
    for location in candidates(base, reference, config.search_paths()) {
        if is_remote(&location) && !remote_allowed(config, base, &location) {
            return Err(MomlError::RemoteNotApproved(location));
        }
        match config.loader().read(&location) {
            Ok(text) => {
                debug!(reference, location = %location, "resolved");
                return Ok(Resolved { location, text });
            }
            Err(e) => trace!(location = %location, error = %e, "candidate rejected"),
        }
    }
    Err(MomlError::Unresolved(reference.to_string()))
}

fn remote_allowed(config: &ParserConfig, base: Option<&str>, location: &str) -> bool {
    if let Some(dir) = base.filter(|b| is_remote(b)).and_then(base_directory)
        && location.starts_with(&dir)
    {
        return true;
    }
    config.approve_remote(location)
}

// ============================================================================
// IMPORT CACHE
// ============================================================================

/// Documents already loaded, per workspace and location.
///
/// Entries hold plain ids, so an entry whose model has been removed simply
/// goes stale and is pruned on the next lookup.
#[derive(Debug, Default)]
pub struct ImportCache {
    entries: Mutex<FxHashMap<(u64, String), ObjId>>,
}

impl ImportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ws: &Workspace, location: &str) -> Option<ObjId> {
        let key = (ws.uid(), location.to_string());
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(id) if ws.contains(*id) => Some(*id),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, ws: &Workspace, location: &str, id: ObjId) {
        self.entries.lock().insert((ws.uid(), location.to_string()), id);
    }

    /// Forget `location`. A class definition that still has live
    /// subclasses or instances is kept; returns whether the entry is gone.
    pub fn purge(&self, ws: &Workspace, location: &str) -> bool {
        let key = (ws.uid(), location.to_string());
        let mut entries = self.entries.lock();
        if let Some(id) = entries.get(&key)
            && ws.is_class_definition(*id)
            && ws.has_live_derived(*id)
        {
            debug!(location, "class with live derived objects kept in import cache");
            return false;
        }
        entries.remove(&key);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
