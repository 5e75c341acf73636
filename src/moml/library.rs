//! Lazy population of entity libraries.
//!
//! A library's `configure` body is stored unparsed. The first read
//! through one of the populating accessors hands it to
//! [`MomlLibraryLoader`], which parses it with the library as context.

use tracing::debug;

use super::config::ParserConfig;
use super::error::MomlError;
use super::handler::DocumentHandler;
use super::resolve::resolve;
use crate::kernel::{ConfigureText, LibraryLoader, ObjId, Workspace};

/// Parses pending library configurations with a fixed configuration.
#[derive(Debug, Clone)]
pub struct MomlLibraryLoader {
    config: ParserConfig,
}

impl MomlLibraryLoader {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }
}

/// Drop a `<?moml ... ?>` wrapper; text without one is used as is.
pub(crate) fn strip_moml_wrapper(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix("<?moml") {
        Some(rest) => rest.strip_suffix("?>").unwrap_or(rest).trim(),
        None => trimmed,
    }
}

impl LibraryLoader for MomlLibraryLoader {
    fn populate(&self, ws: &mut Workspace, library: ObjId, text: &ConfigureText) -> Result<(), String> {
        let mut body = strip_moml_wrapper(&text.text).to_string();
        let mut base = text.base.clone();
        if body.is_empty() {
            let Some(source) = &text.source else {
                return Ok(());
            };
            let resolved = resolve(&self.config, base.as_deref(), source).map_err(|e| e.to_string())?;
            body = strip_moml_wrapper(&resolved.text).to_string();
            base = Some(resolved.location);
        }
        if body.is_empty() {
            return Ok(());
        }

        debug!(library = %ws.full_name(library), "parsing library contents");
        let mut handler = DocumentHandler::new(ws, &self.config, Some(library), base, false);
        match handler.parse(&body) {
            Ok(_) => Ok(()),
            Err(MomlError::MissingClasses { classes, .. }) => {
                Err(format!("missing classes: {}", classes.join(", ")))
            }
            Err(e) => Err(e.to_string()),
        }
    }
}
