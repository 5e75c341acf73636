//! Event-driven document handler.
//!
//! quick-xml events are turned into SAX-style start/end callbacks that
//! edit the workspace as they arrive:
//!
//! ```text
//! Reader ──► on_start ──► collect + filter attributes ──► dispatch(element)
//!        │                                                   │
//!        │                                   Frame pushed ◄──┘
//!        └─► on_end ──► queued links, then deletes ──► element end work
//!                       ──► end filters ──► undo handed to parent frame
//! ```
//!
//! Two modes bypass dispatch. Inside `configure` and `doc` every nested
//! tag is captured verbatim as text. After an `if` that tested false, or
//! an element whose error the handler chose to skip, everything up to the
//! matching end tag is ignored; a depth counter keeps nested elements of
//! the skipped one from ending the skip early.

use std::mem;

use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, trace, warn};

use super::config::ParserConfig;
use super::context::{Deferred, Frame, FrameKind, Namespace, UndoContext};
use super::error::{ErrorResponse, MomlError, MomlResult, SourceLocation};
use super::parser::ParseReport;
use crate::base::LineIndex;
use crate::kernel::{KernelError, ObjId, UndoEntry, Workspace};

/// Attribute values of one element, in document order.
pub(crate) type Attrs = IndexMap<String, String>;

/// Public id prefix every MoML DOCTYPE carries.
const MOML_PUBLIC_ID: &str = "-//UC Berkeley//DTD MoML";

/// Whether a dispatched element stays open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Open,
    /// Ignore the element and everything inside it.
    Skip,
}

/// Verbatim body of a `configure` or `doc` element.
#[derive(Debug, Default)]
struct RawCapture {
    depth: usize,
    text: String,
}

pub(crate) struct DocumentHandler<'a> {
    pub(crate) ws: &'a mut Workspace,
    pub(crate) config: &'a ParserConfig,
    /// Location of the document being read.
    pub(crate) base: Option<String>,
    pub(crate) undoable: bool,
    /// Object the parse was started in, if any.
    pub(crate) context: Option<ObjId>,
    pub(crate) current: Option<ObjId>,
    pub(crate) toplevel: Option<ObjId>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) namespaces: Vec<Namespace>,
    pub(crate) report: ParseReport,
    /// Classes made visible by `import`.
    pub(crate) imports: Vec<ObjId>,
    /// Undo belonging to other models, bundled with the main entry.
    pub(crate) aux_undo: Vec<UndoEntry>,
    skip_depth: usize,
    raw: Option<RawCapture>,
    lines: LineIndex,
    root_undo: Vec<String>,
    /// Models whose change requests we deferred, with their old setting.
    deferrals: Vec<(ObjId, bool)>,
}

impl<'a> DocumentHandler<'a> {
    pub(crate) fn new(
        ws: &'a mut Workspace,
        config: &'a ParserConfig,
        context: Option<ObjId>,
        base: Option<String>,
        undoable: bool,
    ) -> Self {
        let toplevel = context.map(|c| ws.toplevel(c));
        let mut handler = Self {
            ws,
            config,
            base,
            undoable,
            context,
            current: context,
            toplevel,
            frames: Vec::new(),
            namespaces: Vec::new(),
            report: ParseReport::default(),
            imports: Vec::new(),
            aux_undo: Vec::new(),
            skip_depth: 0,
            raw: None,
            lines: LineIndex::new(""),
            root_undo: Vec::new(),
            deferrals: Vec::new(),
        };
        if let Some(context) = context {
            handler.begin_deferral(context);
        }
        handler
    }

    /// Parse a whole document. A cancelled parse yields `Ok(None)`.
    pub(crate) fn parse(&mut self, text: &str) -> MomlResult<Option<ObjId>> {
        self.lines = LineIndex::new(text);
        let result = match self.run(text) {
            Ok(()) => self.end_document(),
            Err(e) => {
                self.release_deferrals();
                Err(e)
            }
        };
        match result {
            Err(MomlError::Cancelled) => {
                debug!("parse cancelled by error handler");
                Ok(None)
            }
            other => other,
        }
    }

    pub(crate) fn into_report(self) -> ParseReport {
        self.report
    }

    // ── Event loop ───────────────────────────────────────────────────

    /// Feed every event of `text` through the callbacks. Used for the
    /// document itself and for each `input` spliced into it.
    pub(crate) fn run(&mut self, text: &str) -> MomlResult<()> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(false);
        loop {
            let offset = usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX);
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    let at = usize::try_from(reader.error_position()).unwrap_or(0);
                    return Err(MomlError::xml(format!("{e} at {}", self.location(at))));
                }
            };
            match event {
                Event::Start(e) => {
                    if self.capture_tag(&e, false) {
                        continue;
                    }
                    self.on_start(&e, false, offset)?;
                }
                Event::Empty(e) => {
                    if self.capture_tag(&e, true) {
                        continue;
                    }
                    if self.on_start(&e, true, offset)? {
                        self.on_end()?;
                    }
                }
                Event::End(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if let Some(raw) = self.raw.as_mut()
                        && raw.depth > 0
                    {
                        raw.depth -= 1;
                        raw.text.push_str(&format!("</{name}>"));
                        continue;
                    }
                    self.on_end()?;
                }
                Event::Text(t) => {
                    if let Some(raw) = self.raw.as_mut() {
                        if raw.depth == 0 {
                            let text = t.unescape().map_err(|e| MomlError::xml(e.to_string()))?;
                            raw.text.push_str(&text);
                        } else {
                            raw.text.push_str(&String::from_utf8_lossy(&t));
                        }
                    }
                }
                Event::CData(c) => {
                    if let Some(raw) = self.raw.as_mut() {
                        let content = String::from_utf8_lossy(&c);
                        if raw.depth == 0 {
                            raw.text.push_str(&content);
                        } else {
                            raw.text.push_str(&format!("<![CDATA[{content}]]>"));
                        }
                    }
                }
                Event::PI(pi) => {
                    if let Some(raw) = self.raw.as_mut() {
                        raw.text.push_str(&format!("<?{}?>", String::from_utf8_lossy(&pi)));
                    }
                }
                Event::DocType(d) => {
                    if self.skip_depth == 0 && self.raw.is_none() {
                        check_doctype(&String::from_utf8_lossy(&d))?;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(())
    }

    /// Copy a tag into the raw capture. Returns false outside raw mode.
    fn capture_tag(&mut self, e: &BytesStart<'_>, empty: bool) -> bool {
        let Some(raw) = self.raw.as_mut() else {
            return false;
        };
        let inner = String::from_utf8_lossy(e);
        if empty {
            raw.text.push_str(&format!("<{inner}/>"));
        } else {
            raw.text.push_str(&format!("<{inner}>"));
            raw.depth += 1;
        }
        true
    }

    /// Returns whether a frame was opened for the element.
    fn on_start(&mut self, e: &BytesStart<'_>, empty: bool, offset: usize) -> MomlResult<bool> {
        if self.skip_depth > 0 {
            if !empty {
                self.skip_depth += 1;
            }
            return Ok(false);
        }
        let element = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let text = format!("<{}{}>", String::from_utf8_lossy(e), if empty { "/" } else { "" });
        let location = self.location(offset);
        trace!(element = %element, at = %location, "start element");

        let attrs = match self.collect_attributes(e, &element) {
            Ok(Some(attrs)) => attrs,
            Ok(None) => {
                self.begin_skip(empty);
                return Ok(false);
            }
            Err(err) => {
                self.handle_error(err, &text, &location)?;
                self.begin_skip(empty);
                return Ok(false);
            }
        };

        let mut frame = Frame::new(&element, self.current, text.clone(), location.clone());
        match self.dispatch(&element, &attrs, &mut frame, empty) {
            Ok(Flow::Open) => {
                self.frames.push(frame);
                Ok(true)
            }
            Ok(Flow::Skip) => {
                self.abandon(frame);
                self.begin_skip(empty);
                Ok(false)
            }
            Err(err) => {
                self.abandon(frame);
                self.handle_error(err, &text, &location)?;
                self.begin_skip(empty);
                Ok(false)
            }
        }
    }

    fn begin_skip(&mut self, empty: bool) {
        if !empty {
            self.skip_depth = 1;
        }
    }

    fn on_end(&mut self) -> MomlResult<()> {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return Ok(());
        }
        let Some(frame) = self.frames.pop() else {
            return Err(MomlError::xml("end tag without matching start tag"));
        };
        let body = self.raw.take().map(|raw| raw.text);
        self.close(frame, body)
    }

    /// Element-name dispatch. Unknown elements are recorded and otherwise
    /// treated as transparent containers.
    fn dispatch(&mut self, element: &str, attrs: &Attrs, frame: &mut Frame, empty: bool) -> MomlResult<Flow> {
        match element {
            "entity" | "model" | "class" => self.start_entity(element, attrs, frame),
            "port" => self.start_port(attrs, frame),
            "property" | "director" | "rendition" => self.start_property(element, attrs, frame),
            "relation" => self.start_relation(attrs, frame),
            "vertex" => self.start_vertex(attrs, frame),
            "link" | "unlink" | "deleteEntity" | "deletePort" | "deleteProperty" | "deleteRelation" => {
                self.start_deferrable(element, attrs, frame)
            }
            "rename" => self.start_rename(attrs, frame),
            "display" => self.start_display(attrs, frame),
            "doc" => self.start_doc(attrs, frame, empty),
            "configure" => self.start_configure(attrs, frame, empty),
            "group" => self.start_group(attrs, frame),
            "if" => self.start_if(attrs),
            "import" => self.start_import(attrs),
            "input" => self.start_input(attrs),
            other => {
                if !self.report.unrecognized.iter().any(|u| u == other) {
                    self.report.unrecognized.push(other.to_string());
                }
                Ok(Flow::Open)
            }
        }
    }

    /// Undo the cursor and namespace changes of an element that will not
    /// stay open, keeping whatever undo it already produced.
    fn abandon(&mut self, frame: Frame) {
        self.current = frame.saved_current;
        if frame.namespace_pushed {
            self.namespaces.pop();
        }
        self.raw = None;
        let fragment = frame.undo.render(self.ws);
        self.push_undo(fragment);
    }

    fn close(&mut self, mut frame: Frame, body: Option<String>) -> MomlResult<()> {
        if let Some(scope) = frame.scope.take() {
            for request in scope.links.iter().chain(scope.deletes.iter()) {
                self.run_deferred(request, &mut frame.undo)?;
            }
        }

        let outcome = match self.finish_element(&mut frame, body) {
            Ok(()) => Ok(()),
            Err(err) => self.handle_error(err, &frame.text, &frame.location),
        };

        let config = self.config;
        for filter in config.filters() {
            match filter.filter_end_element(self.ws, frame.object, &frame.element, self.base.as_deref()) {
                Ok(true) => self.report.modified = true,
                Ok(false) => {}
                Err(e) => warn!(element = %frame.element, error = %e, "end-element filter failed"),
            }
        }

        self.current = frame.saved_current;
        if frame.namespace_pushed {
            self.namespaces.pop();
        }
        let fragment = frame.undo.render(self.ws);
        self.push_undo(fragment);
        outcome
    }

    /// Kind-specific work when an element closes.
    fn finish_element(&mut self, frame: &mut Frame, body: Option<String>) -> MomlResult<()> {
        match mem::replace(&mut frame.kind, FrameKind::Plain) {
            FrameKind::Configure { target, source } => {
                self.finish_configure(target, source, body.unwrap_or_default(), &mut frame.undo)
            }
            FrameKind::Doc { target, name } => self.finish_doc(target, &name, body.unwrap_or_default(), &mut frame.undo),
            FrameKind::Plain | FrameKind::Group => Ok(()),
        }
    }

    /// Execute a queued link or delete in the context it was queued in.
    fn run_deferred(&mut self, request: &Deferred, undo: &mut UndoContext) -> MomlResult<()> {
        let saved = mem::replace(&mut self.current, Some(request.context));
        let result = self.execute_deferrable(&request.element, &request.attrs);
        self.current = saved;
        match result {
            Ok(fragment) => {
                if self.undoable && !fragment.is_empty() {
                    undo.children.push(fragment);
                }
                Ok(())
            }
            // Objects of a missing class were never created; the missing
            // class is what gets reported.
            Err(MomlError::Kernel(KernelError::NotFound { .. })) if !self.report.missing_classes.is_empty() => {
                debug!(element = %request.text, "skipped: refers to an object of a missing class");
                Ok(())
            }
            Err(err) => self.handle_error(err, &request.text, &request.location),
        }
    }

    pub(crate) fn push_undo(&mut self, fragment: String) {
        if !self.undoable || fragment.is_empty() {
            return;
        }
        match self.frames.last_mut() {
            Some(parent) => parent.undo.children.push(fragment),
            None => self.root_undo.push(fragment),
        }
    }

    // ── Attributes ───────────────────────────────────────────────────

    /// Decode attribute values and run them through the filters. `None`
    /// means a filter dropped the element.
    fn collect_attributes(&mut self, e: &BytesStart<'_>, element: &str) -> MomlResult<Option<Attrs>> {
        let mut attrs = Attrs::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| MomlError::xml(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| MomlError::xml(err.to_string()))?
                .into_owned();
            attrs.insert(key, value);
        }
        let config = self.config;
        for filter in config.filters() {
            for (key, value) in attrs.iter_mut() {
                match filter.filter_attribute_value(self.ws, self.current, element, key, value, self.base.as_deref()) {
                    None => {
                        self.report.modified = true;
                        return Ok(None);
                    }
                    Some(filtered) if filtered != *value => {
                        self.report.modified = true;
                        *value = filtered;
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(Some(attrs))
    }

    // ── Errors ───────────────────────────────────────────────────────

    pub(crate) fn location(&self, offset: usize) -> SourceLocation {
        SourceLocation {
            source: self.base.clone(),
            position: self.lines.position(offset),
        }
    }

    /// Offer an element's error to the error handler. `Ok(())` means the
    /// element is skipped and parsing continues.
    pub(crate) fn handle_error(&mut self, error: MomlError, text: &str, location: &SourceLocation) -> MomlResult<()> {
        if error.is_fatal() {
            return Err(error);
        }
        let error = locate(error, text, location);
        let Some(handler) = self.config.error_handler() else {
            return Err(error);
        };
        let context = self.current.map(|c| self.ws.full_name(c));
        match handler.handle(text, context.as_deref(), &error) {
            ErrorResponse::Continue => {
                debug!(element = text, error = %error, "element skipped");
                Ok(())
            }
            ErrorResponse::Cancel => Err(MomlError::Cancelled),
            ErrorResponse::Throw => Err(error),
        }
    }

    // ── Document end ─────────────────────────────────────────────────

    fn end_document(&mut self) -> MomlResult<Option<ObjId>> {
        if !self.frames.is_empty() {
            self.release_deferrals();
            return Err(MomlError::xml(format!(
                "document ended with {} unclosed element(s)",
                self.frames.len()
            )));
        }
        if !self.report.unrecognized.is_empty() {
            warn!(elements = ?self.report.unrecognized, "unrecognized elements ignored");
        }
        self.push_undo_entry();
        self.release_deferrals();
        if !self.report.missing_classes.is_empty() {
            return Err(MomlError::MissingClasses {
                classes: self.report.missing_classes.clone(),
                toplevel: self.toplevel,
            });
        }
        Ok(self.toplevel)
    }

    /// Wrap the collected undo into one entry on the context's model.
    fn push_undo_entry(&mut self) {
        let Some(context) = self.context.filter(|_| self.undoable) else {
            return;
        };
        let aux = mem::take(&mut self.aux_undo);
        if self.root_undo.is_empty() && aux.is_empty() {
            return;
        }
        if !self.ws.contains(context) {
            return;
        }
        let mut moml = String::from("<group>");
        for fragment in self.root_undo.drain(..).rev() {
            moml.push_str(&fragment);
        }
        moml.push_str("</group>");
        trace!(undo = %moml, "undo entry recorded");
        self.ws.undo_stack_mut(context).push(UndoEntry::new(context, moml).with_aux(aux));
    }

    // ── Change-request deferral ──────────────────────────────────────

    pub(crate) fn begin_deferral(&mut self, model: ObjId) {
        let previous = self.ws.set_deferring_change_requests(model, true);
        self.deferrals.push((model, previous));
    }

    /// Restore every deferral setting we changed and run what queued up.
    fn release_deferrals(&mut self) {
        for (model, previous) in mem::take(&mut self.deferrals).into_iter().rev() {
            if !self.ws.contains(model) {
                continue;
            }
            self.ws.set_deferring_change_requests(model, previous);
            if !previous && let Err(e) = self.ws.execute_change_requests(model) {
                warn!(model = %self.ws.full_name(model), error = %e, "queued change request failed");
            }
        }
    }

    /// Capture everything up to the current element's end tag as text.
    pub(crate) fn begin_raw(&mut self) {
        self.raw = Some(RawCapture::default());
    }

    // ── Input splicing ───────────────────────────────────────────────

    /// Run another document's events at the current position.
    pub(crate) fn splice(&mut self, location: String, text: &str) -> MomlResult<()> {
        let saved_base = mem::replace(&mut self.base, Some(location));
        let saved_lines = mem::replace(&mut self.lines, LineIndex::new(text));
        let result = self.run(text);
        self.base = saved_base;
        self.lines = saved_lines;
        result
    }
}

/// Attach element text and location to an error raised by an element.
fn locate(error: MomlError, text: &str, location: &SourceLocation) -> MomlError {
    let message = match error {
        MomlError::Structural { ref element, .. } if !element.is_empty() => return error,
        MomlError::Structural { message, .. } => message,
        MomlError::Kernel(e) => e.to_string(),
        MomlError::Unresolved(_) | MomlError::RemoteNotApproved(_) | MomlError::Io(_) => error.to_string(),
        other => return other,
    };
    MomlError::Structural {
        message,
        element: text.to_string(),
        location: location.clone(),
    }
}

/// Reject documents whose DOCTYPE names a public id other than MoML's.
fn check_doctype(doctype: &str) -> MomlResult<()> {
    let Some((_, rest)) = doctype.split_once("PUBLIC") else {
        return Ok(());
    };
    let rest = rest.trim_start();
    let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
        return Ok(());
    };
    let public_id = rest[1..].split(quote).next().unwrap_or("");
    if public_id.starts_with(MOML_PUBLIC_ID) {
        Ok(())
    } else {
        Err(MomlError::NotMoml(public_id.to_string()))
    }
}
