#![forbid(unsafe_code)]

use std::fmt;

use chroma_ast::Loc;
use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme, LabeledSpan, NamedSource};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Scope,
    Name,
    Parse,
    Type,
    Import,
    /// Abort-class failure: broken compiler invariant or explicit panic.
    Panic,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Scope => "ScopeError",
            ErrorKind::Name => "NameError",
            ErrorKind::Parse => "ParseError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Import => "ImportError",
            ErrorKind::Panic => "PanicError",
        }
    }

    fn code(self) -> &'static str {
        match self {
            ErrorKind::Scope => "chroma::scope",
            ErrorKind::Name => "chroma::name",
            ErrorKind::Parse => "chroma::parse",
            ErrorKind::Type => "chroma::type",
            ErrorKind::Import => "chroma::import",
            ErrorKind::Panic => "chroma::panic",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Error,
    Note,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub level: Level,
    pub message: String,
    pub loc: Loc,
}

#[derive(Clone, Debug, Error)]
#[error("{kind}: {message}")]
pub struct ChromaError {
    pub kind: ErrorKind,
    pub message: String,
    pub annotations: Vec<Annotation>,
}

impl ChromaError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            annotations: Vec::new(),
        }
    }

    /// An error with a single annotation pointing at `loc`.
    pub fn simple(
        kind: ErrorKind,
        primary: impl Into<String>,
        secondary: impl Into<String>,
        loc: &Loc,
    ) -> Self {
        Self::new(kind, primary).with_error(secondary, loc)
    }

    pub fn type_error(primary: impl Into<String>, secondary: impl Into<String>, loc: &Loc) -> Self {
        Self::simple(ErrorKind::Type, primary, secondary, loc)
    }

    pub fn scope(primary: impl Into<String>, secondary: impl Into<String>, loc: &Loc) -> Self {
        Self::simple(ErrorKind::Scope, primary, secondary, loc)
    }

    pub fn panic(message: impl Into<String>, loc: &Loc) -> Self {
        let message = message.into();
        Self::simple(ErrorKind::Panic, message.clone(), message, loc)
    }

    pub fn add(&mut self, level: Level, message: impl Into<String>, loc: &Loc) {
        self.annotations.push(Annotation {
            level,
            message: message.into(),
            loc: loc.clone(),
        });
    }

    pub fn with_error(mut self, message: impl Into<String>, loc: &Loc) -> Self {
        self.add(Level::Error, message, loc);
        self
    }

    pub fn with_note(mut self, message: impl Into<String>, loc: &Loc) -> Self {
        self.add(Level::Note, message, loc);
        self
    }

    /// Point the error at `loc` unless it already carries a real location.
    /// Errors raised by builtins and operators know nothing about the
    /// source; the frame that evaluated the failing node fills it in.
    pub fn at_loc_maybe(mut self, loc: &Loc) -> Self {
        if loc.is_fake() || self.loc().is_some_and(|l| !l.is_fake()) {
            return self;
        }
        self.annotations.insert(
            0,
            Annotation {
                level: Level::Error,
                message: String::new(),
                loc: loc.clone(),
            },
        );
        self
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// First location attached to this error, if any.
    pub fn loc(&self) -> Option<&Loc> {
        self.annotations.first().map(|a| &a.loc)
    }

    pub fn report(&self, source: &str) -> ErrorReport {
        let filename = self
            .loc()
            .map(|l| l.filename.clone())
            .unwrap_or_else(|| "<unknown>".to_string());
        let mut labels = Vec::new();
        let mut unplaced = Vec::new();
        for ann in &self.annotations {
            let text = match ann.level {
                Level::Error => ann.message.clone(),
                Level::Note => format!("note: {}", ann.message),
            };
            let label = (!text.is_empty()).then(|| text.clone());
            match ann.loc.to_span(source) {
                Some(sp) if ann.level == Level::Error => {
                    labels.push(LabeledSpan::new_primary_with_span(label, sp))
                }
                Some(sp) => labels.push(LabeledSpan::new_with_span(label, sp)),
                None => unplaced.push(format!("{} ({})", text, ann.loc)),
            }
        }
        ErrorReport {
            message: self.to_string(),
            code: self.kind.code(),
            src: NamedSource::new(filename, source.to_string()),
            labels,
            help: (!unplaced.is_empty()).then(|| unplaced.join("\n")),
        }
    }

    pub fn to_report(&self, source: &str) -> miette::Report {
        miette::Report::new(self.report(source))
    }

    /// Human readable rendering with a source snippet.
    pub fn render(&self, source: &str, use_colors: bool) -> String {
        let theme = if use_colors {
            GraphicalTheme::unicode()
        } else {
            GraphicalTheme::unicode_nocolor()
        };
        let handler = GraphicalReportHandler::new_themed(theme);
        let mut out = String::new();
        match handler.render_report(&mut out, &self.report(source)) {
            Ok(()) => out,
            Err(_) => self.to_string(),
        }
    }
}

impl Diagnostic for ChromaError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }
}

/// A `ChromaError` bound to the source text it refers to.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ErrorReport {
    message: String,
    code: &'static str,
    src: NamedSource<String>,
    labels: Vec<LabeledSpan>,
    help: Option<String>,
}

impl Diagnostic for ErrorReport {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.code))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        if self.labels.is_empty() {
            return None;
        }
        Some(Box::new(self.labels.iter().cloned()))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display + 'a>)
    }
}

/// `maybe_plural(1, "argument")` is "1 argument", otherwise "N arguments".
pub fn maybe_plural(n: usize, singular: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {singular}s")
    }
}
