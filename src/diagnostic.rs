// The diagnostic sink every Environment owns. Parsers/analyzers swallow
// their own failures as "did nothing"; compile and execution failures are
// filed here and later rendered as `path:line:col: severity: message`.

use std::fmt;

use crate::reference::{DocumentHandle, Reference};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub document: DocumentHandle,
    pub reference: Reference,
}

impl Diagnostic {
    /// `line`/`column` are 1-based, derived by counting `\n` bytes up to
    /// `reference.position()` in the document's content.
    pub fn line_column(&self) -> (usize, usize) {
        let content = self.document.content();
        let pos = self.reference.position() as usize;
        let upto = &content[..pos.min(content.len())];
        let line = upto.matches('\n').count() + 1;
        let column = match upto.rfind('\n') {
            Some(nl) => pos - nl,
            None => pos + 1,
        };
        (line, column)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (line, column) = self.line_column();
        write!(f, "{}:{}:{}: {}: {}", self.document.name(), line, column, self.severity, self.message)
    }
}

/// Append-only collector. The Unit driver and compiler/executor file
/// diagnostics here; `log` mirrors each one at the matching level so a
/// calling process can subscribe without reading the sink itself.
#[derive(Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Note => log::debug!("{}", diagnostic),
            Severity::Warning => log::warn!("{}", diagnostic),
            Severity::Error => log::error!("{}", diagnostic),
        }
        self.entries.push(diagnostic);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::PseudoDocument;

    #[test]
    fn line_column_counts_newlines() {
        let doc = DocumentHandle::new(PseudoDocument::new("t", "ab\ncd\nef"));
        let d = Diagnostic {
            severity: Severity::Error,
            message: "boom".into(),
            document: doc,
            reference: Reference::new(6, 1),
        };
        assert_eq!(d.line_column(), (3, 1));
    }

    #[test]
    fn has_errors_reflects_severity() {
        let doc = DocumentHandle::new(PseudoDocument::new("t", "x"));
        let mut sink = Diagnostics::new();
        sink.report(Diagnostic { severity: Severity::Warning, message: "m".into(), document: doc.clone(), reference: Reference::new(0, 1) });
        assert!(!sink.has_errors());
        sink.report(Diagnostic { severity: Severity::Error, message: "m".into(), document: doc, reference: Reference::new(0, 1) });
        assert!(sink.has_errors());
    }
}
