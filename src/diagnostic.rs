use crate::ast::Position;
use crate::recovery::TerminatorHint;
use annotate_snippets::display_list::{DisplayList, FormatOptions};
use annotate_snippets::snippet::*;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

const CONTEXT_LINES: usize = 5;
const DEVELOPER_HINT: &str = "This shouldn't happen. Please contact the developers.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    Syntax,
    Impossible,
    UnknownObject,
    Argument,
    Type,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::Syntax => "SyntaxError",
            DiagnosticKind::Impossible => "ImpossibleError",
            DiagnosticKind::UnknownObject => "UnknownObjectError",
            DiagnosticKind::Argument => "ArgumentError",
            DiagnosticKind::Type => "TypeError",
        }
    }
}

impl Display for DiagnosticKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Remediation {
    Hint(String),
    MissingTerminator(TerminatorHint),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub description: String,
    pub remediation: Option<Remediation>,
    pub reference: Option<Position>,
    /// Compilation unit whose source the reference points into.
    pub unit: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            remediation: None,
            reference: None,
            unit: None,
        }
    }

    pub fn syntax(description: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Syntax, description)
    }

    /// A compiler invariant failed; always carries the developer hint.
    pub fn impossible(description: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Impossible, description).with_hint(DEVELOPER_HINT)
    }

    pub fn unknown_object(description: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::UnknownObject, description)
    }

    pub fn argument(description: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Argument, description)
    }

    pub fn type_error(description: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Type, description)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.remediation = Some(Remediation::Hint(hint.into()));
        self
    }

    pub fn with_remediation(mut self, remediation: Option<Remediation>) -> Self {
        self.remediation = remediation;
        self
    }

    pub fn at(mut self, pos: Position) -> Self {
        self.reference = Some(pos);
        self
    }

    pub fn at_opt(mut self, pos: Option<Position>) -> Self {
        self.reference = pos;
        self
    }

    pub fn in_unit(mut self, unit: Option<&str>) -> Self {
        if self.unit.is_none() {
            self.unit = unit.map(str::to_string);
        }
        self
    }

    pub fn hint(&self) -> Option<&str> {
        match &self.remediation {
            Some(Remediation::Hint(hint)) => Some(hint),
            _ => None,
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)?;
        if let Some(pos) = self.reference {
            write!(f, " (line {}, column {})", pos.line, pos.column)?;
        }
        Ok(())
    }
}

/// Append-only diagnostic collection, shareable between units compiled in parallel.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Mutex<Vec<Diagnostic>>,
    sources: Mutex<HashMap<String, Arc<Vec<String>>>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_source(&self, unit: &str, source: &str) {
        let lines = source.split('\n').map(|line| line.trim_end_matches('\r').to_string()).collect();
        lock(&self.sources).insert(unit.to_string(), Arc::new(lines));
    }

    pub fn source_lines(&self, unit: &str) -> Option<Arc<Vec<String>>> {
        lock(&self.sources).get(unit).cloned()
    }

    pub fn throw(&self, diagnostic: Diagnostic) {
        tracing::debug!(kind = diagnostic.kind.as_str(), "{}", diagnostic.description);
        lock(&self.entries).push(diagnostic);
    }

    pub fn sink<'a>(&'a self, unit: Option<&'a str>) -> UnitSink<'a> {
        UnitSink {
            diagnostics: self,
            unit,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        lock(&self.entries).iter().filter(|d| d.kind == kind).count()
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        lock(&self.entries).clone()
    }

    /// Renders every collected diagnostic with its source context.
    pub fn render(&self, color: bool) -> String {
        let entries = self.snapshot();
        let mut out = String::new();
        for diagnostic in &entries {
            let lines = diagnostic.unit.as_deref().and_then(|unit| self.source_lines(unit));
            out.push_str(&render_diagnostic(diagnostic, lines.as_deref().map(Vec::as_slice), color));
            out.push('\n');
        }
        out
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A handle on the sink that tags every diagnostic with its unit.
#[derive(Debug, Clone, Copy)]
pub struct UnitSink<'a> {
    diagnostics: &'a Diagnostics,
    unit: Option<&'a str>,
}

impl<'a> UnitSink<'a> {
    pub fn throw(&self, diagnostic: Diagnostic) {
        self.diagnostics.throw(diagnostic.in_unit(self.unit));
    }

    pub fn unit(&self) -> Option<&'a str> {
        self.unit
    }
}

pub fn render_diagnostic(diagnostic: &Diagnostic, lines: Option<&[String]>, color: bool) -> String {
    let description = diagnostic.description.clone();
    let hint = diagnostic.hint().map(str::to_string);
    let context = match (diagnostic.reference, lines) {
        (Some(pos), Some(lines)) => source_window(lines, pos.line, pos.column),
        _ => None,
    };

    let mut slices = Vec::new();
    if let Some(window) = &context {
        slices.push(Slice {
            source: window.source.as_str(),
            line_start: window.line_start,
            origin: diagnostic.unit.as_deref(),
            fold: false,
            annotations: vec![SourceAnnotation {
                label: "",
                annotation_type: AnnotationType::Error,
                range: (window.offset, window.offset + 1),
            }],
        });
    }
    let footer = match &hint {
        Some(hint) => vec![Annotation {
            id: None,
            label: Some(hint.as_str()),
            annotation_type: AnnotationType::Help,
        }],
        None => vec![],
    };
    let snippet = Snippet {
        title: Some(Annotation {
            id: Some(diagnostic.kind.as_str()),
            label: Some(description.as_str()),
            annotation_type: AnnotationType::Error,
        }),
        footer,
        slices,
        opt: FormatOptions {
            color,
            ..Default::default()
        },
    };
    let mut out = DisplayList::from(snippet).to_string();

    if let Some(Remediation::MissingTerminator(patch)) = &diagnostic.remediation {
        if let Some(window) = source_window(&patch.lines, patch.line, patch.column) {
            let snippet = Snippet {
                title: Some(Annotation {
                    id: None,
                    label: Some("A semicolon might be missing here."),
                    annotation_type: AnnotationType::Help,
                }),
                footer: vec![],
                slices: vec![Slice {
                    source: window.source.as_str(),
                    line_start: window.line_start,
                    origin: None,
                    fold: false,
                    annotations: vec![SourceAnnotation {
                        label: "",
                        annotation_type: AnnotationType::Help,
                        range: (window.offset, window.offset + 1),
                    }],
                }],
                opt: FormatOptions {
                    color,
                    ..Default::default()
                },
            };
            out.push('\n');
            out.push_str(&DisplayList::from(snippet).to_string());
        }
    }
    out
}

struct SourceWindow {
    source: String,
    line_start: usize,
    offset: usize,
}

/// Up to five lines ending at `line`, with the marked column as a char offset.
fn source_window(lines: &[String], line: usize, column: usize) -> Option<SourceWindow> {
    if line == 0 || line > lines.len() {
        return None;
    }
    let first = line.saturating_sub(CONTEXT_LINES).max(1);
    let mut source = String::new();
    let mut offset = 0;
    for number in first..=line {
        let text = &lines[number - 1];
        if number == line {
            let width = text.chars().count();
            offset += column.saturating_sub(1).min(width);
            source.push_str(text);
            // room for a caret past the end of the line
            source.push(' ');
        } else {
            offset += text.chars().count() + 1;
            source.push_str(text);
            source.push('\n');
        }
    }
    Some(SourceWindow {
        source,
        line_start: first,
        offset,
    })
}

/// Joins items as "a, b and c".
pub fn pretty_join(items: &[String], separator: &str) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{}{}{}", init.join(", "), separator, last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pretty_join_uses_separator_before_last() {
        assert_eq!(pretty_join(&[], " and "), "");
        assert_eq!(pretty_join(&strings(&["a"]), " and "), "a");
        assert_eq!(pretty_join(&strings(&["a", "b"]), " or "), "a or b");
        assert_eq!(pretty_join(&strings(&["a", "b", "c"]), " and "), "a, b and c");
    }

    #[test]
    fn impossible_errors_carry_the_developer_hint() {
        let diagnostic = Diagnostic::impossible("broken");
        assert_eq!(diagnostic.hint(), Some(DEVELOPER_HINT));
    }

    #[test]
    fn sink_tags_diagnostics_with_unit() {
        let diagnostics = Diagnostics::new();
        diagnostics.sink(Some("sprite")).throw(Diagnostic::argument("too many"));
        let entries = diagnostics.snapshot();
        assert_eq!(entries[0].unit.as_deref(), Some("sprite"));
        assert_eq!(diagnostics.count(DiagnosticKind::Argument), 1);
    }

    #[test]
    fn window_ends_at_failing_line() {
        let lines = strings(&["1", "2", "3", "4", "5", "6", "seven"]);
        let window = source_window(&lines, 7, 3).unwrap();
        assert_eq!(window.line_start, 3);
        assert_eq!(window.source, "3\n4\n5\n6\nseven ");
        assert_eq!(window.offset, 8 + 2);
    }

    #[test]
    fn render_includes_banner_description_and_hint() {
        let diagnostics = Diagnostics::new();
        diagnostics.set_source("main", "onflag {\n  mvoe(10);\n}");
        diagnostics.sink(Some("main")).throw(
            Diagnostic::unknown_object("'mvoe' is not a known function or block.")
                .with_hint("Did you mean 'move'?")
                .at(Position::new(2, 3)),
        );
        let rendered = diagnostics.render(false);
        assert!(rendered.contains("UnknownObjectError"));
        assert!(rendered.contains("'mvoe' is not a known function or block."));
        assert!(rendered.contains("mvoe(10);"));
        assert!(rendered.contains("Did you mean 'move'?"));
    }

    #[test]
    fn render_without_reference_has_no_context() {
        let diagnostics = Diagnostics::new();
        diagnostics.throw(Diagnostic::type_error("Can't cast \"a\" to number."));
        let rendered = diagnostics.render(false);
        assert!(rendered.contains("TypeError"));
        assert!(!rendered.contains(" | "));
    }
}
