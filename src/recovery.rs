//! Missing-terminator recovery: patch a failing source with a `;` next to the
//! failure point and parse it again. If the trial parse runs out of input, the
//! terminator was most likely what the author forgot.

use crate::ast::Position;
use crate::diagnostic::Remediation;
use crate::parser::ParseErrorKind;

/// Anything able to parse a complete source text again.
pub trait Reparse {
    fn reparse(&self, source: &str) -> Result<(), ParseErrorKind>;
}

/// Where a terminator would have to be inserted, together with the patched
/// source it was tried on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminatorHint {
    pub lines: Vec<String>,
    /// 1-based line of the inserted terminator.
    pub line: usize,
    /// 1-based column of the inserted terminator.
    pub column: usize,
}

/// Keeps everything before the failure point, appends `;` and re-parses.
pub fn patch_before<R: Reparse + ?Sized>(lines: &[String], pos: Position, grammar: &R) -> Option<TerminatorHint> {
    if pos.line == 0 || pos.line > lines.len() {
        return None;
    }
    let mut rebuilt: Vec<String> = lines[..pos.line - 1].to_vec();
    let prefix: String = lines[pos.line - 1].chars().take(pos.column.saturating_sub(1)).collect();
    if !prefix.trim_end().is_empty() {
        rebuilt.push(prefix);
    }
    try_terminator(rebuilt, grammar)
}

/// Keeps everything up to the end of the token at the failure point, appends
/// `;` and re-parses.
pub fn patch_after<R: Reparse + ?Sized>(
    lines: &[String],
    pos: Position,
    token_len: usize,
    grammar: &R,
) -> Option<TerminatorHint> {
    if pos.line == 0 || pos.line > lines.len() {
        return None;
    }
    let mut rebuilt: Vec<String> = lines[..pos.line - 1].to_vec();
    let keep = pos.column.saturating_sub(1) + token_len;
    rebuilt.push(lines[pos.line - 1].chars().take(keep).collect());
    try_terminator(rebuilt, grammar)
}

fn try_terminator<R: Reparse + ?Sized>(mut rebuilt: Vec<String>, grammar: &R) -> Option<TerminatorHint> {
    let last = rebuilt.last_mut()?;
    last.push(';');
    let column = last.chars().count();
    let line = rebuilt.len();
    match grammar.reparse(&rebuilt.join("\n")) {
        Err(ParseErrorKind::UnexpectedEof { .. }) => Some(TerminatorHint {
            lines: rebuilt,
            line,
            column,
        }),
        _ => None,
    }
}

/// Chooses the patch strategy for a parse failure.
pub fn suggest_terminator<R: Reparse + ?Sized>(
    lines: &[String],
    kind: &ParseErrorKind,
    pos: Position,
    grammar: &R,
) -> Option<Remediation> {
    let hint = match kind {
        ParseErrorKind::UnexpectedCharacter(_) => patch_before(lines, pos, grammar),
        ParseErrorKind::UnexpectedToken { found, .. } => patch_before(lines, pos, grammar)
            .or_else(|| patch_after(lines, pos, found.chars().count(), grammar)),
        ParseErrorKind::UnexpectedEof { .. } => None,
    };
    hint.map(Remediation::MissingTerminator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Grammar;
    use std::cell::RefCell;

    fn lines(source: &str) -> Vec<String> {
        source.split('\n').map(str::to_string).collect()
    }

    struct Recording {
        seen: RefCell<Vec<String>>,
        answer: Result<(), ParseErrorKind>,
    }

    impl Reparse for Recording {
        fn reparse(&self, source: &str) -> Result<(), ParseErrorKind> {
            self.seen.borrow_mut().push(source.to_string());
            self.answer.clone()
        }
    }

    #[test]
    fn patch_before_drops_blank_prefix_and_terminates_previous_line() {
        let grammar = Recording {
            seen: RefCell::new(Vec::new()),
            answer: Err(ParseErrorKind::UnexpectedEof { expected: vec![] }),
        };
        let source = lines("onflag {\n  move(10)\n  say(\"hi\");\n}");
        let hint = patch_before(&source, Position::new(3, 3), &grammar).unwrap();
        assert_eq!(grammar.seen.borrow()[0], "onflag {\n  move(10);");
        assert_eq!(hint.line, 2);
        assert_eq!(hint.column, 11);
    }

    #[test]
    fn other_trial_failures_suppress_the_hint() {
        let grammar = Recording {
            seen: RefCell::new(Vec::new()),
            answer: Err(ParseErrorKind::UnexpectedCharacter('@')),
        };
        let source = lines("onflag { move(1) @ }");
        assert!(patch_before(&source, Position::new(1, 18), &grammar).is_none());
        let ok = Recording {
            seen: RefCell::new(Vec::new()),
            answer: Ok(()),
        };
        assert!(patch_before(&source, Position::new(1, 18), &ok).is_none());
    }

    #[test]
    fn nothing_to_patch_at_the_very_start() {
        let source = lines("  @");
        assert!(patch_before(&source, Position::new(1, 3), &Grammar).is_none());
    }

    #[test]
    fn patch_after_keeps_the_failing_token() {
        let grammar = Recording {
            seen: RefCell::new(Vec::new()),
            answer: Err(ParseErrorKind::UnexpectedEof { expected: vec![] }),
        };
        let source = lines("onflag {\n  x = 1 y = 2;\n}");
        let hint = patch_after(&source, Position::new(2, 9), 1, &grammar).unwrap();
        assert_eq!(grammar.seen.borrow()[0], "onflag {\n  x = 1 y;");
        assert_eq!(hint.column, 10);
    }

    #[test]
    fn missing_semicolon_is_found_with_the_real_grammar() {
        let source = lines("onflag {\n  move(10)\n  say(\"hi\");\n}");
        let kind = ParseErrorKind::UnexpectedToken {
            found: "say".into(),
            expected: vec!["';'".into()],
        };
        let remediation = suggest_terminator(&source, &kind, Position::new(3, 3), &Grammar);
        match remediation {
            Some(Remediation::MissingTerminator(hint)) => {
                assert_eq!(hint.line, 2);
                assert_eq!(hint.lines.last().map(String::as_str), Some("  move(10);"));
            }
            other => panic!("expected a terminator hint, got {:?}", other),
        }
    }

    #[test]
    fn eof_failures_are_not_patched() {
        let source = lines("onflag {");
        let kind = ParseErrorKind::UnexpectedEof { expected: vec![] };
        assert!(suggest_terminator(&source, &kind, Position::new(1, 9), &Grammar).is_none());
    }
}
