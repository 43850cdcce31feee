use crate::ast::{
    Args, BinaryOp, Declaration, Expr, Literal, LiteralKind, Name, Position, ProcedureDecl, Program, Statement,
};
use crate::diagnostic::pretty_join;
use crate::lexer::{Lexer, Token, TokenType};
use crate::recovery::Reparse;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnexpectedCharacter(char),
    UnexpectedToken { found: String, expected: Vec<String> },
    UnexpectedEof { expected: Vec<String> },
}

impl Display for ParseErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErrorKind::UnexpectedCharacter(ch) => {
                write!(f, "An unexpected character {:?} is unrelated to the expected tokens.", ch)
            }
            ParseErrorKind::UnexpectedToken { found, expected } => write!(
                f,
                "An unexpected token {:?} took the place of {}.",
                found,
                pretty_join(expected, " or ")
            ),
            ParseErrorKind::UnexpectedEof { expected } => write!(
                f,
                "The end of the file was reached while expecting {}.",
                pretty_join(expected, " or ")
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub pos: Position,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (line {}, column {})", self.kind, self.pos.line, self.pos.column)
    }
}

impl Error for ParseError {}

pub fn parse_source(source: &str) -> Result<Program, ParseError> {
    let tokens = Lexer::new(source).tokenize().map_err(|err| ParseError {
        kind: ParseErrorKind::UnexpectedCharacter(err.ch),
        pos: err.pos,
    })?;
    Parser::new(tokens).parse_program()
}

/// The grammar as a re-parse entry point for the recovery heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grammar;

impl Reparse for Grammar {
    fn reparse(&self, source: &str) -> Result<(), ParseErrorKind> {
        parse_source(source).map(|_| ()).map_err(|err| err.kind)
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, index: 0 }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut declarations = Vec::new();
        while !self.at_end() {
            declarations.push(self.parse_declaration()?);
        }
        Ok(Program { declarations })
    }

    fn parse_declaration(&mut self) -> Result<Declaration, ParseError> {
        let token = self.current().clone();
        if self.match_keyword("costumes") {
            return self.parse_costumes(token.pos);
        }
        if self.match_keyword("nowarp") {
            self.consume_keyword("def")?;
            return self.parse_procedure(token.pos, true);
        }
        if self.match_keyword("def") {
            return self.parse_procedure(token.pos, false);
        }
        if self.check_type(TokenType::Ident) {
            self.advance();
            let body = self.parse_block()?;
            return Ok(Declaration::Hat {
                name: Name::new(token.pos, token.value),
                body,
            });
        }
        self.error_expected(&["'costumes'", "'def'", "'nowarp'", "NAME"])
    }

    fn parse_costumes(&mut self, pos: Position) -> Result<Declaration, ParseError> {
        let mut paths = vec![self.parse_string_literal()?];
        while self.match_type(TokenType::Comma) {
            paths.push(self.parse_string_literal()?);
        }
        self.consume_type(TokenType::Semicolon)?;
        Ok(Declaration::Costumes { pos, paths })
    }

    fn parse_string_literal(&mut self) -> Result<Literal, ParseError> {
        let token = self.consume_type(TokenType::String)?;
        Ok(Literal {
            pos: token.pos,
            kind: LiteralKind::String,
            text: token.value,
        })
    }

    fn parse_procedure(&mut self, pos: Position, nowarp: bool) -> Result<Declaration, ParseError> {
        let name_token = self.consume_type(TokenType::Ident)?;
        let mut params = Vec::new();
        if self.match_type(TokenType::LParen) {
            if !self.check_type(TokenType::RParen) {
                loop {
                    let param = self.consume_type(TokenType::Ident)?;
                    params.push(Name::new(param.pos, param.value));
                    if !self.match_type(TokenType::Comma) {
                        break;
                    }
                }
            }
            self.consume_type(TokenType::RParen)?;
        }
        let body = self.parse_block()?;
        Ok(Declaration::Procedure(ProcedureDecl {
            pos,
            name: Name::new(name_token.pos, name_token.value),
            params,
            nowarp,
            body,
        }))
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.consume_type(TokenType::LBrace)?;
        let mut body = Vec::new();
        while !self.check_type(TokenType::RBrace) {
            if self.at_end() {
                return self.error_expected(&["'}'"]);
            }
            body.push(self.parse_statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let token = self.current().clone();
        if self.match_keyword("if") {
            return self.parse_if(token.pos);
        }
        if self.match_keyword("repeat") {
            let times = self.parse_expression(0)?;
            let body = self.parse_block()?;
            return Ok(Statement::Repeat {
                pos: token.pos,
                times,
                body,
            });
        }
        if self.match_keyword("until") {
            let condition = self.parse_expression(0)?;
            let body = self.parse_block()?;
            return Ok(Statement::Until {
                pos: token.pos,
                condition,
                body,
            });
        }
        if self.match_keyword("forever") {
            let body = self.parse_block()?;
            return Ok(Statement::Forever { pos: token.pos, body });
        }
        if self.match_keyword("local") {
            let name_token = self.consume_type(TokenType::Ident)?;
            self.consume_op("=")?;
            let value = self.parse_expression(0)?;
            self.consume_type(TokenType::Semicolon)?;
            return Ok(Statement::LocalVar {
                pos: token.pos,
                name: Name::new(name_token.pos, name_token.value),
                value,
            });
        }
        if self.check_type(TokenType::Ident) {
            self.advance();
            let name = Name::new(token.pos, token.value);
            if self.match_type(TokenType::LParen) {
                let args = self.parse_args()?;
                self.consume_type(TokenType::Semicolon)?;
                return Ok(Statement::Call { name, args });
            }
            if self.check_op("=") {
                self.advance();
                let value = self.parse_expression(0)?;
                self.consume_type(TokenType::Semicolon)?;
                return Ok(Statement::VarSet {
                    pos: token.pos,
                    name,
                    value,
                });
            }
            return self.error_expected(&["'('", "'='"]);
        }
        self.error_expected(&["'if'", "'repeat'", "'until'", "'forever'", "'local'", "NAME", "'}'"])
    }

    fn parse_if(&mut self, pos: Position) -> Result<Statement, ParseError> {
        let condition = self.parse_expression(0)?;
        let then_body = self.parse_block()?;
        let mut else_body = Vec::new();
        if self.match_keyword("else") {
            let else_token = self.current().clone();
            if self.match_keyword("if") {
                else_body.push(self.parse_if(else_token.pos)?);
            } else {
                else_body = self.parse_block()?;
            }
        }
        Ok(Statement::IfElse {
            pos,
            condition,
            then_body,
            else_body,
        })
    }

    /// Parses call arguments after the opening parenthesis. A trailing comma
    /// leaves an empty slot at the end.
    fn parse_args(&mut self) -> Result<Args, ParseError> {
        let mut args = Vec::new();
        if self.match_type(TokenType::RParen) {
            return Ok(args);
        }
        loop {
            args.push(Some(self.parse_expression(0)?));
            if !self.match_type(TokenType::Comma) {
                break;
            }
            if self.check_type(TokenType::RParen) {
                args.push(None);
                break;
            }
        }
        self.consume_type(TokenType::RParen)?;
        Ok(args)
    }

    fn parse_expression(&mut self, min_precedence: i32) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let token = self.current().clone();
            if token.typ != TokenType::Op {
                break;
            }
            let Some((precedence, op)) = binary_op(&token.value) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let right = self.parse_expression(precedence + 1)?;
            left = Expr::Binary {
                pos: token.pos,
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let token = self.current().clone();
        if self.check_op("-") {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Minus {
                pos: token.pos,
                operand: Box::new(operand),
            });
        }
        if self.check_op("!") || self.check_keyword("not") {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Not {
                pos: token.pos,
                operand: Box::new(operand),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.current().clone();
        let literal_kind = match token.typ {
            TokenType::Number => Some(LiteralKind::Number),
            TokenType::Float => Some(LiteralKind::Float),
            TokenType::String => Some(LiteralKind::String),
            _ => None,
        };
        if let Some(kind) = literal_kind {
            self.advance();
            return Ok(Expr::Literal(Literal {
                pos: token.pos,
                kind,
                text: token.value,
            }));
        }
        match token.typ {
            TokenType::Argument => {
                self.advance();
                Ok(Expr::Argument {
                    pos: token.pos,
                    name: token.value.trim_start_matches('$').to_string(),
                })
            }
            TokenType::Ident => {
                self.advance();
                if self.match_type(TokenType::LParen) {
                    let args = self.parse_args()?;
                    return Ok(Expr::Reporter {
                        name: Name::new(token.pos, token.value),
                        args,
                    });
                }
                Ok(Expr::Var {
                    pos: token.pos,
                    name: token.value,
                })
            }
            TokenType::LParen => {
                self.advance();
                let inner = self.parse_expression(0)?;
                self.consume_type(TokenType::RParen)?;
                Ok(inner)
            }
            _ => self.error_expected(&["NUMBER", "FLOAT", "STRING", "ARGUMENT", "NAME", "'('"]),
        }
    }

    fn consume_keyword(&mut self, keyword: &str) -> Result<Token, ParseError> {
        if self.check_keyword(keyword) {
            Ok(self.advance())
        } else {
            let expected = format!("'{}'", keyword);
            self.error_expected(&[expected.as_str()])
        }
    }

    fn consume_type(&mut self, typ: TokenType) -> Result<Token, ParseError> {
        if self.check_type(typ) {
            Ok(self.advance())
        } else {
            self.error_expected(&[typ.describe()])
        }
    }

    fn consume_op(&mut self, op: &str) -> Result<Token, ParseError> {
        if self.check_op(op) {
            Ok(self.advance())
        } else {
            let expected = format!("'{}'", op);
            self.error_expected(&[expected.as_str()])
        }
    }

    fn match_keyword(&mut self, keyword: &str) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            return true;
        }
        false
    }

    fn match_type(&mut self, typ: TokenType) -> bool {
        if self.check_type(typ) {
            self.advance();
            return true;
        }
        false
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        let token = self.current();
        token.typ == TokenType::Keyword && token.value == keyword
    }

    fn check_op(&self, op: &str) -> bool {
        let token = self.current();
        token.typ == TokenType::Op && token.value == op
    }

    fn check_type(&self, typ: TokenType) -> bool {
        self.current().typ == typ
    }

    fn at_end(&self) -> bool {
        self.current().typ == TokenType::Eof
    }

    fn current(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn error_expected<R>(&self, expected: &[&str]) -> Result<R, ParseError> {
        let token = self.current();
        let expected = expected.iter().map(|e| e.to_string()).collect();
        let kind = if token.typ == TokenType::Eof {
            ParseErrorKind::UnexpectedEof { expected }
        } else {
            ParseErrorKind::UnexpectedToken {
                found: token.value.clone(),
                expected,
            }
        };
        Err(ParseError { kind, pos: token.pos })
    }
}

fn binary_op(op: &str) -> Option<(i32, BinaryOp)> {
    match op {
        "==" => Some((1, BinaryOp::Eq)),
        "<" => Some((1, BinaryOp::Lt)),
        ">" => Some((1, BinaryOp::Gt)),
        "+" => Some((2, BinaryOp::Add)),
        "-" => Some((2, BinaryOp::Sub)),
        "*" => Some((3, BinaryOp::Mul)),
        "/" => Some((3, BinaryOp::Div)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hat_body(source: &str) -> Vec<Statement> {
        let program = parse_source(source).unwrap();
        match program.declarations.into_iter().next() {
            Some(Declaration::Hat { body, .. }) => body,
            other => panic!("expected a hat, got {:?}", other),
        }
    }

    #[test]
    fn parses_hat_with_call() {
        let body = hat_body("onflag { move(10); }");
        assert_eq!(body.len(), 1);
        match &body[0] {
            Statement::Call { name, args } => {
                assert_eq!(name.value, "move");
                assert_eq!(args.len(), 1);
                assert!(matches!(
                    &args[0],
                    Some(Expr::Literal(Literal { kind: LiteralKind::Number, text, .. })) if text == "10"
                ));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn trailing_comma_leaves_an_empty_slot() {
        let body = hat_body("onflag { say(\"hi\",); }");
        let Statement::Call { args, .. } = &body[0] else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert!(args[1].is_none());
    }

    #[test]
    fn multiplication_binds_tighter_than_comparison() {
        let body = hat_body("onflag { x = 1 + 2 * 3 > 4; }");
        let Statement::VarSet { value, .. } = &body[0] else {
            panic!("expected assignment");
        };
        let Expr::Binary { op: BinaryOp::Gt, left, .. } = value else {
            panic!("expected comparison at the root, got {:?}", value);
        };
        let Expr::Binary { op: BinaryOp::Add, right, .. } = left.as_ref() else {
            panic!("expected addition");
        };
        assert!(matches!(right.as_ref(), Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn parses_nowarp_procedure_with_params() {
        let program = parse_source("nowarp def jump(height, speed) { changey($height); }").unwrap();
        let Declaration::Procedure(decl) = &program.declarations[0] else {
            panic!("expected procedure");
        };
        assert!(decl.nowarp);
        assert_eq!(decl.name.value, "jump");
        let params: Vec<_> = decl.params.iter().map(|p| p.value.as_str()).collect();
        assert_eq!(params, vec!["height", "speed"]);
        let Statement::Call { args, .. } = &decl.body[0] else {
            panic!("expected call");
        };
        assert!(matches!(&args[0], Some(Expr::Argument { name, .. }) if name == "height"));
    }

    #[test]
    fn else_if_nests_inside_the_else_body() {
        let body = hat_body("onflag { if x { } else if y { move(1); } }");
        let Statement::IfElse { else_body, then_body, .. } = &body[0] else {
            panic!("expected if");
        };
        assert!(then_body.is_empty());
        assert_eq!(else_body.len(), 1);
        assert!(matches!(else_body[0], Statement::IfElse { .. }));
    }

    #[test]
    fn missing_semicolon_is_an_unexpected_token() {
        let err = parse_source("onflag {\n  move(10)\n  say(\"hi\");\n}").unwrap_err();
        assert_eq!(err.pos, Position::new(3, 3));
        match err.kind {
            ParseErrorKind::UnexpectedToken { found, expected } => {
                assert_eq!(found, "say");
                assert_eq!(expected, vec!["';'".to_string()]);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn truncated_input_is_unexpected_eof() {
        let err = parse_source("onflag {\n  move(10);").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnexpectedEof { .. }));
    }

    #[test]
    fn lexer_failures_become_unexpected_character() {
        let err = parse_source("onflag { move(10) @ }").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedCharacter('@'));
        assert_eq!(err.pos, Position::new(1, 19));
    }
}
