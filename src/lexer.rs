use crate::ast::Position;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Keyword,
    Ident,
    Argument,
    Number,
    Float,
    String,
    Op,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Eof,
}

impl TokenType {
    pub fn describe(self) -> &'static str {
        match self {
            TokenType::Keyword => "keyword",
            TokenType::Ident => "NAME",
            TokenType::Argument => "ARGUMENT",
            TokenType::Number => "NUMBER",
            TokenType::Float => "FLOAT",
            TokenType::String => "STRING",
            TokenType::Op => "operator",
            TokenType::LParen => "'('",
            TokenType::RParen => "')'",
            TokenType::LBrace => "'{'",
            TokenType::RBrace => "'}'",
            TokenType::Comma => "','",
            TokenType::Semicolon => "';'",
            TokenType::Eof => "end of input",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub typ: TokenType,
    pub value: String,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct LexerError {
    pub ch: char,
    pub pos: Position,
}

impl Display for LexerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unexpected character {:?} (line {}, column {})",
            self.ch, self.pos.line, self.pos.column
        )
    }
}

impl Error for LexerError {}

pub struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            index: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();
        while !self.at_end() {
            let ch = self.peek();
            if is_ignorable_format_char(ch) || ch.is_whitespace() {
                self.advance();
                continue;
            }
            if ch == '#' {
                self.skip_comment();
                continue;
            }
            if ch == '"' {
                tokens.push(self.read_string()?);
                continue;
            }
            if ch.is_ascii_digit() {
                tokens.push(self.read_number());
                continue;
            }
            if ch.is_ascii_alphabetic() || ch == '_' {
                tokens.push(self.read_identifier());
                continue;
            }
            let pos = self.pos();
            let simple = match ch {
                '(' => Some(TokenType::LParen),
                ')' => Some(TokenType::RParen),
                '{' => Some(TokenType::LBrace),
                '}' => Some(TokenType::RBrace),
                ',' => Some(TokenType::Comma),
                ';' => Some(TokenType::Semicolon),
                _ => None,
            };
            if let Some(typ) = simple {
                self.advance();
                tokens.push(Token {
                    typ,
                    value: ch.to_string(),
                    pos,
                });
                continue;
            }
            match ch {
                '$' => tokens.push(self.read_argument()?),
                '+' | '-' | '*' | '/' | '<' | '>' | '!' => {
                    self.advance();
                    tokens.push(Token {
                        typ: TokenType::Op,
                        value: ch.to_string(),
                        pos,
                    });
                }
                '=' => tokens.push(self.read_equals()),
                _ => return Err(LexerError { ch, pos }),
            }
        }
        tokens.push(Token {
            typ: TokenType::Eof,
            value: String::new(),
            pos: self.pos(),
        });
        Ok(tokens)
    }

    fn read_equals(&mut self) -> Token {
        let pos = self.pos();
        self.advance();
        let value = if self.peek() == '=' {
            self.advance();
            "=="
        } else {
            "="
        };
        Token {
            typ: TokenType::Op,
            value: value.to_string(),
            pos,
        }
    }

    fn read_argument(&mut self) -> Result<Token, LexerError> {
        let pos = self.pos();
        self.advance();
        let next = self.peek();
        if !(next.is_ascii_alphabetic() || next == '_') {
            return Err(LexerError { ch: '$', pos });
        }
        let name = self.read_identifier();
        Ok(Token {
            typ: TokenType::Argument,
            value: format!("${}", name.value),
            pos,
        })
    }

    fn read_identifier(&mut self) -> Token {
        let pos = self.pos();
        let mut text = String::new();
        while !self.at_end() {
            let ch = self.peek();
            if ch.is_ascii_alphanumeric() || ch == '_' {
                text.push(self.advance());
            } else {
                break;
            }
        }
        let typ = if is_keyword(&text) {
            TokenType::Keyword
        } else {
            TokenType::Ident
        };
        Token {
            typ,
            value: text,
            pos,
        }
    }

    fn read_number(&mut self) -> Token {
        let pos = self.pos();
        let mut text = String::new();
        while self.peek().is_ascii_digit() {
            text.push(self.advance());
        }
        if self.peek() == '.' && self.peek_at(1).is_ascii_digit() {
            text.push(self.advance());
            while self.peek().is_ascii_digit() {
                text.push(self.advance());
            }
            return Token {
                typ: TokenType::Float,
                value: text,
                pos,
            };
        }
        Token {
            typ: TokenType::Number,
            value: text,
            pos,
        }
    }

    /// Reads a string lexeme, quotes and escapes included.
    fn read_string(&mut self) -> Result<Token, LexerError> {
        let pos = self.pos();
        let mut out = String::new();
        out.push(self.advance());
        while !self.at_end() {
            let ch = self.advance();
            out.push(ch);
            match ch {
                '"' => {
                    return Ok(Token {
                        typ: TokenType::String,
                        value: out,
                        pos,
                    })
                }
                '\\' if !self.at_end() => out.push(self.advance()),
                '\n' => break,
                _ => {}
            }
        }
        Err(LexerError { ch: '"', pos })
    }

    fn skip_comment(&mut self) {
        while !self.at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn at_end(&self) -> bool {
        self.index >= self.chars.len()
    }

    fn peek(&self) -> char {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> char {
        self.chars.get(self.index + offset).copied().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let ch = self.chars[self.index];
        self.index += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }

    fn pos(&self) -> Position {
        Position::new(self.line, self.column)
    }
}

fn is_keyword(word: &str) -> bool {
    matches!(
        word,
        "costumes" | "def" | "nowarp" | "if" | "else" | "repeat" | "until" | "forever" | "local" | "not"
    )
}

fn is_ignorable_format_char(ch: char) -> bool {
    matches!(
        ch,
        '\u{feff}' // BOM / zero width no-break space
            | '\u{200b}' // zero width space
            | '\u{200c}' // zero width non-joiner
            | '\u{200d}' // zero width joiner
            | '\u{2060}' // word joiner
    )
}
