#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Number,
    Float,
    String,
}

/// A literal leaf exactly as the tokenizer saw it. String leaves keep their
/// surrounding quotes.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub pos: Position,
    pub kind: LiteralKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Name {
    pub pos: Position,
    pub value: String,
}

impl Name {
    pub fn new(pos: Position, value: impl Into<String>) -> Self {
        Self {
            pos,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Lt,
    Gt,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// Name of the operator entry in the catalog.
    pub fn operator_name(self) -> &'static str {
        match self {
            BinaryOp::Eq => "eq",
            BinaryOp::Lt => "lt",
            BinaryOp::Gt => "gt",
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
        }
    }
}

/// Call arguments. `None` is an empty slot left by a trailing comma.
pub type Args = Vec<Option<Expr>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Argument {
        pos: Position,
        name: String,
    },
    Var {
        pos: Position,
        name: String,
    },
    Reporter {
        name: Name,
        args: Args,
    },
    Binary {
        pos: Position,
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not {
        pos: Position,
        operand: Box<Expr>,
    },
    Minus {
        pos: Position,
        operand: Box<Expr>,
    },
}

impl Expr {
    pub fn pos(&self) -> Position {
        match self {
            Expr::Literal(literal) => literal.pos,
            Expr::Reporter { name, .. } => name.pos,
            Expr::Argument { pos, .. }
            | Expr::Var { pos, .. }
            | Expr::Binary { pos, .. }
            | Expr::Not { pos, .. }
            | Expr::Minus { pos, .. } => *pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Call {
        name: Name,
        args: Args,
    },
    IfElse {
        pos: Position,
        condition: Expr,
        then_body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    Repeat {
        pos: Position,
        times: Expr,
        body: Vec<Statement>,
    },
    Until {
        pos: Position,
        condition: Expr,
        body: Vec<Statement>,
    },
    Forever {
        pos: Position,
        body: Vec<Statement>,
    },
    LocalVar {
        pos: Position,
        name: Name,
        value: Expr,
    },
    VarSet {
        pos: Position,
        name: Name,
        value: Expr,
    },
}

impl Statement {
    pub fn pos(&self) -> Position {
        match self {
            Statement::Call { name, .. } => name.pos,
            Statement::IfElse { pos, .. }
            | Statement::Repeat { pos, .. }
            | Statement::Until { pos, .. }
            | Statement::Forever { pos, .. }
            | Statement::LocalVar { pos, .. }
            | Statement::VarSet { pos, .. } => *pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureDecl {
    pub pos: Position,
    pub name: Name,
    pub params: Vec<Name>,
    pub nowarp: bool,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Costumes {
        pos: Position,
        paths: Vec<Literal>,
    },
    Procedure(ProcedureDecl),
    Hat {
        name: Name,
        body: Vec<Statement>,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub declarations: Vec<Declaration>,
}
