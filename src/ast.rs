use crate::source::Position;
use std::fmt;

/// Declared type of a variable, parameter or function result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Int,
    Float,
    Bool,
    String,
    List(Box<Type>),
    Pair(Box<Type>, Box<Type>),
    Dict(Box<Type>, Box<Type>),
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Bool => write!(f, "bool"),
            Type::String => write!(f, "string"),
            Type::List(elem) => write!(f, "List<{}>", elem),
            Type::Pair(first, second) => write!(f, "Pair<{}, {}>", first, second),
            Type::Dict(key, value) => write!(f, "Dict<{}, {}>", key, value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // Literals
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    StringLit(String),

    // Containers
    List(Vec<Expr>),
    Pair(Box<Expr>, Box<Expr>),
    Dict(Vec<(Expr, Expr)>),

    // Variable access
    Var(String),

    // Binary operations; positioned at the operator
    BinOp(Box<Expr>, BinOp, Box<Expr>),

    // Unary operations
    UnaryOp(UnaryOp, Box<Expr>),

    // name(args)
    Call(String, Vec<Expr>),

    // receiver.name(args)
    MethodCall(Box<Expr>, String, Vec<Expr>),

    // from T x in source where .. select .. orderby ..
    Query(Box<Query>),
}

impl Expr {
    pub fn new(kind: ExprKind, position: Position) -> Self {
        Expr { kind, position }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub var_type: Type,
    pub var_name: String,
    pub source: Expr,
    pub filter: Option<Expr>,
    pub select: Expr,
    pub order_by: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub position: Position,
}

impl Stmt {
    pub fn new(kind: StmtKind, position: Position) -> Self {
        Stmt { kind, position }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    // Bare declaration: `int x;`
    Declaration(Type, String),

    // Declaration with initializer: `int x = 5;`
    Init(Type, String, Expr),

    Assign(String, Expr),

    // Control flow
    If(Expr, Block, Option<Block>),
    While(Expr, Block),
    For(ForLoop),
    // for(T x in coll, key = f)
    ForSorted(ForLoop, String),

    Return(Expr),

    // Expression statement (calls, method calls)
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub var_type: Type,
    pub var_name: String,
    pub collection: Expr,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<(Type, String)>,
    pub return_type: Type,
    pub body: Block,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Function(Function),
    // Top-level `Declaration` or `Init` statement
    Global(Stmt),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub items: Vec<Item>,
}

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(func) => Some(func),
            Item::Global(_) => None,
        })
    }

    pub fn globals(&self) -> impl Iterator<Item = &Stmt> {
        self.items.iter().filter_map(|item| match item {
            Item::Global(stmt) => Some(stmt),
            Item::Function(_) => None,
        })
    }
}
