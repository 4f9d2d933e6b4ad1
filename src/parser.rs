use crate::ast::*;
use crate::lexer::{LexError, Lexer, Token, TokenKind};
use crate::source::Position;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lexical(#[from] LexError),
    #[error("Syntax error at {position}: expected {expected}, found {found}")]
    Syntax {
        expected: String,
        found: String,
        position: Position,
    },
    #[error("Missing semicolon at {position}")]
    MissingSemicolon { position: Position },
    #[error("Missing closing round bracket at {position}")]
    MissingClosingParen { position: Position },
    #[error("Missing closing curly bracket at {position}")]
    MissingClosingBrace { position: Position },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::Lexical(err) => err.position,
            ParseError::Syntax { position, .. }
            | ParseError::MissingSemicolon { position }
            | ParseError::MissingClosingParen { position }
            | ParseError::MissingClosingBrace { position } => *position,
        }
    }
}

/// Recursive-descent parser with a single token of lookahead.
///
/// Tokens are pulled from the lexer on demand, so a lexical error surfaces
/// at the point the parser reaches it.
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Parser { lexer, current })
    }

    fn peek(&self) -> &TokenKind {
        &self.current.kind
    }

    fn position(&self) -> Position {
        self.current.position
    }

    fn advance(&mut self) -> Result<Token, ParseError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn check(&self, expected: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(expected)
    }

    /// Consumes `expected` if it is the current token.
    fn eat(&mut self, expected: &TokenKind) -> Result<bool, ParseError> {
        if self.check(expected) {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        if self.check(&expected) {
            return self.advance();
        }
        let position = self.position();
        Err(match expected {
            TokenKind::Semicolon => ParseError::MissingSemicolon { position },
            TokenKind::RParen => ParseError::MissingClosingParen { position },
            TokenKind::RBrace => ParseError::MissingClosingBrace { position },
            other => self.syntax_error(&other.to_string()),
        })
    }

    fn expect_identifier(&mut self) -> Result<(String, Position), ParseError> {
        let position = self.position();
        match self.peek().clone() {
            TokenKind::Identifier(name) => {
                self.advance()?;
                Ok((name, position))
            }
            _ => Err(self.syntax_error("identifier")),
        }
    }

    fn syntax_error(&self, expected: &str) -> ParseError {
        ParseError::Syntax {
            expected: expected.to_string(),
            found: self.peek().to_string(),
            position: self.position(),
        }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Eof => break,
                TokenKind::Function => items.push(Item::Function(self.parse_function()?)),
                kind if kind.is_type_keyword() => {
                    let decl = self.parse_declaration()?;
                    self.expect(TokenKind::Semicolon)?;
                    items.push(Item::Global(decl));
                }
                _ => return Err(self.syntax_error("function or declaration")),
            }
        }
        Ok(Program { items })
    }

    /// Parses a lone expression (optionally terminated by `;`) spanning the
    /// whole input.
    pub fn parse_standalone_expr(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr()?;
        self.eat(&TokenKind::Semicolon)?;
        if !self.check(&TokenKind::Eof) {
            return Err(self.syntax_error("end of input"));
        }
        Ok(expr)
    }

    fn parse_function(&mut self) -> Result<Function, ParseError> {
        let position = self.expect(TokenKind::Function)?.position;
        let return_type = self.parse_type()?;
        let (name, _) = self.expect_identifier()?;

        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if self.peek().is_type_keyword() {
            loop {
                let param_type = self.parse_type()?;
                let (param_name, _) = self.expect_identifier()?;
                params.push((param_type, param_name));
                if !self.eat(&TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        let body = self.parse_block()?;

        Ok(Function {
            name,
            params,
            return_type,
            body,
            position,
        })
    }

    fn parse_type(&mut self) -> Result<Type, ParseError> {
        let ty = match self.peek() {
            TokenKind::Int => Type::Int,
            TokenKind::Float => Type::Float,
            TokenKind::Bool => Type::Bool,
            TokenKind::StringType => Type::String,
            TokenKind::List => {
                self.advance()?;
                self.expect(TokenKind::Less)?;
                let elem = self.parse_type()?;
                self.expect(TokenKind::Greater)?;
                return Ok(Type::List(Box::new(elem)));
            }
            TokenKind::Pair | TokenKind::Dict => {
                let is_pair = self.check(&TokenKind::Pair);
                self.advance()?;
                self.expect(TokenKind::Less)?;
                let first = Box::new(self.parse_type()?);
                self.expect(TokenKind::Comma)?;
                let second = Box::new(self.parse_type()?);
                self.expect(TokenKind::Greater)?;
                return Ok(if is_pair {
                    Type::Pair(first, second)
                } else {
                    Type::Dict(first, second)
                });
            }
            _ => return Err(self.syntax_error("type")),
        };
        self.advance()?;
        Ok(ty)
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let position = self.expect(TokenKind::LBrace)?.position;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(ParseError::MissingClosingBrace {
                    position: self.position(),
                });
            }
            statements.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Block {
            statements,
            position,
        })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        // Variable declaration
        if self.peek().is_type_keyword() {
            let decl = self.parse_declaration()?;
            self.expect(TokenKind::Semicolon)?;
            return Ok(decl);
        }

        let position = self.position();
        match self.peek().clone() {
            TokenKind::If => {
                let stmt = self.parse_if()?;
                self.eat(&TokenKind::Semicolon)?;
                Ok(stmt)
            }

            TokenKind::While => {
                self.advance()?;
                self.expect(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let body = self.parse_block()?;
                self.eat(&TokenKind::Semicolon)?;
                Ok(Stmt::new(StmtKind::While(cond, body), position))
            }

            TokenKind::For => {
                let stmt = self.parse_for()?;
                self.eat(&TokenKind::Semicolon)?;
                Ok(stmt)
            }

            TokenKind::Return => {
                self.advance()?;
                let value = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::new(StmtKind::Return(value), position))
            }

            // Expression statement; a bare variable at the start followed by
            // `=` turns it into an assignment.
            _ => {
                let expr = self.parse_expr()?;
                if let ExprKind::Var(name) = &expr.kind {
                    if expr.position == position && self.eat(&TokenKind::Assign)? {
                        let value = self.parse_expr()?;
                        self.expect(TokenKind::Semicolon)?;
                        return Ok(Stmt::new(StmtKind::Assign(name.clone(), value), position));
                    }
                }
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::new(StmtKind::Expr(expr), position))
            }
        }
    }

    fn parse_declaration(&mut self) -> Result<Stmt, ParseError> {
        let position = self.position();
        let var_type = self.parse_type()?;
        let (name, _) = self.expect_identifier()?;
        if self.eat(&TokenKind::Assign)? {
            let init = self.parse_expr()?;
            return Ok(Stmt::new(StmtKind::Init(var_type, name, init), position));
        }
        Ok(Stmt::new(StmtKind::Declaration(var_type, name), position))
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let position = self.expect(TokenKind::If)?.position;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.eat(&TokenKind::Else)? {
            if self.check(&TokenKind::If) {
                let nested_position = self.position();
                let nested = self.parse_if()?;
                Some(Block {
                    statements: vec![nested],
                    position: nested_position,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::If(cond, then_branch, else_branch),
            position,
        ))
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let position = self.expect(TokenKind::For)?.position;
        self.expect(TokenKind::LParen)?;
        let var_type = self.parse_type()?;
        let (var_name, _) = self.expect_identifier()?;
        self.expect(TokenKind::In)?;
        let collection = self.parse_expr()?;

        let key_function = if self.eat(&TokenKind::Comma)? {
            self.expect(TokenKind::Key)?;
            self.expect(TokenKind::Assign)?;
            let (name, _) = self.expect_identifier()?;
            Some(name)
        } else {
            None
        };
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;

        let for_loop = ForLoop {
            var_type,
            var_name,
            collection,
            body,
        };
        let kind = match key_function {
            Some(key) => StmtKind::ForSorted(for_loop, key),
            None => StmtKind::For(for_loop),
        };
        Ok(Stmt::new(kind, position))
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            let position = self.advance()?.position;
            let right = self.parse_and()?;
            left = binary(left, BinOp::Or, right, position);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_relational()?;
        while self.check(&TokenKind::And) {
            let position = self.advance()?.position;
            let right = self.parse_relational()?;
            left = binary(left, BinOp::And, right, position);
        }
        Ok(left)
    }

    // At most one comparison per level: `a < b < c` is rejected by the caller.
    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            TokenKind::Less => BinOp::Lt,
            TokenKind::Greater => BinOp::Gt,
            TokenKind::LessEqual => BinOp::Le,
            TokenKind::GreaterEqual => BinOp::Ge,
            TokenKind::Equal => BinOp::Eq,
            TokenKind::NotEqual => BinOp::Ne,
            _ => return Ok(left),
        };
        let position = self.advance()?.position;
        let right = self.parse_additive()?;
        Ok(binary(left, op, right, position))
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let position = self.advance()?.position;
            let right = self.parse_multiplicative()?;
            left = binary(left, op, right, position);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            let position = self.advance()?.position;
            let right = self.parse_unary()?;
            left = binary(left, op, right, position);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Not => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        let position = self.advance()?.position;
        let operand = self.parse_unary()?;
        Ok(Expr::new(ExprKind::UnaryOp(op, Box::new(operand)), position))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_primary()?;
        self.parse_postfix_from(expr)
    }

    fn parse_postfix_from(&mut self, mut expr: Expr) -> Result<Expr, ParseError> {
        while self.eat(&TokenKind::Dot)? {
            let (method, position) = self.expect_identifier()?;
            self.expect(TokenKind::LParen)?;
            let args = self.parse_args(&TokenKind::RParen)?;
            self.expect(TokenKind::RParen)?;
            expr = Expr::new(ExprKind::MethodCall(Box::new(expr), method, args), position);
        }
        Ok(expr)
    }

    /// Finishes a primary that began with an identifier already consumed.
    fn parse_identifier_tail(&mut self, name: String, position: Position) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::LParen)? {
            let args = self.parse_args(&TokenKind::RParen)?;
            self.expect(TokenKind::RParen)?;
            return Ok(Expr::new(ExprKind::Call(name, args), position));
        }
        Ok(Expr::new(ExprKind::Var(name), position))
    }

    fn parse_args(&mut self, closing: &TokenKind) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.check(closing) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let position = self.position();
        match self.peek().clone() {
            TokenKind::IntLiteral(n) => {
                self.advance()?;
                Ok(Expr::new(ExprKind::IntLit(n), position))
            }
            TokenKind::FloatLiteral(n) => {
                self.advance()?;
                Ok(Expr::new(ExprKind::FloatLit(n), position))
            }
            TokenKind::BoolLiteral(b) => {
                self.advance()?;
                Ok(Expr::new(ExprKind::BoolLit(b), position))
            }
            TokenKind::StringLiteral(s) => {
                self.advance()?;
                Ok(Expr::new(ExprKind::StringLit(s), position))
            }
            TokenKind::Identifier(name) => {
                self.advance()?;
                self.parse_identifier_tail(name, position)
            }
            TokenKind::LBracket => {
                self.advance()?;
                let elements = self.parse_args(&TokenKind::RBracket)?;
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::new(ExprKind::List(elements), position))
            }
            // Parenthesized expression or pair literal
            TokenKind::LParen => {
                self.advance()?;
                let first = self.parse_expr()?;
                if self.eat(&TokenKind::Comma)? {
                    let second = self.parse_expr()?;
                    self.expect(TokenKind::RParen)?;
                    return Ok(Expr::new(
                        ExprKind::Pair(Box::new(first), Box::new(second)),
                        position,
                    ));
                }
                self.expect(TokenKind::RParen)?;
                Ok(first)
            }
            TokenKind::LBrace => {
                self.advance()?;
                let mut entries = Vec::new();
                if !self.check(&TokenKind::RBrace) {
                    loop {
                        let key = self.parse_expr()?;
                        self.expect(TokenKind::Colon)?;
                        let value = self.parse_expr()?;
                        entries.push((key, value));
                        if !self.eat(&TokenKind::Comma)? {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBrace)?;
                Ok(Expr::new(ExprKind::Dict(entries), position))
            }
            TokenKind::From => self.parse_query(),
            _ => Err(self.syntax_error("expression")),
        }
    }

    fn parse_query(&mut self) -> Result<Expr, ParseError> {
        let position = self.expect(TokenKind::From)?.position;
        let var_type = self.parse_type()?;
        let (var_name, _) = self.expect_identifier()?;
        self.expect(TokenKind::In)?;
        let source = self.parse_expr()?;

        let filter = if self.eat(&TokenKind::Where)? {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Select)?;
        let select = self.parse_expr()?;
        let order_by = if self.eat(&TokenKind::OrderBy)? {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let query = Query {
            var_type,
            var_name,
            source,
            filter,
            select,
            order_by,
        };
        Ok(Expr::new(ExprKind::Query(Box::new(query)), position))
    }
}

fn binary(left: Expr, op: BinOp, right: Expr, position: Position) -> Expr {
    Expr::new(ExprKind::BinOp(Box::new(left), op, Box::new(right)), position)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(src: &str) -> Expr {
        Parser::new(src).unwrap().parse_standalone_expr().unwrap()
    }

    fn shape(e: &Expr) -> String {
        match &e.kind {
            ExprKind::IntLit(n) => n.to_string(),
            ExprKind::Var(name) => name.clone(),
            ExprKind::BinOp(l, op, r) => format!("({} {} {})", shape(l), op, shape(r)),
            ExprKind::UnaryOp(UnaryOp::Neg, inner) => format!("-{}", shape(inner)),
            ExprKind::UnaryOp(UnaryOp::Not, inner) => format!("!{}", shape(inner)),
            other => format!("{:?}", other),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(shape(&expr("1 + 2 * 3")), "(1 + (2 * 3))");
    }

    #[test]
    fn additive_is_left_associative() {
        assert_eq!(shape(&expr("1 - 2 - 3")), "((1 - 2) - 3)");
    }

    #[test]
    fn and_binds_tighter_than_or() {
        assert_eq!(shape(&expr("a || b && c")), "(a || (b && c))");
    }

    #[test]
    fn comparison_sits_between_and_and_additive() {
        assert_eq!(shape(&expr("a + 1 < b && c")), "(((a + 1) < b) && c)");
    }

    #[test]
    fn comparison_does_not_chain() {
        let err = Parser::new("1 < 2 < 3").unwrap().parse_standalone_expr().unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn unary_minus_binds_tighter_than_multiplication() {
        assert_eq!(shape(&expr("-a * b")), "(-a * b)");
    }

    #[test]
    fn binary_node_sits_at_operator() {
        let e = expr("10 / x");
        assert_eq!(e.position, Position::new(1, 4));
    }
}
