use crate::source::{Position, SourceMap};
use logos::Logos;
use thiserror::Error;

pub const MAX_NUMBER: i64 = 10_000_000;
pub const MIN_NUMBER: i64 = -MAX_NUMBER;
pub const MAX_IDENTIFIER_LENGTH: usize = 100;
pub const MAX_STRING_LENGTH: usize = 10_000;
pub const MAX_COMMENT_LENGTH: usize = 10_000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LexErrorKind {
    #[default]
    #[error("Unexpected character")]
    UnexpectedCharacter,
    #[error("Comment too long")]
    CommentTooLong,
    #[error("String too long")]
    StringTooLong,
    #[error("Identifier too long")]
    IdentifierTooLong,
    #[error("Unterminated string")]
    UnterminatedString,
    #[error("Number out of range")]
    NumberOutOfRange,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} at {position}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub position: Position,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexErrorKind)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum TokenKind {
    // Types
    #[token("int")]
    Int,
    #[token("float")]
    Float,
    #[token("bool")]
    Bool,
    #[token("string")]
    StringType,
    #[token("List")]
    List,
    #[token("Pair")]
    Pair,
    #[token("Dict")]
    Dict,

    // Keywords
    #[token("function")]
    Function,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("return")]
    Return,
    #[token("from")]
    From,
    #[token("in")]
    In,
    #[token("where")]
    Where,
    #[token("select")]
    Select,
    #[token("orderby")]
    OrderBy,
    #[token("key")]
    Key,

    // Identifiers and literals
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", identifier)]
    Identifier(String),

    #[regex(r"[0-9]+\.[0-9]+", float_literal)]
    FloatLiteral(f64),

    #[regex(r"[0-9]+", int_literal)]
    IntLiteral(i64),

    #[regex(r#""[^"\n]*""#, string_literal)]
    #[regex(r#""[^"\n]*"#, unterminated_string)]
    StringLiteral(String),

    #[token("true", |_| true)]
    #[token("false", |_| false)]
    BoolLiteral(bool),

    // Comments are handed to `Lexer` which checks their length and drops them.
    #[regex(r"#[^\n]*")]
    Comment,

    // Arithmetic
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,

    #[token("=")]
    Assign,

    // Comparison
    #[token("==")]
    Equal,
    #[token("!=")]
    NotEqual,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("<=")]
    LessEqual,
    #[token(">=")]
    GreaterEqual,

    // Logical
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("!")]
    Not,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,

    // Never matched by the scanner; `Lexer` yields it once input is exhausted.
    Eof,
}

fn identifier(lex: &mut logos::Lexer<TokenKind>) -> Result<String, LexErrorKind> {
    let text = lex.slice();
    if text.len() > MAX_IDENTIFIER_LENGTH {
        return Err(LexErrorKind::IdentifierTooLong);
    }
    Ok(text.to_string())
}

fn int_literal(lex: &mut logos::Lexer<TokenKind>) -> Result<i64, LexErrorKind> {
    match lex.slice().parse::<i64>() {
        Ok(n) if (MIN_NUMBER..=MAX_NUMBER).contains(&n) => Ok(n),
        _ => Err(LexErrorKind::NumberOutOfRange),
    }
}

fn float_literal(lex: &mut logos::Lexer<TokenKind>) -> Result<f64, LexErrorKind> {
    match lex.slice().parse::<f64>() {
        Ok(n) if n >= MIN_NUMBER as f64 && n <= MAX_NUMBER as f64 => Ok(n),
        _ => Err(LexErrorKind::NumberOutOfRange),
    }
}

fn string_literal(lex: &mut logos::Lexer<TokenKind>) -> Result<String, LexErrorKind> {
    let s = lex.slice();
    let content = &s[1..s.len() - 1];
    if content.chars().count() > MAX_STRING_LENGTH {
        return Err(LexErrorKind::StringTooLong);
    }
    Ok(content.to_string())
}

fn unterminated_string(lex: &mut logos::Lexer<TokenKind>) -> Result<String, LexErrorKind> {
    if lex.slice().chars().count() - 1 > MAX_STRING_LENGTH {
        return Err(LexErrorKind::StringTooLong);
    }
    Err(LexErrorKind::UnterminatedString)
}

impl TokenKind {
    pub fn is_type_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Int
                | TokenKind::Float
                | TokenKind::Bool
                | TokenKind::StringType
                | TokenKind::List
                | TokenKind::Pair
                | TokenKind::Dict
        )
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Int => write!(f, "int"),
            TokenKind::Float => write!(f, "float"),
            TokenKind::Bool => write!(f, "bool"),
            TokenKind::StringType => write!(f, "string"),
            TokenKind::List => write!(f, "List"),
            TokenKind::Pair => write!(f, "Pair"),
            TokenKind::Dict => write!(f, "Dict"),
            TokenKind::Function => write!(f, "function"),
            TokenKind::If => write!(f, "if"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::While => write!(f, "while"),
            TokenKind::For => write!(f, "for"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::From => write!(f, "from"),
            TokenKind::In => write!(f, "in"),
            TokenKind::Where => write!(f, "where"),
            TokenKind::Select => write!(f, "select"),
            TokenKind::OrderBy => write!(f, "orderby"),
            TokenKind::Key => write!(f, "key"),
            TokenKind::Identifier(s) => write!(f, "{}", s),
            TokenKind::FloatLiteral(n) => write!(f, "{:?}", n),
            TokenKind::IntLiteral(n) => write!(f, "{}", n),
            TokenKind::StringLiteral(s) => write!(f, "\"{}\"", s),
            TokenKind::BoolLiteral(b) => write!(f, "{}", b),
            TokenKind::Comment => write!(f, "comment"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Assign => write!(f, "="),
            TokenKind::Equal => write!(f, "=="),
            TokenKind::NotEqual => write!(f, "!="),
            TokenKind::Less => write!(f, "<"),
            TokenKind::Greater => write!(f, ">"),
            TokenKind::LessEqual => write!(f, "<="),
            TokenKind::GreaterEqual => write!(f, ">="),
            TokenKind::And => write!(f, "&&"),
            TokenKind::Or => write!(f, "||"),
            TokenKind::Not => write!(f, "!"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

/// A token together with the position of its first character.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

/// Pull-based scanner over a source string.
///
/// Once the input is exhausted every further call yields `Eof`; once a
/// lexical error has been reported every further call repeats it.
pub struct Lexer<'src> {
    inner: logos::Lexer<'src, TokenKind>,
    map: SourceMap<'src>,
    failed: Option<LexError>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Lexer {
            inner: TokenKind::lexer(source),
            map: SourceMap::new(source),
            failed: None,
        }
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        loop {
            let Some(result) = self.inner.next() else {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    position: self.map.end(),
                });
            };
            let position = self.map.position(self.inner.span().start);
            match result {
                Ok(TokenKind::Comment) => {
                    if self.inner.slice().chars().count() - 1 > MAX_COMMENT_LENGTH {
                        return Err(self.fail(LexErrorKind::CommentTooLong, position));
                    }
                }
                Ok(kind) => return Ok(Token { kind, position }),
                Err(kind) => return Err(self.fail(kind, position)),
            }
        }
    }

    /// Scans the whole input, ending with the `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn fail(&mut self, kind: LexErrorKind, position: Position) -> LexError {
        let err = LexError { kind, position };
        self.failed = Some(err.clone());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn keyword_prefix_is_still_an_identifier() {
        assert_eq!(
            kinds("integer intx"),
            vec![
                TokenKind::Identifier("integer".to_string()),
                TokenKind::Identifier("intx".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn comment_is_trivia() {
        assert_eq!(
            kinds("#111\njakisid"),
            vec![TokenKind::Identifier("jakisid".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn dot_after_integer_without_fraction() {
        assert_eq!(
            kinds("1.length"),
            vec![
                TokenKind::IntLiteral(1),
                TokenKind::Dot,
                TokenKind::Identifier("length".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn error_is_sticky() {
        let mut lexer = Lexer::new("\"open");
        let first = lexer.next_token().unwrap_err();
        let second = lexer.next_token().unwrap_err();
        assert_eq!(first, second);
        assert_eq!(first.kind, LexErrorKind::UnterminatedString);
    }

    #[test]
    fn eof_repeats() {
        let mut lexer = Lexer::new("x");
        lexer.next_token().unwrap();
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
    }
}
