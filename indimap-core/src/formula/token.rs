//! Token definitions for the mapping formula lexer

/// Tokens recognized by the formula lexer
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    // Literals
    Number(f64),
    String(String),
    /// Function names, HC/HOSP and cell references such as `B2`, `Data!B2:C5`
    /// or `'My Sheet'!A1`
    Identifier(String),

    // Operators
    Plus,
    Minus,
    Asterisk,
    Slash,

    // Delimiters
    LParen,
    RParen,
    Comma,

    EOF,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "\"{}\"", s),
            Token::Identifier(s) => write!(f, "{}", s),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Asterisk => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::EOF => write!(f, "end of input"),
        }
    }
}
