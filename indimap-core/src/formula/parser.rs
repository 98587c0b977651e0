//! Recursive descent parser that converts a stream of tokens into an [`Expr`].
//!
//! GRAMMAR:
//!   expression     --> additive
//!   additive       --> multiplicative ( ("+" | "-") multiplicative )*
//!   multiplicative --> unary ( ("*" | "/") unary )*
//!   unary          --> ("-" | "+") unary | primary
//!   primary        --> NUMBER | STRING | function_call | source | reference | "(" expression ")"
//!   function_call  --> NAME "(" arguments? ")"
//!   arguments      --> expression ("," expression)*
//!   source         --> "HC" | "HOSP"
//!   reference      --> [sheet "!"] CELL [":" CELL]

use super::FormulaError;
use super::ast::{BinaryOperator, Expr, Function};
use super::lexer::Lexer;
use super::token::Token;
use crate::reader::parser_utils::{parse_cell_range, split_sheet_ref};

/// Nesting limit for parentheses, calls and unary operators
pub const MAX_DEPTH: usize = 256;

pub type ParseResult<T> = Result<T, FormulaError>;

/// Parse a complete formula
pub fn parse(input: &str) -> ParseResult<Expr> {
    Parser::new(input).parse()
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token();
        Parser {
            lexer,
            current_token,
            depth: 0,
        }
    }

    pub fn parse(&mut self) -> ParseResult<Expr> {
        if self.current_token == Token::EOF {
            return Err(FormulaError::Parse("empty expression".to_string()));
        }

        let expr = self.parse_expression()?;

        if self.current_token != Token::EOF {
            return Err(FormulaError::Parse(format!(
                "unexpected {} after expression",
                self.current_token
            )));
        }

        Ok(expr)
    }

    fn advance(&mut self) {
        self.current_token = self.lexer.next_token();
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.current_token == expected {
            self.advance();
            Ok(())
        } else {
            Err(FormulaError::Parse(format!(
                "expected {}, found {}",
                expected, self.current_token
            )))
        }
    }

    fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let first = self.parse_multiplicative()?;
        let mut rest = Vec::new();

        loop {
            let op = match &self.current_token {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };

            self.advance();
            rest.push((op, self.parse_multiplicative()?));
        }

        Ok(chain(first, rest))
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let first = self.parse_unary()?;
        let mut rest = Vec::new();

        loop {
            let op = match &self.current_token {
                Token::Asterisk => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                _ => break,
            };

            self.advance();
            rest.push((op, self.parse_unary()?));
        }

        Ok(chain(first, rest))
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::TooDeep);
        }

        let expr = match self.current_token {
            Token::Minus => {
                self.advance();
                Expr::Negate(Box::new(self.parse_unary()?))
            }
            Token::Plus => {
                self.advance();
                self.parse_unary()?
            }
            _ => self.parse_primary()?,
        };

        self.depth -= 1;
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.current_token.clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expr::Text(s))
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::Identifier(name) => {
                self.advance();
                if self.current_token == Token::LParen {
                    self.parse_function_call(&name)
                } else if let Some(source) = Expr::source_from_name(&name) {
                    Ok(source)
                } else {
                    parse_reference(name)
                }
            }
            other => Err(FormulaError::Parse(format!("unexpected {}", other))),
        }
    }

    fn parse_function_call(&mut self, name: &str) -> ParseResult<Expr> {
        let function =
            Function::from_name(name).ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;
        self.expect(Token::LParen)?;

        let mut args = Vec::new();
        if self.current_token != Token::RParen {
            loop {
                args.push(self.parse_expression()?);
                if self.current_token == Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;

        Ok(Expr::Call { function, args })
    }
}

fn chain(first: Expr, rest: Vec<(BinaryOperator, Expr)>) -> Expr {
    if rest.is_empty() {
        first
    } else {
        Expr::Chain {
            first: Box::new(first),
            rest,
        }
    }
}

fn parse_reference(name: String) -> ParseResult<Expr> {
    let (_, address) = split_sheet_ref(&name);
    if parse_cell_range(address).is_some() {
        Ok(Expr::Reference(name))
    } else {
        Err(FormulaError::UnknownIdentifier(name))
    }
}
