//! Scans a mapping formula and produces a stream of tokens.
//!
//! Characters that have no meaning in the grammar (a leading `=`, stray `;`,
//! `#` and so on) are skipped, so they can never reach evaluation.

use super::token::Token;
use crate::number::khmer_digit_value;
use std::iter::Peekable;
use std::str::Chars;

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
        }
    }

    /// Advances the lexer and returns the next token.
    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_whitespace();

            match self.input.next() {
                Some('+') => return Token::Plus,
                Some('-') | Some('\u{2212}') => return Token::Minus,
                Some('*') => return Token::Asterisk,
                Some('/') => return Token::Slash,
                Some('(') => return Token::LParen,
                Some(')') => return Token::RParen,
                Some(',') => return Token::Comma,
                Some('"') => return self.read_string(),
                Some('\'') => return self.read_quoted_reference(),
                Some(ch) if is_digit(ch) || ch == '.' => return self.read_number(ch),
                Some(ch) if is_identifier_start(ch) => {
                    let mut ident = String::new();
                    ident.push(ch);
                    return self.read_identifier(ident);
                }
                None => return Token::EOF,
                Some(ch) => log::trace!("skipping '{}' in formula", ch),
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&ch) = self.input.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.input.next();
        }
    }

    fn read_string(&mut self) -> Token {
        let mut result = String::new();
        for ch in self.input.by_ref() {
            if ch == '"' {
                return Token::String(result);
            }
            result.push(ch);
        }
        // Unterminated: the parser reports the missing ')' that follows
        Token::String(result)
    }

    /// 'Sheet Name'!A1 keeps its quotes; the reference splitter strips them
    fn read_quoted_reference(&mut self) -> Token {
        let mut ident = String::from('\'');
        while let Some(ch) = self.input.next() {
            ident.push(ch);
            if ch == '\'' {
                if self.input.peek() == Some(&'\'') {
                    ident.push('\'');
                    self.input.next();
                } else {
                    break;
                }
            }
        }
        self.read_identifier(ident)
    }

    fn read_number(&mut self, first_char: char) -> Token {
        let mut number_str = String::new();
        push_digit(&mut number_str, first_char);
        let mut has_dot = first_char == '.';

        while let Some(&ch) = self.input.peek() {
            if is_digit(ch) {
                push_digit(&mut number_str, ch);
                self.input.next();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                number_str.push(ch);
                self.input.next();
            } else {
                break;
            }
        }

        match number_str.parse::<f64>() {
            Ok(n) => Token::Number(n),
            // A lone "." reads as an identifier the parser will reject
            Err(_) => Token::Identifier(number_str),
        }
    }

    fn read_identifier(&mut self, mut ident: String) -> Token {
        while let Some(&ch) = self.input.peek() {
            if is_identifier_continue(ch) {
                ident.push(ch);
                self.input.next();
            } else {
                break;
            }
        }
        Token::Identifier(ident)
    }
}

fn is_digit(ch: char) -> bool {
    ch.is_ascii_digit() || khmer_digit_value(ch).is_some()
}

fn push_digit(out: &mut String, ch: char) {
    match khmer_digit_value(ch).and_then(|d| char::from_digit(d, 10)) {
        Some(ascii) => out.push(ascii),
        None => out.push(ch),
    }
}

fn is_khmer(ch: char) -> bool {
    ('\u{1780}'..='\u{17FF}').contains(&ch)
}

fn is_identifier_start(ch: char) -> bool {
    (ch.is_alphabetic() && !is_digit(ch)) || ch == '_' || ch == '$' || is_khmer(ch)
}

fn is_identifier_continue(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '$' | '!' | ':' | '.') || is_khmer(ch)
}
