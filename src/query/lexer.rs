//! Tokenizer for the query language.

use crate::errors::DocGraphError;

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Param,
    Star,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Minus,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Concat,
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub position: usize,
}

impl Token {
    /// True for an identifier matching `keyword` case-insensitively.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(name) if name.eq_ignore_ascii_case(keyword))
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, DocGraphError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let ch = bytes[pos];
        if ch.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        let start = pos;
        let simple = match ch {
            b'?' => Some(TokenKind::Param),
            b'*' => Some(TokenKind::Star),
            b',' => Some(TokenKind::Comma),
            b'.' if !bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) => Some(TokenKind::Dot),
            b':' => Some(TokenKind::Colon),
            b';' => Some(TokenKind::Semicolon),
            b'-' => Some(TokenKind::Minus),
            b'(' => Some(TokenKind::LParen),
            b')' => Some(TokenKind::RParen),
            b'{' => Some(TokenKind::LBrace),
            b'}' => Some(TokenKind::RBrace),
            b'[' => Some(TokenKind::LBracket),
            b']' => Some(TokenKind::RBracket),
            b'=' => Some(TokenKind::Eq),
            _ => None,
        };
        if let Some(kind) = simple {
            tokens.push(Token {
                kind,
                position: start,
            });
            pos += 1;
            continue;
        }

        let next = bytes.get(pos + 1).copied();
        let kind = match (ch, next) {
            (b'!', Some(b'=')) | (b'<', Some(b'>')) => {
                pos += 2;
                TokenKind::Ne
            }
            (b'<', Some(b'=')) => {
                pos += 2;
                TokenKind::Le
            }
            (b'>', Some(b'=')) => {
                pos += 2;
                TokenKind::Ge
            }
            (b'|', Some(b'|')) => {
                pos += 2;
                TokenKind::Concat
            }
            (b'<', _) => {
                pos += 1;
                TokenKind::Lt
            }
            (b'>', _) => {
                pos += 1;
                TokenKind::Gt
            }
            (b'\'' | b'"', _) => {
                let (text, end) = read_string(input, pos)?;
                pos = end;
                TokenKind::Str(text)
            }
            (b'`', _) => {
                let end = input[pos + 1..]
                    .find('`')
                    .map(|offset| pos + 1 + offset)
                    .ok_or_else(|| DocGraphError::syntax(start, "unterminated quoted identifier"))?;
                let name = input[pos + 1..end].to_string();
                pos = end + 1;
                TokenKind::Ident(name)
            }
            (c, _) if c.is_ascii_digit() || c == b'.' => {
                let (kind, end) = read_number(input, pos)?;
                pos = end;
                kind
            }
            (c, _) if c.is_ascii_alphabetic() || c == b'_' || c == b'@' => {
                let end = input[pos + 1..]
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .map_or(input.len(), |offset| pos + 1 + offset);
                let name = input[pos..end].to_string();
                pos = end;
                TokenKind::Ident(name)
            }
            _ => {
                let found = input[pos..].chars().next().unwrap_or('?');
                return Err(DocGraphError::syntax(
                    start,
                    format!("unexpected character {found:?}"),
                ));
            }
        };
        tokens.push(Token {
            kind,
            position: start,
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        position: input.len(),
    });
    Ok(tokens)
}

/// Reads a quoted string starting at `start`; a doubled quote or a backslash escapes.
fn read_string(input: &str, start: usize) -> Result<(String, usize), DocGraphError> {
    let mut chars = input[start..].char_indices();
    let (_, quote) = chars
        .next()
        .ok_or_else(|| DocGraphError::syntax(start, "expected string"))?;
    let mut text = String::new();
    let mut escaped = false;
    let mut pending_quote = false;
    for (offset, c) in chars {
        if pending_quote {
            if c == quote {
                text.push(quote);
                pending_quote = false;
                continue;
            }
            return Ok((text, start + offset));
        }
        if escaped {
            text.push(match c {
                'n' => '\n',
                't' => '\t',
                other => other,
            });
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            pending_quote = true;
        } else {
            text.push(c);
        }
    }
    if pending_quote {
        return Ok((text, input.len()));
    }
    Err(DocGraphError::syntax(start, "unterminated string literal"))
}

fn read_number(input: &str, start: usize) -> Result<(TokenKind, usize), DocGraphError> {
    let bytes = input.as_bytes();
    let mut end = start;
    let mut is_float = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !is_float && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) => {
                is_float = true;
                end += 1;
            }
            b'e' | b'E' if end > start => {
                is_float = true;
                end += 1;
                if matches!(bytes.get(end), Some(b'+' | b'-')) {
                    end += 1;
                }
            }
            _ => break,
        }
    }
    let text = &input[start..end];
    let kind = if is_float {
        text.parse::<f64>()
            .map(TokenKind::Float)
            .map_err(|_| DocGraphError::syntax(start, format!("invalid number {text}")))?
    } else {
        text.parse::<i64>()
            .map(TokenKind::Int)
            .map_err(|_| DocGraphError::syntax(start, format!("invalid number {text}")))?
    };
    Ok((kind, end))
}
