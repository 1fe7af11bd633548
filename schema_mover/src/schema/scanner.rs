//! Quote- and nesting-aware scanning of schema text
//!
//! Comments are stripped without touching string literals, and statements are split on
//! `;` only when no `BEGIN`/`END`-style block is open, so compound bodies keep their
//! inner terminators.

use crate::dialect::ScanOptions;
use crate::error::{Error, Result};

/// Remove `--` line comments and `/* */` block comments outside literals
pub fn strip_comments(sql: &str, options: ScanOptions) -> Result<String> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                out.push_str(&sql[copied..i]);
                let end = sql[i..].find('\n').map_or(sql.len(), |n| i + n);
                i = end;
                copied = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                out.push_str(&sql[copied..i]);
                let end = sql[i + 2..]
                    .find("*/")
                    .map(|n| i + 2 + n + 2)
                    .ok_or_else(|| Error::parse(&sql[i..], "unterminated block comment"))?;
                out.push(' ');
                i = end;
                copied = end;
            }
            b'\'' | b'"' | b'`' | b'$' => {
                i = skip_literal(sql, i, options)?;
            }
            _ => i += 1,
        }
    }
    out.push_str(&sql[copied..]);
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Semicolon,
    Colon,
    Open,
    Close,
    Other,
}

/// Split comment-free text into top-level statements, without their terminators.
///
/// `BEGIN` opens a block only in a routine, trigger or event definition, or inside an open
/// block, so a top-level `BEGIN;` or a column named `begin` is an ordinary word. `END`
/// inside parentheses that no block was opened in is an ordinary word too.
pub fn split_statements(sql: &str, options: ScanOptions) -> Result<Vec<String>> {
    let tokens = tokenize(sql, options)?;
    let mut statements = Vec::new();
    // open blocks with the parenthesis depth they were opened at
    let mut blocks: Vec<(String, usize)> = Vec::new();
    let mut depth = 0usize;
    let mut statement_start = 0;
    let mut first_word: Option<String> = None;
    let mut compound_body = false;
    let mut at_start = true;
    let mut previous_word: Option<&str> = None;

    let mut index = 0;
    while index < tokens.len() {
        let (token, start, end) = &tokens[index];
        index += 1;
        match token {
            Token::Semicolon => {
                if blocks.is_empty() {
                    push_statement(&mut statements, &sql[statement_start..*start]);
                    statement_start = *end;
                    depth = 0;
                    first_word = None;
                    compound_body = false;
                }
                at_start = true;
                previous_word = None;
            }
            Token::Colon => {
                // `label: LOOP`
                at_start = true;
            }
            Token::Open | Token::Close | Token::Other => {
                if *token == Token::Open {
                    depth += 1;
                } else if *token == Token::Close {
                    depth = depth.saturating_sub(1);
                }
                at_start = false;
                previous_word = None;
            }
            Token::Word(word) => {
                let was_start = at_start;
                at_start = false;
                if first_word.is_none() {
                    first_word = Some(word.clone());
                }
                match word.as_str() {
                    "PROCEDURE" | "FUNCTION" | "TRIGGER" | "EVENT"
                        if first_word.as_deref() == Some("CREATE") =>
                    {
                        compound_body = true;
                    }
                    "BEGIN" if depth == 0 && (compound_body || !blocks.is_empty()) => {
                        blocks.push((word.clone(), depth));
                        at_start = true;
                    }
                    "CASE" => blocks.push((word.clone(), depth)),
                    "IF" | "WHILE" | "LOOP" | "REPEAT" if was_start => {
                        blocks.push((word.clone(), depth));
                    }
                    "END" => {
                        let closes = match blocks.last() {
                            Some((_, opened_at)) => depth <= *opened_at,
                            None if was_start => {
                                return Err(Error::parse(
                                    &sql[statement_start..*end],
                                    "END without a matching block",
                                ));
                            }
                            None => false,
                        };
                        if closes {
                            blocks.pop();
                            // `END IF`, `END LOOP`, ... close the same block
                            if let Some((Token::Word(next), _, _)) = tokens.get(index) {
                                if matches!(
                                    next.as_str(),
                                    "IF" | "LOOP" | "WHILE" | "REPEAT" | "CASE"
                                ) {
                                    index += 1;
                                }
                            }
                        }
                    }
                    "THEN" | "ELSE" | "DO" => at_start = true,
                    "ROW" if previous_word == Some("EACH") => at_start = true,
                    _ => {}
                }
                previous_word = match &tokens[index - 1].0 {
                    Token::Word(w) => Some(w.as_str()),
                    _ => None,
                };
            }
        }
    }

    if !blocks.is_empty() {
        let open: Vec<&str> = blocks.iter().map(|(word, _)| word.as_str()).collect();
        return Err(Error::parse(
            &sql[statement_start..],
            format!("unterminated {} block", open.join("/")),
        ));
    }
    push_statement(&mut statements, &sql[statement_start..]);
    Ok(statements)
}

fn push_statement(statements: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        statements.push(text.to_string());
    }
}

/// Tokens with their byte ranges; literals collapse into a single `Other`
fn tokenize(sql: &str, options: ScanOptions) -> Result<Vec<(Token, usize, usize)>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let c = bytes[i];
        let token = match c {
            b';' => {
                i += 1;
                Token::Semicolon
            }
            b':' => {
                if matches!(bytes.get(i + 1), Some(b':') | Some(b'=')) {
                    i += 2;
                    Token::Other
                } else {
                    i += 1;
                    Token::Colon
                }
            }
            b'(' => {
                i += 1;
                Token::Open
            }
            b')' => {
                i += 1;
                Token::Close
            }
            b'\'' | b'"' | b'`' | b'$' => {
                i = skip_literal(sql, i, options)?;
                Token::Other
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$')
                {
                    i += 1;
                }
                Token::Word(sql[start..i].to_uppercase())
            }
            c if c.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            _ => {
                // skip a whole UTF-8 sequence
                i += 1;
                while i < bytes.len() && (bytes[i] & 0xC0) == 0x80 {
                    i += 1;
                }
                Token::Other
            }
        };
        tokens.push((token, start, i));
    }
    Ok(tokens)
}

/// End offset of the literal starting at `start`; a `$` that opens no dollar quote is one byte
fn skip_literal(sql: &str, start: usize, options: ScanOptions) -> Result<usize> {
    let bytes = sql.as_bytes();
    let quote = bytes[start];

    if quote == b'$' {
        if !options.dollar_quotes {
            return Ok(start + 1);
        }
        let tag_len = bytes[start + 1..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
            .count();
        let tag_end = start + 1 + tag_len;
        let opens = bytes.get(tag_end) == Some(&b'$')
            && !bytes.get(start + 1).map_or(false, u8::is_ascii_digit);
        if !opens {
            return Ok(start + 1);
        }
        let tag = &sql[start..=tag_end];
        return sql[tag_end + 1..]
            .find(tag)
            .map(|n| tag_end + 1 + n + tag.len())
            .ok_or_else(|| Error::parse(&sql[start..], "unterminated dollar-quoted string"));
    }

    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' && quote == b'\'' && options.backslash_escapes {
            i += 2;
            continue;
        }
        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(Error::parse(&sql[start..], "unterminated quoted string"))
}
