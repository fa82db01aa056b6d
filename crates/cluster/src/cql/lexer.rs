use std::{iter::Peekable, str::CharIndices};

use cqlkit_domain::{DriverError, DriverResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Unquoted identifier or keyword, case preserved.
    Ident(String),
    /// Double-quoted identifier, case-sensitive.
    QuotedIdent(String),
    Str(String),
    Integer(i64),
    Float(f64),
    Blob(Vec<u8>),
    Symbol(char),
}

impl Token {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(ident) if ident.eq_ignore_ascii_case(keyword))
    }

    pub fn describe(&self) -> String {
        match self {
            Token::Ident(ident) => ident.clone(),
            Token::QuotedIdent(ident) => format!("\"{ident}\""),
            Token::Str(value) => format!("'{value}'"),
            Token::Integer(value) => value.to_string(),
            Token::Float(value) => value.to_string(),
            Token::Blob(value) => format!("0x{}", hex::encode(value)),
            Token::Symbol(symbol) => symbol.to_string(),
        }
    }
}

const SYMBOLS: &[char] = &[
    '(', ')', ',', ';', '.', '=', '*', '?', ':', '{', '}', '[', ']', '<', '>',
];

pub fn tokenize(input: &str) -> DriverResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
        } else if input[start..].starts_with("--") || input[start..].starts_with("//") {
            skip_line(&mut chars);
        } else if ch == '\'' {
            chars.next();
            tokens.push(Token::Str(read_quoted(&mut chars, '\'', start)?));
        } else if ch == '"' {
            chars.next();
            tokens.push(Token::QuotedIdent(read_quoted(&mut chars, '"', start)?));
        } else if ch.is_ascii_digit() || (ch == '-' && next_is_digit(input, start)) {
            tokens.push(read_number(input, &mut chars, start)?);
        } else if ch.is_ascii_alphabetic() || ch == '_' {
            let end = consume_while(&mut chars, |c| c.is_ascii_alphanumeric() || c == '_');
            tokens.push(Token::Ident(input[start..end].to_string()));
        } else if SYMBOLS.contains(&ch) {
            chars.next();
            tokens.push(Token::Symbol(ch));
        } else {
            return Err(DriverError::syntax(format!(
                "line 1:{start} unexpected character '{ch}'"
            )));
        }
    }

    Ok(tokens)
}

fn next_is_digit(input: &str, start: usize) -> bool {
    input[start + 1..]
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit())
}

fn skip_line(chars: &mut Peekable<CharIndices<'_>>) {
    for (_, ch) in chars.by_ref() {
        if ch == '\n' {
            break;
        }
    }
}

fn consume_while(chars: &mut Peekable<CharIndices<'_>>, keep: impl Fn(char) -> bool) -> usize {
    let mut end = 0;
    while let Some(&(index, ch)) = chars.peek() {
        if !keep(ch) {
            return index;
        }
        end = index + ch.len_utf8();
        chars.next();
    }
    end
}

/// Reads up to the closing quote; a doubled quote is an escaped quote.
fn read_quoted(
    chars: &mut Peekable<CharIndices<'_>>,
    quote: char,
    start: usize,
) -> DriverResult<String> {
    let mut value = String::new();
    while let Some((_, ch)) = chars.next() {
        if ch == quote {
            if matches!(chars.peek(), Some(&(_, next)) if next == quote) {
                chars.next();
                value.push(quote);
            } else {
                return Ok(value);
            }
        } else {
            value.push(ch);
        }
    }
    Err(DriverError::syntax(format!(
        "line 1:{start} unterminated quoted literal"
    )))
}

fn read_number(
    input: &str,
    chars: &mut Peekable<CharIndices<'_>>,
    start: usize,
) -> DriverResult<Token> {
    if input[start..].starts_with("0x") || input[start..].starts_with("0X") {
        chars.next();
        chars.next();
        let end = consume_while(chars, |c| c.is_ascii_hexdigit());
        let end = end.max(start + 2);
        let digits = &input[start + 2..end];
        return hex::decode(digits)
            .map(Token::Blob)
            .map_err(|err| DriverError::syntax(format!("invalid blob literal 0x{digits}: {err}")));
    }

    chars.next();
    let end = consume_while(chars, |c| {
        c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E'
    });
    let end = end.max(start + 1);
    let text = &input[start..end];
    if text.contains(['.', 'e', 'E']) {
        text.parse()
            .map(Token::Float)
            .map_err(|_| DriverError::syntax(format!("invalid float literal {text}")))
    } else {
        text.parse()
            .map(Token::Integer)
            .map_err(|_| DriverError::syntax(format!("invalid integer literal {text}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_insert_with_markers() {
        let tokens = tokenize("INSERT INTO ks.t (key, items) VALUES (?, ?);").unwrap();
        assert_eq!(tokens[0], Token::Ident("INSERT".into()));
        assert!(tokens[0].is_keyword("insert"));
        assert_eq!(tokens[3], Token::Symbol('.'));
        assert_eq!(tokens.iter().filter(|t| **t == Token::Symbol('?')).count(), 2);
        assert_eq!(tokens.last(), Some(&Token::Symbol(';')));
    }

    #[test]
    fn reads_literals() {
        let tokens = tokenize("'it''s' -42 1.5 0xCAFE \"Name\" -- trailing").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Str("it's".into()),
                Token::Integer(-42),
                Token::Float(1.5),
                Token::Blob(vec![0xca, 0xfe]),
                Token::QuotedIdent("Name".into()),
            ]
        );
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let err = tokenize("SELECT 'oops").unwrap_err();
        assert_eq!(err.code(), cqlkit_domain::ErrorCode::ServerSyntaxError);
    }
}
