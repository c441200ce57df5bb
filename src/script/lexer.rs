use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::ScriptError;

/// Lexical token. Identifiers, keywords and string literals are lowercased.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {n}"),
            Token::Str(s) => write!(f, "string '{s}'"),
            Token::Ident(s) => write!(f, "identifier '{s}'"),
            Token::True => f.write_str("'true'"),
            Token::False => f.write_str("'false'"),
            Token::And => f.write_str("'and'"),
            Token::Or => f.write_str("'or'"),
            Token::Not => f.write_str("'not'"),
            Token::Dot => f.write_str("'.'"),
            Token::Comma => f.write_str("','"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::LBracket => f.write_str("'['"),
            Token::RBracket => f.write_str("']'"),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Slash => f.write_str("'/'"),
            Token::Lt => f.write_str("'<'"),
            Token::Le => f.write_str("'<='"),
            Token::Gt => f.write_str("'>'"),
            Token::Ge => f.write_str("'>='"),
            Token::Eq => f.write_str("'='"),
            Token::Ne => f.write_str("'!='"),
        }
    }
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            c if c.is_ascii_digit() => tokens.push(number(&mut chars)?),
            c if c.is_alphabetic() || c == '_' => tokens.push(word(&mut chars)),
            '\'' | '"' => tokens.push(string(&mut chars, offset)?),
            '&' | '|' => {
                chars.next();
                if chars.next_if(|&(_, c)| c == ch).is_none() {
                    return Err(ScriptError::UnexpectedChar { ch, offset });
                }
                tokens.push(if ch == '&' { Token::And } else { Token::Or });
            }
            '<' | '>' | '=' | '!' => {
                chars.next();
                let followed_by_eq = chars.next_if(|&(_, c)| c == '=').is_some();
                tokens.push(match (ch, followed_by_eq) {
                    ('<', false) => Token::Lt,
                    ('<', true) => Token::Le,
                    ('>', false) => Token::Gt,
                    ('>', true) => Token::Ge,
                    ('=', _) => Token::Eq,
                    ('!', false) => Token::Not,
                    _ => Token::Ne,
                });
            }
            _ => {
                chars.next();
                tokens.push(match ch {
                    '.' => Token::Dot,
                    ',' => Token::Comma,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    _ => return Err(ScriptError::UnexpectedChar { ch, offset }),
                });
            }
        }
    }

    Ok(tokens)
}

fn number(chars: &mut Peekable<CharIndices<'_>>) -> Result<Token, ScriptError> {
    let mut text = String::new();
    while let Some((_, c)) = chars.next_if(|&(_, c)| c.is_ascii_digit()) {
        text.push(c);
    }
    // A fraction needs a digit after the point; otherwise the '.' is a separate token.
    let mut lookahead = chars.clone();
    if let (Some((_, '.')), Some((_, d))) = (lookahead.next(), lookahead.next()) {
        if d.is_ascii_digit() {
            chars.next();
            text.push('.');
            while let Some((_, c)) = chars.next_if(|&(_, c)| c.is_ascii_digit()) {
                text.push(c);
            }
        }
    }
    text.parse::<f64>()
        .map(Token::Number)
        .map_err(|_| ScriptError::InvalidNumber(text))
}

fn word(chars: &mut Peekable<CharIndices<'_>>) -> Token {
    let mut text = String::new();
    while let Some((_, c)) = chars.next_if(|&(_, c)| c.is_alphanumeric() || c == '_') {
        text.extend(c.to_lowercase());
    }
    match text.as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "true" => Token::True,
        "false" => Token::False,
        _ => Token::Ident(text),
    }
}

fn string(chars: &mut Peekable<CharIndices<'_>>, offset: usize) -> Result<Token, ScriptError> {
    let Some((_, quote)) = chars.next() else {
        return Err(ScriptError::UnterminatedString { offset });
    };
    let mut text = String::new();
    for (_, c) in chars.by_ref() {
        if c == quote {
            return Ok(Token::Str(text));
        }
        text.extend(c.to_lowercase());
    }
    Err(ScriptError::UnterminatedString { offset })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_expression() {
        let tokens = tokenize("Right_Wrist.y <= 0.45 AND !(x != 2)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("right_wrist".into()),
                Token::Dot,
                Token::Ident("y".into()),
                Token::Le,
                Token::Number(0.45),
                Token::And,
                Token::Not,
                Token::LParen,
                Token::Ident("x".into()),
                Token::Ne,
                Token::Number(2.0),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_tokenize_aliases_and_strings() {
        let tokens = tokenize("tm['Station'].class == 'Grip' || a>=1").unwrap();
        assert!(tokens.contains(&Token::Str("station".into())));
        assert!(tokens.contains(&Token::Str("grip".into())));
        assert!(tokens.contains(&Token::Eq));
        assert!(tokens.contains(&Token::Or));
        assert!(tokens.contains(&Token::Ge));
    }

    #[test]
    fn test_tokenize_errors() {
        assert_eq!(
            tokenize("a ; b"),
            Err(ScriptError::UnexpectedChar { ch: ';', offset: 2 })
        );
        assert_eq!(tokenize("a & b"), Err(ScriptError::UnexpectedChar { ch: '&', offset: 2 }));
        assert_eq!(tokenize("'open"), Err(ScriptError::UnterminatedString { offset: 0 }));
    }
}
