use crate::error::CompileError;
use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Pipe,   // |
    LParen, // (
    RParen, // )
    LBrace, // {
    RBrace, // }
    Comma,  // ,
    /// "..." with escapes kept verbatim
    Str(String),
    /// '...'
    Char(String),
    /// ERN, D200, O>=, I1, 1-10 ...
    Word(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

fn is_delimiter(ch: char) -> bool {
    matches!(ch, '|' | '(' | ')' | '{' | '}' | ',' | '"' | '\'')
}

pub fn tokenize(script: &str) -> Result<Vec<Spanned>, CompileError> {
    let mut tokens = Vec::new();
    let mut chars = script.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        let single = match ch {
            '|' => Some(Token::Pipe),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = single {
            chars.next();
            tokens.push(Spanned { token, span: Span::new(start, start + 1) });
            continue;
        }

        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '"' | '\'' => {
                chars.next(); // opening quote
                let mut body = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    if c == '\\' {
                        body.push(c);
                        if let Some((_, escaped)) = chars.next() {
                            body.push(escaped);
                        }
                        continue;
                    }
                    if c == ch {
                        closed = true;
                        break;
                    }
                    body.push(c);
                }
                if !closed {
                    return Err(CompileError::LexerError {
                        message: format!("Unclosed {} literal", if ch == '"' { "string" } else { "character" }),
                        span: Span::new(start, script.len()),
                    });
                }
                let end = chars.peek().map(|&(i, _)| i).unwrap_or(script.len());
                let token = if ch == '"' { Token::Str(body) } else { Token::Char(body) };
                tokens.push(Spanned { token, span: Span::new(start, end) });
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_whitespace() || is_delimiter(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                let end = start + word.len();
                tokens.push(Spanned { token: Token::Word(word), span: Span::new(start, end) });
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(script: &str) -> Vec<Token> {
        tokenize(script).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn splits_on_delimiters() {
        assert_eq!(
            kinds("|G(I,1,=,0)|"),
            vec![
                Token::Pipe,
                Token::Word("G".into()),
                Token::LParen,
                Token::Word("I".into()),
                Token::Comma,
                Token::Word("1".into()),
                Token::Comma,
                Token::Word("=".into()),
                Token::Comma,
                Token::Word("0".into()),
                Token::RParen,
                Token::Pipe,
            ]
        );
    }

    #[test]
    fn quoted_literals_hide_delimiters() {
        assert_eq!(
            kinds(r#"R"a|b" 'x' "q\"(""#),
            vec![
                Token::Word("R".into()),
                Token::Str("a|b".into()),
                Token::Char("x".into()),
                Token::Str(r#"q\"("#.into()),
            ]
        );
    }

    #[test]
    fn unclosed_string_is_an_error() {
        assert!(matches!(tokenize("|P\"abc"), Err(CompileError::LexerError { .. })));
    }
}
