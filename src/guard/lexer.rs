//! Minimal SQL tokenizer for the safety checks
//!
//! Only distinguishes what the guard needs: words, quoted text, statement
//! terminators and comments. Everything else is a single-character symbol.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bare word, upper-cased (keywords, identifiers, numbers)
    Word(String),
    /// '...' string literal
    Literal,
    /// "..." or `...` quoted identifier
    QuotedIdent,
    Semicolon,
    /// `--`, `#` or `/* */` comment
    Comment,
    Symbol(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexError {
    UnterminatedLiteral,
    UnterminatedComment,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Scan a quoted run starting after the opening quote. A doubled quote is an escape.
fn skip_quoted(chars: &[char], mut i: usize, quote: char) -> Result<usize, LexError> {
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(LexError::UnterminatedLiteral)
}

pub fn tokenize(sql: &str) -> Result<Vec<Token>, LexError> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '\'' => {
                i = skip_quoted(&chars, i + 1, '\'')?;
                tokens.push(Token::Literal);
            }
            '"' | '`' => {
                i = skip_quoted(&chars, i + 1, c)?;
                tokens.push(Token::QuotedIdent);
            }
            ';' => {
                tokens.push(Token::Semicolon);
                i += 1;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                tokens.push(Token::Comment);
            }
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                tokens.push(Token::Comment);
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let mut j = i + 2;
                loop {
                    if j + 1 >= chars.len() {
                        return Err(LexError::UnterminatedComment);
                    }
                    if chars[j] == '*' && chars[j + 1] == '/' {
                        break;
                    }
                    j += 1;
                }
                i = j + 2;
                tokens.push(Token::Comment);
            }
            c if is_word_char(c) => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(Token::Word(word.to_uppercase()));
            }
            other => {
                tokens.push(Token::Symbol(other));
                i += 1;
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(tokens: &[Token]) -> Vec<&str> {
        tokens
            .iter()
            .filter_map(|t| match t {
                Token::Word(w) => Some(w.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_words_are_uppercased() {
        let tokens = tokenize("select id from customers").unwrap();
        assert_eq!(words(&tokens), vec!["SELECT", "ID", "FROM", "CUSTOMERS"]);
    }

    #[test]
    fn test_literal_contents_are_hidden() {
        let tokens = tokenize("SELECT * FROM t WHERE note = 'drop; delete'").unwrap();
        assert!(!tokens.contains(&Token::Semicolon));
        assert!(!words(&tokens).contains(&"DELETE"));
        assert!(tokens.contains(&Token::Literal));
    }

    #[test]
    fn test_doubled_quote_escape() {
        let tokens = tokenize("SELECT 'it''s'; ").unwrap();
        assert_eq!(tokens.iter().filter(|t| **t == Token::Semicolon).count(), 1);
    }

    #[test]
    fn test_comments() {
        let tokens = tokenize("SELECT 1 -- trailing\n/* block */ # hash").unwrap();
        assert_eq!(tokens.iter().filter(|t| **t == Token::Comment).count(), 3);
    }

    #[test]
    fn test_unterminated() {
        assert_eq!(tokenize("SELECT 'open"), Err(LexError::UnterminatedLiteral));
        assert_eq!(tokenize("SELECT \"open"), Err(LexError::UnterminatedLiteral));
        assert_eq!(tokenize("SELECT 1 /* open"), Err(LexError::UnterminatedComment));
    }

    #[test]
    fn test_identifier_with_keyword_prefix_is_one_word() {
        let tokens = tokenize("SELECT updated_at, created_by FROM t").unwrap();
        assert_eq!(words(&tokens), vec!["SELECT", "UPDATED_AT", "CREATED_BY", "FROM", "T"]);
    }
}
