//! Read-only safety guard for generated SQL
//!
//! Lexical checks only. Anything the checks cannot classify with confidence
//! is rejected. The database connection is read-only as well, so the guard is
//! the first of two layers.

mod lexer;

use lexer::{tokenize, LexError, Token};
use serde::Serialize;
use std::fmt;

/// Verbs that modify data, schema, permissions or session state
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "REPLACE", "RENAME", "MERGE", "UPSERT", "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX",
    "ANALYZE", "LOCK", "UNLOCK", "CALL", "EXEC", "EXECUTE", "SET", "LOAD", "LOAD_FILE", "INTO",
    "OUTFILE", "DUMPFILE", "HANDLER", "BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT", "RELEASE",
];

/// Why a statement was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectionReason {
    Empty,
    NoSqlExtracted,
    UnterminatedLiteral,
    MultipleStatements,
    NotReadOnly { leading: String },
    ForbiddenKeyword { keyword: String },
    CommentDetected,
}

impl RejectionReason {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::Empty => "empty",
            RejectionReason::NoSqlExtracted => "no_sql_extracted",
            RejectionReason::UnterminatedLiteral => "unterminated_literal",
            RejectionReason::MultipleStatements => "multiple_statements",
            RejectionReason::NotReadOnly { .. } => "not_read_only",
            RejectionReason::ForbiddenKeyword { .. } => "forbidden_keyword",
            RejectionReason::CommentDetected => "comment_detected",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::Empty => write!(f, "Blocked: the SQL statement is empty."),
            RejectionReason::NoSqlExtracted => write!(
                f,
                "Blocked: no SQL statement could be found in the reply. Return a single SELECT query."
            ),
            RejectionReason::UnterminatedLiteral => write!(
                f,
                "Blocked: the SQL contains an unterminated quoted string or comment."
            ),
            RejectionReason::MultipleStatements => write!(
                f,
                "Blocked: only a single SQL statement is allowed; remove extra statements separated by ';'."
            ),
            RejectionReason::NotReadOnly { leading } => write!(
                f,
                "Blocked: statement starts with '{}'. Only SELECT queries (optionally with a WITH clause) are allowed.",
                leading
            ),
            RejectionReason::ForbiddenKeyword { keyword } => write!(
                f,
                "Blocked: SQL contains '{}' which is not allowed in a read-only query.",
                keyword
            ),
            RejectionReason::CommentDetected => write!(
                f,
                "Blocked: SQL comments are not allowed; return the query without comments."
            ),
        }
    }
}

/// Outcome of running the guard on one statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ValidationVerdict {
    Accepted { sql: String },
    Rejected { reason: RejectionReason },
}

impl ValidationVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationVerdict::Accepted { .. })
    }

    fn reject(reason: RejectionReason) -> Self {
        ValidationVerdict::Rejected { reason }
    }
}

/// Check that `sql` is a single read-only statement.
///
/// Checks run in a fixed order: lexing, statement count, leading verb,
/// forbidden keywords, comments. The first failure wins.
pub fn validate(sql: &str) -> ValidationVerdict {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return ValidationVerdict::reject(RejectionReason::Empty);
    }

    let tokens = match tokenize(trimmed) {
        Ok(tokens) => tokens,
        Err(LexError::UnterminatedLiteral) | Err(LexError::UnterminatedComment) => {
            return ValidationVerdict::reject(RejectionReason::UnterminatedLiteral)
        }
    };

    let significant: Vec<&Token> = tokens.iter().filter(|t| **t != Token::Comment).collect();
    if significant.is_empty() {
        return ValidationVerdict::reject(RejectionReason::Empty);
    }

    // One statement, at most one terminator and only in last position
    let terminators = significant
        .iter()
        .filter(|t| ***t == Token::Semicolon)
        .count();
    let ends_with_terminator = significant.last() == Some(&&Token::Semicolon);
    if terminators > 1 || (terminators == 1 && !ends_with_terminator) {
        return ValidationVerdict::reject(RejectionReason::MultipleStatements);
    }

    let leading = match significant[0] {
        Token::Word(word) => word.clone(),
        Token::Semicolon => return ValidationVerdict::reject(RejectionReason::Empty),
        Token::Symbol(c) => c.to_string(),
        Token::Literal | Token::QuotedIdent | Token::Comment => "<quoted text>".to_string(),
    };
    let has_select = significant
        .iter()
        .any(|t| matches!(t, Token::Word(w) if w == "SELECT"));
    let read_only_start = leading == "SELECT" || (leading == "WITH" && has_select);
    if !read_only_start {
        return ValidationVerdict::reject(RejectionReason::NotReadOnly { leading });
    }

    for token in &significant {
        if let Token::Word(word) = token {
            if FORBIDDEN_KEYWORDS.contains(&word.as_str()) {
                return ValidationVerdict::reject(RejectionReason::ForbiddenKeyword {
                    keyword: word.clone(),
                });
            }
        }
    }

    if tokens.contains(&Token::Comment) {
        return ValidationVerdict::reject(RejectionReason::CommentDetected);
    }

    ValidationVerdict::Accepted {
        sql: trimmed.to_string(),
    }
}

/// Whether `keyword` appears as a whole word outside literals, comments and
/// parentheses. A `LIMIT` inside a subquery or CTE body does not count.
pub fn contains_top_level_keyword(sql: &str, keyword: &str) -> bool {
    let keyword = keyword.to_uppercase();
    let Ok(tokens) = tokenize(sql) else {
        return false;
    };
    let mut depth = 0usize;
    tokens.iter().any(|token| match token {
        Token::Symbol('(') => {
            depth += 1;
            false
        }
        Token::Symbol(')') => {
            depth = depth.saturating_sub(1);
            false
        }
        Token::Word(w) => depth == 0 && *w == keyword,
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_top_level_keyword() {
        assert!(contains_top_level_keyword("select * from t limit 5", "LIMIT"));
        assert!(!contains_top_level_keyword("SELECT 'no limit' FROM t", "LIMIT"));
        assert!(!contains_top_level_keyword("SELECT speed_limit FROM t", "LIMIT"));
        assert!(!contains_top_level_keyword(
            "SELECT * FROM t WHERE id IN (SELECT id FROM u LIMIT 3)",
            "LIMIT"
        ));
        assert!(contains_top_level_keyword(
            "WITH x AS (SELECT id FROM u LIMIT 3) SELECT * FROM x LIMIT 1",
            "LIMIT"
        ));
    }

    fn rejected(sql: &str) -> RejectionReason {
        match validate(sql) {
            ValidationVerdict::Rejected { reason } => reason,
            ValidationVerdict::Accepted { sql } => panic!("accepted: {}", sql),
        }
    }

    #[test]
    fn test_plain_select_is_accepted() {
        assert_eq!(
            validate("SELECT * FROM orders"),
            ValidationVerdict::Accepted {
                sql: "SELECT * FROM orders".to_string()
            }
        );
    }

    #[test]
    fn test_whitespace_and_case_variation_is_accepted() {
        assert_eq!(
            validate("  select id from customers  "),
            ValidationVerdict::Accepted {
                sql: "select id from customers".to_string()
            }
        );
    }

    #[test]
    fn test_trailing_terminator_is_accepted() {
        assert!(validate("SELECT COUNT(*) FROM customers;").is_accepted());
    }

    #[test]
    fn test_cte_is_accepted() {
        let sql = "WITH totals AS (SELECT customer_id, COUNT(*) AS n FROM orders GROUP BY customer_id) SELECT * FROM totals";
        assert!(validate(sql).is_accepted());
    }

    #[test]
    fn test_stacked_statement_is_rejected() {
        assert_eq!(
            rejected("SELECT 1; DROP TABLE orders"),
            RejectionReason::MultipleStatements
        );
        assert_eq!(rejected("SELECT 1;;"), RejectionReason::MultipleStatements);
    }

    #[test]
    fn test_write_verbs_are_rejected() {
        assert_eq!(
            rejected("DELETE FROM orders"),
            RejectionReason::NotReadOnly {
                leading: "DELETE".to_string()
            }
        );
        assert_eq!(rejected("update orders set x = 1").code(), "not_read_only");
        assert_eq!(rejected("SHOW TABLES").code(), "not_read_only");
    }

    #[test]
    fn test_forbidden_keyword_inside_select() {
        assert_eq!(
            rejected("SELECT * INTO backup FROM orders"),
            RejectionReason::ForbiddenKeyword {
                keyword: "INTO".to_string()
            }
        );
        assert_eq!(
            rejected("WITH x AS (DELETE FROM orders RETURNING *) SELECT * FROM x").code(),
            "forbidden_keyword"
        );
    }

    #[test]
    fn test_cte_without_select_is_rejected() {
        assert_eq!(rejected("WITH x AS (VALUES (1)) VALUES (2)").code(), "not_read_only");
    }

    #[test]
    fn test_keywords_in_literals_and_identifiers_are_ignored() {
        assert!(validate("SELECT * FROM orders WHERE notes = 'please delete; drop'").is_accepted());
        assert!(validate("SELECT \"update\" FROM audit").is_accepted());
        assert!(validate("SELECT updated_at FROM orders").is_accepted());
    }

    #[test]
    fn test_comments_are_rejected() {
        assert_eq!(
            rejected("SELECT * FROM orders -- harmless?"),
            RejectionReason::CommentDetected
        );
        assert_eq!(
            rejected("SELECT * FROM orders /* x */"),
            RejectionReason::CommentDetected
        );
        assert_eq!(
            rejected("/* hidden */ SELECT 1").code(),
            "comment_detected"
        );
    }

    #[test]
    fn test_comment_smuggled_statement_is_rejected() {
        assert_eq!(
            rejected("SELECT 1; /* */ DROP TABLE orders"),
            RejectionReason::MultipleStatements
        );
    }

    #[test]
    fn test_backslash_does_not_escape_a_quote() {
        assert_eq!(
            rejected(r"SELECT 'a\'; SELECT 1; --'"),
            RejectionReason::MultipleStatements
        );
        assert_eq!(
            rejected(r"SELECT 'a\'; SELECT name AS leaked FROM secrets; --'"),
            RejectionReason::MultipleStatements
        );
        assert!(validate(r"SELECT 'C:\temp\' AS path").is_accepted());
    }

    #[test]
    fn test_unterminated_literal_is_rejected() {
        assert_eq!(
            rejected("SELECT * FROM t WHERE a = 'x; DROP TABLE t"),
            RejectionReason::UnterminatedLiteral
        );
    }

    #[test]
    fn test_empty_is_rejected() {
        assert_eq!(rejected("   "), RejectionReason::Empty);
        assert_eq!(rejected(";"), RejectionReason::Empty);
    }

    #[test]
    fn test_reason_text_names_the_problem() {
        let reason = rejected("SELECT 1; DELETE FROM orders");
        assert!(reason.to_string().contains("single SQL statement"));
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["code"], "multiple_statements");
    }
}
