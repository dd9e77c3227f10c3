//! Recover SQL and suggestion lists from free-form model replies

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Leading verbs that mark the start of a statement. Write verbs are
/// included so the guard sees (and rejects) them instead of a silent miss.
const STATEMENT_VERBS: &[&str] = &[
    "SELECT", "WITH", "SHOW", "EXPLAIN", "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE",
    "TRUNCATE", "REPLACE", "GRANT", "REVOKE", "RENAME", "MERGE", "PRAGMA", "ATTACH", "DETACH",
];

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)```(?:sql)?[ \t]*\r?\n?(.*?)\r?\n?```").expect("static regex"))
}

fn list_marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*•]+|\d+[.)]|[a-zA-Z][.)])\s+").expect("static regex")
    })
}

fn starts_with_verb(line: &str) -> bool {
    let upper = line.trim_start().to_uppercase();
    STATEMENT_VERBS.iter().any(|verb| {
        upper.starts_with(verb)
            && upper[verb.len()..]
                .chars()
                .next()
                .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
    })
}

/// Pull one SQL statement out of a reply.
///
/// A fenced block wins if present and the statement runs to the closing fence.
/// Otherwise it starts at the first line beginning with a SQL verb and runs to
/// the next blank line. The result always ends with a single `;`. Returns
/// `None` when nothing looks like SQL.
pub fn extract_sql(text: &str) -> Option<String> {
    let mut body = text.trim();
    let mut fenced = false;
    if let Some(inner) = fence_pattern().captures(body).and_then(|c| c.get(1)) {
        body = inner.as_str().trim();
        fenced = true;
    }
    let body = body.trim_matches('`').trim();

    let mut lines = body.lines().skip_while(|line| !starts_with_verb(line));
    let first = lines.next()?;
    let mut statement = vec![first];
    if fenced {
        statement.extend(lines);
    } else {
        statement.extend(lines.take_while(|line| !line.trim().is_empty()));
    }

    let sql = statement
        .join("\n")
        .trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string();
    if sql.is_empty() {
        return None;
    }
    Some(format!("{};", sql))
}

/// One suggestion per line, with list markers and quotes removed, deduplicated
pub fn parse_suggestions(text: &str, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .map(|line| list_marker_pattern().replace(line, "").to_string())
        .map(|line| line.trim().trim_matches('"').trim().to_string())
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .filter(|line| seen.insert(line.to_lowercase()))
        .take(max)
        .collect()
}
