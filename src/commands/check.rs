//! Check command: run the safety guard on a statement

use crate::guard::{self, ValidationVerdict};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub input: String,
    #[serde(flatten)]
    pub verdict: ValidationVerdict,
}

pub fn cmd_check(sql: &str) -> CheckResult {
    CheckResult {
        input: sql.to_string(),
        verdict: guard::validate(sql),
    }
}

/// Print guard verdict to console
pub fn print_check(result: &CheckResult) {
    match &result.verdict {
        ValidationVerdict::Accepted { sql } => {
            println!("✓ Accepted");
            println!("  {}", sql);
        }
        ValidationVerdict::Rejected { reason } => {
            println!("✗ Rejected ({})", reason.code());
            println!("  {}", reason);
        }
    }
}

/// Exit status for scripts: 0 accepted, 2 rejected
pub fn check_exit_code(result: &CheckResult) -> i32 {
    match &result.verdict {
        ValidationVerdict::Accepted { .. } => 0,
        ValidationVerdict::Rejected { .. } => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_reports_verdict() {
        let ok = cmd_check("SELECT name FROM customers;");
        assert!(ok.verdict.is_accepted());
        assert_eq!(check_exit_code(&ok), 0);

        let blocked = cmd_check("DROP TABLE customers");
        assert_eq!(check_exit_code(&blocked), 2);
        let json = serde_json::to_value(&blocked).unwrap();
        assert_eq!(json["verdict"], "rejected");
        assert_eq!(json["reason"]["code"], "not_read_only");
        assert_eq!(json["input"], "DROP TABLE customers");
    }
}
