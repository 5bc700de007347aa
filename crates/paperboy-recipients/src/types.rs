use std::sync::OnceLock;

use regex::Regex;

/// Structural email check — one local part, one domain with a TLD of at
/// least two letters. Deliverability is the mail transport's problem.
pub fn validate_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    let re = EMAIL_RE.get_or_init(|| {
        // Fixed pattern; cannot fail to compile.
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
    });
    re.is_match(email)
}

/// Per-item tally of a bulk registration. Partial success is the expected
/// outcome, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub added: usize,
    pub failed: usize,
    pub failed_emails: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_addresses() {
        for email in [
            "a@x.com",
            "first.last@example.co.kr",
            "user+tag@sub.domain.org",
            "a_b%c@host.io",
        ] {
            assert!(validate_email(email), "should accept {email}");
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        for email in [
            "",
            "plain",
            "@x.com",
            "a@",
            "a@x",
            "a@x.c",
            "a b@x.com",
            "a@x_y.com",
        ] {
            assert!(!validate_email(email), "should reject {email}");
        }
    }
}
