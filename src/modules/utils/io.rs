use std::io::{self, BufRead, Write};

/// Print `label` and read one trimmed line from stdin
pub fn prompt(label: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", label)?;
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().to_string())
}

/// Syntactic email check: one `@`, a non-empty local part and a dotted
/// domain, no whitespace
pub fn is_valid_email(email: &str) -> bool {
    if email.contains(char::is_whitespace) {
        return false;
    }

    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .map(|(host, _)| !host.is_empty())
                    .unwrap_or(false)
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_ordinary_addresses() {
        for email in [
            "jonas@natours.io",
            "lead.guide@natours.co.uk",
            "sophie+tours@example.com",
        ] {
            assert!(is_valid_email(email), "{}", email);
        }
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        for email in [
            "",
            "jonas",
            "jonas@natours",
            "jonas@.io",
            "jonas@natours.",
            "@natours.io",
            "jonas@@natours.io",
            "jo nas@natours.io",
        ] {
            assert!(!is_valid_email(email), "{}", email);
        }
    }
}
