use chrono::Duration;

use super::OutgoingEmail;
use crate::utils::time::format_duration;

const SIGNATURE: &str = "Best regards,\nThe Natours Team";

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// HTML alternative of a plain-text body: one paragraph per blank-line
/// separated block, links made clickable
pub fn render_html(body: &str) -> String {
    let paragraphs: Vec<String> = body
        .split("\n\n")
        .map(|block| {
            let lines: Vec<String> = block
                .lines()
                .map(|line| {
                    let line = escape_html(line.trim());
                    if line.starts_with("http://") || line.starts_with("https://") {
                        format!("<a href=\"{0}\">{0}</a>", line)
                    } else {
                        line
                    }
                })
                .collect();
            format!("<p>{}</p>", lines.join("<br>"))
        })
        .collect();

    format!(
        "<!DOCTYPE html><html><body>{}</body></html>",
        paragraphs.join("")
    )
}

/// First word of a display name, used in greetings
pub fn first_name(name: &str) -> &str {
    name.split_whitespace().next().unwrap_or("there")
}

/// Welcome message sent after sign-up
pub fn welcome_email(to: &str, name: &str, url: &str) -> OutgoingEmail {
    let body = format!(
        "Hi {},\n\n\
        Welcome to Natours, we're glad to have you!\n\n\
        Upload a profile photo and start exploring tours here:\n\n\
        {}\n\n\
        If you need any help with booking your next tour, just reply to this email.\n\n\
        {}",
        first_name(name),
        url,
        SIGNATURE
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: "Welcome to Natours".to_string(),
        html: Some(render_html(&body)),
        body,
    }
}

/// Message carrying the reset link. `reset_url` embeds the plaintext secret.
pub fn password_reset_email(to: &str, name: &str, reset_url: &str, ttl: Duration) -> OutgoingEmail {
    let validity = format_duration(ttl.num_seconds().max(0) as u64);
    let body = format!(
        "Hi {},\n\n\
        Forgot your password? Submit a request with your new password and \
        password confirmation to:\n\n\
        {}\n\n\
        This link is valid for {}.\n\n\
        If you didn't forget your password, please ignore this email.\n\n\
        {}",
        first_name(name),
        reset_url,
        validity,
        SIGNATURE
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: format!("Your password reset token (valid for {})", validity),
        html: Some(render_html(&body)),
        body,
    }
}
