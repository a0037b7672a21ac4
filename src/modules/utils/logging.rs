use env_logger::{Builder, Env, Target};
use log::{info, warn};
use std::fs::OpenOptions;
use std::path::Path;

/// Initialize logging. Level comes from `RUST_LOG` (default `info`); output
/// goes to stderr, or is appended to `log_file` when one is given.
pub fn initialize_logging(log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_secs().format_module_path(true);

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;
    info!("Logging initialized");
    Ok(())
}

/// Mask an account identifier for logs, keeping two characters at each end
pub fn format_sensitive(text: &str) -> String {
    let count = text.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let head: String = text.chars().take(2).collect();
    let tail: String = text.chars().skip(count - 2).collect();
    format!("{}***{}", head, tail)
}

fn auth_event_line(event: &str, user: &str, success: bool, details: Option<&str>) -> String {
    let mut line = format!(
        "auth event={} user={} outcome={}",
        event,
        format_sensitive(user),
        if success { "ok" } else { "failed" }
    );
    if let Some(details) = details {
        line.push_str(&format!(" details={:?}", details));
    }
    line
}

/// Log an authentication event. Failures go out at `warn`. `user` is masked;
/// never pass secrets or tokens in `details`.
pub fn log_auth_event(event: &str, user: &str, success: bool, details: Option<&str>) {
    let line = auth_event_line(event, user, success, details);
    if success {
        info!("{}", line);
    } else {
        warn!("{}", line);
    }
}
