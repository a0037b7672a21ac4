use chrono::Utc;
use clap::{Arg, ArgMatches, Command};
use log::info;
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use tour_auth::auth::password::read_password;
use tour_auth::auth::{
    AuthConfig, AuthError, AuthService, CredentialRepository, GateOutcome, JsonFileStore,
    NewAccount, Principal, RecordScope, RequestCredentials, Role,
};
use tour_auth::email::{ConsoleMailer, Mailer, SmtpMailer, SmtpSettings};
use tour_auth::utils::io::prompt;
use tour_auth::utils::logging::initialize_logging;
use tour_auth::utils::time::format_timestamp;
use tour_auth::CREDENTIALS_FILE;

type Service = AuthService<JsonFileStore, Box<dyn Mailer>>;

fn cli() -> Command {
    Command::new("tour-auth")
        .about("Manage tour-booking accounts, sessions and password resets")
        .subcommand_required(true)
        .arg(
            Arg::new("store")
                .long("store")
                .help("Path to the credential store file")
                .value_name("FILE")
                .default_value(CREDENTIALS_FILE),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .help("Append logs to this file instead of stderr")
                .value_name("FILE"),
        )
        .subcommand(
            Command::new("signup")
                .about("Create a new account")
                .arg(Arg::new("name").long("name").required(true))
                .arg(Arg::new("email").long("email").required(true))
                .arg(
                    Arg::new("role")
                        .long("role")
                        .help("user, guide, lead-guide or admin")
                        .default_value("user"),
                )
                .arg(
                    Arg::new("welcome-url")
                        .long("welcome-url")
                        .default_value("http://127.0.0.1:3000/me"),
                ),
        )
        .subcommand(
            Command::new("login")
                .about("Log in and print a session token")
                .arg(Arg::new("email").long("email").required(true)),
        )
        .subcommand(
            Command::new("whoami")
                .about("Check a session token")
                .arg(Arg::new("token").long("token").required(true)),
        )
        .subcommand(
            Command::new("change-password")
                .about("Change the password of the account behind a token")
                .arg(Arg::new("token").long("token").required(true)),
        )
        .subcommand(
            Command::new("forgot-password")
                .about("Send a password reset link")
                .arg(Arg::new("email").long("email").required(true))
                .arg(
                    Arg::new("reset-url")
                        .long("reset-url")
                        .default_value("http://127.0.0.1:3000/api/v1/users/resetPassword"),
                ),
        )
        .subcommand(
            Command::new("reset-password")
                .about("Set a new password using a reset token")
                .arg(
                    Arg::new("secret")
                        .long("secret")
                        .help("Reset token from the email, or - to type it in")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("deactivate")
                .about("Deactivate the account behind a token")
                .arg(Arg::new("token").long("token").required(true)),
        )
}

fn terminal(e: io::Error) -> AuthError {
    AuthError::Terminal(e.to_string())
}

fn ask_password(label: &str) -> Result<String, AuthError> {
    print!("{}", label);
    io::stdout().flush().map_err(terminal)?;
    read_password().map_err(terminal)
}

fn ask_new_password() -> Result<(String, String), AuthError> {
    let password = ask_password("New password: ")?;
    let confirmation = ask_password("Confirm new password: ")?;
    Ok((password, confirmation))
}

fn arg<'a>(matches: &'a ArgMatches, name: &str) -> &'a str {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .unwrap_or_default()
}

fn build_mailer() -> Result<Box<dyn Mailer>, AuthError> {
    match SmtpSettings::from_env()? {
        Some(settings) => {
            info!("Delivering email through {}", settings.host);
            Ok(Box::new(SmtpMailer::new(settings)?))
        }
        None => Ok(Box::new(ConsoleMailer)),
    }
}

fn require_principal(service: &Service, token: &str) -> Result<Principal, AuthError> {
    let header = format!("Bearer {}", token.trim());
    service
        .authenticate(&RequestCredentials::from_authorization(&header), Utc::now())?
        .into_result()
}

fn print_session(token: &str, cookie: &str) {
    println!("Token: {}", token);
    println!("Set-Cookie: {}", cookie);
}

fn run(matches: &ArgMatches) -> Result<(), AuthError> {
    let config = AuthConfig::from_env()?;
    let store = JsonFileStore::open(arg(matches, "store"))?;
    let service: Service = AuthService::new(&config, store, build_mailer()?);

    match matches.subcommand() {
        Some(("signup", sub)) => {
            let password = ask_password("Password: ")?;
            let password_confirm = ask_password("Confirm password: ")?;
            let account = NewAccount {
                name: arg(sub, "name").to_string(),
                email: arg(sub, "email").to_string(),
                password,
                password_confirm,
                role: arg(sub, "role").parse::<Role>()?,
            };
            let session = service.signup(&account, arg(sub, "welcome-url"), Utc::now())?;
            println!("Account created ({})", session.principal.role);
            print_session(&session.token, &session.set_cookie);
        }
        Some(("login", sub)) => {
            let password = ask_password("Password: ")?;
            let session = service.login(arg(sub, "email"), &password, Utc::now())?;
            print_session(&session.token, &session.set_cookie);
        }
        Some(("whoami", sub)) => {
            let header = format!("Bearer {}", arg(sub, "token").trim());
            let outcome =
                service.authenticate(&RequestCredentials::from_authorization(&header), Utc::now())?;
            match outcome {
                GateOutcome::Verified(principal) => {
                    let record = service
                        .repository()
                        .load(&principal.identity, RecordScope::ActiveOnly)?
                        .ok_or(AuthError::Unauthenticated)?;
                    println!("{} <{}> ({})", record.name, record.email, record.role);
                    if let Some(epoch) = record.credential_epoch {
                        println!("Password last changed: {}", format_timestamp(epoch));
                    }
                }
                GateOutcome::Rejected(reason) => return Err(reason.into_error()),
            }
        }
        Some(("change-password", sub)) => {
            let principal = require_principal(&service, arg(sub, "token"))?;
            let current = ask_password("Current password: ")?;
            let (password, confirmation) = ask_new_password()?;
            let session = service.change_password(
                &principal.identity,
                &current,
                &password,
                &confirmation,
                Utc::now(),
            )?;
            println!("Password updated. Earlier sessions are no longer valid.");
            print_session(&session.token, &session.set_cookie);
        }
        Some(("forgot-password", sub)) => {
            match service.forgot_password(arg(sub, "email"), arg(sub, "reset-url"), Utc::now()) {
                Ok(_) | Err(AuthError::NoSuchAccount) => {
                    println!("If an account exists with this email, a reset link has been sent.");
                }
                Err(e) => return Err(e),
            }
        }
        Some(("reset-password", sub)) => {
            let secret = match arg(sub, "secret") {
                "-" => prompt("Reset token: ").map_err(terminal)?,
                value => value.to_string(),
            };
            let (password, confirmation) = ask_new_password()?;
            let session = service.reset_password(&secret, &password, &confirmation, Utc::now())?;
            println!("Password reset. You are now logged in.");
            print_session(&session.token, &session.set_cookie);
        }
        Some(("deactivate", sub)) => {
            let principal = require_principal(&service, arg(sub, "token"))?;
            service.deactivate(&principal.identity)?;
            println!("Account deactivated.");
            println!("Set-Cookie: {}", service.logout(Utc::now()));
        }
        _ => unreachable!("clap requires a subcommand"),
    }

    Ok(())
}

fn main() -> ExitCode {
    let matches = cli().get_matches();

    let log_file = matches.get_one::<String>("log-file").map(Path::new);
    if let Err(e) = initialize_logging(log_file) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }

    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::debug!("Command failed: {}", e);
            eprintln!("Error ({}): {}", e.status_code(), e.public_message());
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[test]
    fn test_parse_signup() {
        let matches = cli()
            .try_get_matches_from([
                "tour-auth",
                "--store",
                "/tmp/users.json",
                "signup",
                "--name",
                "Lourdes Browning",
                "--email",
                "loulou@example.com",
                "--role",
                "guide",
            ])
            .unwrap();
        assert_eq!(arg(&matches, "store"), "/tmp/users.json");
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "signup");
        assert_eq!(arg(sub, "role").parse::<Role>().unwrap(), Role::Guide);
    }

    #[test]
    fn test_terminal_errors_keep_their_own_kind() {
        let err = terminal(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"));
        assert_eq!(err, AuthError::Terminal("stdin closed".into()));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(cli().try_get_matches_from(["tour-auth"]).is_err());
    }
}
