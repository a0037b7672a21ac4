// First, declare the modules folder itself
mod modules;

// Re-export everything from modules for easier access
pub use modules::{auth, email, utils};

// Re-export commonly used types
pub use modules::auth::config::AuthConfig;
pub use modules::auth::errors::AuthError;
pub use modules::auth::service::AuthService;
pub use modules::auth::store::{CredentialRepository, JsonFileStore, MemoryStore};
pub use modules::email::Mailer;

// Constants
pub const CREDENTIALS_FILE: &str = "credentials.json";
pub const SESSION_COOKIE: &str = "jwt";
pub const LOGGED_OUT_COOKIE_VALUE: &str = "loggedout";
pub const DEFAULT_HASH_COST: u32 = 12;
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 90;
pub const DEFAULT_COOKIE_TTL_DAYS: i64 = 90;
pub const EPOCH_BACKDATE_SECS: i64 = 2;
pub const RESET_SECRET_TTL_SECS: i64 = 600;
pub const MIN_PASSWORD_LENGTH: usize = 8;

// Type aliases
pub type HmacSha256 = hmac::Hmac<sha2::Sha256>;
