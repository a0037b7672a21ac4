pub mod config;
pub mod cookie;
pub mod credentials;
pub mod errors;
pub mod gate;
pub mod password;
pub mod reset;
pub mod service;
pub mod store;
pub mod tokens;

// Re-export the main types and functions
pub use config::{AuthConfig, SigningKey};
pub use credentials::{CredentialRecord, CredentialStore, NewAccount, ResetSecretRecord, Role};
pub use errors::AuthError;
pub use gate::{restrict_to, AuthGate, GateOutcome, Principal, RejectReason, RequestCredentials};
pub use password::{validate_password, PasswordError};
pub use reset::ResetTokenManager;
pub use service::{AuthService, Session};
pub use store::{CredentialRepository, JsonFileStore, MemoryStore, RecordScope};
pub use tokens::{TokenIssuer, VerifiedToken};
