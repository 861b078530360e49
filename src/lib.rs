// First, declare the modules folder itself
mod modules;

// Re-export everything from modules for easier access
pub use modules::{auth, config, security, utils, validation};

// Re-export commonly used types
pub use modules::auth::{
    CredentialWorkflow, GateError, InvitationTokenStore, RecordStore, Role, RoleSet, StoreError,
};
pub use modules::config::GateConfig;
pub use modules::validation::{
    EmailFormatValidator, PasswordPolicyEvaluator, UsernameValidator, ValidationVerdict,
};

// Constants
pub const STORE_FILE: &str = "credential_store.json";
pub const LOG_FILE: &str = "credential_gate.log";
pub const DEFAULT_CODE_LENGTH: usize = 4;
pub const MAX_CODE_LENGTH: usize = 10;
pub const MAX_CODE_ATTEMPTS: u32 = 32;
pub const DEFAULT_INVITATION_TTL: u64 = 86400;
pub const DEFAULT_HASH_ITERATIONS: u32 = 100_000;

// Type aliases
pub type HmacSha256 = hmac::Hmac<sha2::Sha256>;
