pub mod error;
pub mod password;
pub mod roles;
pub mod store;
pub mod tokens;
pub mod workflow;

// Re-export the main types and functions
pub use error::GateError;
pub use password::{generate_one_time_password, read_password};
pub use roles::{Role, RoleSet};
pub use store::{
    InvitationToken, JsonFileStore, MemoryStore, RecordStore, RekeyOutcome, StoreError, UserRecord,
};
pub use tokens::{InvitationTokenStore, TokenState};
pub use workflow::{CredentialWorkflow, LoginOutcome, RegistrationCheck};
