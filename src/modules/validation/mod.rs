pub mod email;
pub mod password;
pub mod username;
pub mod verdict;

pub use email::EmailFormatValidator;
pub use password::{PasswordConditions, PasswordPolicyEvaluator};
pub use username::UsernameValidator;
pub use verdict::ValidationVerdict;
