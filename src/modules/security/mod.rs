pub mod hashing;

pub use hashing::{derive_password_hash, generate_random_salt, PasswordHasher};
