// Declare all modules
pub mod auth;
pub mod config;
pub mod security;
pub mod utils;
pub mod validation;

// No re-exports here as they're handled in lib.rs
