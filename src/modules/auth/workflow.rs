use serde::Serialize;
use std::sync::Arc;

use super::error::GateError;
use super::password::generate_one_time_password;
use super::roles::{Role, RoleSet};
use super::store::{normalize_username, RecordStore, RekeyOutcome, UserRecord};
use super::tokens::InvitationTokenStore;
use crate::modules::config::GateConfig;
use crate::modules::security::PasswordHasher;
use crate::modules::utils::logging::log_auth_event;
use crate::modules::utils::time::get_current_timestamp;
use crate::modules::validation::{
    EmailFormatValidator, PasswordPolicyEvaluator, UsernameValidator, ValidationVerdict,
};

/// Per-field verdicts of a registration form
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RegistrationCheck {
    pub username: ValidationVerdict,
    pub password: ValidationVerdict,
    pub email: ValidationVerdict,
}

impl RegistrationCheck {
    pub fn is_ok(&self) -> bool {
        self.username.ok && self.password.ok && self.email.ok
    }

    /// Fold into one verdict: failing messages joined by newlines in username,
    /// password, email order; the index is the first failing field's
    pub fn aggregate(&self) -> ValidationVerdict {
        let failures: Vec<&ValidationVerdict> = [&self.username, &self.password, &self.email]
            .into_iter()
            .filter(|verdict| !verdict.ok)
            .collect();

        match failures.first() {
            None => ValidationVerdict::pass(),
            Some(first) => ValidationVerdict {
                ok: false,
                message: failures
                    .iter()
                    .map(|verdict| verdict.message.as_str())
                    .collect::<Vec<_>>()
                    .join("\n"),
                error_index: first.error_index,
            },
        }
    }
}

/// Result of a successful login
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub username: String,
    pub roles: RoleSet,
    pub password_reset_pending: bool,
}

/// Front door of the crate: composes the field validators, the invitation store and
/// the user records into the operations an account screen needs.
pub struct CredentialWorkflow {
    records: Arc<dyn RecordStore>,
    tokens: InvitationTokenStore,
    hasher: PasswordHasher,
}

impl CredentialWorkflow {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self::from_config(records, &GateConfig::default())
    }

    pub fn from_config(records: Arc<dyn RecordStore>, config: &GateConfig) -> Self {
        let tokens = InvitationTokenStore::with_settings(
            Arc::clone(&records),
            config.invitation_code_length,
            config.max_code_attempts,
        );
        Self {
            records,
            tokens,
            hasher: PasswordHasher::new(config.password_hash_iterations),
        }
    }

    pub fn tokens(&self) -> &InvitationTokenStore {
        &self.tokens
    }

    pub fn check_fields(username: &str, password: &str, email: &str) -> RegistrationCheck {
        RegistrationCheck {
            username: UsernameValidator::validate(username),
            password: PasswordPolicyEvaluator::evaluate(password),
            email: EmailFormatValidator::validate(email),
        }
    }

    /// Whether the three fields are acceptable for a new account
    pub fn check_registration(username: &str, password: &str, email: &str) -> ValidationVerdict {
        Self::check_fields(username, password, email).aggregate()
    }

    pub fn generate_invitation(&self, roles: &RoleSet, expires_at: u64) -> Result<String, GateError> {
        self.tokens.generate(roles, expires_at)
    }

    /// Consume `code` and return the roles it grants
    pub fn redeem_invitation(&self, code: &str) -> Result<RoleSet, GateError> {
        self.tokens
            .validate_and_consume(code)?
            .ok_or(GateError::InvalidOrExpiredCode)
    }

    pub fn generate_one_time_password() -> String {
        generate_one_time_password()
    }

    fn new_user(&self, username: &str, password: &str, email: &str, roles: RoleSet) -> UserRecord {
        UserRecord {
            username: username.to_string(),
            username_normalized: normalize_username(username),
            password: self.hasher.hash(password),
            email: email.to_string(),
            roles,
            password_reset_pending: false,
            created_at: get_current_timestamp(),
        }
    }

    fn require_user(&self, username: &str) -> Result<UserRecord, GateError> {
        self.records
            .get_user_by_username(username)?
            .ok_or_else(|| GateError::UserNotFound(username.to_string()))
    }

    /// Create an account from an invitation.
    ///
    /// The username is checked before the code is consumed, so a taken name leaves the
    /// invitation usable.
    pub fn register(
        &self,
        username: &str,
        password: &str,
        email: &str,
        code: &str,
    ) -> Result<UserRecord, GateError> {
        let verdict = Self::check_registration(username, password, email);
        if !verdict.ok {
            log_auth_event("register", username, false, Some("malformed input"));
            return Err(GateError::MalformedInput(verdict));
        }

        if self.records.get_user_by_username(username)?.is_some() {
            log_auth_event("register", username, false, Some("username taken"));
            return Err(GateError::DuplicateUsername(username.to_string()));
        }

        let roles = match self.redeem_invitation(code) {
            Ok(roles) => roles,
            Err(e) => {
                log_auth_event("register", username, false, Some(&e.to_string()));
                return Err(e);
            }
        };

        let user = self.new_user(username, password, email, roles);
        if !self.records.insert_user(user.clone())? {
            log::warn!("Username claimed concurrently after its invitation was consumed");
            log_auth_event("register", username, false, Some("username taken"));
            return Err(GateError::DuplicateUsername(username.to_string()));
        }

        log_auth_event("register", username, true, Some(&format!("roles={}", user.roles)));
        Ok(user)
    }

    /// Create the first account, which becomes the administrator without an invitation
    pub fn register_initial_admin(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<UserRecord, GateError> {
        if !self.records.list_users()?.is_empty() {
            return Err(GateError::AdminAlreadyInitialized);
        }

        let verdict = Self::check_registration(username, password, email);
        if !verdict.ok {
            return Err(GateError::MalformedInput(verdict));
        }

        let user = self.new_user(username, password, email, RoleSet::single(Role::Admin));
        // The store re-checks emptiness under its lock
        if !self.records.insert_first_user(user.clone())? {
            log_auth_event("setup_admin", username, false, Some("users already exist"));
            return Err(GateError::AdminAlreadyInitialized);
        }

        log_auth_event("setup_admin", username, true, None);
        Ok(user)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, GateError> {
        let user = match self.records.get_user_by_username(username)? {
            Some(user) if self.hasher.verify(password, &user.password) => user,
            _ => {
                log_auth_event("login", username, false, None);
                return Err(GateError::InvalidCredentials);
            }
        };

        log_auth_event("login", username, true, None);
        Ok(LoginOutcome {
            username: user.username,
            roles: user.roles,
            password_reset_pending: user.password_reset_pending,
        })
    }

    /// Replace a user's password with a one-time password and flag the account so the
    /// next login asks for a new one. Returns the one-time password for the admin.
    pub fn admin_reset_password(&self, username: &str) -> Result<String, GateError> {
        let mut user = self.require_user(username)?;
        let otp = generate_one_time_password();
        user.password = self.hasher.hash(&otp);
        user.password_reset_pending = true;
        self.records.upsert_user(user)?;

        log_auth_event("admin_reset_password", username, true, None);
        Ok(otp)
    }

    /// Set a new password (policy-checked on the plaintext) and clear any pending reset
    pub fn change_password(&self, username: &str, new_password: &str) -> Result<(), GateError> {
        let verdict = PasswordPolicyEvaluator::evaluate(new_password);
        if !verdict.ok {
            return Err(GateError::MalformedInput(verdict));
        }

        let mut user = self.require_user(username)?;
        user.password = self.hasher.hash(new_password);
        user.password_reset_pending = false;
        self.records.upsert_user(user)?;

        log_auth_event("change_password", username, true, None);
        Ok(())
    }

    pub fn update_email(&self, username: &str, email: &str) -> Result<(), GateError> {
        let verdict = EmailFormatValidator::validate(email);
        if !verdict.ok {
            return Err(GateError::MalformedInput(verdict));
        }

        let mut user = self.require_user(username)?;
        user.email = email.to_string();
        self.records.upsert_user(user)?;
        Ok(())
    }

    /// Rewrite an account's username, password and email in one step.
    ///
    /// All three fields go through the registration checks. Roles and the creation time
    /// carry over; a new password clears any pending reset.
    pub fn update_profile(
        &self,
        old_username: &str,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<UserRecord, GateError> {
        let verdict = Self::check_registration(username, password, email);
        if !verdict.ok {
            return Err(GateError::MalformedInput(verdict));
        }

        let current = self.require_user(old_username)?;
        let user = UserRecord {
            roles: current.roles,
            created_at: current.created_at,
            ..self.new_user(username, password, email, RoleSet::new())
        };

        match self.records.rekey_user(old_username, user.clone())? {
            RekeyOutcome::Updated => {
                log_auth_event(
                    "update_profile",
                    username,
                    true,
                    Some(&format!("was {}", current.username_normalized)),
                );
                Ok(user)
            }
            RekeyOutcome::UsernameTaken => {
                log_auth_event("update_profile", username, false, Some("username taken"));
                Err(GateError::DuplicateUsername(username.to_string()))
            }
            RekeyOutcome::NotFound => Err(GateError::UserNotFound(old_username.to_string())),
        }
    }

    pub fn set_roles(&self, username: &str, roles: RoleSet) -> Result<(), GateError> {
        if roles.is_empty() {
            return Err(GateError::EmptyRoleSet);
        }

        let mut user = self.require_user(username)?;
        user.roles = roles;
        log::info!("Roles of {} set to {}", user.username_normalized, user.roles);
        self.records.upsert_user(user)?;
        Ok(())
    }

    pub fn delete_user(&self, username: &str) -> Result<bool, GateError> {
        let removed = self.records.delete_user(username)?;
        log_auth_event("delete_user", username, removed, None);
        Ok(removed)
    }

    pub fn list_users(&self) -> Result<Vec<UserRecord>, GateError> {
        Ok(self.records.list_users()?)
    }
}
