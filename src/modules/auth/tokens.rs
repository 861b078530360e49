use rand::Rng;
use std::sync::Arc;

use super::error::GateError;
use super::roles::RoleSet;
use super::store::{InvitationToken, RecordStore, StoreError};
use crate::modules::utils::logging::log_invitation_event;
use crate::modules::utils::time::get_current_timestamp;
use crate::{DEFAULT_CODE_LENGTH, MAX_CODE_ATTEMPTS, MAX_CODE_LENGTH};

const CODE_ALPHABET: &[u8] = b"0123456789abcdef";

/// Where a token stands at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Issued,
    Consumed,
    Expired,
}

/// Random lower-case hex code of the given length
pub fn random_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Issues and redeems invitation codes.
///
/// Expiry is evaluated lazily against the check time; nothing sweeps tokens in the
/// background. Consumed and expired tokens stay in the store until `purge_inactive`.
pub struct InvitationTokenStore {
    records: Arc<dyn RecordStore>,
    code_length: usize,
    max_attempts: u32,
}

impl InvitationTokenStore {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self::with_settings(records, DEFAULT_CODE_LENGTH, MAX_CODE_ATTEMPTS)
    }

    /// Code length is clamped to `1..=MAX_CODE_LENGTH`, attempts to at least one
    pub fn with_settings(records: Arc<dyn RecordStore>, code_length: usize, max_attempts: u32) -> Self {
        Self {
            records,
            code_length: code_length.clamp(1, MAX_CODE_LENGTH),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn code_length(&self) -> usize {
        self.code_length
    }

    /// Issue a code granting `roles` until `expires_at` (Unix seconds)
    pub fn generate(&self, roles: &RoleSet, expires_at: u64) -> Result<String, GateError> {
        let length = self.code_length;
        self.generate_with(roles, expires_at, || random_code(length))
    }

    /// Issue a code drawn from `next_code`, drawing again while the code is taken
    pub fn generate_with(
        &self,
        roles: &RoleSet,
        expires_at: u64,
        mut next_code: impl FnMut() -> String,
    ) -> Result<String, GateError> {
        if roles.is_empty() {
            return Err(GateError::EmptyRoleSet);
        }

        let created_at = get_current_timestamp();
        for attempt in 1..=self.max_attempts {
            let code = next_code();
            let token = InvitationToken {
                code: code.clone(),
                roles: roles.clone(),
                expires_at,
                used: false,
                created_at,
            };
            if self.records.insert_token(token)? {
                log_invitation_event(
                    "generate",
                    &code,
                    true,
                    Some(&format!("roles={}, expires_at={}", roles, expires_at)),
                );
                return Ok(code);
            }
            log::debug!("Invitation code collision on attempt {}", attempt);
        }

        log_invitation_event("generate", "", false, Some("code space exhausted"));
        Err(GateError::CodeSpaceExhausted(self.max_attempts))
    }

    /// Redeem `code` now; see `validate_and_consume_at`
    pub fn validate_and_consume(&self, code: &str) -> Result<Option<RoleSet>, StoreError> {
        self.validate_and_consume_at(code, get_current_timestamp())
    }

    /// Redeem `code` if it exists, is unused and expires strictly after `now`, returning
    /// the roles it grants.
    ///
    /// The used flag only moves through the store's compare-and-set, so concurrent
    /// redemptions of one code yield exactly one success. Expiry and roles never change
    /// after issue, which makes reading them ahead of the swap safe; the roles come from
    /// that read, so a purge right after the swap cannot lose them.
    pub fn validate_and_consume_at(&self, code: &str, now: u64) -> Result<Option<RoleSet>, StoreError> {
        let token = match self.records.get_token(code)? {
            Some(token) => token,
            None => {
                log_invitation_event("consume", code, false, Some("unknown code"));
                return Ok(None);
            }
        };

        if !token.is_redeemable(now) {
            let reason = if token.used { "already used" } else { "expired" };
            log_invitation_event("consume", code, false, Some(reason));
            return Ok(None);
        }

        if self.records.compare_and_set_used(code, false, true)? {
            log_invitation_event("consume", code, true, None);
            Ok(Some(token.roles))
        } else {
            log_invitation_event("consume", code, false, Some("lost redemption race"));
            Ok(None)
        }
    }

    /// Roles carried by `code`, without consuming it
    pub fn role_of(&self, code: &str) -> Result<Option<RoleSet>, StoreError> {
        Ok(self.records.get_token(code)?.map(|token| token.roles))
    }

    pub fn state_at(&self, code: &str, now: u64) -> Result<Option<TokenState>, StoreError> {
        Ok(self.records.get_token(code)?.map(|token| {
            if token.used {
                TokenState::Consumed
            } else if token.expires_at <= now {
                TokenState::Expired
            } else {
                TokenState::Issued
            }
        }))
    }

    /// Remove consumed tokens and tokens expired at `now`
    pub fn purge_inactive(&self, now: u64) -> Result<usize, StoreError> {
        let removed = self.records.retain_tokens(&|token| token.is_redeemable(now))?;
        log::info!("Purged {} inactive invitation codes", removed);
        Ok(removed)
    }
}
