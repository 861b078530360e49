use super::verdict::ValidationVerdict;

pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_LOCAL_PART_LENGTH: usize = 64;

pub const EMAIL_EMPTY: &str = "The email cannot be empty";
pub const EMAIL_TOO_LONG: &str = "The email exceeds the maximum length of 254 characters";
pub const EMAIL_INVALID_FORMAT: &str = "Invalid email format";
pub const EMAIL_LOCAL_PART_TOO_LONG: &str = "The local part exceeds 64 characters";
pub const EMAIL_DOMAIN_NEEDS_DOT: &str = "The domain must contain at least one dot";
pub const EMAIL_DOMAIN_LEADING_DOT: &str = "The domain cannot start with a dot";
pub const EMAIL_DOMAIN_TRAILING_DOT: &str = "The domain cannot end with a dot";

fn is_local_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '.' | '-')
}

fn is_domain_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-')
}

/// Format checker for email addresses: a whole-string shape check
/// (`local@domain` over restricted alphabets) followed by structural checks.
pub struct EmailFormatValidator;

impl EmailFormatValidator {
    pub fn validate(input: &str) -> ValidationVerdict {
        if input.is_empty() {
            return ValidationVerdict::fail_at(EMAIL_EMPTY, 0);
        }

        let length = input.chars().count();
        if length > MAX_EMAIL_LENGTH {
            return ValidationVerdict::fail_at(EMAIL_TOO_LONG, MAX_EMAIL_LENGTH);
        }

        let (local, domain) = match Self::split_address(input) {
            Some(parts) => parts,
            None => return ValidationVerdict::fail_at(EMAIL_INVALID_FORMAT, 0),
        };

        if local.len() > MAX_LOCAL_PART_LENGTH {
            return ValidationVerdict::fail_at(EMAIL_LOCAL_PART_TOO_LONG, MAX_LOCAL_PART_LENGTH);
        }

        // Past the shape check the address is ASCII, so byte offsets are character offsets
        let domain_start = local.len() + 1;
        if !domain.contains('.') {
            return ValidationVerdict::fail_at(EMAIL_DOMAIN_NEEDS_DOT, domain_start);
        }
        if domain.starts_with('.') {
            return ValidationVerdict::fail_at(EMAIL_DOMAIN_LEADING_DOT, domain_start);
        }
        if domain.ends_with('.') {
            return ValidationVerdict::fail_at(EMAIL_DOMAIN_TRAILING_DOT, input.len() - 1);
        }

        ValidationVerdict::pass()
    }

    /// Split on the single `@` when both halves are non-empty and use only their alphabet
    fn split_address(input: &str) -> Option<(&str, &str)> {
        let (local, domain) = input.split_once('@')?;
        if local.is_empty() || domain.is_empty() {
            return None;
        }
        if !local.chars().all(is_local_char) || !domain.chars().all(is_domain_char) {
            return None;
        }
        Some((local, domain))
    }
}
