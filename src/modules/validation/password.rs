use super::verdict::ValidationVerdict;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Characters accepted as the special-character class
pub const SPECIAL_CHARACTERS: &str = "~`!@#$%^&*()_-+{}[]|:,.?/";

pub const PASSWORD_EMPTY: &str = "The password cannot be empty";
pub const PASSWORD_INVALID_CHARACTER: &str = "An invalid character has been found in the password";
pub const PASSWORD_CONDITIONS_UNMET: &str = "password conditions were not satisfied";

/// Character classes tracked while scanning a candidate
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PasswordConditions {
    pub upper_case: bool,
    pub lower_case: bool,
    pub numeric_digit: bool,
    pub special_character: bool,
    pub long_enough: bool,
}

impl PasswordConditions {
    /// Names of the conditions that were not met, in reporting order
    pub fn unmet(&self) -> Vec<&'static str> {
        [
            (self.upper_case, "Upper case"),
            (self.lower_case, "Lower case"),
            (self.numeric_digit, "Numeric digits"),
            (self.special_character, "Special character"),
            (self.long_enough, "Long Enough"),
        ]
        .into_iter()
        .filter(|(met, _)| !met)
        .map(|(_, name)| name)
        .collect()
    }

    pub fn all_met(&self) -> bool {
        self.unmet().is_empty()
    }
}

/// Rule-set evaluator for password strength.
///
/// Unlike the username recognizer this reports every unmet condition at once, so a user
/// can fix the password in a single pass. An invalid character still stops the scan.
pub struct PasswordPolicyEvaluator;

impl PasswordPolicyEvaluator {
    pub fn evaluate(input: &str) -> ValidationVerdict {
        match Self::scan(input) {
            Err(verdict) => verdict,
            Ok(conditions) => {
                let unmet = conditions.unmet();
                if unmet.is_empty() {
                    ValidationVerdict::pass()
                } else {
                    ValidationVerdict::fail(format!(
                        "{}; {}",
                        unmet.join(", "),
                        PASSWORD_CONDITIONS_UNMET
                    ))
                }
            }
        }
    }

    /// Classify every character, stopping at the first one outside the four classes
    pub fn scan(input: &str) -> Result<PasswordConditions, ValidationVerdict> {
        if input.is_empty() {
            return Err(ValidationVerdict::fail_at(PASSWORD_EMPTY, 0));
        }

        let mut conditions = PasswordConditions::default();
        let mut length = 0;
        for (index, c) in input.chars().enumerate() {
            if c.is_ascii_uppercase() {
                conditions.upper_case = true;
            } else if c.is_ascii_lowercase() {
                conditions.lower_case = true;
            } else if c.is_ascii_digit() {
                conditions.numeric_digit = true;
            } else if SPECIAL_CHARACTERS.contains(c) {
                conditions.special_character = true;
            } else {
                return Err(ValidationVerdict::fail_at(PASSWORD_INVALID_CHARACTER, index));
            }
            length += 1;
        }
        conditions.long_enough = length >= MIN_PASSWORD_LENGTH;

        Ok(conditions)
    }
}
