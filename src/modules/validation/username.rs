use super::verdict::ValidationVerdict;

pub const MIN_USERNAME_LENGTH: usize = 4;
pub const MAX_USERNAME_LENGTH: usize = 16;

pub const USERNAME_EMPTY: &str = "The username is empty";
pub const USERNAME_BAD_START: &str = "A username must start with a letter (A-Z or a-z)";
pub const USERNAME_AFTER_SEPARATOR: &str =
    "A username character after a period, minus, or underscore must be alphanumeric (A-Z, a-z, 0-9)";
pub const USERNAME_INVALID_CHARACTER: &str =
    "A username contains an invalid character; only A-Z, a-z, 0-9, '.', '-' and '_' are allowed";
pub const USERNAME_TOO_SHORT: &str = "The username is too short; it must have at least 4 characters";
pub const USERNAME_TOO_LONG: &str = "The username is too long; it must have no more than 16 characters";

/// Scanner state after consuming a character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    AfterAlphanumeric,
    AfterSeparator,
}

fn is_separator(c: char) -> bool {
    matches!(c, '.' | '-' | '_')
}

/// Finite-state recognizer for usernames.
///
/// Rules are applied in order and the first failure wins:
/// empty input, a leading letter, the separator automaton, then the length window.
pub struct UsernameValidator;

impl UsernameValidator {
    pub fn validate(input: &str) -> ValidationVerdict {
        let mut chars = input.chars();

        let first = match chars.next() {
            Some(c) => c,
            None => return ValidationVerdict::fail_at(USERNAME_EMPTY, 0),
        };
        if !first.is_ascii_alphabetic() {
            return ValidationVerdict::fail_at(USERNAME_BAD_START, 0);
        }

        let mut state = ScanState::AfterAlphanumeric;
        let mut length = 1;

        for (index, c) in chars.enumerate().map(|(i, c)| (i + 1, c)) {
            state = match (state, c) {
                (_, c) if c.is_ascii_alphanumeric() => ScanState::AfterAlphanumeric,
                (ScanState::AfterAlphanumeric, c) if is_separator(c) => ScanState::AfterSeparator,
                (ScanState::AfterSeparator, _) => {
                    return ValidationVerdict::fail_at(USERNAME_AFTER_SEPARATOR, index)
                }
                (ScanState::AfterAlphanumeric, _) => {
                    return ValidationVerdict::fail_at(USERNAME_INVALID_CHARACTER, index)
                }
            };
            length += 1;
        }

        // A trailing separator still owes an alphanumeric
        if state == ScanState::AfterSeparator {
            return ValidationVerdict::fail_at(USERNAME_AFTER_SEPARATOR, length);
        }

        if length < MIN_USERNAME_LENGTH {
            return ValidationVerdict::fail_at(USERNAME_TOO_SHORT, length);
        }
        if length > MAX_USERNAME_LENGTH {
            return ValidationVerdict::fail_at(USERNAME_TOO_LONG, length);
        }

        ValidationVerdict::pass()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_username() {
        let verdict = UsernameValidator::validate("");
        assert!(!verdict.ok);
        assert!(verdict.message.contains("empty"));
        assert_eq!(verdict.error_index, Some(0));
    }

    #[test]
    fn test_first_character_must_be_letter() {
        for input in ["1abc", ".Abc", "_abcd", "-abcd"] {
            let verdict = UsernameValidator::validate(input);
            assert_eq!(verdict.message, USERNAME_BAD_START, "input {:?}", input);
            assert_eq!(verdict.error_index, Some(0));
        }
    }

    #[test]
    fn test_valid_usernames() {
        for input in ["Abcde", "Abc123", "Ab.cd-12_ef", "A1.b2-C3_d4E5f6", "A3-c", "abcd"] {
            let verdict = UsernameValidator::validate(input);
            assert!(verdict.ok, "input {:?} rejected: {}", input, verdict);
            assert_eq!(verdict.message, "");
            assert_eq!(verdict.error_index, None);
        }
    }

    #[test]
    fn test_length_boundaries() {
        let short = UsernameValidator::validate("Ab3");
        assert_eq!(short.message, USERNAME_TOO_SHORT);
        assert_eq!(short.error_index, Some(3));

        let long = UsernameValidator::validate("Abcdefghijklmnopq");
        assert_eq!(long.message, USERNAME_TOO_LONG);
        assert_eq!(long.error_index, Some(17));

        assert!(UsernameValidator::validate("Abcdefghijklmnop").ok);
        assert!(UsernameValidator::validate("Abcd").ok);
    }

    #[test]
    fn test_every_out_of_window_length_is_rejected() {
        for length in (1..MIN_USERNAME_LENGTH).chain(MAX_USERNAME_LENGTH + 1..40) {
            let input: String = std::iter::once('A')
                .chain(std::iter::repeat('b').take(length - 1))
                .collect();
            let verdict = UsernameValidator::validate(&input);
            assert!(!verdict.ok);
            assert!(
                verdict.message == USERNAME_TOO_SHORT || verdict.message == USERNAME_TOO_LONG,
                "length {} gave {:?}",
                length,
                verdict.message
            );
            assert_eq!(verdict.error_index, Some(length));
        }
    }

    #[test]
    fn test_character_after_separator() {
        let verdict = UsernameValidator::validate("Ab.#123");
        assert_eq!(verdict.message, USERNAME_AFTER_SEPARATOR);
        assert_eq!(verdict.error_index, Some(3));

        let adjacent = UsernameValidator::validate("Ab._cd");
        assert_eq!(adjacent.message, USERNAME_AFTER_SEPARATOR);
        assert_eq!(adjacent.error_index, Some(3));
    }

    #[test]
    fn test_trailing_separator() {
        let verdict = UsernameValidator::validate("Abcd_");
        assert_eq!(verdict.message, USERNAME_AFTER_SEPARATOR);
        assert_eq!(verdict.error_index, Some(5));
    }

    #[test]
    fn test_invalid_character_index() {
        let verdict = UsernameValidator::validate("Abc^de");
        assert_eq!(verdict.message, USERNAME_INVALID_CHARACTER);
        assert_eq!(verdict.error_index, Some(3));

        // Scanning stops before the length check
        let verdict = UsernameValidator::validate("Abcdefghijklmnopqrst!");
        assert_eq!(verdict.error_index, Some(20));
    }

    #[test]
    fn test_first_invalid_character_is_reported() {
        let prefix = "Ab1";
        for bad in [' ', '@', '#', '!', 'é', '+', '/'] {
            for position in 0..5 {
                let mut input: String = prefix.to_string();
                input.extend(std::iter::repeat('x').take(position));
                input.push(bad);
                input.push_str("z#");
                let verdict = UsernameValidator::validate(&input);
                assert!(!verdict.ok);
                assert_eq!(verdict.error_index, Some(prefix.len() + position));
            }
        }
    }

    #[test]
    fn test_validation_is_repeatable() {
        let inputs = ["", "1abc", "Ab.#123", "Abcde", "Abcdefghijklmnopq"];
        for input in inputs {
            assert_eq!(UsernameValidator::validate(input), UsernameValidator::validate(input));
        }
        let before = UsernameValidator::validate("Abcde");
        let _ = UsernameValidator::validate("Ab^");
        assert_eq!(UsernameValidator::validate("Abcde"), before);
    }
}
