use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::io;

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub const ONE_TIME_PASSWORD_LENGTH: usize = 8;
pub const ONE_TIME_PASSWORD_SPECIAL: char = '!';

fn pick(rng: &mut impl Rng, alphabet: &[u8]) -> char {
    alphabet[rng.gen_range(0..alphabet.len())] as char
}

/// Generate an 8-character one-time password for administrator resets.
///
/// One character from each required class is placed first, the rest are drawn from the
/// alphanumeric alphabet, and the result is shuffled. Draws come from the OS generator.
pub fn generate_one_time_password() -> String {
    let mut rng = OsRng;
    let mut chars = vec![
        pick(&mut rng, UPPERCASE),
        pick(&mut rng, LOWERCASE),
        pick(&mut rng, DIGITS),
        ONE_TIME_PASSWORD_SPECIAL,
    ];
    while chars.len() < ONE_TIME_PASSWORD_LENGTH {
        chars.push(pick(&mut rng, ALPHANUMERIC));
    }
    chars.shuffle(&mut rng);
    chars.into_iter().collect()
}

/// Helper function to read a password without echoing it
pub fn read_password() -> io::Result<String> {
    rpassword::read_password()
}
