use crate::HmacSha256;
use pbkdf2::pbkdf2;
use rand::Rng;

use crate::DEFAULT_HASH_ITERATIONS;

const SALT_LENGTH: usize = 16;
const HASH_LENGTH: usize = 32;
const SCHEME: &str = "pbkdf2";

/// Function to generate a random salt for PBKDF2
pub fn generate_random_salt() -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..SALT_LENGTH).map(|_| rng.gen()).collect()
}

/// Derive a 32-byte PBKDF2-HMAC-SHA256 digest of `password`
pub fn derive_password_hash(password: &str, salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut hash = vec![0u8; HASH_LENGTH];
    pbkdf2::<HmacSha256>(password.as_bytes(), salt, iterations, &mut hash);
    hash
}

/// Salted password hashing with a self-describing output
/// (`pbkdf2$<iterations>$<salt hex>$<hash hex>`), so the iteration count can change
/// without invalidating stored passwords.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_ITERATIONS)
    }
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn hash(&self, password: &str) -> String {
        let salt = generate_random_salt();
        let hash = derive_password_hash(password, &salt, self.iterations);
        format!(
            "{}${}${}${}",
            SCHEME,
            self.iterations,
            hex::encode(&salt),
            hex::encode(hash)
        )
    }

    /// Check `password` against a stored hash string; malformed entries never match
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let parts: Vec<&str> = stored.split('$').collect();
        if parts.len() != 4 || parts[0] != SCHEME {
            return false;
        }
        let iterations = match parts[1].parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => return false,
        };
        let (salt, expected) = match (hex::decode(parts[2]), hex::decode(parts[3])) {
            (Ok(salt), Ok(expected)) => (salt, expected),
            _ => return false,
        };

        let actual = derive_password_hash(password, &salt, iterations);
        // Compare every byte regardless of where the first mismatch sits
        actual.len() == expected.len()
            && actual
                .iter()
                .zip(expected.iter())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}
