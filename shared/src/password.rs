use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

/// Password hashing capability handed to the user directory.
pub trait PasswordDigest: Send + Sync {
    fn hash(&self, plain: &str) -> Result<String, String>;
    fn verify(&self, plain: &str, digest: &str) -> bool;
}

/// Argon2id with the crate's default parameters, PHC-encoded output.
#[derive(Debug, Default, Clone)]
pub struct Argon2Digest;

impl PasswordDigest for Argon2Digest {
    fn hash(&self, plain: &str) -> Result<String, String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| format!("password hashing failed: {}", e))
    }

    fn verify(&self, plain: &str, digest: &str) -> bool {
        match PasswordHash::new(digest) {
            Ok(parsed) => Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!("Stored password digest is not PHC formatted: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let digest = Argon2Digest.hash("hunter22").unwrap();
        assert_ne!(digest, "hunter22");
        assert!(Argon2Digest.verify("hunter22", &digest));
        assert!(!Argon2Digest.verify("hunter23", &digest));
        assert!(!Argon2Digest.verify("hunter22", "plain-text"));
    }
}
