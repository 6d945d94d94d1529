// CSRF tokens for HTML forms
//
// A token is the hex HMAC-SHA256 of a per-visitor subject keyed by the
// server secret. Signed-in visitors use their user id, anonymous ones a random
// value kept in a cookie.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Random subject for visitors without a session
pub fn generate_anonymous_subject() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Token for a subject
pub fn issue_token(secret: &str, subject: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(subject.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a submitted token
pub fn verify_token(secret: &str, subject: &str, token: &str) -> bool {
    let Ok(provided) = hex::decode(token.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(subject.as_bytes());
    mac.verify_slice(&provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_verifies() {
        let token = issue_token("secret", "user:1");
        assert_eq!(token.len(), 64);
        assert!(verify_token("secret", "user:1", &token));
    }

    #[test]
    fn test_token_bound_to_subject_and_secret() {
        let token = issue_token("secret", "user:1");
        assert!(!verify_token("secret", "user:2", &token));
        assert!(!verify_token("other", "user:1", &token));
        assert!(!verify_token("secret", "user:1", "zz-not-hex"));
        assert!(!verify_token("secret", "user:1", ""));
    }

    #[test]
    fn test_anonymous_subjects_are_random() {
        let a = generate_anonymous_subject();
        let b = generate_anonymous_subject();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
