use sha2::{Digest, Sha256};

use crate::rate_limit::RateLimitKey;

const MIN_API_KEY_LEN: usize = 20;
const MAX_API_KEY_LEN: usize = 128;

// Short hex digest of the API key, used in logs and as rate limit identity
pub fn hash_api_key(api_key: &str, length: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest.chars().take(length).collect()
}

/// Format sanity check only. Whether the key is actually accepted is
/// decided by the materials database on the first query.
pub fn validate_api_key(api_key: &str) -> bool {
    (MIN_API_KEY_LEN..=MAX_API_KEY_LEN).contains(&api_key.len())
        && api_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub fn create_rate_limit_key(api_key_hash: &str, client_ip: &str) -> RateLimitKey {
    RateLimitKey::new(api_key_hash, client_ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_short_and_stable() {
        let key = "test_api_key_32_characters_long1";
        let hashed = hash_api_key(key, 12);

        assert_eq!(hashed.len(), 12);
        assert!(hashed.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hashed, hash_api_key(key, 12));
        assert_ne!(hashed, hash_api_key("another_api_key_32_characters_xx", 12));
    }

    #[test]
    fn hash_prefix_of_sha256() {
        // sha256("abc")
        assert_eq!(hash_api_key("abc", 12), "ba7816bf8f01");
    }

    #[test]
    fn key_format_check() {
        assert!(validate_api_key("abcdefghijklmnopqrstuvwxyz123456"));
        assert!(validate_api_key("test_key_32_characters_long_123"));

        assert!(!validate_api_key(""));
        assert!(!validate_api_key("short"));
        assert!(!validate_api_key("toolongandcontainsinvalidcharacters!"));
        assert!(!validate_api_key(&"a".repeat(129)));
    }

    #[test]
    fn rate_limit_key_pairs_hash_and_ip() {
        let key = create_rate_limit_key("ba7816bf8f01", "10.1.2.3");
        assert_eq!(key.api_key_hash, "ba7816bf8f01");
        assert_eq!(key.client_ip, "10.1.2.3");
    }
}
