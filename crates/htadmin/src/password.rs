use rand::Rng;
use rand::distr::Alphanumeric;

/// Length of passwords handed out by the admin service.
pub const GENERATED_PASSWORD_LEN: usize = 32;

/// Generates a random password of `len` characters from `[0-9a-zA-Z]`.
pub fn generate_password(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_and_alphabet() {
        for len in [0, 1, 32, 100] {
            let password = generate_password(len);
            assert_eq!(password.len(), len);
            assert!(password.bytes().all(|b| b.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_passwords_differ() {
        let a = generate_password(GENERATED_PASSWORD_LEN);
        let b = generate_password(GENERATED_PASSWORD_LEN);
        assert_ne!(a, b);
    }
}
