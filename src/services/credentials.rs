use rand::distributions::Alphanumeric;
use rand::Rng;

/// bcrypt cost used for every stored credential.
pub const BCRYPT_COST: u32 = 12;

/// Random password over `[A-Za-z0-9]`, each character drawn uniformly.
pub fn generate_password(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

pub fn hash_password(password: &str, cost: u32) -> anyhow::Result<String> {
    Ok(bcrypt::hash(password, cost)?)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_has_requested_length_and_alphabet() {
        for len in [8, 10, 32] {
            let pw = generate_password(len);
            assert_eq!(pw.len(), len);
            assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
        }
        assert!(generate_password(0).is_empty());
    }

    #[test]
    fn passwords_differ_between_calls() {
        assert_ne!(generate_password(16), generate_password(16));
    }

    #[test]
    fn hash_verifies_only_the_same_password() {
        let hash = hash_password("s3cretPass", 4).unwrap();
        assert!(verify_password("s3cretPass", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cretPass", "not-a-bcrypt-hash"));
    }
}
