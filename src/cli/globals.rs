use secrecy::SecretString;

/// Settings shared by every action.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    /// Secret the token codec is keyed with. Never logged.
    pub token_secret: SecretString,
    pub session_ttl_seconds: u64,
    pub token_ttl_seconds: u64,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(token_secret: SecretString) -> Self {
        Self {
            token_secret,
            session_ttl_seconds: 900,
            token_ttl_seconds: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new(SecretString::from("swordfish".to_string()));
        assert_eq!(args.token_secret.expose_secret(), "swordfish");
        assert_eq!(args.session_ttl_seconds, 900);
        assert_eq!(args.token_ttl_seconds, 300);
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let args = GlobalArgs::new(SecretString::from("swordfish".to_string()));
        assert!(!format!("{args:?}").contains("swordfish"));
    }
}
