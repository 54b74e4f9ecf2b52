//! Credentials handed to the driven CLI.

use std::fmt;

use harbor_core::HarborError;
use secrecy::{ExposeSecret, SecretString};

/// Environment variable holding an Anthropic API key.
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

/// Environment variable holding a Claude Code OAuth token.
pub const CLAUDE_CODE_OAUTH_TOKEN: &str = "CLAUDE_CODE_OAUTH_TOKEN";

/// API key and/or OAuth token. Redacted in `Debug`.
#[derive(Clone, Default)]
pub struct Credentials {
    api_key: Option<SecretString>,
    oauth_token: Option<SecretString>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("oauth_token", &self.oauth_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn non_empty(value: String) -> Option<SecretString> {
    if value.trim().is_empty() {
        None
    } else {
        Some(SecretString::from(value))
    }
}

impl Credentials {
    /// No credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key. Empty strings are ignored.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = non_empty(key.into());
        self
    }

    /// Set the OAuth token. Empty strings are ignored.
    #[must_use]
    pub fn with_oauth_token(mut self, token: impl Into<String>) -> Self {
        self.oauth_token = non_empty(token.into());
        self
    }

    /// Read `ANTHROPIC_API_KEY` and `CLAUDE_CODE_OAUTH_TOKEN`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            api_key: lookup(ANTHROPIC_API_KEY).and_then(non_empty),
            oauth_token: lookup(CLAUDE_CODE_OAUTH_TOKEN).and_then(non_empty),
        }
    }

    /// Fill whichever credential is missing from `fallback`.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            api_key: self.api_key.or(fallback.api_key),
            oauth_token: self.oauth_token.or(fallback.oauth_token),
        }
    }

    /// Whether an API key is set.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Whether an OAuth token is set.
    pub fn has_oauth_token(&self) -> bool {
        self.oauth_token.is_some()
    }

    /// Fail with an authentication error when neither credential is set.
    pub fn ensure_present(&self) -> Result<(), HarborError> {
        if self.api_key.is_none() && self.oauth_token.is_none() {
            return Err(HarborError::Authentication(format!(
                "set {ANTHROPIC_API_KEY} or {CLAUDE_CODE_OAUTH_TOKEN}, or pass credentials explicitly"
            )));
        }
        Ok(())
    }

    /// Environment entries for the driven process.
    pub(crate) fn env(&self) -> Vec<(String, String)> {
        let mut env = Vec::with_capacity(2);
        if let Some(key) = &self.api_key {
            env.push((ANTHROPIC_API_KEY.to_owned(), key.expose_secret().to_owned()));
        }
        if let Some(token) = &self.oauth_token {
            env.push((CLAUDE_CODE_OAUTH_TOKEN.to_owned(), token.expose_secret().to_owned()));
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn missing_both_is_authentication_error() {
        assert_matches!(
            Credentials::new().ensure_present(),
            Err(HarborError::Authentication(msg)) if msg.contains(ANTHROPIC_API_KEY)
        );
    }

    #[test]
    fn either_credential_is_enough() {
        assert!(Credentials::new().with_api_key("sk-1").ensure_present().is_ok());
        assert!(Credentials::new().with_oauth_token("oat-1").ensure_present().is_ok());
    }

    #[test]
    fn blank_values_are_ignored() {
        let creds = Credentials::from_lookup(|name| match name {
            ANTHROPIC_API_KEY => Some("  ".into()),
            CLAUDE_CODE_OAUTH_TOKEN => Some("oat".into()),
            _ => None,
        });
        assert!(!creds.has_api_key());
        assert!(creds.has_oauth_token());
    }

    #[test]
    fn explicit_values_win_over_fallback() {
        let explicit = Credentials::new().with_api_key("explicit");
        let env = Credentials::new().with_api_key("env").with_oauth_token("token");
        let merged = explicit.or(env);
        let vars = merged.env();
        assert_eq!(vars[0], (ANTHROPIC_API_KEY.to_owned(), "explicit".to_owned()));
        assert_eq!(vars[1], (CLAUDE_CODE_OAUTH_TOKEN.to_owned(), "token".to_owned()));
    }

    #[test]
    fn debug_redacts_secrets() {
        let creds = Credentials::new().with_api_key("sk-secret");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
