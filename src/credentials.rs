//! Credentials and credential providers consumed by the signer.

use crate::{Error, Result};

/// An access key pair, with an optional session token for temporary
/// credentials.
///
/// Held by value and cloned per signing attempt; the secret is deliberately
/// excluded from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl Credentials {
    /// Creates credentials from an access key id and secret.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attaches a session token (temporary credentials).
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// The access key id.
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// The secret access key.
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    /// The session token, if these are temporary credentials.
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Rejects blank or whitespace-only key material.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.access_key_id.trim().is_empty() || self.secret_access_key.trim().is_empty() {
            return Err(Error::Auth(
                "credentials are missing an access key id or secret".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .finish()
    }
}

/// Source of credentials for signing.
///
/// Resolved once per attempt so rotating providers always sign with fresh
/// material. A provider failure is an auth error and is never retried.
pub trait ProvideCredentials: Send + Sync {
    /// Returns credentials, or an auth error when none are available.
    fn provide_credentials(&self) -> Result<Credentials>;
}

/// A provider that always returns the same credentials.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    /// Wraps fixed credentials in a provider.
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl ProvideCredentials for StaticCredentials {
    fn provide_credentials(&self) -> Result<Credentials> {
        self.credentials.validate()?;
        Ok(self.credentials.clone())
    }
}

/// Reads credentials from the conventional environment variables
/// (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN`).
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl ProvideCredentials for EnvCredentials {
    fn provide_credentials(&self) -> Result<Credentials> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| Error::Auth("AWS_ACCESS_KEY_ID is not set".to_string()))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| Error::Auth("AWS_SECRET_ACCESS_KEY is not set".to_string()))?;

        let mut credentials = Credentials::new(access_key_id, secret_access_key);
        if let Ok(token) = std::env::var("AWS_SESSION_TOKEN") {
            credentials = credentials.with_session_token(token);
        }
        credentials.validate()?;
        Ok(credentials)
    }
}
