//! Credentials from environment variables.
//!
//! For credential id `aws_credentials` the provider reads
//! `AWS_CREDENTIALS_ACCESS_KEY_ID` / `AWS_CREDENTIALS_SECRET_ACCESS_KEY`, and
//! falls back to the standard `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.

use async_trait::async_trait;

use operators::{AwsCredentials, CredentialsError, CredentialsProvider};

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct EnvCredentials {
    lookup: Lookup,
}

impl EnvCredentials {
    /// Read from the process environment.
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Read from an arbitrary variable source.
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }

    fn pair(&self, prefix: &str) -> (Option<String>, Option<String>) {
        (
            (self.lookup)(&format!("{prefix}_ACCESS_KEY_ID")),
            (self.lookup)(&format!("{prefix}_SECRET_ACCESS_KEY")),
        )
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialsProvider for EnvCredentials {
    async fn resolve(&self, credential_id: &str) -> Result<AwsCredentials, CredentialsError> {
        let prefix: String = credential_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();

        let (access_key, secret_key) = match self.pair(&prefix) {
            (None, None) => self.pair("AWS"),
            found => found,
        };

        match (access_key, secret_key) {
            (None, None) => Err(CredentialsError::NotFound(credential_id.to_string())),
            (Some(a), Some(s)) if !a.is_empty() && !s.is_empty() => Ok(AwsCredentials::new(a, s)),
            (Some(_), Some(_)) => Err(CredentialsError::Invalid {
                id: credential_id.to_string(),
                reason: "access key and secret key must not be empty".into(),
            }),
            (Some(_), None) => Err(CredentialsError::Invalid {
                id: credential_id.to_string(),
                reason: "secret key is missing".into(),
            }),
            (None, Some(_)) => Err(CredentialsError::Invalid {
                id: credential_id.to_string(),
                reason: "access key is missing".into(),
            }),
        }
    }
}
