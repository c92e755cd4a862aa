//! Bearer tokens for authenticated API requests.
//!
//! Google APIs accept either a pre-minted OAuth access token or a service
//! account key, optionally impersonating a user through domain-wide
//! delegation. Service account tokens are minted and refreshed by
//! `gcp_auth`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use tracing::debug;
use veneer_core::{AdapterOptions, Result, SourceError, VeneerError};

/// Read-only access to sheets, including ones shared through Drive.
pub const SHEETS_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets.readonly",
    "https://www.googleapis.com/auth/drive.readonly",
];

#[async_trait]
pub trait TokenSource: Send + Sync + fmt::Debug {
    async fn bearer(&self) -> Result<String>;
}

/// A token minted elsewhere.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(..)")
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn bearer(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Tokens for a service account key.
pub struct ServiceAccount {
    account: CustomServiceAccount,
    subject: Option<String>,
    scopes: Vec<String>,
}

impl ServiceAccount {
    /// Parse a service account key in Google's JSON format.
    pub fn from_json(info: &str, subject: Option<&str>, scopes: &[&str]) -> Result<Self> {
        let mut account = CustomServiceAccount::from_json(info).map_err(|e| {
            VeneerError::InvalidArgument(format!("invalid service account info: {}", e))
        })?;
        if let Some(subject) = subject {
            account = account.with_subject(subject.to_string());
        }
        Ok(Self {
            account,
            subject: subject.map(str::to_string),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("subject", &self.subject)
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[async_trait]
impl TokenSource for ServiceAccount {
    async fn bearer(&self) -> Result<String> {
        let scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        let token = self
            .account
            .token(&scopes)
            .await
            .map_err(|e| SourceError::new("auth", None, format!("token request failed: {}", e)))?;
        debug!("Obtained service account token, subject={:?}", self.subject);
        Ok(token.as_str().to_string())
    }
}

/// Credentials named by adapter options, `None` for anonymous access.
///
/// `service_account_info` (key JSON) with an optional `subject` wins over
/// `access_token`.
pub fn from_options(
    options: &AdapterOptions,
    scopes: &[&str],
) -> Result<Option<Arc<dyn TokenSource>>> {
    let subject = options.get("subject");
    if let Some(info) = options.get("service_account_info") {
        let account = ServiceAccount::from_json(info, subject, scopes)?;
        return Ok(Some(Arc::new(account)));
    }
    if subject.is_some() {
        return Err(VeneerError::InvalidArgument(
            "subject requires service_account_info".to_string(),
        ));
    }
    Ok(options
        .get("access_token")
        .map(|token| Arc::new(StaticToken::new(token)) as Arc<dyn TokenSource>))
}
