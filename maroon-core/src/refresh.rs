//! Cached credential resolution.
//!
//! [`CredentialResolver`] returns a profile's cached credentials while they
//! have more than [`REFRESH_THRESHOLD`] left, and otherwise fetches fresh ones
//! from its [`IssueCredentials`] collaborator and caches them in the
//! [`ProfileStore`].

use chrono::{DateTime, Duration, Utc};

use crate::error::MaroonError;
use crate::issuer::{AssumeRoleRequest, IssueCredentials};
use crate::model::{Credentials, ProfileName};
use crate::profile_store::ProfileStore;

/// Credentials this close to expiry are replaced.
pub const REFRESH_THRESHOLD: Duration = Duration::minutes(15);

/// Session duration requested for every fetch.
pub const SESSION_DURATION_SECS: u32 = 3600;

/// Whether `cached` must be replaced at `now`.
pub fn needs_refresh(cached: Option<&Credentials>, now: DateTime<Utc>) -> bool {
    match cached {
        Some(credentials) => credentials.remaining(now) <= REFRESH_THRESHOLD,
        None => true,
    }
}

/// Where resolved credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cached,
    Issued,
}

/// Outcome of [`CredentialResolver::resolve`].
#[derive(Debug)]
pub struct Resolved {
    pub credentials: Credentials,
    pub origin: Origin,
    /// Set when freshly issued credentials could not be written back to the
    /// store. The credentials are still usable.
    pub cache_error: Option<MaroonError>,
}

impl Resolved {
    pub fn into_credentials(self) -> Credentials {
        self.credentials
    }
}

/// Resolves usable credentials for a profile, fetching only when needed.
pub struct CredentialResolver<I: IssueCredentials> {
    issuer: I,
}

impl<I: IssueCredentials> CredentialResolver<I> {
    pub fn new(issuer: I) -> Self {
        Self { issuer }
    }

    pub fn issuer(&self) -> &I {
        &self.issuer
    }

    /// Return credentials for `name` that stay valid past the refresh threshold.
    ///
    /// A failed fetch leaves the store untouched. A failed cache write after a
    /// successful fetch is reported in [`Resolved::cache_error`].
    pub async fn resolve(
        &self,
        store: &ProfileStore,
        name: &ProfileName,
        now: DateTime<Utc>,
    ) -> Result<Resolved, MaroonError> {
        let profile = store.get(name)?;

        let usable = profile
            .credentials
            .as_ref()
            .filter(|cached| !needs_refresh(Some(*cached), now));
        if let Some(credentials) = usable {
            tracing::debug!(
                "Using cached credentials for {} (expire at {})",
                name,
                credentials.expiration()
            );
            return Ok(Resolved {
                credentials: credentials.clone(),
                origin: Origin::Cached,
                cache_error: None,
            });
        }

        tracing::debug!("Cached credentials for {} missing or expiring, fetching", name);
        let request = AssumeRoleRequest::for_profile(&profile, SESSION_DURATION_SECS);
        let credentials = self.issuer.issue(&request).await?;
        tracing::info!(
            "Issued credentials for {} (expire at {})",
            name,
            credentials.expiration()
        );

        let cache_error = store
            .update_credentials(name, credentials.clone())
            .err();
        if let Some(e) = &cache_error {
            tracing::warn!("Failed to cache credentials for {}: {}", name, e);
        }

        Ok(Resolved {
            credentials,
            origin: Origin::Issued,
            cache_error,
        })
    }
}
