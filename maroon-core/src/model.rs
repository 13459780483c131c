//! Domain model types for Maroon.
//!
//! This module defines the core types used throughout Maroon:
//! - [`ProfileName`], [`AccountId`], [`RoleName`], [`Region`] - validated identifiers
//! - [`Credentials`] - temporary access key / secret / session token with an expiry
//! - [`Profile`] - role parameters plus optionally cached credentials
//! - [`Configuration`] - the persisted mapping from profile name to profile
//! - [`ProcessCredentials`] - the `credential_process` output document

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::MaroonError;
use crate::secret::Secret;

/// Implements the shared plumbing of a string newtype whose only constructor
/// is its validating `parse`.
macro_rules! validated_string {
    ($name:ident) => {
        impl $name {
            /// Get the value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = MaroonError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = MaroonError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

/// Name of a Maroon profile (e.g., "dev-admin").
///
/// Profile names are 1 to 64 characters of ASCII letters, digits and `-`.
///
/// # Examples
///
/// ```
/// use maroon_core::ProfileName;
///
/// assert!(ProfileName::parse("dev-admin").is_ok());
/// assert!(ProfileName::parse("dev admin").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProfileName(String);

impl ProfileName {
    /// Validate and wrap a profile name.
    pub fn parse(name: impl Into<String>) -> Result<Self, MaroonError> {
        let name = name.into();
        if name.is_empty() || name.len() > 64 {
            return Err(MaroonError::invalid(
                "profile name",
                name,
                "must be 1 to 64 characters",
            ));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(MaroonError::invalid(
                "profile name",
                name,
                "only alphanumeric characters and '-' are allowed",
            ));
        }
        Ok(Self(name))
    }
}

validated_string!(ProfileName);

/// AWS account identifier: exactly 12 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Validate and wrap an account identifier.
    pub fn parse(id: impl Into<String>) -> Result<Self, MaroonError> {
        let id = id.into();
        if id.len() != 12 || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(MaroonError::invalid(
                "account ID",
                id,
                "does not match AWS account ID format (12 digits)",
            ));
        }
        Ok(Self(id))
    }
}

validated_string!(AccountId);

/// Name of the IAM role to assume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleName(String);

impl RoleName {
    const EXTRA_CHARS: &'static str = "_+=,.@-";

    /// Validate and wrap a role name.
    pub fn parse(name: impl Into<String>) -> Result<Self, MaroonError> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.len() <= 64
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || Self::EXTRA_CHARS.contains(c));
        if !valid {
            return Err(MaroonError::invalid(
                "role name",
                name,
                "does not match AWS role name format",
            ));
        }
        Ok(Self(name))
    }
}

validated_string!(RoleName);

/// AWS region name (e.g., "us-east-1", "us-gov-west-1").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Region(String);

impl Region {
    /// Validate and wrap a region name.
    pub fn parse(region: impl Into<String>) -> Result<Self, MaroonError> {
        let region = region.into();
        let parts: Vec<&str> = region.split('-').collect();
        let well_formed = parts.len() >= 3
            && parts.iter().all(|p| {
                !p.is_empty()
                    && p.chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            })
            && parts
                .last()
                .is_some_and(|p| p.chars().all(|c| c.is_ascii_digit()));
        if !well_formed {
            return Err(MaroonError::invalid(
                "region",
                region,
                "is not a valid AWS region",
            ));
        }
        Ok(Self(region))
    }
}

validated_string!(Region);

/// Temporary AWS credentials.
///
/// Issued credentials are never edited field by field; a refresh replaces the
/// whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: Secret,
    session_token: Secret,
    expiration: DateTime<Utc>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expiration: DateTime<Utc>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: Secret::new(secret_access_key),
            session_token: Secret::new(session_token),
            expiration,
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &Secret {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> &Secret {
        &self.session_token
    }

    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    /// Time left until expiry; negative once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expiration - now
    }

    /// Whether every field carries a value and the expiry is a real instant.
    ///
    /// Zero-valued credentials (empty strings or an expiry at or before the
    /// Unix epoch) mean "never fetched".
    pub fn is_populated(&self) -> bool {
        !self.access_key_id.is_empty()
            && !self.secret_access_key.is_empty()
            && !self.session_token.is_empty()
            && self.expiration.timestamp() > 0
    }
}

/// On-disk shape of cached credentials, tolerant of missing and zero values.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCredentials {
    #[serde(default, alias = "AccessKeyId")]
    access_key_id: Option<String>,
    #[serde(default, alias = "SecretAccessKey")]
    secret_access_key: Option<String>,
    #[serde(default, alias = "SessionToken")]
    session_token: Option<String>,
    #[serde(default, alias = "Expiration")]
    expiration: Option<DateTime<Utc>>,
}

impl StoredCredentials {
    fn into_credentials(self) -> Option<Credentials> {
        let credentials = Credentials::new(
            self.access_key_id?,
            self.secret_access_key?,
            self.session_token?,
            self.expiration?,
        );
        credentials.is_populated().then_some(credentials)
    }
}

fn cached_credentials<'de, D>(deserializer: D) -> Result<Option<Credentials>, D::Error>
where
    D: Deserializer<'de>,
{
    let stored = Option::<StoredCredentials>::deserialize(deserializer)?;
    Ok(stored.and_then(StoredCredentials::into_credentials))
}

/// A configured profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Account that owns the role.
    pub account_id: AccountId,

    /// Role assumed when fetching credentials.
    pub role_to_assume: RoleName,

    /// Default region written next to the profile's `credential_process`.
    pub region: Region,

    /// Last issued credentials; `None` until the first fetch.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "cached_credentials"
    )]
    pub credentials: Option<Credentials>,
}

impl Profile {
    /// Create a profile without cached credentials.
    pub fn new(account_id: AccountId, role_to_assume: RoleName, region: Region) -> Self {
        Self {
            account_id,
            role_to_assume,
            region,
            credentials: None,
        }
    }

    /// ARN of the role this profile assumes.
    pub fn role_arn(&self) -> String {
        format!(
            "arn:aws:iam::{}:role/{}",
            self.account_id, self.role_to_assume
        )
    }
}

/// The persisted mapping from profile name to profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(
        rename = "profiles",
        alias = "Profiles",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    profiles: BTreeMap<ProfileName, Profile>,
}

impl Configuration {
    pub fn get(&self, name: &ProfileName) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &ProfileName) -> bool {
        self.profiles.contains_key(name)
    }

    /// Insert a new profile; an existing entry is never overwritten.
    pub fn add(&mut self, name: ProfileName, profile: Profile) -> Result<(), MaroonError> {
        if self.contains(&name) {
            return Err(MaroonError::AlreadyExists {
                profile: name.into(),
            });
        }
        self.profiles.insert(name, profile);
        Ok(())
    }

    /// Remove a profile, returning it if it was present.
    pub fn remove(&mut self, name: &ProfileName) -> Option<Profile> {
        self.profiles.remove(name)
    }

    /// Replace the cached credentials of an existing profile.
    ///
    /// Zero-valued credentials are rejected; they would load back as absent.
    pub fn set_credentials(
        &mut self,
        name: &ProfileName,
        credentials: Credentials,
    ) -> Result<(), MaroonError> {
        if !credentials.is_populated() {
            return Err(MaroonError::invalid(
                "credentials",
                credentials.expiration().to_rfc3339(),
                "must have non-empty fields and a non-zero expiration",
            ));
        }
        let profile = self
            .profiles
            .get_mut(name)
            .ok_or_else(|| MaroonError::NotFound {
                profile: name.to_string(),
            })?;
        profile.credentials = Some(credentials);
        Ok(())
    }

    /// Iterate over profiles in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&ProfileName, &Profile)> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Output document of a `credential_process` command.
///
/// AWS SDKs and the AWS CLI read this JSON from the command's stdout.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessCredentials<'a> {
    version: u8,
    access_key_id: &'a str,
    secret_access_key: &'a str,
    session_token: &'a str,
    expiration: DateTime<Utc>,
}

impl<'a> From<&'a Credentials> for ProcessCredentials<'a> {
    fn from(credentials: &'a Credentials) -> Self {
        Self {
            version: 1,
            access_key_id: credentials.access_key_id(),
            secret_access_key: credentials.secret_access_key().expose(),
            session_token: credentials.session_token().expose(),
            expiration: credentials.expiration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn expiry() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap()
    }

    fn test_profile() -> Profile {
        Profile::new(
            AccountId::parse("123456789012").unwrap(),
            RoleName::parse("Admin").unwrap(),
            Region::parse("us-east-1").unwrap(),
        )
    }

    #[test]
    fn test_profile_name_validation() {
        assert!(ProfileName::parse("dev-admin-01").is_ok());
        assert!(ProfileName::parse("a".repeat(64)).is_ok());
        assert!(ProfileName::parse("").is_err());
        assert!(ProfileName::parse("a".repeat(65)).is_err());
        assert!(ProfileName::parse("dev_admin").is_err());
        assert!(ProfileName::parse("dev admin").is_err());
    }

    #[test]
    fn test_account_id_validation() {
        assert!(AccountId::parse("123456789012").is_ok());
        assert!(AccountId::parse("12345678901").is_err());
        assert!(AccountId::parse("1234567890123").is_err());
        assert!(AccountId::parse("12345678901a").is_err());
    }

    #[test]
    fn test_role_name_validation() {
        assert!(RoleName::parse("Admin").is_ok());
        assert!(RoleName::parse("ops_role+x=y,z.w@q-1").is_ok());
        assert!(RoleName::parse("").is_err());
        assert!(RoleName::parse("r".repeat(65)).is_err());
        assert!(RoleName::parse("role/name").is_err());
    }

    #[test]
    fn test_region_validation() {
        assert!(Region::parse("us-east-1").is_ok());
        assert!(Region::parse("ap-southeast-2").is_ok());
        assert!(Region::parse("us-gov-west-1").is_ok());
        assert!(Region::parse("us-east").is_err());
        assert!(Region::parse("US-EAST-1").is_err());
        assert!(Region::parse("us--1").is_err());
        assert!(Region::parse("us-east-x").is_err());
    }

    #[test]
    fn test_invalid_input_error() {
        let err = AccountId::parse("42").unwrap_err();
        assert!(matches!(
            err,
            MaroonError::InvalidInput {
                field: "account ID",
                ..
            }
        ));
    }

    #[test]
    fn test_role_arn() {
        assert_eq!(test_profile().role_arn(), "arn:aws:iam::123456789012:role/Admin");
    }

    #[test]
    fn test_profile_without_credentials_omits_field() {
        let json = serde_json::to_value(test_profile()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "accountId": "123456789012",
                "roleToAssume": "Admin",
                "region": "us-east-1"
            })
        );
    }

    #[test]
    fn test_credentials_serialized_camel_case() {
        let mut profile = test_profile();
        profile.credentials = Some(Credentials::new("AKIA", "secret", "token", expiry()));

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(
            json["credentials"],
            serde_json::json!({
                "accessKeyId": "AKIA",
                "secretAccessKey": "secret",
                "sessionToken": "token",
                "expiration": "2030-01-02T03:04:05Z"
            })
        );
    }

    #[test]
    fn test_zero_credentials_load_as_absent() {
        let json = r#"{
            "Profiles": {
                "dev": {
                    "accountId": "123456789012",
                    "roleToAssume": "Admin",
                    "region": "us-east-1",
                    "credentials": {
                        "AccessKeyId": null,
                        "SecretAccessKey": null,
                        "SessionToken": null,
                        "Expiration": null
                    }
                },
                "prod": {
                    "accountId": "210987654321",
                    "roleToAssume": "ReadOnly",
                    "region": "eu-west-1",
                    "credentials": {
                        "AccessKeyId": "",
                        "SecretAccessKey": "",
                        "SessionToken": "",
                        "Expiration": "0001-01-01T00:00:00Z"
                    }
                }
            }
        }"#;

        let config: Configuration = serde_json::from_str(json).unwrap();
        assert_eq!(config.len(), 2);
        assert!(config.iter().all(|(_, p)| p.credentials.is_none()));
    }

    #[test]
    fn test_legacy_pascal_case_credentials_load() {
        let json = r#"{
            "accountId": "123456789012",
            "roleToAssume": "Admin",
            "region": "us-east-1",
            "credentials": {
                "AccessKeyId": "AKIA",
                "SecretAccessKey": "secret",
                "SessionToken": "token",
                "Expiration": "2030-01-02T03:04:05Z"
            }
        }"#;

        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(
            profile.credentials,
            Some(Credentials::new("AKIA", "secret", "token", expiry()))
        );
    }

    #[test]
    fn test_invalid_stored_account_id_rejected() {
        let json = r#"{"accountId": "42", "roleToAssume": "Admin", "region": "us-east-1"}"#;
        assert!(serde_json::from_str::<Profile>(json).is_err());
    }

    #[test]
    fn test_configuration_add_rejects_duplicate() {
        let mut config = Configuration::default();
        let name = ProfileName::parse("dev").unwrap();
        config.add(name.clone(), test_profile()).unwrap();

        let mut other = test_profile();
        other.region = Region::parse("eu-west-1").unwrap();
        let result = config.add(name.clone(), other);

        assert!(matches!(result, Err(MaroonError::AlreadyExists { .. })));
        assert_eq!(config.get(&name), Some(&test_profile()));
    }

    #[test]
    fn test_set_credentials_unknown_profile() {
        let mut config = Configuration::default();
        let result = config.set_credentials(
            &ProfileName::parse("ghost").unwrap(),
            Credentials::new("AKIA", "secret", "token", expiry()),
        );
        assert!(matches!(result, Err(MaroonError::NotFound { .. })));
    }

    #[test]
    fn test_set_credentials_rejects_zero_values() {
        let name = ProfileName::parse("dev").unwrap();
        let mut config = Configuration::default();
        config.add(name.clone(), test_profile()).unwrap();

        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        for credentials in [
            Credentials::new("AKIA", "secret", "token", epoch),
            Credentials::new("", "secret", "token", expiry()),
        ] {
            let result = config.set_credentials(&name, credentials);
            assert!(matches!(result, Err(MaroonError::InvalidInput { .. })));
        }
        assert_eq!(config.get(&name).unwrap().credentials, None);
    }

    #[test]
    fn test_process_credentials_output() {
        let credentials = Credentials::new("AKIA", "secret", "token", expiry());
        let output = serde_json::to_string(&ProcessCredentials::from(&credentials)).unwrap();
        assert_eq!(
            output,
            r#"{"Version":1,"AccessKeyId":"AKIA","SecretAccessKey":"secret","SessionToken":"token","Expiration":"2030-01-02T03:04:05Z"}"#
        );
    }
}
