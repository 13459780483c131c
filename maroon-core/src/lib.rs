//! # Maroon Core
//!
//! Core library for Maroon, which keeps short-lived AWS credentials for named
//! profiles and wires them into the AWS CLI and SDKs.
//!
//! This crate provides:
//! - Domain types for profiles and credentials
//! - A JSON-backed profile store with atomic whole-file replacement
//! - A credential resolver that reuses cached credentials until they near expiry
//! - A client for the credential-issuing API
//! - Comment-preserving updates of the AWS `credentials` and `config` files
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use maroon_core::{ApiClient, CredentialResolver, ProfileName, ProfileStore, Secret};
//!
//! async fn credentials_for(name: &str, token: &str) -> Result<(), maroon_core::MaroonError> {
//!     let store = ProfileStore::open()?;
//!     let client = ApiClient::new(maroon_core::DEFAULT_API_URL.parse().unwrap(), Secret::new(token));
//!     let resolver = CredentialResolver::new(client);
//!     let resolved = resolver
//!         .resolve(&store, &ProfileName::parse(name)?, chrono::Utc::now())
//!         .await?;
//!     println!("{}", resolved.credentials.access_key_id());
//!     Ok(())
//! }
//! ```

pub mod atomic;
pub mod aws_files;
pub mod error;
pub mod ini;
pub mod issuer;
pub mod model;
pub mod profile_store;
pub mod refresh;
pub mod secret;

// Re-export commonly used types at crate root
pub use model::{
    AccountId,
    Configuration,
    Credentials,
    ProcessCredentials,
    Profile,
    ProfileName,
    Region,
    RoleName,
};

pub use error::{
    IssueError,
    MaroonError,
    ParseError,
};

pub use secret::Secret;

pub use atomic::{
    Committed,
    FileReplacer,
};

pub use profile_store::ProfileStore;

pub use issuer::{
    AccessType,
    ApiClient,
    AssumeRoleRequest,
    ConsoleUrlRequest,
    IssueCredentials,
    DEFAULT_API_URL,
};

pub use refresh::{
    CredentialResolver,
    Origin,
    Resolved,
    needs_refresh,
};

pub use aws_files::{
    AwsConfigFile,
    AwsCredentialsFile,
};
