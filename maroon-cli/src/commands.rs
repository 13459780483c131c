//! Command implementations.
//!
//! Each command writes its user-facing output to `out`; logs go to stderr.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use maroon_core::{
    AccessType, AccountId, ApiClient, AssumeRoleRequest, AwsConfigFile, AwsCredentialsFile,
    ConsoleUrlRequest, CredentialResolver, Credentials, FileReplacer, IssueCredentials,
    IssueError, ProcessCredentials, Profile, ProfileName, ProfileStore, Region, Resolved,
    RoleName,
};
use std::io::Write;
use url::Url;

use crate::config::CliConfig;

/// Everything a command needs, built once per invocation.
pub struct App {
    config: CliConfig,
    explicit_token: Option<String>,
}

impl App {
    /// `explicit_token` comes from `--token` or `MAROON_TOKEN`; the configured
    /// `token_file` is only read once a command needs the API.
    pub fn new(config: CliConfig, explicit_token: Option<String>) -> Self {
        Self {
            config,
            explicit_token,
        }
    }

    fn store(&self) -> Result<ProfileStore> {
        let path = self.config.store_path()?;
        ProfileStore::open_at(&path)
            .with_context(|| format!("Failed to open profile store at {:?}", path))
    }

    fn replacer(&self) -> FileReplacer {
        FileReplacer::new(self.config.scratch_dir())
    }

    fn api_url(&self) -> Result<Url> {
        Url::parse(&self.config.api_url)
            .with_context(|| format!("Invalid api_url {:?}", self.config.api_url))
    }

    fn client(&self) -> Result<Option<ApiClient>> {
        let base_url = self.api_url()?;
        let token = self.config.token(self.explicit_token.as_deref())?;
        Ok(token.map(|token| ApiClient::new(base_url, token)))
    }

    async fn resolve(&self, name: &ProfileName, now: DateTime<Utc>) -> Result<Resolved> {
        let store = self.store()?;
        let resolver = CredentialResolver::new(ApiIssuer(self));
        resolver
            .resolve(&store, name, now)
            .await
            .with_context(|| format!("Failed to get credentials for profile '{}'", name))
    }
}

/// Builds the API client only once a fetch actually happens.
struct ApiIssuer<'a>(&'a App);

#[async_trait]
impl IssueCredentials for ApiIssuer<'_> {
    async fn issue(&self, request: &AssumeRoleRequest) -> Result<Credentials, IssueError> {
        let client = self
            .0
            .client()
            .map_err(|e| IssueError::RequestFailed {
                message: format!("{:#}", e),
            })?;
        match client {
            Some(client) => client.issue(request).await,
            None => Err(IssueError::RequestFailed {
                message: "no API token; pass --token or set MAROON_TOKEN".to_string(),
            }),
        }
    }
}

pub fn add_profile(
    app: &App,
    name: &ProfileName,
    account_id: AccountId,
    role: RoleName,
    region: Region,
    out: &mut impl Write,
) -> Result<()> {
    let store = app.store()?;
    store.add(name, Profile::new(account_id, role, region.clone()))?;

    let aws_config = AwsConfigFile::new(app.config.aws_config_file()?, app.replacer());
    aws_config
        .sync_profile_invocation(name, &region)
        .with_context(|| {
            format!(
                "Added profile '{}' but failed to update {:?}",
                name,
                aws_config.path()
            )
        })?;

    writeln!(out, "Added profile '{}'", name)?;
    Ok(())
}

pub fn remove_profile(app: &App, name: &ProfileName, out: &mut impl Write) -> Result<()> {
    if app.store()?.remove(name)? {
        writeln!(out, "Removed profile '{}'", name)?;
    } else {
        writeln!(out, "Profile '{}' does not exist, nothing to remove", name)?;
    }
    Ok(())
}

pub fn list_profiles(app: &App, now: DateTime<Utc>, out: &mut impl Write) -> Result<()> {
    let profiles = app.store()?.list()?;

    if profiles.is_empty() {
        writeln!(out, "No profiles configured")?;
        return Ok(());
    }

    writeln!(
        out,
        "{:<24} {:<12} {:<24} {:<16} CREDENTIALS",
        "PROFILE", "ACCOUNT", "ROLE", "REGION"
    )?;
    for (name, profile) in profiles {
        let status = match &profile.credentials {
            None => "none".to_string(),
            Some(c) if c.expiration() <= now => "expired".to_string(),
            Some(c) => format!("expires {}", c.expiration().format("%Y-%m-%dT%H:%M:%SZ")),
        };
        writeln!(
            out,
            "{:<24} {:<12} {:<24} {:<16} {}",
            name, profile.account_id, profile.role_to_assume, profile.region, status
        )?;
    }
    Ok(())
}

pub async fn print_credentials(
    app: &App,
    name: &ProfileName,
    now: DateTime<Utc>,
    out: &mut impl Write,
) -> Result<()> {
    let credentials = app.resolve(name, now).await?.into_credentials();
    let output = serde_json::to_string(&ProcessCredentials::from(&credentials))?;
    writeln!(out, "{}", output)?;
    Ok(())
}

pub async fn update_credentials(
    app: &App,
    name: &ProfileName,
    now: DateTime<Utc>,
    out: &mut impl Write,
) -> Result<()> {
    let credentials = app.resolve(name, now).await?.into_credentials();

    let aws_credentials =
        AwsCredentialsFile::new(app.config.aws_credentials_file()?, app.replacer());
    aws_credentials
        .sync_default(&credentials)
        .with_context(|| format!("Failed to update {:?}", aws_credentials.path()))?;

    writeln!(
        out,
        "Wrote credentials for '{}' to the default profile (expire at {})",
        name,
        credentials.expiration().format("%Y-%m-%dT%H:%M:%SZ")
    )?;
    Ok(())
}

pub async fn get_console_url(
    app: &App,
    account_id: AccountId,
    access_type: AccessType,
    duration_secs: u32,
    out: &mut impl Write,
) -> Result<()> {
    let request = ConsoleUrlRequest::new(account_id, access_type, duration_secs)?;
    let client = app
        .client()?
        .context("No API token; pass --token or set MAROON_TOKEN")?;

    let url = client
        .console_url(&request)
        .await
        .context("Failed to generate console URL")?;
    writeln!(out, "{}", url)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use maroon_core::MaroonError;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap()
    }

    fn test_config(root: &Path, api_url: &str) -> CliConfig {
        let scratch = root.join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        CliConfig {
            api_url: api_url.to_string(),
            store_path: Some(root.join("maroon").join("config.json")),
            aws_credentials_file: Some(root.join(".aws").join("credentials")),
            aws_config_file: Some(root.join(".aws").join("config")),
            scratch_dir: Some(scratch),
            ..Default::default()
        }
    }

    fn test_app(root: &Path, api_url: &str, token: Option<&str>) -> App {
        App::new(test_config(root, api_url), token.map(String::from))
    }

    fn name(s: &str) -> ProfileName {
        ProfileName::parse(s).unwrap()
    }

    fn add_dev(app: &App) {
        add_profile(
            app,
            &name("dev"),
            AccountId::parse("123456789012").unwrap(),
            RoleName::parse("Admin").unwrap(),
            Region::parse("us-east-1").unwrap(),
            &mut Vec::new(),
        )
        .unwrap();
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    async fn mount_assume_role(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/v1/assume-role"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessKeyId": "AKIA",
                "secretAccessKey": "secret",
                "sessionToken": "session",
                "expiration": "2030-06-01T13:00:00Z"
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn test_add_profile_writes_store_and_aws_config() {
        let temp = TempDir::new().unwrap();
        let app = test_app(temp.path(), "http://unused.invalid", None);
        let mut out = Vec::new();

        add_profile(
            &app,
            &name("dev"),
            AccountId::parse("123456789012").unwrap(),
            RoleName::parse("Admin").unwrap(),
            Region::parse("us-east-1").unwrap(),
            &mut out,
        )
        .unwrap();

        assert_eq!(output(out), "Added profile 'dev'\n");
        assert!(app.store().unwrap().get(&name("dev")).is_ok());
        assert_eq!(
            fs::read_to_string(temp.path().join(".aws").join("config")).unwrap(),
            "[profile dev]\ncredential_process = maroon credentials print -p dev\nregion = us-east-1\n"
        );
    }

    #[test]
    fn test_add_duplicate_profile_fails() {
        let temp = TempDir::new().unwrap();
        let app = test_app(temp.path(), "http://unused.invalid", None);
        add_dev(&app);

        let err = add_profile(
            &app,
            &name("dev"),
            AccountId::parse("210987654321").unwrap(),
            RoleName::parse("ReadOnly").unwrap(),
            Region::parse("eu-west-1").unwrap(),
            &mut Vec::new(),
        )
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<MaroonError>(),
            Some(MaroonError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_remove_profile_reports_outcome() {
        let temp = TempDir::new().unwrap();
        let app = test_app(temp.path(), "http://unused.invalid", None);
        add_dev(&app);

        let mut out = Vec::new();
        remove_profile(&app, &name("dev"), &mut out).unwrap();
        remove_profile(&app, &name("dev"), &mut out).unwrap();

        assert_eq!(
            output(out),
            "Removed profile 'dev'\nProfile 'dev' does not exist, nothing to remove\n"
        );
    }

    #[test]
    fn test_list_profiles() {
        let temp = TempDir::new().unwrap();
        let app = test_app(temp.path(), "http://unused.invalid", None);

        let mut out = Vec::new();
        list_profiles(&app, now(), &mut out).unwrap();
        assert_eq!(output(out), "No profiles configured\n");

        add_dev(&app);
        let mut out = Vec::new();
        list_profiles(&app, now(), &mut out).unwrap();
        let text = output(out);
        assert!(text.starts_with("PROFILE"));
        assert!(text.contains("dev"));
        assert!(text.contains("123456789012"));
        assert!(text.trim_end().ends_with("none"));
    }

    #[tokio::test]
    async fn test_print_credentials_outputs_process_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/assume-role"))
            .and(query_param("roleArn", "arn:aws:iam::123456789012:role/Admin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessKeyId": "AKIA",
                "secretAccessKey": "secret",
                "sessionToken": "session",
                "expiration": "2030-06-01T13:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let app = test_app(temp.path(), &server.uri(), Some("id-token"));
        add_dev(&app);

        let mut out = Vec::new();
        print_credentials(&app, &name("dev"), now(), &mut out).await.unwrap();

        assert_eq!(
            output(out),
            "{\"Version\":1,\"AccessKeyId\":\"AKIA\",\"SecretAccessKey\":\"secret\",\"SessionToken\":\"session\",\"Expiration\":\"2030-06-01T13:00:00Z\"}\n"
        );
        let cached = app.store().unwrap().get(&name("dev")).unwrap().credentials;
        assert!(cached.is_some());
    }

    #[tokio::test]
    async fn test_cached_credentials_need_no_token() {
        let temp = TempDir::new().unwrap();
        let app = test_app(temp.path(), "http://unused.invalid", None);
        add_dev(&app);
        app.store()
            .unwrap()
            .update_credentials(
                &name("dev"),
                Credentials::new("AKIA", "secret", "session", now() + Duration::hours(1)),
            )
            .unwrap();

        let mut out = Vec::new();
        print_credentials(&app, &name("dev"), now(), &mut out).await.unwrap();

        assert!(output(out).contains("\"AccessKeyId\":\"AKIA\""));
    }

    #[tokio::test]
    async fn test_fetch_without_token_fails() {
        let temp = TempDir::new().unwrap();
        let app = test_app(temp.path(), "http://unused.invalid", None);
        add_dev(&app);

        let result = print_credentials(&app, &name("dev"), now(), &mut Vec::new()).await;

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("no API token"));
    }

    #[tokio::test]
    async fn test_unreadable_token_file_only_fails_fetches() {
        let temp = TempDir::new().unwrap();
        let config = CliConfig {
            token_file: Some(temp.path().join("missing-token")),
            ..test_config(temp.path(), "http://unused.invalid")
        };
        let app = App::new(config, None);
        add_dev(&app);

        let mut out = Vec::new();
        list_profiles(&app, now(), &mut out).unwrap();
        assert!(output(out).contains("dev"));

        let err = print_credentials(&app, &name("dev"), now(), &mut Vec::new())
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read token"));

        remove_profile(&app, &name("dev"), &mut Vec::new()).unwrap();
    }

    #[tokio::test]
    async fn test_update_credentials_writes_default_section() {
        let server = MockServer::start().await;
        mount_assume_role(&server).await;

        let temp = TempDir::new().unwrap();
        let app = test_app(temp.path(), &server.uri(), Some("id-token"));
        add_dev(&app);

        let mut out = Vec::new();
        update_credentials(&app, &name("dev"), now(), &mut out).await.unwrap();

        assert_eq!(
            fs::read_to_string(temp.path().join(".aws").join("credentials")).unwrap(),
            "[default]\naws_access_key_id = AKIA\naws_secret_access_key = secret\naws_session_token = session\n"
        );
        assert!(output(out).contains("expire at 2030-06-01T13:00:00Z"));
    }

    #[tokio::test]
    async fn test_unknown_profile_fails_before_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let app = test_app(temp.path(), &server.uri(), Some("id-token"));

        let err = update_credentials(&app, &name("ghost"), now(), &mut Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<MaroonError>(),
            Some(MaroonError::NotFound { .. })
        ));
        assert!(!temp.path().join(".aws").join("credentials").exists());
    }

    #[tokio::test]
    async fn test_get_console_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/console-url"))
            .and(query_param("accessType", "ReadOnly"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "consoleUrl": "https://signin.example" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let app = test_app(temp.path(), &server.uri(), Some("id-token"));
        let mut out = Vec::new();

        get_console_url(
            &app,
            AccountId::parse("123456789012").unwrap(),
            AccessType::ReadOnly,
            3600,
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(output(out), "https://signin.example\n");
    }

    #[tokio::test]
    async fn test_console_url_duration_validated_before_request() {
        let temp = TempDir::new().unwrap();
        let app = test_app(temp.path(), "http://unused.invalid", Some("id-token"));

        let err = get_console_url(
            &app,
            AccountId::parse("123456789012").unwrap(),
            AccessType::Administrator,
            60,
            &mut Vec::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<MaroonError>(),
            Some(MaroonError::InvalidInput { field: "duration", .. })
        ));
    }
}
