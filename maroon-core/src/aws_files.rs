//! Synchronizers for the shared AWS `credentials` and `config` files.
//!
//! Both files belong to the user and other tools. Only the keys Maroon owns
//! are rewritten; everything else in the file is preserved.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::atomic::{FileReplacer, open_owner_only};
use crate::error::MaroonError;
use crate::ini::Document;
use crate::model::{Credentials, ProfileName, Region};

/// Program named in `credential_process` invocations.
pub const DEFAULT_PROGRAM_NAME: &str = "maroon";

const CREDENTIALS_ENV: &str = "AWS_SHARED_CREDENTIALS_FILE";
const CONFIG_ENV: &str = "AWS_CONFIG_FILE";

/// `$<env_var>` if set and non-empty, else `<home>/.aws/<file_name>`.
fn aws_path(
    env_value: Option<OsString>,
    home: Option<&Path>,
    file_name: &str,
) -> Result<PathBuf, MaroonError> {
    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(value));
    }
    let home = home.ok_or(MaroonError::ConfigDirUnavailable)?;
    Ok(home.join(".aws").join(file_name))
}

fn default_aws_path(env_var: &str, file_name: &str) -> Result<PathBuf, MaroonError> {
    let dirs = directories::BaseDirs::new();
    aws_path(
        std::env::var_os(env_var),
        dirs.as_ref().map(|d| d.home_dir()),
        file_name,
    )
}

/// A user-owned section/key-value file updated in place.
#[derive(Debug)]
struct SharedFile {
    path: PathBuf,
    replacer: FileReplacer,
}

impl SharedFile {
    /// Set `entries` under `section`, creating the file if needed.
    fn update(&self, section: &str, entries: &[(&str, &str)]) -> Result<(), MaroonError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut text = String::new();
        open_owner_only(
            &self.path,
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false),
        )?
        .read_to_string(&mut text)?;

        let mut document = Document::parse(&text)?;
        for (key, value) in entries {
            document.set(section, key, value)?;
        }

        self.replacer
            .replace(&self.path, document.to_string().as_bytes())?;
        tracing::info!("Updated [{}] in {:?}", section, self.path);
        Ok(())
    }
}

/// The AWS shared credentials file (`~/.aws/credentials`).
#[derive(Debug)]
pub struct AwsCredentialsFile {
    file: SharedFile,
}

impl AwsCredentialsFile {
    /// `$AWS_SHARED_CREDENTIALS_FILE`, else `~/.aws/credentials`.
    pub fn default_path() -> Result<PathBuf, MaroonError> {
        default_aws_path(CREDENTIALS_ENV, "credentials")
    }

    pub fn new(path: impl Into<PathBuf>, replacer: FileReplacer) -> Self {
        Self {
            file: SharedFile {
                path: path.into(),
                replacer,
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Write `credentials` into the `default` section.
    pub fn sync_default(&self, credentials: &Credentials) -> Result<(), MaroonError> {
        self.file.update(
            "default",
            &[
                ("aws_access_key_id", credentials.access_key_id()),
                (
                    "aws_secret_access_key",
                    credentials.secret_access_key().expose(),
                ),
                ("aws_session_token", credentials.session_token().expose()),
            ],
        )
    }
}

/// The AWS CLI/SDK configuration file (`~/.aws/config`).
#[derive(Debug)]
pub struct AwsConfigFile {
    file: SharedFile,
    program: String,
}

impl AwsConfigFile {
    /// `$AWS_CONFIG_FILE`, else `~/.aws/config`.
    pub fn default_path() -> Result<PathBuf, MaroonError> {
        default_aws_path(CONFIG_ENV, "config")
    }

    pub fn new(path: impl Into<PathBuf>, replacer: FileReplacer) -> Self {
        Self {
            file: SharedFile {
                path: path.into(),
                replacer,
            },
            program: DEFAULT_PROGRAM_NAME.to_string(),
        }
    }

    /// Use another program name in `credential_process`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// The command AWS tools run to obtain credentials for `name`.
    pub fn invocation(&self, name: &ProfileName) -> String {
        format!("{} credentials print -p {}", self.program, name)
    }

    /// Point `[profile <name>]` at Maroon and set its region.
    pub fn sync_profile_invocation(
        &self,
        name: &ProfileName,
        region: &Region,
    ) -> Result<(), MaroonError> {
        let invocation = self.invocation(name);
        self.file.update(
            &format!("profile {}", name),
            &[
                ("credential_process", invocation.as_str()),
                ("region", region.as_str()),
            ],
        )
    }
}
