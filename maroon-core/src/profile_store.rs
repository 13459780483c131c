//! Profile persistence.
//!
//! Profiles live in a single JSON document in the platform configuration
//! directory (`~/.config/maroon/config.json` on Linux). Every mutating
//! operation reads the whole file, changes it in memory and atomically
//! replaces it.
//!
//! There is no cross-process locking: two concurrent writers race and the
//! later write wins.
//!
//! # Example
//!
//! ```rust,ignore
//! use maroon_core::{AccountId, Profile, ProfileName, ProfileStore, Region, RoleName};
//!
//! let store = ProfileStore::open()?;
//! let profile = Profile::new(
//!     AccountId::parse("123456789012")?,
//!     RoleName::parse("Admin")?,
//!     Region::parse("us-east-1")?,
//! );
//! store.add(&ProfileName::parse("dev")?, profile)?;
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::atomic::FileReplacer;
use crate::error::MaroonError;
use crate::model::{Configuration, Credentials, Profile, ProfileName};

/// Disk-backed profile store.
///
/// The handle holds no cached state; each call goes back to the file.
#[derive(Debug)]
pub struct ProfileStore {
    /// Path to the configuration JSON file.
    path: PathBuf,

    /// Stages replacements next to the file so renames stay on one volume.
    replacer: FileReplacer,
}

impl ProfileStore {
    /// Get the default storage path for the configuration file.
    pub fn default_path() -> Result<PathBuf, MaroonError> {
        let dirs = directories::ProjectDirs::from("dev", "gtech", "maroon")
            .ok_or(MaroonError::ConfigDirUnavailable)?;

        Ok(dirs.config_dir().join("config.json"))
    }

    /// Open the store at the default location.
    pub fn open() -> Result<Self, MaroonError> {
        Self::open_at(Self::default_path()?)
    }

    /// Open the store at a specific path, creating its parent directory.
    ///
    /// The file itself is only created by the first write.
    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self, MaroonError> {
        let path = path.into();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        Ok(Self {
            path,
            replacer: FileReplacer::new(dir),
        })
    }

    /// Read the whole configuration.
    ///
    /// A missing or zero-length file is an empty configuration.
    pub fn load(&self) -> Result<Configuration, MaroonError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Configuration::default()),
            Err(e) => return Err(e.into()),
        };

        if contents.is_empty() {
            return Ok(Configuration::default());
        }

        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, config: &Configuration) -> Result<(), MaroonError> {
        let mut contents = serde_json::to_string_pretty(config)?;
        contents.push('\n');
        self.replacer.replace(&self.path, contents.as_bytes())?;
        tracing::debug!("Saved {} profile(s) to {:?}", config.len(), self.path);
        Ok(())
    }

    /// Add a new profile.
    ///
    /// Returns an error if a profile with the same name already exists; the
    /// existing entry is left untouched.
    pub fn add(&self, name: &ProfileName, profile: Profile) -> Result<(), MaroonError> {
        let mut config = self.load()?;
        config.add(name.clone(), profile)?;
        self.save(&config)
    }

    /// Get a copy of a profile.
    pub fn get(&self, name: &ProfileName) -> Result<Profile, MaroonError> {
        self.load()?
            .get(name)
            .cloned()
            .ok_or_else(|| MaroonError::NotFound {
                profile: name.to_string(),
            })
    }

    /// All profiles in name order.
    pub fn list(&self) -> Result<Vec<(ProfileName, Profile)>, MaroonError> {
        Ok(self
            .load()?
            .iter()
            .map(|(name, profile)| (name.clone(), profile.clone()))
            .collect())
    }

    /// Remove a profile.
    ///
    /// Removing an absent profile succeeds without rewriting the file.
    /// Returns whether a profile was deleted.
    pub fn remove(&self, name: &ProfileName) -> Result<bool, MaroonError> {
        let mut config = self.load()?;
        if config.remove(name).is_none() {
            tracing::debug!("Profile {} not present, nothing to remove", name);
            return Ok(false);
        }
        self.save(&config)?;
        Ok(true)
    }

    /// Replace the cached credentials of an existing profile.
    pub fn update_credentials(
        &self,
        name: &ProfileName,
        credentials: Credentials,
    ) -> Result<(), MaroonError> {
        let mut config = self.load()?;
        config.set_credentials(name, credentials)?;
        self.save(&config)
    }

    /// Get the storage path for this store.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
