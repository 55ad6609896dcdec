//! Per-box Vagrantfile lookups.
//!
//! Boxes live at `<home>/boxes/<escaped-name>/<version>/<provider>/Vagrantfile`.
//! The file is Ruby, but only simple `key = value` assignments are needed so
//! lookups are plain pattern matches.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{ComputeError, Result};
use crate::types::BoxRef;

/// Marker file that must exist in every box directory.
pub const BOX_MARKER_FILE: &str = "Vagrantfile";

/// Replacement for `/` in box directory names (`hashicorp/bionic64`).
const SLASH_ESCAPE: &str = "-VAGRANTSLASH-";

/// Directory holding every installed box.
pub fn boxes_dir(home: &Path) -> PathBuf {
    home.join("boxes")
}

/// Escape a box name the way Vagrant names its box directories.
pub fn escape_box_name(name: &str) -> String {
    name.replace('/', SLASH_ESCAPE)
}

/// Inverse of [`escape_box_name`].
pub fn unescape_box_name(dir_name: &str) -> String {
    dir_name.replace(SLASH_ESCAPE, "/")
}

/// Directory of one box version for one provider.
pub fn box_dir(home: &Path, b: &BoxRef) -> PathBuf {
    boxes_dir(home)
        .join(escape_box_name(&b.name))
        .join(&b.version)
        .join(&b.provider)
}

/// Parsed contents of a box's Vagrantfile.
#[derive(Debug, Clone)]
pub struct BoxConfig {
    path: PathBuf,
    contents: String,
}

impl BoxConfig {
    /// Read the Vagrantfile of `b`. A missing file is a configuration error.
    pub fn load(home: &Path, b: &BoxRef) -> Result<Self> {
        let path = box_dir(home, b).join(BOX_MARKER_FILE);
        if !path.is_file() {
            return Err(ComputeError::MissingBoxConfig { path });
        }
        let contents =
            std::fs::read_to_string(&path).map_err(|e| ComputeError::io(&path, e))?;
        Ok(Self { path, contents })
    }

    /// Build from in-memory contents.
    pub fn from_contents(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value assigned to `key`, quoted or bare. The first assignment wins.
    pub fn key(&self, key: &str) -> Option<String> {
        let pattern = format!(
            r#"(?m)^\s*{}\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s#]+))"#,
            regex::escape(key)
        );
        let re = Regex::new(&pattern).ok()?;
        let caps = re.captures(&self.contents)?;
        caps.get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
    }

    /// `config.ssh.password`
    pub fn ssh_password(&self) -> Option<String> {
        self.key("config.ssh.password")
    }

    /// `config.vm.guest`, used as the OS family.
    pub fn guest(&self) -> Option<String> {
        self.key("config.vm.guest").map(|g| g.trim_start_matches(':').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VAGRANTFILE: &str = r#"
Vagrant.configure("2") do |config|
  config.vm.guest = :windows
  config.ssh.username = "admin"
  config.ssh.password = 'secret'
  config.vm.boot_timeout = 600 # seconds
end
"#;

    #[test]
    fn test_key_lookup() {
        let cfg = BoxConfig::from_contents("/tmp/Vagrantfile", VAGRANTFILE);

        assert_eq!(cfg.key("config.ssh.username").as_deref(), Some("admin"));
        assert_eq!(cfg.ssh_password().as_deref(), Some("secret"));
        assert_eq!(cfg.guest().as_deref(), Some("windows"));
        assert_eq!(cfg.key("config.vm.boot_timeout").as_deref(), Some("600"));
        assert_eq!(cfg.key("config.vm.hostname"), None);
    }

    #[test]
    fn test_load_requires_marker_file() {
        let home = tempfile::tempdir().unwrap();
        let b = BoxRef::new("hashicorp/bionic64", "1.0.282", "virtualbox");

        let err = BoxConfig::load(home.path(), &b).unwrap_err();
        assert!(matches!(err, ComputeError::MissingBoxConfig { .. }));
        assert!(err.is_configuration_error());

        let dir = box_dir(home.path(), &b);
        assert!(dir.ends_with("boxes/hashicorp-VAGRANTSLASH-bionic64/1.0.282/virtualbox"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(BOX_MARKER_FILE), VAGRANTFILE).unwrap();

        let cfg = BoxConfig::load(home.path(), &b).unwrap();
        assert_eq!(cfg.ssh_password().as_deref(), Some("secret"));
    }

    #[test]
    fn test_escape_round_trip() {
        assert_eq!(unescape_box_name(&escape_box_name("a/b")), "a/b");
        assert_eq!(escape_box_name("ubuntu"), "ubuntu");
    }
}
