//! Per-user app-data tree resolution (§6: "Reads `LOCALAPPDATA` (or
//! platform equivalent)"). `directories` gives us the platform-correct
//! equivalent without hand-rolling the `LOCALAPPDATA`/`XDG_DATA_HOME`/
//! `~/Library/Application Support` dance.

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::CoreError;

pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn resolve() -> Result<Self, CoreError> {
        let dirs = ProjectDirs::from("com", "hostlink", "hostlink").ok_or(CoreError::NoAppDataDir)?;
        let root = dirs.data_local_dir().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Build a tree rooted at an explicit path, bypassing platform
    /// directory resolution — for tests and for embedding this core
    /// under a UI shell that already owns its own app-data location.
    pub fn at(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("general.json")
    }

    pub fn hosts_file(&self) -> PathBuf {
        self.root.join("hosts.ini")
    }

    pub fn identity_cert_file(&self) -> PathBuf {
        self.root.join("client.crt")
    }

    pub fn identity_key_file(&self) -> PathBuf {
        self.root.join("client.key")
    }

    pub fn artwork_dir(&self, host_uuid: &str) -> PathBuf {
        self.root.join("boxart").join(host_uuid)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artwork_dir_is_namespaced_by_host() {
        let paths = AppPaths::at(PathBuf::from("/tmp/hostlink-test"));
        assert_eq!(
            paths.artwork_dir("abc-123"),
            PathBuf::from("/tmp/hostlink-test/boxart/abc-123")
        );
    }
}
