use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Throwaway working directory with its own HOME
pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_spec(&self, content: &str) -> PathBuf {
        let path = self.root.path().join("server.yaml");
        fs::write(&path, content).unwrap();
        path
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// `nimbus` running inside the project, isolated from the user's environment
    pub fn command(&self) -> assert_cmd::Command {
        #[allow(deprecated)]
        let mut cmd = assert_cmd::Command::cargo_bin("nimbus").unwrap();
        cmd.current_dir(self.path())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".config"))
            .env_remove("NIMBUS_SPEC_PATH")
            .env_remove("OS_CLOUD")
            .env_remove("NIMBUS_FLOATING_POOL");
        cmd
    }
}
