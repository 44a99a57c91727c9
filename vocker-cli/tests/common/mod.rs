#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

pub struct TestContext {
    pub cmd: Command,
    pub home: PathBuf,
    // Removed when the test is done
    pub dir: TempDir,
}

impl TestContext {
    /// Another command on the same home directory
    pub fn new_cmd(&self) -> Command {
        command_for(&self.home)
    }

    /// Write a build script into the test directory and return its path
    pub fn write_script(&self, name: &str, script: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, script).expect("Failed to write script");
        path
    }
}

fn command_for(home: &Path) -> Command {
    let bin_path = env!("CARGO_BIN_EXE_vocker");
    let mut cmd = Command::new(bin_path);
    cmd.timeout(Duration::from_secs(60));
    cmd.env_remove("RUST_LOG");
    cmd.arg("--home").arg(home);
    cmd
}

pub fn vocker() -> TestContext {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let home = dir.path().join("home");
    TestContext {
        cmd: command_for(&home),
        home,
        dir,
    }
}
