use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;
use vocker_shared::errors::{VockerError, VockerResult};

use super::{GuestCommand, GuestEditor};
use crate::util::run_tool;

/// Edits guest images with `guestfish`.
///
/// Every call boots the libguestfs appliance once, so [`GuestEditor::batch`]
/// sends all commands in a single invocation separated by `:`.
#[derive(Debug, Clone)]
pub struct Guestfish {
    program: String,
}

impl Guestfish {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `guestfish --network -a <image> -i <cmd> [: <cmd> ...]`
    fn command_line(image: &Path, commands: &[GuestCommand]) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--network".into(),
            "-a".into(),
            image.as_os_str().to_owned(),
            "-i".into(),
        ];

        for (i, command) in commands.iter().enumerate() {
            if i > 0 {
                args.push(":".into());
            }
            match command {
                GuestCommand::Sh(script) => {
                    args.push("sh".into());
                    args.push(script.into());
                }
                GuestCommand::Write { path, content } => {
                    args.push("write".into());
                    args.push(path.into());
                    args.push(content.into());
                }
            }
        }

        args
    }
}

#[async_trait]
impl GuestEditor for Guestfish {
    async fn run(&self, image: &Path, script: &str) -> VockerResult<()> {
        self.batch(image, &[GuestCommand::Sh(script.to_string())])
            .await
    }

    async fn write_file(&self, image: &Path, guest_path: &str, content: &str) -> VockerResult<()> {
        self.batch(
            image,
            &[GuestCommand::Write {
                path: guest_path.to_string(),
                content: content.to_string(),
            }],
        )
        .await
    }

    async fn batch(&self, image: &Path, commands: &[GuestCommand]) -> VockerResult<()> {
        if commands.is_empty() {
            return Ok(());
        }

        tracing::debug!(image = %image.display(), count = commands.len(), "Editing guest");

        run_tool(&self.program, Self::command_line(image, commands))
            .await
            .map(|_| ())
            .map_err(|e| {
                VockerError::GuestAccess(format!("editing {} failed: {}", image.display(), e))
            })
    }
}
