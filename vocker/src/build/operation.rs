//! Build operations, one per script directive.

use std::fmt;
use std::path::Path;

use vocker_shared::errors::{VockerError, VockerResult};

use super::env::BuildEnv;
use super::layer::Layer;
use crate::disk::{Disk, DiskFormat};
use crate::guest::{BaseFetcher, GuestCommand, GuestEditor};
use crate::runtime::constants::guest_paths;

/// Directives that are accepted but have no effect on the image.
const IGNORED_DIRECTIVES: &[&str] = &["MAINTAINER", "LABEL"];

/// One declared build step.
///
/// Every variant keeps the raw argument text exactly as written; it is part
/// of the layer fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// `FROM <template>`
    BaseImage(String),
    /// `RUN <shell>`
    RunCommand(String),
    /// `CMD <shell>`
    SetDefaultCommand(String),
    /// `EXPOSE <port>`
    ExposePort(String),
    /// `ENV <KEY=VALUE>`
    SetEnvironment(String),
    /// Acknowledged directive that cannot be applied to a VM image.
    Ignored { directive: String, args: String },
}

/// Collaborators an operation may call while applying itself.
pub(crate) struct ApplyTools<'a> {
    pub fetcher: &'a dyn BaseFetcher,
    pub editor: &'a dyn GuestEditor,
    /// Scratch space on the same filesystem as the images directory.
    pub temp_dir: &'a Path,
}

impl Operation {
    /// Look up a directive keyword (case-insensitive).
    ///
    /// Returns None for unknown directives.
    pub fn from_directive(keyword: &str, args: &str) -> Option<Self> {
        let keyword = keyword.to_ascii_uppercase();
        let args = args.to_string();

        let op = match keyword.as_str() {
            "FROM" => Operation::BaseImage(args),
            "RUN" => Operation::RunCommand(args),
            "CMD" => Operation::SetDefaultCommand(args),
            "EXPOSE" => Operation::ExposePort(args),
            "ENV" => Operation::SetEnvironment(args),
            k if IGNORED_DIRECTIVES.contains(&k) => Operation::Ignored {
                directive: keyword,
                args,
            },
            _ => return None,
        };
        Some(op)
    }

    /// Directive keyword as it appears in a script.
    pub fn keyword(&self) -> &str {
        match self {
            Operation::BaseImage(_) => "FROM",
            Operation::RunCommand(_) => "RUN",
            Operation::SetDefaultCommand(_) => "CMD",
            Operation::ExposePort(_) => "EXPOSE",
            Operation::SetEnvironment(_) => "ENV",
            Operation::Ignored { directive, .. } => directive,
        }
    }

    /// Raw argument text.
    pub fn args(&self) -> &str {
        match self {
            Operation::BaseImage(a)
            | Operation::RunCommand(a)
            | Operation::SetDefaultCommand(a)
            | Operation::ExposePort(a)
            | Operation::SetEnvironment(a)
            | Operation::Ignored { args: a, .. } => a,
        }
    }

    /// Variant tag plus raw arguments. Input to the layer fingerprint.
    pub fn signature(&self) -> String {
        format!("{} {}", self.keyword(), self.args())
    }

    pub fn is_base_image(&self) -> bool {
        matches!(self, Operation::BaseImage(_))
    }

    /// Environment seen by the operations after this one.
    pub fn fold_env(&self, env: BuildEnv) -> BuildEnv {
        match self {
            Operation::SetEnvironment(assignment) => env.with(assignment),
            _ => env,
        }
    }

    /// Apply this operation to `target`.
    ///
    /// `target` must already be materialized, except for `BaseImage` where
    /// fetching the image is the whole operation. `env` must include this
    /// operation's own contribution (see [`Operation::fold_env`]).
    pub(crate) async fn apply(
        &self,
        target: &Layer,
        env: &BuildEnv,
        tools: &ApplyTools<'_>,
    ) -> VockerResult<()> {
        match self {
            Operation::BaseImage(_) => fetch_base(target, tools).await,
            Operation::RunCommand(shell) => {
                let script = run_script(env, shell);
                tracing::debug!(script = %script, "Run");
                tools.editor.run(&target.path(), &script).await
            }
            Operation::SetDefaultCommand(shell) => {
                if shell.trim_start().starts_with('[') {
                    tracing::warn!("Only the shell form of CMD is supported, copying it anyway");
                }
                let commands = default_command_batch(env, shell);
                tools.editor.batch(&target.path(), &commands).await
            }
            Operation::ExposePort(raw) => {
                let port = parse_port(raw)?;
                let script = format!("firewall-offline-cmd --add-port={}/tcp", port);
                tools.editor.run(&target.path(), &script).await
            }
            Operation::SetEnvironment(assignment) => {
                tracing::debug!(assignment = %assignment, "Environment updated");
                Ok(())
            }
            Operation::Ignored { directive, .. } => {
                tracing::warn!("Ignoring operation {}", directive);
                Ok(())
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.keyword(), self.args())
    }
}

/// Canonical layer name for a base template: `fedora:23` -> `fedora-23`.
pub fn base_image_name(template: &str) -> String {
    template.trim().replace([':', '/'], "-")
}

/// Script for `RUN`: exports the accumulated environment, then runs `shell`.
pub(crate) fn run_script(env: &BuildEnv, shell: &str) -> String {
    match env.export_prefix() {
        Some(exports) => format!("{} ; {}", exports, shell),
        None => shell.to_string(),
    }
}

/// Startup script installed by `CMD`.
pub(crate) fn startup_script(env: &BuildEnv, shell: &str) -> String {
    format!("#!/bin/bash\n\n{}\n\n{}", env.export_lines().join("\n"), shell)
}

/// Install the startup script and make the guest convenient to boot into:
/// root autologin on the consoles, a quiet one-second grub, permissive SELinux.
fn default_command_batch(env: &BuildEnv, shell: &str) -> Vec<GuestCommand> {
    let script = startup_script(env, shell);
    tracing::debug!(script = %script, "rc.local");

    vec![
        GuestCommand::Write {
            path: guest_paths::RC_LOCAL.to_string(),
            content: script,
        },
        GuestCommand::Sh(format!("chmod a+x {}", guest_paths::RC_LOCAL)),
        GuestCommand::Sh(format!(
            "sed -i '/^ExecStart=/ s/$/ --autologin root/' {}",
            guest_paths::GETTY_UNITS.join(" ")
        )),
        GuestCommand::Sh(format!(
            "sed -i -e '/linux.*vmlinuz/ s/$/ quiet/' -e 's/timeout=[^ ]*/timeout=1/' {}",
            guest_paths::GRUB_CFG
        )),
        GuestCommand::Sh(format!(
            "sed -i '/^SELINUX=/ s/=.*/=permissive/' {}",
            guest_paths::SELINUX_CONFIG
        )),
    ]
}

/// Only a bare TCP port number is supported.
fn parse_port(raw: &str) -> VockerResult<u16> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VockerError::Validation(format!(
            "Only supporting EXPOSE <port>, ignoring '{}'",
            raw
        )));
    }
    raw.parse::<u16>()
        .map_err(|_| VockerError::Validation(format!("Port out of range, ignoring '{}'", raw)))
}

/// Populate a root layer from its template unless the image already exists.
///
/// The download goes to a temp file first and is renamed into place, so the
/// images directory never holds a partial base image.
async fn fetch_base(target: &Layer, tools: &ApplyTools<'_>) -> VockerResult<()> {
    let path = target.path();
    tracing::debug!("Checking presence: {}", path.display());

    if path.is_file() {
        tracing::debug!("Reusing base {}", target);
        return Ok(());
    }

    let temp_path = tools.temp_dir.join(format!(
        "{}.{}.partial",
        target.name(),
        uuid::Uuid::new_v4().simple()
    ));
    // Removes the partial download if anything below fails
    let _partial = Disk::owned(temp_path.clone(), DiskFormat::Qcow2);

    tools.fetcher.fetch(target.name(), &temp_path).await?;

    std::fs::rename(&temp_path, &path).map_err(|e| {
        VockerError::Storage(format!(
            "Failed to move base image into {}: {}",
            path.display(),
            e
        ))
    })?;

    tracing::debug!("Created base {}", target);
    Ok(())
}
