//! Machine control through the `vagrant` command-line tool.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::error::{ComputeError, Result};
use crate::recorder::{OutputListener, OutputRecorder, WireLogger};
use crate::traits::{MachineControl, MachineControlFactory};
use crate::types::LoginCredentials;

/// Default executable name.
pub const DEFAULT_VAGRANT_BINARY: &str = "vagrant";

/// Runs `vagrant` inside one project directory.
///
/// Invocations are serialised: the output recorder supports a single session
/// at a time.
pub struct VagrantCli {
    project: PathBuf,
    binary: String,
    recorder: OutputRecorder,
    invocation: Mutex<()>,
}

impl VagrantCli {
    pub fn new(project: impl Into<PathBuf>, binary: impl Into<String>) -> Self {
        let project = project.into();
        let wire = Arc::new(WireLogger::new(project.display().to_string()));
        Self {
            project,
            binary: binary.into(),
            recorder: OutputRecorder::new(wire),
            invocation: Mutex::new(()),
        }
    }

    pub fn project(&self) -> &Path {
        &self.project
    }

    /// Run a command and return its combined output.
    async fn run(&self, args: &[&str]) -> Result<String> {
        let command = format!("{} {}", self.binary, args.join(" "));
        let _guard = self.invocation.lock().await;

        self.recorder.record();
        let status = self.execute(args).await;
        let transcript = self.recorder.stop_recording();

        match status {
            Ok(status) if status.success() => Ok(transcript),
            Ok(status) => Err(ComputeError::ProcessFailed {
                command: format!("{} (exit {})", command, status.code().unwrap_or(-1)),
                output: transcript,
            }),
            Err(e) => Err(ComputeError::ProcessFailed {
                command,
                output: e.to_string(),
            }),
        }
    }

    async fn execute(&self, args: &[&str]) -> std::io::Result<ExitStatus> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.project)
            .env("VAGRANT_NO_COLOR", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (out, err) = tokio::join!(
            forward_lines(stdout, &self.recorder),
            forward_lines(stderr, &self.recorder)
        );
        out?;
        err?;

        child.wait().await
    }
}

async fn forward_lines<R>(stream: Option<R>, listener: &dyn OutputListener) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return Ok(());
    };
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        listener.on_output(&format!("{}\n", line));
    }
    Ok(())
}

/// Parse the output of `vagrant ssh-config <machine>`.
pub fn parse_ssh_config(output: &str) -> Result<LoginCredentials> {
    let mut user = None;
    let mut host = None;
    let mut port = None;
    let mut identity = None;

    for line in output.lines() {
        let Some((key, value)) = line.trim().split_once(char::is_whitespace) else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key {
            "User" => user = Some(value.to_string()),
            "HostName" => host = Some(value.to_string()),
            "Port" => port = value.parse::<u16>().ok(),
            // Only the first identity file is used
            "IdentityFile" if identity.is_none() => identity = Some(PathBuf::from(value)),
            _ => {}
        }
    }

    let user = user.ok_or_else(|| ComputeError::ProcessFailed {
        command: "vagrant ssh-config".to_string(),
        output: format!("no User in ssh-config output:\n{}", output),
    })?;

    Ok(LoginCredentials {
        user,
        password: None,
        private_key_path: identity,
        host: host.unwrap_or_else(|| "127.0.0.1".to_string()),
        port: port.unwrap_or(22),
    })
}

#[async_trait]
impl MachineControl for VagrantCli {
    #[instrument(skip(self), fields(project = %self.project.display()))]
    async fn up(&self, machine: &str) -> Result<String> {
        info!("Bringing machine up");
        let transcript = self.run(&["up", machine]).await?;
        info!("Machine is up");
        Ok(transcript)
    }

    #[instrument(skip(self), fields(project = %self.project.display()))]
    async fn halt(&self, machine: &str) -> Result<()> {
        info!("Halting machine");
        self.run(&["halt", machine]).await.map(|_| ())
    }

    #[instrument(skip(self), fields(project = %self.project.display()))]
    async fn halt_forced(&self, machine: &str) -> Result<()> {
        info!("Force halting machine");
        self.run(&["halt", "--force", machine]).await.map(|_| ())
    }

    #[instrument(skip(self), fields(project = %self.project.display()))]
    async fn destroy(&self, machine: &str) -> Result<()> {
        info!("Destroying machine");
        self.run(&["destroy", "--force", machine]).await.map(|_| ())
    }

    #[instrument(skip(self), fields(project = %self.project.display()))]
    async fn ssh_config(&self, machine: &str) -> Result<LoginCredentials> {
        let output = self.run(&["ssh-config", machine]).await?;
        parse_ssh_config(&output)
    }

    async fn exists(&self) -> bool {
        self.project.join("Vagrantfile").is_file()
    }
}

/// One `VagrantCli` per project directory, shared across callers.
pub struct VagrantCliFactory {
    binary: String,
    projects: DashMap<PathBuf, Arc<VagrantCli>>,
}

impl VagrantCliFactory {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            projects: DashMap::new(),
        }
    }
}

impl Default for VagrantCliFactory {
    fn default() -> Self {
        Self::new(DEFAULT_VAGRANT_BINARY)
    }
}

impl MachineControlFactory for VagrantCliFactory {
    fn for_project(&self, project: &Path) -> Arc<dyn MachineControl> {
        self.projects
            .entry(project.to_path_buf())
            .or_insert_with(|| Arc::new(VagrantCli::new(project, self.binary.clone())))
            .value()
            .clone()
    }
}
