//! Access to the target machine.
//!
//! Steps never touch the process environment, the filesystem or child
//! processes directly; they go through [`Host`]. [`SystemHost`] is the real
//! implementation, tests substitute a fake or a `mockall` mock.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use sysinfo::{Disks, System};
use tracing::debug;

use crate::error::{BootstrapError, Result};

/// A command to run on the host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
}

impl HostCommand {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    #[must_use]
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Best diagnostic text: stderr if present, otherwise stdout.
    #[must_use]
    pub fn diagnostics(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }

    /// Turn a non-zero exit into an [`BootstrapError::UnexpectedFault`].
    ///
    /// # Errors
    ///
    /// Returns a fault carrying the captured diagnostics if the command failed.
    pub fn check(self, context: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            let code = self
                .code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            Err(BootstrapError::fault(
                format!("{context} (exit {code})"),
                self.diagnostics(),
            ))
        }
    }
}

/// Operations a bootstrap run performs against the target machine.
#[cfg_attr(test, mockall::automock)]
pub trait Host: Send + Sync {
    /// Host identity used in logs and summaries.
    fn hostname(&self) -> String;

    /// Run a command to completion.
    ///
    /// A non-zero exit is reported in [`CommandOutput`], not as an error.
    /// Errors mean the command could not be started at all.
    fn run(&self, command: &HostCommand) -> Result<CommandOutput>;

    fn path_exists(&self, path: &Path) -> bool;

    /// Resolve symlinks (e.g. `/dev/disk/by-uuid/*`). `None` if the path
    /// does not resolve.
    fn canonicalize(&self, path: &Path) -> Option<PathBuf>;

    fn read_to_string(&self, path: &Path) -> Result<String>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Append a single line (newline added) to a file.
    fn append_line(&self, path: &Path, line: &str) -> Result<()>;

    /// Locate a program on PATH.
    fn find_program(&self, name: &str) -> Option<PathBuf>;

    /// Total physical memory in bytes.
    fn total_memory(&self) -> u64;

    /// Free space in bytes on the filesystem containing `path`.
    fn available_disk(&self, path: &Path) -> Option<u64>;
}

/// The machine this process runs on.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl SystemHost {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Host for SystemHost {
    fn hostname(&self) -> String {
        System::host_name().unwrap_or_else(|| "localhost".to_string())
    }

    fn run(&self, command: &HostCommand) -> Result<CommandOutput> {
        debug!(command = %command, "Running command");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if command.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }

        let mut child = cmd.spawn().map_err(|e| {
            BootstrapError::fault(format!("Failed to spawn {}", command.program), e.to_string())
        })?;

        if let (Some(input), Some(stdin)) = (&command.stdin, child.stdin.as_mut()) {
            stdin.write_all(input.as_bytes()).map_err(|e| {
                BootstrapError::fault(
                    format!("Failed to write stdin of {}", command.program),
                    e.to_string(),
                )
            })?;
        }
        // Close stdin so the child sees EOF.
        drop(child.stdin.take());

        let output = child.wait_with_output().map_err(|e| {
            BootstrapError::fault(format!("Failed to wait for {}", command.program), e.to_string())
        })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn canonicalize(&self, path: &Path) -> Option<PathBuf> {
        std::fs::canonicalize(path).ok()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| {
            BootstrapError::fault(format!("Failed to read {}", path.display()), e.to_string())
        })
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| {
            BootstrapError::fault(format!("Failed to create {}", path.display()), e.to_string())
        })
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                BootstrapError::fault(format!("Failed to open {}", path.display()), e.to_string())
            })?;
        writeln!(file, "{line}").map_err(|e| {
            BootstrapError::fault(format!("Failed to write {}", path.display()), e.to_string())
        })
    }

    fn find_program(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }

    fn total_memory(&self) -> u64 {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.total_memory()
    }

    fn available_disk(&self, path: &Path) -> Option<u64> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|d| path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map(sysinfo::Disk::available_space)
    }
}
