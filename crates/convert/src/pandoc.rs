use crate::error::{ErrorKind, Result};
use crate::{ConversionOptions, Converter};
use async_trait::async_trait;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::instrument;

/// Executable names tried, in order, when no program is configured.
const EXECUTABLES: &[&str] = &["pandoc"];

/// A pandoc executable.
#[derive(Debug, Clone)]
pub struct Pandoc {
    program: PathBuf,
    name: String,
}

impl Pandoc {
    /// Locate pandoc, either the configured program (a name looked up on
    /// `PATH`, or a path) or the first of the usual executable names.
    pub fn discover(program: Option<&Path>) -> Result<Self> {
        let candidates: Vec<PathBuf> = match program {
            Some(program) => vec![program.to_path_buf()],
            None => EXECUTABLES.iter().map(PathBuf::from).collect(),
        };
        for candidate in &candidates {
            if let Ok(program) = which::which(candidate) {
                tracing::debug!(program = %program.display(), "Discovered converter");
                return Ok(Self::at(program));
            }
        }
        let searched = candidates.iter().map(|c| c.display().to_string()).collect::<Vec<_>>().join(", ");
        tracing::info!(searched = %searched, "Converter executable not found");
        exn::bail!(ErrorKind::NotFound(searched));
    }

    /// Use a specific executable without searching for it.
    pub fn at(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let name = program.file_name().map_or_else(|| "pandoc".to_string(), |n| n.to_string_lossy().into_owned());
        Self { program, name }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn spawn_error(&self, err: std::io::Error) -> ErrorKind {
        match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ErrorKind::NotFound(format!("{} ({err})", self.program.display()))
            },
            _ => ErrorKind::Io(err.to_string()),
        }
    }

    /// Run a listing flag (`--list-input-formats`) and collect its lines.
    async fn list(&self, flag: &str) -> Result<Vec<String>> {
        let output = Command::new(&self.program)
            .arg(flag)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            exn::bail!(ErrorKind::Rejected {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8(output.stdout).or_raise(|| ErrorKind::InvalidOutput)?;
        Ok(stdout.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
    }
}

#[async_trait]
impl Converter for Pandoc {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(program = %self.program.display()))]
    async fn verify(&self, options: &ConversionOptions) -> Result<()> {
        let inputs = self.list("--list-input-formats").await.or_raise(|| ErrorKind::NotFound(self.name.clone()))?;
        let from = ConversionOptions::base_format(&options.from);
        if !inputs.iter().any(|f| f == from) {
            exn::bail!(ErrorKind::UnsupportedFormat(from.to_string()));
        }
        let outputs = self.list("--list-output-formats").await.or_raise(|| ErrorKind::NotFound(self.name.clone()))?;
        let to = ConversionOptions::base_format(&options.to);
        if !outputs.iter().any(|f| f == to) {
            exn::bail!(ErrorKind::UnsupportedFormat(to.to_string()));
        }
        tracing::debug!(from = %from, to = %to, "Converter supports configured formats");
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(bytes = source.len()))]
    async fn convert(&self, source: &str, options: &ConversionOptions) -> Result<String> {
        let mut child = Command::new(&self.program)
            .arg("--from")
            .arg(&options.from)
            .arg("--to")
            .arg(&options.to)
            .args(&options.extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the future on timeout or cancellation kills pandoc.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // Feed stdin from its own task so a large document can't deadlock
        // against pandoc filling its stdout pipe.
        let stdin = child.stdin.take();
        let input = source.as_bytes().to_vec();
        let writer = tokio::spawn(async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(&input).await,
                None => Ok(()),
            }
        });

        let output = tokio::time::timeout(options.timeout, child.wait_with_output())
            .await
            .map_err(|_| ErrorKind::Timeout(options.timeout))?
            .map_err(|e| ErrorKind::Io(e.to_string()))?;
        let written = writer.await.map_err(|e| ErrorKind::Io(e.to_string()))?;

        if !output.status.success() {
            exn::bail!(ErrorKind::Rejected {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        // Pandoc may stop reading early and still succeed; only a failed
        // write with a failed exit matters, and that was handled above.
        if let Err(e) = written {
            tracing::trace!(error = %e, "Converter closed stdin early");
        }
        String::from_utf8(output.stdout).or_raise(|| ErrorKind::InvalidOutput)
    }
}
