use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use super::{expected_output, Converter, DocumentFormat, PDF_EXTENSION};
use crate::error::ConversionError;

/// Converts documents by running LibreOffice (`soffice`) headless.
///
/// Every call gets its own throw-away user profile so concurrent engine
/// processes never fight over the profile lock. The engine is started in its
/// own process group; on timeout the whole group is killed and reaped, which
/// also takes down the `soffice.bin` child the launcher script forks.
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    program: PathBuf,
}

impl SofficeConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, input: &Path, output_dir: &Path, profile_dir: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg(format!(
                "-env:UserInstallation=file://{}",
                profile_dir.display()
            ))
            .args(["--headless", "--norestore", "--convert-to", PDF_EXTENSION, "--outdir"])
            .arg(output_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        command
    }

    fn classify_spawn_error(&self, e: std::io::Error) -> ConversionError {
        match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                error!(program = %self.program.display(), error = %e, "conversion engine not found");
                ConversionError::EngineNotFound {
                    program: self.program.clone(),
                }
            }
            _ => ConversionError::Io(e),
        }
    }
}

impl Default for SofficeConverter {
    fn default() -> Self {
        Self::new("soffice")
    }
}

#[async_trait]
impl Converter for SofficeConverter {
    async fn convert(
        &self,
        input: &Path,
        output_dir: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, ConversionError> {
        DocumentFormat::from_path(input)?;

        let profile = tempfile::Builder::new()
            .prefix("docpdf-profile-")
            .tempdir()?;
        let mut command = self.command(input, output_dir, profile.path());
        debug!(command = ?command.as_std(), "running conversion engine");

        let child = spawn(&mut command)
            .await
            .map_err(|e| self.classify_spawn_error(e))?;
        let mut engine = EngineProcess::new(child);

        // One deadline covers the launcher's exit and the pipes reaching EOF.
        // Helpers left behind by the launcher hold the pipes open, so the
        // group is killed as soon as the launcher exits.
        let stdout = drain(engine.child.stdout.take());
        let stderr = drain(engine.child.stderr.take());
        let exited = async {
            let status = engine.child.wait().await;
            engine.kill_group();
            status
        };
        let outcome =
            tokio::time::timeout(timeout, async { tokio::join!(exited, stdout, stderr) }).await;

        let (status, stdout, stderr) = match outcome {
            Ok((status, stdout, stderr)) => (status?, stdout, stderr),
            Err(_) => {
                engine.terminate().await;
                warn!(input = %input.display(), secs = timeout.as_secs(), "conversion timed out");
                return Err(ConversionError::Timeout {
                    secs: timeout.as_secs(),
                });
            }
        };
        debug!(%stdout, "engine output");

        finish(status, &stderr, input, output_dir).await
    }
}

async fn finish(
    status: ExitStatus,
    stderr: &str,
    input: &Path,
    output_dir: &Path,
) -> Result<PathBuf, ConversionError> {
    if !status.success() {
        let reason = match stderr.trim() {
            "" => format!("engine exited with {status}"),
            detail => format!("engine exited with {status}: {detail}"),
        };
        error!(input = %input.display(), %reason, "conversion failed");
        return Err(ConversionError::failed(reason));
    }

    let produced = expected_output(input, output_dir);
    if !tokio::fs::try_exists(&produced).await.unwrap_or(false) {
        error!(expected = %produced.display(), "engine succeeded but no PDF was written");
        return Err(ConversionError::failed("PDF file not found after conversion"));
    }

    info!(input = %input.display(), output = %produced.display(), "conversion successful");
    Ok(produced)
}

/// Spawn, retrying briefly while the executable is still open for writing
/// elsewhere (ETXTBSY right after the engine binary was replaced).
async fn spawn(command: &mut Command) -> std::io::Result<Child> {
    let mut attempts = 0;
    loop {
        match command.spawn() {
            Err(e) if is_text_busy(&e) && attempts < 3 => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            other => return other,
        }
    }
}

#[cfg(unix)]
fn is_text_busy(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::ETXTBSY)
}

#[cfg(not(unix))]
fn is_text_busy(_e: &std::io::Error) -> bool {
    false
}

/// A spawned engine and the process group it leads.
///
/// The group is killed on drop, so abandoning a conversion midway (client
/// gone, runtime shutting down) never leaves `soffice.bin` running.
#[derive(Debug)]
struct EngineProcess {
    child: Child,
    pgid: Option<u32>,
}

impl EngineProcess {
    fn new(child: Child) -> Self {
        let pgid = child.id();
        Self { child, pgid }
    }

    /// Kill every process in the engine's group. Only the first call signals.
    fn kill_group(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }

    /// Kill the engine and everything it spawned, then reap it.
    async fn terminate(&mut self) {
        self.kill_group();
        if let Err(e) = self.child.kill().await {
            // Already exited between the timeout firing and the kill.
            debug!(error = %e, "engine kill after timeout");
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        self.kill_group();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    // SAFETY: kill(2) with a negative pid signals the process group created
    // at spawn time; it touches no memory owned by this process.
    let rc = unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
    if rc != 0 {
        let e = std::io::Error::last_os_error();
        if e.raw_os_error() == Some(libc::ESRCH) {
            // Every member already exited.
            return;
        }
        warn!(pgid, error = %e, "failed to kill engine process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!(error = %e, "failed to read engine output");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
