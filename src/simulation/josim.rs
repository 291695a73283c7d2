use super::{SimulationOutput, SimulationSettings, Simulator};
use crate::error::SimulationError;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Keep at most this much of the simulator's stderr in error messages
const STDERR_TAIL_BYTES: usize = 2048;

/// Runs the JoSIM command line simulator as a subprocess.
///
/// Each call gets its own scratch directory holding the netlist, the CSV
/// output and the captured stderr; the directory is removed when the call
/// returns, successful or not.
#[derive(Clone, Debug)]
pub struct JosimSimulator {
    binary: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
}

impl JosimSimulator {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(20),
        }
    }

    pub fn from_settings(settings: &SimulationSettings) -> Self {
        Self::new(settings.binary.clone()).with_timeout(settings.timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Poll the child until it exits or the timeout elapses; kill it on timeout
    fn wait_with_timeout(&self, child: &mut Child) -> Result<ExitStatus, SimulationError> {
        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if start.elapsed() >= self.timeout {
                if let Err(e) = child.kill() {
                    warn!(error = %e, "failed to kill timed out simulator");
                }
                // reap to avoid a zombie
                let _ = child.wait();
                return Err(SimulationError::Timeout(self.timeout));
            }
            thread::sleep(self.poll_interval);
        }
    }
}

fn stderr_tail(path: &Path) -> String {
    let stderr = fs::read_to_string(path).unwrap_or_default();
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_string();
    }
    let mut cut = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(cut) {
        cut += 1;
    }
    trimmed[cut..].to_string()
}

impl Simulator for JosimSimulator {
    fn name(&self) -> &str {
        "JoSIM"
    }

    fn simulate(&self, netlist: &str) -> Result<SimulationOutput, SimulationError> {
        let scratch = tempfile::Builder::new().prefix("josim-job-").tempdir()?;
        let netlist_path = scratch.path().join("netlist.cir");
        let output_path = scratch.path().join("output.csv");
        let stderr_path = scratch.path().join("stderr.log");

        fs::write(&netlist_path, netlist)?;
        let stderr_file = File::create(&stderr_path)?;

        let mut child = Command::new(&self.binary)
            .arg(&netlist_path)
            .arg("-o")
            .arg(&output_path)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_file))
            .spawn()
            .map_err(|source| SimulationError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let status = self.wait_with_timeout(&mut child)?;
        if !status.success() {
            return Err(SimulationError::ExitStatus {
                code: status.code(),
                stderr: stderr_tail(&stderr_path),
            });
        }

        if !output_path.exists() {
            return Err(SimulationError::MissingOutput(output_path));
        }
        let text = fs::read_to_string(&output_path)?;
        let output = SimulationOutput::from_csv(&text)?;

        debug!(
            scratch = %scratch.path().display(),
            samples = output.len(),
            "simulation completed"
        );
        Ok(output)
    }
}
