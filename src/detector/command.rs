//! Detector backed by an external program.
//!
//! For each image the program is started once, receives the image as PNG on
//! stdin and must print a JSON candidate list on stdout:
//!
//! ```text
//! [{"label": "dog", "confidence": 0.92}, {"label": "cat", "confidence": 0.41}]
//! ```
//!
//! A non-zero exit status, unparseable output or exceeding the timeout is a
//! [`DetectorError`]. The child is killed if the invocation is abandoned.

use std::io::{Cursor, ErrorKind};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Candidate, Detector};
use crate::constants::DEFAULT_DETECTOR_TIMEOUT;
use crate::error::DetectorError;

/// Runs `program args...` for every detection request.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandDetector {
    /// Create a detector for the given program and arguments.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Some(DEFAULT_DETECTOR_TIMEOUT),
        }
    }

    /// Parse a shell-style command line (`"python3 detect.py --model yolo.pt"`).
    ///
    /// # Errors
    ///
    /// Returns an error for unbalanced quotes or an empty command line.
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut words = shell_words::split(command_line)
            .with_context(|| format!("Invalid detector command: {command_line}"))?;
        if words.is_empty() {
            bail!("Detector command is empty");
        }
        let program = words.remove(0);
        Ok(Self::new(program, words))
    }

    /// Override the per-invocation time budget; `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program that will be executed.
    pub fn program(&self) -> &str {
        &self.program
    }

    async fn run(&self, png: Vec<u8>) -> Result<Vec<Candidate>, DetectorError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("detector stdin unavailable"))?;
        let feed = async move {
            stdin.write_all(&png).await?;
            stdin.shutdown().await
        };

        // Feed stdin while collecting output so a chatty child cannot deadlock us
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;

        if !output.status.success() {
            return Err(DetectorError::Exited {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        // A detector may legitimately exit without reading all of stdin
        if let Err(e) = fed {
            if e.kind() != ErrorKind::BrokenPipe {
                return Err(e.into());
            }
        }

        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[async_trait]
impl Detector for CommandDetector {
    async fn detect(&self, image: RgbImage) -> Result<Vec<Candidate>, DetectorError> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let Some(limit) = self.timeout else {
            return self.run(png).await;
        };
        match tokio::time::timeout(limit, self.run(png)).await {
            Ok(result) => result,
            Err(_) => Err(DetectorError::Timeout(limit)),
        }
    }
}
