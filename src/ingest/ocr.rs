//! Optical character recognition for scanned pages.

use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Errors raised while recognizing text in an image.
#[derive(Debug, Error)]
pub enum OcrError {
    /// OCR engine process could not be started or fed.
    #[error("failed to run OCR engine '{program}': {source}")]
    Spawn {
        /// Executable we attempted to run.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// OCR engine exited unsuccessfully.
    #[error("OCR engine exited with {status}: {stderr}")]
    Failed {
        /// Exit status reported by the process.
        status: std::process::ExitStatus,
        /// Captured standard error.
        stderr: String,
    },
}

/// Interface implemented by OCR backends.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize text in an encoded image (JPEG, JPEG 2000, PNG or PNM).
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError>;
}

/// OCR engine that shells out to the `tesseract` CLI.
pub struct TesseractOcr {
    program: String,
    language: String,
}

impl TesseractOcr {
    /// Construct an engine invoking `program` with the `language` pack.
    pub fn new(program: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            language: language.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError> {
        let spawn_error = |source| OcrError::Spawn {
            program: self.program.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(["stdin", "stdout", "-l", &self.language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image).await.map_err(spawn_error)?;
            // Dropping stdin closes the pipe so tesseract sees EOF.
        }

        let output = child.wait_with_output().await.map_err(spawn_error)?;
        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
