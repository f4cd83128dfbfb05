//! Text extraction via pdftoppm and Tesseract.
//!
//! The source file is rasterized into one PNG per page, then each page
//! image is run through Tesseract. Pages are concatenated in ascending
//! numeric page order parsed from the artifact names; pdftoppm pads the
//! index to a width that depends on the page count, so lexicographic
//! listing order cannot be trusted past nine pages.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

use crate::config::OcrSettings;

/// Errors that can occur during text extraction.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("external tool not found: {0}")]
    ToolNotFound(String),

    #[error("{tool} failed: {stderr}")]
    ProcessFailed { tool: String, stderr: String },

    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A rasterized page image with its numeric page index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub index: u32,
    pub path: PathBuf,
}

/// Page-level text extractor driving the external tools.
pub struct PageExtractor {
    dpi: u32,
    language: String,
    process_timeout: Duration,
}

impl PageExtractor {
    /// Create an extractor from OCR settings.
    pub fn new(settings: &OcrSettings) -> Self {
        Self {
            dpi: settings.dpi,
            language: settings.language.clone(),
            process_timeout: Duration::from_secs(settings.process_timeout_secs),
        }
    }

    /// Rasterize a source document and OCR every page, returning the
    /// concatenated text in ascending page order. `work_dir` receives the
    /// page images; the caller owns its lifetime and cleanup.
    pub async fn extract_document(
        &self,
        source_path: &Path,
        work_dir: &Path,
    ) -> Result<String, OcrError> {
        self.rasterize(source_path, work_dir).await?;

        let pages = collect_page_images(work_dir)?;
        if pages.is_empty() {
            return Err(OcrError::ProcessFailed {
                tool: "pdftoppm".to_string(),
                stderr: "no page images produced".to_string(),
            });
        }

        let mut text = String::new();
        for page in &pages {
            let page_text = self.extract_page_text(&page.path).await?;
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(page_text.trim_end());
        }
        Ok(text)
    }

    /// Convert the document into per-page PNGs under `out_dir`.
    ///
    /// pdftoppm names the artifacts `page-<index>.png` with a zero-padded
    /// numeric index.
    pub async fn rasterize(&self, source_path: &Path, out_dir: &Path) -> Result<(), OcrError> {
        let mut cmd = Command::new("pdftoppm");
        cmd.args(["-png", "-r", &self.dpi.to_string()])
            .arg(source_path)
            .arg(out_dir.join("page"));
        self.run_tool(cmd, "pdftoppm").await?;
        Ok(())
    }

    /// Run Tesseract over one page image.
    pub async fn extract_page_text(&self, image_path: &Path) -> Result<String, OcrError> {
        let mut cmd = Command::new("tesseract");
        cmd.arg(image_path)
            .arg("stdout")
            .args(["-l", &self.language]);
        self.run_tool(cmd, "tesseract").await
    }

    /// Spawn an external tool with a bounded timeout, killing it on expiry.
    async fn run_tool(&self, mut cmd: Command, tool: &str) -> Result<String, OcrError> {
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OcrError::ToolNotFound(tool.to_string()));
            }
            Err(e) => return Err(OcrError::Io(e)),
        };

        let output = match tokio::time::timeout(self.process_timeout, child.wait_with_output()).await
        {
            Ok(result) => result?,
            // Dropping the timed-out future kills the child (kill_on_drop).
            Err(_) => {
                return Err(OcrError::Timeout {
                    tool: tool.to_string(),
                    seconds: self.process_timeout.as_secs(),
                });
            }
        };

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(OcrError::ProcessFailed {
                tool: tool.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

/// Collect `page-*.png` artifacts sorted by their numeric page index.
pub fn collect_page_images(dir: &Path) -> std::io::Result<Vec<PageImage>> {
    let mut pages: Vec<PageImage> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_str()?;
            let index = page_index(name)?;
            Some(PageImage { index, path })
        })
        .collect();
    pages.sort_by_key(|p| p.index);
    Ok(pages)
}

/// Parse the numeric page index out of a pdftoppm artifact name
/// (`page-007.png` -> 7). Returns None for anything else.
fn page_index(file_name: &str) -> Option<u32> {
    let stem = file_name.strip_suffix(".png")?;
    let index = stem.strip_prefix("page-")?;
    index.parse().ok()
}

/// Check if a binary is available in PATH.
pub fn check_binary(name: &str) -> bool {
    std::process::Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Availability of the external tools the OCR stage shells out to.
pub fn check_tools() -> Vec<(String, bool)> {
    ["pdftoppm", "tesseract"]
        .iter()
        .map(|tool| (tool.to_string(), check_binary(tool)))
        .collect()
}
