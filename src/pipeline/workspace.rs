//! Per-request working files.
//!
//! The converters only speak files, so every request needs three paths on
//! disk: the downloaded template, the intermediate HTML and the final PDF.
//! They are derived from one UUID v4, which keeps concurrent requests apart
//! without any locking, and they are deleted when the [`Workspace`] is
//! released or dropped, whichever comes first. Dropping covers the paths an
//! explicit release cannot: `?` early returns, panics, and a request future
//! cancelled by its deadline.

use crate::error::PdfItError;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Three working-file paths owned by one request.
#[derive(Debug)]
pub struct Workspace {
    id: String,
    root: PathBuf,
    template_pdf: PathBuf,
    html: PathBuf,
    output_pdf: PathBuf,
    released: bool,
}

impl Workspace {
    /// Pick a fresh identifier under `root` and derive the paths.
    ///
    /// Pure computation: nothing is created on disk.
    pub fn allocate(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let id = Uuid::new_v4().simple().to_string();
        Self {
            template_pdf: root.join(format!("{id}.pdf")),
            // pdf2htmlEX names its output after the input file.
            html: root.join(format!("{id}.html")),
            output_pdf: root.join(format!("{id}.out.pdf")),
            root,
            id,
            released: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Downloaded template, input of the PDF→HTML step.
    pub fn template_pdf(&self) -> &Path {
        &self.template_pdf
    }

    /// Converter HTML, rewritten in place with the bound markup.
    pub fn html(&self) -> &Path {
        &self.html
    }

    /// Output of the HTML→PDF step.
    pub fn output_pdf(&self) -> &Path {
        &self.output_pdf
    }

    pub fn paths(&self) -> [&Path; 3] {
        [&self.template_pdf, &self.html, &self.output_pdf]
    }

    /// Delete every working file that exists. Missing files are fine.
    ///
    /// All three deletions are attempted; the first failure is returned.
    /// If this future is dropped part-way, [`Drop`] finishes the job.
    pub async fn release(&mut self) -> Result<(), PdfItError> {
        let mut first_err = None;
        for path in self.paths() {
            record(path, tokio::fs::remove_file(path).await, &mut first_err);
        }
        self.released = true;
        first_err.map_or(Ok(()), Err)
    }

    /// Blocking variant for [`Drop`], which cannot await.
    fn release_blocking(&mut self) -> Result<(), PdfItError> {
        let mut first_err = None;
        for path in self.paths() {
            record(path, std::fs::remove_file(path), &mut first_err);
        }
        self.released = true;
        first_err.map_or(Ok(()), Err)
    }
}

fn record(path: &Path, result: io::Result<()>, first_err: &mut Option<PdfItError>) {
    match result {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            if first_err.is_none() {
                *first_err = Some(PdfItError::workspace(path, e));
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.release_blocking() {
                warn!("Workspace {} cleanup failed: {}", self.id, e);
            }
        }
    }
}
