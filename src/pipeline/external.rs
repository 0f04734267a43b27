//! External converter invocation.
//!
//! Both conversions are delegated to command-line tools (pdf2htmlEX and
//! phantomjs by default). A [`ConversionJob`] describes one invocation; its
//! [`run`](ConversionJob::run) future launches the process, captures both
//! output streams and completes when the process exits, so the calling task
//! is suspended rather than a worker thread blocked.
//!
//! ## Killing converters
//!
//! The child is spawned with `kill_on_drop`. When the per-conversion timeout
//! fires, or when the whole request future is dropped by its deadline, the
//! child is killed instead of being left to run against files that are about
//! to be deleted.
//!
//! ## Working directory
//!
//! Converters inherit the caller's working directory, so a relative leading
//! argument such as `rasterize.js` resolves the way it does on the command
//! line. Every per-job path is absolute; pdf2htmlEX is pointed at the work
//! directory with `--dest-dir`.

use crate::config::RenderConfig;
use crate::error::PdfItError;
use crate::pipeline::workspace::Workspace;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Longest stderr excerpt carried in an error.
const STDERR_LIMIT: usize = 4096;

/// Direction of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConversionKind {
    PdfToHtml,
    HtmlToPdf,
}

impl fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionKind::PdfToHtml => f.write_str("PDF→HTML"),
            ConversionKind::HtmlToPdf => f.write_str("HTML→PDF"),
        }
    }
}

/// One external-process invocation.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub kind: ConversionKind,
    pub program: String,
    pub args: Vec<String>,
    pub expected_output: PathBuf,
}

/// A successful conversion.
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub kind: ConversionKind,
    pub exit_code: i32,
    /// Captured stderr; converters log progress and warnings there.
    pub stderr: String,
    pub output_bytes: u64,
    pub duration: Duration,
}

impl ConversionJob {
    /// `<program> <args…> --dest-dir <work dir> --zoom <zoom> <template.pdf>`
    ///
    /// pdf2htmlEX names its output after the input, so the HTML lands next
    /// to the template as `<id>.html`.
    pub fn pdf_to_html(config: &RenderConfig, workspace: &Workspace) -> Self {
        let mut args = config.pdf_to_html.args.clone();
        args.push("--dest-dir".into());
        args.push(workspace.root().display().to_string());
        args.push("--zoom".into());
        args.push(config.zoom.to_string());
        args.push(workspace.template_pdf().display().to_string());
        Self {
            kind: ConversionKind::PdfToHtml,
            program: config.pdf_to_html.program.clone(),
            args,
            expected_output: workspace.html().to_path_buf(),
        }
    }

    /// `<program> <args…> <page.html> <output.pdf> format=… orientation=… margin=…`
    pub fn html_to_pdf(config: &RenderConfig, workspace: &Workspace) -> Self {
        let mut args = config.html_to_pdf.args.clone();
        args.push(workspace.html().display().to_string());
        args.push(workspace.output_pdf().display().to_string());
        args.extend(config.page.to_args());
        Self {
            kind: ConversionKind::HtmlToPdf,
            program: config.html_to_pdf.program.clone(),
            args,
            expected_output: workspace.output_pdf().to_path_buf(),
        }
    }

    /// Run the converter and wait for it to exit, killing it after `timeout`.
    ///
    /// Succeeds only when the exit status is zero and the expected output
    /// file exists and is non-empty.
    pub async fn run(&self, timeout: Duration) -> Result<ConversionOutcome, PdfItError> {
        let start = Instant::now();
        info!("Running {} converter: {} {}", self.kind, self.program, self.args.join(" "));

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PdfItError::ConversionFailed {
                stage: self.kind,
                exit_code: None,
                stderr: format!("failed to launch '{}': {}", self.program, e),
            })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| PdfItError::ConversionFailed {
                stage: self.kind,
                exit_code: None,
                stderr: format!("failed waiting for '{}': {}", self.program, e),
            })?,
            Err(_) => {
                warn!("{} converter exceeded {:?}, killed", self.kind, timeout);
                return Err(PdfItError::ConversionTimeout {
                    stage: self.kind,
                    secs: timeout.as_secs(),
                });
            }
        };

        let stderr = truncate_stderr(&String::from_utf8_lossy(&output.stderr));
        let duration = start.elapsed();

        if !output.status.success() {
            return Err(PdfItError::ConversionFailed {
                stage: self.kind,
                exit_code: output.status.code(),
                stderr,
            });
        }

        let output_bytes = non_empty_len(&self.expected_output).await;
        if output_bytes == 0 {
            return Err(PdfItError::ConversionFailed {
                stage: self.kind,
                exit_code: output.status.code(),
                stderr: format!(
                    "converter exited successfully but produced no output at '{}'\n{}",
                    self.expected_output.display(),
                    stderr
                ),
            });
        }

        debug!(
            "{} conversion wrote {} bytes in {:?}",
            self.kind, output_bytes, duration
        );
        Ok(ConversionOutcome {
            kind: self.kind,
            exit_code: output.status.code().unwrap_or(0),
            stderr,
            output_bytes,
            duration,
        })
    }
}

/// Size of `path`, or 0 when it is missing.
async fn non_empty_len(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|m| if m.is_file() { m.len() } else { 0 })
        .unwrap_or(0)
}

fn truncate_stderr(s: &str) -> String {
    let s = s.trim();
    if s.len() <= STDERR_LIMIT {
        return s.to_string();
    }
    let mut cut = STDERR_LIMIT;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\u{2026}", &s[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConverterCommand, Orientation, PageOptions};

    #[test]
    fn pdf_to_html_arguments() {
        let config = RenderConfig::default();
        let ws = Workspace::allocate("/tmp/pdfit");
        let job = ConversionJob::pdf_to_html(&config, &ws);

        assert_eq!(job.kind, ConversionKind::PdfToHtml);
        assert_eq!(job.program, "pdf2htmlEX");
        assert_eq!(
            job.args,
            vec![
                "--dest-dir".to_string(),
                "/tmp/pdfit".to_string(),
                "--zoom".to_string(),
                "1.4".to_string(),
                ws.template_pdf().display().to_string()
            ]
        );
        assert_eq!(job.expected_output, ws.html());
    }

    #[test]
    fn html_to_pdf_arguments() {
        let config = RenderConfig::builder()
            .html_to_pdf(ConverterCommand::new("phantomjs").arg("/opt/rasterize.js"))
            .page(PageOptions {
                format: "Letter".into(),
                orientation: Orientation::Landscape,
                margin: "2cm".into(),
            })
            .build()
            .unwrap();
        let ws = Workspace::allocate("/tmp/pdfit");
        let job = ConversionJob::html_to_pdf(&config, &ws);

        assert_eq!(job.program, "phantomjs");
        assert_eq!(
            job.args,
            vec![
                "/opt/rasterize.js".to_string(),
                ws.html().display().to_string(),
                ws.output_pdf().display().to_string(),
                "format=Letter".to_string(),
                "orientation=landscape".to_string(),
                "margin=2cm".to_string(),
            ]
        );
        assert_eq!(job.expected_output, ws.output_pdf());
    }

    #[test]
    fn stderr_truncated_on_char_boundary() {
        let long = "é".repeat(STDERR_LIMIT);
        let cut = truncate_stderr(&long);
        assert!(cut.ends_with('\u{2026}'));
        assert!(cut.len() <= STDERR_LIMIT + '\u{2026}'.len_utf8());
        assert_eq!(truncate_stderr("  short\n"), "short");
    }

    #[tokio::test]
    async fn missing_program_is_conversion_failure() {
        let job = ConversionJob {
            kind: ConversionKind::PdfToHtml,
            program: "pdfit-no-such-converter".into(),
            args: vec![],
            expected_output: std::env::temp_dir().join("never.html"),
        };
        let err = job.run(Duration::from_secs(5)).await.unwrap_err();
        match err {
            PdfItError::ConversionFailed {
                stage, exit_code, stderr,
            } => {
                assert_eq!(stage, ConversionKind::PdfToHtml);
                assert_eq!(exit_code, None);
                assert!(stderr.contains("pdfit-no-such-converter"), "got: {stderr}");
            }
            other => panic!("expected ConversionFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use tempfile::TempDir;

        /// `sh -c SCRIPT converter <dir>`; scripts address files through `$1`.
        fn sh_job(dir: &Path, script: &str, output: &str) -> ConversionJob {
            ConversionJob {
                kind: ConversionKind::HtmlToPdf,
                program: "sh".into(),
                args: vec![
                    "-c".into(),
                    script.into(),
                    "converter".into(),
                    dir.display().to_string(),
                ],
                expected_output: dir.join(output),
            }
        }

        #[tokio::test]
        async fn success_requires_output_file() {
            let dir = TempDir::new().unwrap();
            let job = sh_job(
                dir.path(),
                r#"printf '%%PDF-1.4' > "$1/out.pdf"; echo done >&2"#,
                "out.pdf",
            );
            let outcome = job.run(Duration::from_secs(10)).await.unwrap();
            assert_eq!(outcome.exit_code, 0);
            assert_eq!(outcome.output_bytes, 8);
            assert_eq!(outcome.stderr, "done");
        }

        #[tokio::test]
        async fn non_zero_exit_carries_code_and_stderr() {
            let dir = TempDir::new().unwrap();
            let job = sh_job(dir.path(), "echo 'Error: cannot open page' >&2; exit 3", "out.pdf");
            let err = job.run(Duration::from_secs(10)).await.unwrap_err();
            match err {
                PdfItError::ConversionFailed {
                    exit_code, stderr, ..
                } => {
                    assert_eq!(exit_code, Some(3));
                    assert_eq!(stderr, "Error: cannot open page");
                }
                other => panic!("expected ConversionFailed, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn zero_exit_without_output_fails() {
            let dir = TempDir::new().unwrap();
            let job = sh_job(dir.path(), r#": > "$1/out.pdf""#, "out.pdf");
            let err = job.run(Duration::from_secs(10)).await.unwrap_err();
            assert!(
                matches!(err, PdfItError::ConversionFailed { exit_code: Some(0), .. }),
                "got {err:?}"
            );
        }

        #[tokio::test]
        async fn timeout_kills_the_converter() {
            let dir = TempDir::new().unwrap();
            let pid_file = dir.path().join("pid");
            let job = sh_job(dir.path(), r#"echo $$ > "$1/pid"; exec sleep 30"#, "out.pdf");

            let start = Instant::now();
            let err = job.run(Duration::from_secs(1)).await.unwrap_err();
            assert!(matches!(err, PdfItError::ConversionTimeout { secs: 1, .. }));
            assert!(start.elapsed() < Duration::from_secs(10));

            let pid = std::fs::read_to_string(&pid_file).unwrap();
            assert!(
                wait_until_gone(pid.trim()).await,
                "converter {} still running",
                pid.trim()
            );
        }

        /// True once `/proc/<pid>` is gone or the process is a zombie.
        async fn wait_until_gone(pid: &str) -> bool {
            for _ in 0..50 {
                match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
                    Err(_) => return true,
                    Ok(stat) => {
                        let state = stat.rsplit(')').next().and_then(|s| s.split_whitespace().next());
                        if state == Some("Z") || state == Some("X") {
                            return true;
                        }
                    }
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            // Without procfs there is nothing to inspect.
            !Path::new("/proc/self").exists()
        }
    }
}
