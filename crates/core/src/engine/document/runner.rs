//! Launches pandoc.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// How a pandoc process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PandocExit {
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stderr: String,
}

impl PandocExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs pandoc with arguments inside a working directory.
#[async_trait]
pub trait PandocRunner: Send + Sync {
    async fn run(&self, args: &[String], workdir: &Path) -> std::io::Result<PandocExit>;

    /// Returns the `pandoc --version` banner.
    async fn version(&self) -> std::io::Result<String>;
}

/// Spawns the configured pandoc binary.
pub struct ProcessRunner {
    pandoc_path: PathBuf,
}

impl ProcessRunner {
    pub fn new(pandoc_path: impl Into<PathBuf>) -> Self {
        Self {
            pandoc_path: pandoc_path.into(),
        }
    }
}

#[async_trait]
impl PandocRunner for ProcessRunner {
    async fn run(&self, args: &[String], workdir: &Path) -> std::io::Result<PandocExit> {
        let output = Command::new(&self.pandoc_path)
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(PandocExit {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn version(&self) -> std::io::Result<String> {
        let output = Command::new(&self.pandoc_path)
            .arg("--version")
            .kill_on_drop(true)
            .output()
            .await?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "pandoc --version exited with {:?}",
                output.status.code()
            )));
        }
        let banner = String::from_utf8_lossy(&output.stdout);
        Ok(banner.lines().next().unwrap_or_default().to_string())
    }
}

/// Pandoc's error kind for a process exit code.
pub fn error_kind_for_exit(code: Option<i32>) -> &'static str {
    match code {
        Some(3) => "PandocFailOnWarningError",
        Some(4) => "PandocAppError",
        Some(5) => "PandocTemplateError",
        Some(6) => "PandocOptionError",
        Some(21) => "PandocUnknownReaderError",
        Some(22) => "PandocUnknownWriterError",
        Some(23) => "PandocUnsupportedExtensionError",
        Some(24) => "PandocCiteprocError",
        Some(25) => "PandocBibliographyError",
        Some(31) => "PandocEpubSubdirectoryError",
        Some(43) => "PandocPDFError",
        Some(44) => "PandocXMLError",
        Some(47) => "PandocPDFProgramNotFoundError",
        Some(61) => "PandocHttpError",
        Some(62) => "PandocShouldNeverHappenError",
        Some(63) => "PandocSomeError",
        Some(64) => "PandocParseError",
        Some(66) => "PandocMakePDFError",
        Some(67) => "PandocSyntaxMapError",
        Some(83) => "PandocFilterError",
        Some(84) => "PandocLuaError",
        Some(89) => "PandocNoScriptingEngine",
        Some(91) => "PandocMacroLoop",
        Some(92) => "PandocUTF8DecodingError",
        Some(93) => "PandocIpynbDecodingError",
        Some(94) => "PandocUnsupportedCharsetError",
        Some(97) => "PandocCouldNotFindDataFileError",
        Some(98) => "PandocCouldNotFindMetadataFileError",
        Some(99) => "PandocResourceNotFound",
        Some(_) => "PandocError",
        None => "PandocKilled",
    }
}
