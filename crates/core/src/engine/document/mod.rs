//! Document engine backed by pandoc.
//!
//! One pandoc process per request, run inside a scratch directory that is
//! removed afterwards. Embedded media pulled out of office formats travel
//! with the document in a zip.

mod formats;
mod runner;

pub use formats::{descriptors, extracts_media, pandoc_name, EXTENSIONS};
pub use runner::{error_kind_for_exit, PandocExit, PandocRunner, ProcessRunner};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::archive::zip_entries;
use super::dispatch::WorkerDispatcher;
use super::error::EngineError;
use super::status::{EngineStatus, StatusCell};
use super::traits::EngineAdapter;
use super::types::{ConversionJob, ConvertedFile, EngineKind, ProgressSink};
use crate::channel::{WorkerEvents, WorkerFailure, WorkerHandler, WorkerMessage, WorkerOutput};
use crate::config::DocumentEngineConfig;
use crate::format::FormatDescriptor;

pub const ENGINE_ID: &str = "pandoc";

const MEDIA_DIR: &str = "media";

pub const FOREIGN_JSON_MESSAGE: &str = "This JSON file is not a pandoc-converted JSON file. \
It must be converted with pandoc / Convertino to be converted again.";

/// Worker that runs one pandoc process per request.
pub struct DocumentWorker {
    runner: Arc<dyn PandocRunner>,
    temp_dir: PathBuf,
}

impl DocumentWorker {
    pub fn new(runner: Arc<dyn PandocRunner>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            temp_dir: temp_dir.into(),
        }
    }
}

/// Pandoc arguments for one conversion, relative to the scratch directory.
pub fn pandoc_args(from: &str, to: &str, input: &str, output: &str) -> Vec<String> {
    let mut args = vec![
        "--from".to_string(),
        pandoc_name(from).to_string(),
        "--to".to_string(),
        pandoc_name(to).to_string(),
        "--standalone".to_string(),
    ];
    if extracts_media(from, to) {
        args.push(format!("--extract-media={}", MEDIA_DIR));
    }
    args.extend(["-o".to_string(), output.to_string(), input.to_string()]);
    args
}

#[async_trait]
impl WorkerHandler for DocumentWorker {
    async fn handle(
        &self,
        message: WorkerMessage,
        _events: WorkerEvents,
    ) -> Result<WorkerOutput, WorkerFailure> {
        let WorkerMessage::Convert { input, to, .. } = message;

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("pandoc-")
            .tempdir_in(&self.temp_dir)?;

        let input_name = format!("input{}", input.from);
        let output_name = format!("output{}", to);
        tokio::fs::write(scratch.path().join(&input_name), &*input.bytes).await?;

        let args = pandoc_args(&input.from, &to, &input_name, &output_name);
        debug!(?args, "Running pandoc");
        let exit = self.runner.run(&args, scratch.path()).await?;
        if !exit.success() {
            let message = if exit.stderr.is_empty() {
                format!("pandoc exited with {:?}", exit.code)
            } else {
                exit.stderr
            };
            return Err(WorkerFailure::new(error_kind_for_exit(exit.code), message));
        }

        let document = tokio::fs::read(scratch.path().join(&output_name))
            .await
            .map_err(|_| WorkerFailure::new("PandocError", "pandoc did not produce an output file"))?;

        let media = collect_files(&scratch.path().join(MEDIA_DIR)).await?;
        if media.is_empty() {
            return Ok(WorkerOutput::single(document));
        }

        debug!(files = media.len(), "Packing extracted media");
        let stem = match input.name.rsplit_once('.') {
            Some((stem, _)) => stem,
            None => input.name.as_str(),
        };
        let mut entries = vec![(format!("{}{}", stem, to), document)];
        entries.extend(media);
        Ok(WorkerOutput::archive(zip_entries(entries)?))
    }
}

/// Every regular file under `root`, named by its `/`-separated path
/// relative to the parent of `root`. Missing `root` yields nothing.
async fn collect_files(root: &Path) -> std::io::Result<Vec<(String, Vec<u8>)>> {
    let mut files = Vec::new();
    if !tokio::fs::try_exists(root).await? {
        return Ok(files);
    }

    let base = root.parent().unwrap_or(root);
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                stack.push(path);
                continue;
            }
            let relative = path.strip_prefix(base).unwrap_or(path.as_path());
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((name, tokio::fs::read(&path).await?));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Replaces recognized pandoc failures with user-facing messages.
pub fn describe_failure(err: EngineError, from: &str, to: &str) -> EngineError {
    let EngineError::Conversion { kind, message } = err else {
        return err;
    };
    match kind.as_str() {
        "PandocUnknownReaderError" => EngineError::rejected(
            kind,
            format!("{} is not a supported input format for documents.", from),
        ),
        "PandocUnknownWriterError" => EngineError::rejected(
            kind,
            format!("{} is not a supported output format for documents.", to),
        ),
        "PandocParseError" if message.contains("JSON missing pandoc-api-version") => {
            EngineError::rejected(kind, FOREIGN_JSON_MESSAGE)
        }
        _ => EngineError::Conversion { kind, message },
    }
}

/// Document adapter backed by [`DocumentWorker`].
pub struct DocumentAdapter {
    formats: Vec<FormatDescriptor>,
    status: StatusCell,
    runner: Arc<dyn PandocRunner>,
    dispatcher: WorkerDispatcher,
}

impl DocumentAdapter {
    pub fn new(config: &DocumentEngineConfig) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner::new(&config.pandoc_path)))
    }

    pub fn with_runner(config: &DocumentEngineConfig, runner: Arc<dyn PandocRunner>) -> Self {
        let worker = DocumentWorker::new(Arc::clone(&runner), &config.temp_dir);
        Self {
            formats: descriptors(),
            status: StatusCell::new(),
            runner,
            dispatcher: WorkerDispatcher::new(
                ENGINE_ID,
                Arc::new(worker),
                Duration::from_secs(config.timeout_secs),
            ),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.dispatcher.channel().listener_count()
    }
}

#[async_trait]
impl EngineAdapter for DocumentAdapter {
    fn id(&self) -> &str {
        ENGINE_ID
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Document
    }

    fn supported_formats(&self) -> &[FormatDescriptor] {
        &self.formats
    }

    fn reports_progress(&self) -> bool {
        false
    }

    fn status(&self) -> EngineStatus {
        self.status.get()
    }

    async fn initialize(&self) -> Result<(), EngineError> {
        match self.runner.version().await {
            Ok(version) => {
                self.status.mark_ready();
                info!(engine = ENGINE_ID, %version, "Engine ready");
                Ok(())
            }
            Err(e) => {
                let reason = format!("pandoc is not usable: {}", e);
                warn!(engine = ENGINE_ID, error = %reason, "Engine failed to start");
                self.status.mark_failed(reason.clone());
                Err(EngineError::unavailable(ENGINE_ID, reason))
            }
        }
    }

    async fn convert(
        &self,
        job: ConversionJob,
        progress: ProgressSink,
    ) -> Result<ConvertedFile, EngineError> {
        self.status.ensure_available(ENGINE_ID)?;
        if !self.can_read(&job.input.format) {
            return Err(EngineError::UnsupportedFormat {
                format: job.input.format.clone(),
            });
        }
        if !self.can_write(&job.to) {
            return Err(EngineError::UnsupportedFormat {
                format: job.to.clone(),
            });
        }

        let output = self
            .dispatcher
            .run(&job, progress)
            .await
            .map_err(|e| describe_failure(e, &job.input.format, &job.to))?;
        let format = if output.zip { ".zip" } else { job.to.as_str() };
        Ok(ConvertedFile::new(&job.input, format, output.output))
    }

    async fn cancel(&self, file_id: &str) -> Result<(), EngineError> {
        if self.dispatcher.cancel(file_id) {
            debug!(engine = ENGINE_ID, file_id, "Cancelled conversion");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::SourceFile;
    use std::io::Cursor;
    use std::sync::Mutex;
    use zip::ZipArchive;

    /// Stands in for pandoc: answers with a fixed exit and writes the
    /// output (plus optional media) on success.
    struct FakePandoc {
        exit: PandocExit,
        media: Vec<(&'static str, &'static [u8])>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FakePandoc {
        fn ok() -> Self {
            Self::exiting(0, "")
        }

        fn exiting(code: i32, stderr: &str) -> Self {
            Self {
                exit: PandocExit {
                    code: Some(code),
                    stderr: stderr.to_string(),
                },
                media: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PandocRunner for FakePandoc {
        async fn run(&self, args: &[String], workdir: &Path) -> std::io::Result<PandocExit> {
            self.calls.lock().unwrap().push(args.to_vec());
            if self.exit.success() {
                let output = args.iter().position(|a| a == "-o").map(|i| &args[i + 1]);
                if let Some(output) = output {
                    std::fs::write(workdir.join(output), b"<p>converted</p>")?;
                }
                for (name, bytes) in &self.media {
                    let path = workdir.join(MEDIA_DIR).join(name);
                    std::fs::create_dir_all(path.parent().unwrap())?;
                    std::fs::write(path, bytes)?;
                }
            }
            Ok(self.exit.clone())
        }

        async fn version(&self) -> std::io::Result<String> {
            Ok("pandoc 3.1.11".to_string())
        }
    }

    fn config(dir: &Path) -> DocumentEngineConfig {
        DocumentEngineConfig {
            temp_dir: dir.to_path_buf(),
            ..DocumentEngineConfig::default()
        }
    }

    async fn convert_with(
        runner: FakePandoc,
        name: &str,
        to: &str,
    ) -> (Result<ConvertedFile, EngineError>, Arc<FakePandoc>) {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(runner);
        let adapter = DocumentAdapter::with_runner(&config(dir.path()), runner.clone());
        adapter.initialize().await.unwrap();
        let job = ConversionJob::new("f1", SourceFile::new(name, b"# Title".to_vec()), to);
        let result = adapter.convert(job, ProgressSink::noop()).await;
        (result, runner)
    }

    #[test]
    fn test_pandoc_args() {
        let args = pandoc_args(".md", ".html", "input.md", "output.html");
        assert_eq!(
            args,
            vec![
                "--from",
                "markdown",
                "--to",
                "html",
                "--standalone",
                "-o",
                "output.html",
                "input.md"
            ]
        );
        let args = pandoc_args(".docx", ".md", "input.docx", "output.md");
        assert!(args.contains(&"--extract-media=media".to_string()));
    }

    #[tokio::test]
    async fn test_markdown_to_html() {
        let (result, runner) = convert_with(FakePandoc::ok(), "notes.md", "html").await;
        let out = result.unwrap();
        assert_eq!(out.name, "notes.html");
        assert_eq!(&*out.bytes, b"<p>converted</p>");
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_extracted_media_is_zipped() {
        let mut runner = FakePandoc::ok();
        runner.media = vec![
            ("image1.png", b"png".as_slice()),
            ("nested/image2.jpg", b"jpg".as_slice()),
        ];
        let (result, _) = convert_with(runner, "report.docx", "html").await;
        let out = result.unwrap();
        assert_eq!(out.format, ".zip");
        assert_eq!(out.name, "report.zip");

        let archive = ZipArchive::new(Cursor::new(out.bytes.to_vec())).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&"report.html"));
        assert!(names.contains(&"media/image1.png"));
        assert!(names.contains(&"media/nested/image2.jpg"));
    }

    #[tokio::test]
    async fn test_unknown_reader_message() {
        let (result, _) = convert_with(
            FakePandoc::exiting(21, "Unknown input format doc"),
            "old.doc",
            "md",
        )
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.error_kind(), "PandocUnknownReaderError");
        assert_eq!(
            err.to_string(),
            ".doc is not a supported input format for documents."
        );
    }

    #[tokio::test]
    async fn test_unknown_writer_message() {
        let (result, _) = convert_with(
            FakePandoc::exiting(22, "Unknown output format csv"),
            "table.md",
            "csv",
        )
        .await;
        assert_eq!(
            result.unwrap_err().to_string(),
            ".csv is not a supported output format for documents."
        );
    }

    #[tokio::test]
    async fn test_foreign_json_message() {
        let (result, _) = convert_with(
            FakePandoc::exiting(64, "JSON missing pandoc-api-version."),
            "data.json",
            "md",
        )
        .await;
        assert_eq!(result.unwrap_err().to_string(), FOREIGN_JSON_MESSAGE);
    }

    #[tokio::test]
    async fn test_other_kinds_keep_prefix() {
        let (result, _) =
            convert_with(FakePandoc::exiting(84, "lua boom"), "a.md", "rst").await;
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "PandocLuaError: lua boom");

        let (result, _) = convert_with(
            FakePandoc::exiting(64, "unexpected end of input"),
            "a.md",
            "rst",
        )
        .await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "PandocParseError: unexpected end of input"
        );
    }

    #[tokio::test]
    async fn test_missing_pandoc_marks_engine_failed() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = DocumentAdapter::new(&DocumentEngineConfig {
            pandoc_path: PathBuf::from("/nonexistent/convertino-pandoc"),
            temp_dir: dir.path().to_path_buf(),
            ..DocumentEngineConfig::default()
        });
        let err = adapter.initialize().await.unwrap_err();
        assert_eq!(err.error_kind(), "EngineUnavailable");
        assert!(matches!(adapter.status(), EngineStatus::Failed { .. }));
    }
}
