//! Edit pipelines.
//!
//! Each pipeline is a fixed sequence of engine invocations over staged files:
//! download the source, transform it, publish the result. A failing step
//! aborts the sequence; staged files are always released afterwards.

pub mod autoflip;
pub mod remove_segment;
pub mod trim;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use vedit_media::{
    remove_if_exists, script_providers, CenterCropReframer, Downloader, MediaEngine,
    ReframeProvider, StagingArea,
};
use vedit_models::{sanitize_output_name, EditOperation, Job};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Progress of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Start,
    Downloading,
    /// Engine step `step` of `total`
    Transforming { step: usize, total: usize },
    Complete,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Start => f.write_str("start"),
            PipelineStage::Downloading => f.write_str("downloading"),
            PipelineStage::Transforming { step, total } => {
                write!(f, "transforming ({}/{})", step, total)
            }
            PipelineStage::Complete => f.write_str("complete"),
            PipelineStage::Failed => f.write_str("failed"),
        }
    }
}

/// Shared resources for pipeline runs.
pub struct PipelineContext {
    pub config: WorkerConfig,
    pub engine: Arc<dyn MediaEngine>,
    pub downloader: Downloader,
    pub reframers: Vec<Arc<dyn ReframeProvider>>,
    pub fallback: Arc<dyn ReframeProvider>,
}

impl PipelineContext {
    pub fn new(config: WorkerConfig, engine: Arc<dyn MediaEngine>) -> Self {
        let downloader = Downloader::new(config.download_timeout);
        let reframers = script_providers(config.reframe_scripts.clone());
        Self {
            config,
            engine,
            downloader,
            reframers,
            fallback: Arc::new(CenterCropReframer),
        }
    }

    /// Replace the reframe provider list.
    pub fn with_reframers(mut self, reframers: Vec<Arc<dyn ReframeProvider>>) -> Self {
        self.reframers = reframers;
        self
    }

    /// Published location of an artifact.
    pub fn output_path(&self, output_name: &str) -> WorkerResult<PathBuf> {
        let name = sanitize_output_name(output_name)
            .ok_or_else(|| WorkerError::validation(format!("Invalid output name '{}'", output_name)))?;
        Ok(self.config.output_dir.join(name))
    }
}

/// Run the pipeline for `job` under the job time limit.
///
/// Returns the published artifact name.
pub async fn run_pipeline(
    ctx: &PipelineContext,
    job: &Job,
    logger: &JobLogger,
) -> WorkerResult<String> {
    logger.log_stage(PipelineStage::Start);

    let output = ctx.output_path(job.operation.output_name())?;
    let mut staging = StagingArea::create(&ctx.config.work_dir, job.id.as_str()).await?;

    let steps = dispatch(ctx, &mut staging, &job.operation, &output, logger);
    let result = match tokio::time::timeout(ctx.config.job_timeout, steps).await {
        Ok(result) => result,
        Err(_) => Err(WorkerError::JobTimeout(ctx.config.job_timeout.as_secs())),
    };

    staging.release_all().await;

    match result {
        Ok(()) => {
            logger.log_stage(PipelineStage::Complete);
            let name = output
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(name)
        }
        Err(e) => {
            // A publish cut short by the time limit leaves its copy behind
            if let Some(name) = output.file_name() {
                let mut partial = name.to_os_string();
                partial.push(".partial");
                if let Err(cleanup) = remove_if_exists(output.with_file_name(partial)).await {
                    logger.log_warning(&format!("partial output not removed: {}", cleanup));
                }
            }
            logger.log_stage(PipelineStage::Failed);
            logger.log_error(&e.to_string());
            Err(e)
        }
    }
}

async fn dispatch(
    ctx: &PipelineContext,
    staging: &mut StagingArea,
    operation: &EditOperation,
    output: &std::path::Path,
    logger: &JobLogger,
) -> WorkerResult<()> {
    match operation {
        EditOperation::Trim(params) => trim::run(ctx, staging, params, output, logger).await,
        EditOperation::RemoveSegment(params) => {
            remove_segment::run(ctx, staging, params, output, logger).await
        }
        EditOperation::Autoflip(params) => {
            autoflip::run(ctx, staging, params, output, logger).await
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fake engine for pipeline and executor tests.

    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;
    use vedit_media::{EngineOutput, Invocation, MediaEngine, MediaError, MediaResult};

    use super::PipelineContext;
    use crate::config::WorkerConfig;

    /// Records invocations and writes a small file at each output path.
    pub struct FakeEngine {
        pub calls: Mutex<Vec<Invocation>>,
        /// Probed duration in seconds
        pub duration: f64,
        /// Program whose runs fail with exit status 1
        pub fail_program: Option<String>,
        /// Delay applied to every run
        pub delay: Duration,
    }

    impl FakeEngine {
        pub fn new(duration: f64) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                duration,
                fail_program: None,
                delay: Duration::ZERO,
            }
        }

        pub fn failing(program: &str) -> Self {
            Self {
                fail_program: Some(program.to_string()),
                ..Self::new(60.0)
            }
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        pub fn programs(&self) -> Vec<String> {
            self.calls().into_iter().map(|c| c.program).collect()
        }

        fn output_of(inv: &Invocation) -> Option<PathBuf> {
            if inv.program == "bash" {
                let pos = inv.args.iter().position(|a| a == "-o")?;
                inv.args.get(pos + 1).map(PathBuf::from)
            } else {
                inv.last_arg().map(PathBuf::from)
            }
        }
    }

    #[async_trait]
    impl MediaEngine for FakeEngine {
        async fn run(&self, invocation: &Invocation, _timeout: Duration) -> MediaResult<EngineOutput> {
            self.calls.lock().unwrap().push(invocation.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            if self.fail_program.as_deref() == Some(invocation.program.as_str()) {
                return Err(MediaError::engine_failed(
                    invocation.program.clone(),
                    "Invalid data found when processing input",
                    Some(1),
                ));
            }

            if invocation.program == "ffprobe" {
                let stdout = format!(
                    r#"{{"streams":[{{"codec_type":"video","codec_name":"h264","width":1920,"height":1080}}],"format":{{"duration":"{}"}}}}"#,
                    self.duration
                );
                return Ok(EngineOutput {
                    stdout,
                    stderr: String::new(),
                });
            }

            if let Some(out) = Self::output_of(invocation) {
                std::fs::write(&out, format!("{}\n", invocation))?;
            }
            Ok(EngineOutput::default())
        }
    }

    /// Scratch directories plus a local source video.
    pub struct Sandbox {
        pub dir: TempDir,
        pub source_url: String,
    }

    impl Sandbox {
        pub fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let source = dir.path().join("source.mp4");
            std::fs::write(&source, b"source video").unwrap();
            let source_url = url::Url::from_file_path(&source).unwrap().to_string();
            Self { dir, source_url }
        }

        pub fn config(&self) -> WorkerConfig {
            WorkerConfig {
                work_dir: self.work_dir(),
                output_dir: self.output_dir(),
                reframe_scripts: Vec::new(),
                ..WorkerConfig::default()
            }
        }

        pub fn context(&self, engine: Arc<FakeEngine>) -> PipelineContext {
            PipelineContext::new(self.config(), engine)
        }

        pub fn work_dir(&self) -> PathBuf {
            self.dir.path().join("work")
        }

        pub fn output_dir(&self) -> PathBuf {
            self.dir.path().join("processed")
        }

        pub fn staged_files(&self) -> usize {
            count_files(&self.work_dir())
        }
    }

    pub fn count_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeEngine, Sandbox};
    use super::*;
    use std::time::Duration;
    use vedit_models::{EditKind, FailureKind, TrimParams};

    fn trim_job(url: &str, output_name: &str) -> Job {
        Job::new(EditOperation::Trim(TrimParams {
            input_url: url.to_string(),
            start: "00:00:02".to_string(),
            end: "00:00:04".to_string(),
            output_name: output_name.to_string(),
        }))
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(PipelineStage::Downloading.to_string(), "downloading");
        assert_eq!(
            PipelineStage::Transforming { step: 2, total: 3 }.to_string(),
            "transforming (2/3)"
        );
    }

    #[tokio::test]
    async fn test_output_path_stays_in_output_dir() {
        let sandbox = Sandbox::new();
        let ctx = sandbox.context(Arc::new(FakeEngine::new(10.0)));

        let path = ctx.output_path("../../etc/passwd").unwrap();
        assert_eq!(path.parent().unwrap(), sandbox.output_dir());
        assert!(ctx.output_path("///").is_err());
    }

    #[tokio::test]
    async fn test_job_timeout_releases_staging() {
        let sandbox = Sandbox::new();
        let engine = Arc::new(FakeEngine {
            delay: Duration::from_secs(5),
            ..FakeEngine::new(10.0)
        });
        let mut config = sandbox.config();
        config.job_timeout = Duration::from_millis(100);
        let ctx = PipelineContext::new(config, engine);

        let job = trim_job(&sandbox.source_url, "slow.mp4");
        let logger = JobLogger::new(&job.id, EditKind::Trim);
        let err = run_pipeline(&ctx, &job, &logger).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Timeout);
        assert_eq!(sandbox.staged_files(), 0);
        assert!(!sandbox.output_dir().join("slow.mp4").exists());
    }
}
