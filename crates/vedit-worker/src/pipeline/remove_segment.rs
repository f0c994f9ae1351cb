//! Segment removal: cut an internal range out and join what remains.

use std::path::{Path, PathBuf};

use vedit_media::{concat_list_contents, probe_video, publish, FfmpegCommand, StagingArea};
use vedit_models::{format_seconds, parse_timestamp, RemoveSegmentParams};

use super::{PipelineContext, PipelineStage};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// A kept part of the source, `[start, end)`; `end == None` runs to EOF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub end: Option<f64>,
}

impl Segment {
    pub fn command(&self, input: &Path, output: &Path) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(input, output);
        if self.start > 0.0 {
            cmd = cmd.seek(self.start);
        }
        if let Some(end) = self.end {
            cmd = cmd.until(end);
        }
        cmd.codec_copy()
    }
}

/// Work out which parts of a `duration`-second source survive removing
/// `[remove_start, remove_end)`.
///
/// The part before the cut is skipped when the cut starts at zero, the part
/// after it when the cut reaches EOF. Removing everything is an error.
pub fn plan_segments(remove_start: f64, remove_end: f64, duration: f64) -> WorkerResult<Vec<Segment>> {
    if remove_start >= remove_end {
        return Err(WorkerError::validation(format!(
            "remove_start ({}) must be before remove_end ({})",
            format_seconds(remove_start),
            format_seconds(remove_end)
        )));
    }

    let mut segments = Vec::with_capacity(2);
    if remove_start > 0.0 {
        segments.push(Segment {
            start: 0.0,
            end: Some(remove_start.min(duration)),
        });
    }
    if remove_end < duration {
        segments.push(Segment {
            start: remove_end,
            end: None,
        });
    }

    if segments.is_empty() {
        return Err(WorkerError::validation(format!(
            "removing {}-{} from a {} video leaves nothing",
            format_seconds(remove_start),
            format_seconds(remove_end),
            format_seconds(duration)
        )));
    }
    Ok(segments)
}

pub async fn run(
    ctx: &PipelineContext,
    staging: &mut StagingArea,
    params: &RemoveSegmentParams,
    output: &Path,
    logger: &JobLogger,
) -> WorkerResult<()> {
    let remove_start =
        parse_timestamp(&params.remove_start).map_err(|e| WorkerError::validation(e.to_string()))?;
    let remove_end =
        parse_timestamp(&params.remove_end).map_err(|e| WorkerError::validation(e.to_string()))?;
    if remove_start >= remove_end {
        return Err(WorkerError::validation(format!(
            "remove_start ({}) must be before remove_end ({})",
            params.remove_start, params.remove_end
        )));
    }

    logger.log_stage(PipelineStage::Downloading);
    let input = staging.download(&ctx.downloader, &params.input_url).await?;

    let info = probe_video(ctx.engine.as_ref(), &input, ctx.config.copy_timeout).await?;
    let segments = plan_segments(remove_start, remove_end, info.duration)?;
    let total = segments.len() + usize::from(segments.len() > 1);

    let mut parts: Vec<PathBuf> = Vec::with_capacity(segments.len());
    for (i, segment) in segments.iter().enumerate() {
        logger.log_stage(PipelineStage::Transforming { step: i + 1, total });
        let part = staging.new_temp_path(".mp4");
        ctx.engine
            .run(
                &segment.command(&input, &part).invocation(),
                ctx.config.copy_timeout,
            )
            .await?;
        parts.push(part);
    }

    let result = if let [only] = parts.as_slice() {
        logger.log_progress("single segment remains, publishing it directly");
        only.clone()
    } else {
        logger.log_stage(PipelineStage::Transforming { step: total, total });
        let list = staging
            .write_file(".txt", concat_list_contents(&parts))
            .await?;
        let joined = staging.new_temp_path(".mp4");
        let cmd = FfmpegCommand::new(&list, &joined).concat_list().codec_copy();
        ctx.engine
            .run(&cmd.invocation(), ctx.config.copy_timeout)
            .await?;
        joined
    };

    publish(&result, output).await?;
    logger.log_completion(&format!(
        "removed {}-{}, {} segment(s) kept",
        params.remove_start,
        params.remove_end,
        segments.len()
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pipeline::run_pipeline;
    use crate::pipeline::testing::{FakeEngine, Sandbox};
    use vedit_models::{EditKind, EditOperation, FailureKind, Job};

    fn job(url: &str, start: &str, end: &str) -> Job {
        Job::new(EditOperation::RemoveSegment(RemoveSegmentParams {
            input_url: url.to_string(),
            remove_start: start.to_string(),
            remove_end: end.to_string(),
            output_name: "cut.mp4".to_string(),
        }))
    }

    #[test]
    fn test_plan_interior_cut() {
        let plan = plan_segments(3.0, 5.0, 10.0).unwrap();
        assert_eq!(
            plan,
            vec![
                Segment {
                    start: 0.0,
                    end: Some(3.0)
                },
                Segment {
                    start: 5.0,
                    end: None
                },
            ]
        );
    }

    #[test]
    fn test_plan_cut_at_start_keeps_only_after() {
        let plan = plan_segments(0.0, 4.0, 10.0).unwrap();
        assert_eq!(
            plan,
            vec![Segment {
                start: 4.0,
                end: None
            }]
        );
    }

    #[test]
    fn test_plan_cut_past_end_keeps_only_before() {
        let plan = plan_segments(6.0, 15.0, 10.0).unwrap();
        assert_eq!(
            plan,
            vec![Segment {
                start: 0.0,
                end: Some(6.0)
            }]
        );
    }

    #[test]
    fn test_plan_rejects_removing_everything() {
        let err = plan_segments(0.0, 10.0, 10.0).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Validation);
    }

    #[test]
    fn test_plan_rejects_inverted_and_empty_ranges() {
        assert!(plan_segments(5.0, 3.0, 10.0).is_err());
        assert!(plan_segments(5.0, 5.0, 10.0).is_err());
    }

    #[test]
    fn test_segment_commands() {
        let before = Segment {
            start: 0.0,
            end: Some(3.0),
        }
        .command(Path::new("in.mp4"), Path::new("a.mp4"))
        .build_args()
        .join(" ");
        assert_eq!(before, "-y -v error -to 3.000 -i in.mp4 -c copy a.mp4");

        let after = Segment {
            start: 5.0,
            end: None,
        }
        .command(Path::new("in.mp4"), Path::new("b.mp4"))
        .build_args()
        .join(" ");
        assert_eq!(after, "-y -v error -ss 5.000 -i in.mp4 -c copy b.mp4");
    }

    #[tokio::test]
    async fn test_interior_cut_concatenates_two_segments() {
        let sandbox = Sandbox::new();
        let engine = Arc::new(FakeEngine::new(10.0));
        let ctx = sandbox.context(engine.clone());

        let job = job(&sandbox.source_url, "00:00:03", "00:00:05");
        let logger = JobLogger::new(&job.id, EditKind::RemoveSegment);
        run_pipeline(&ctx, &job, &logger).await.unwrap();

        assert_eq!(engine.programs(), vec!["ffprobe", "ffmpeg", "ffmpeg", "ffmpeg"]);
        let concat = engine.calls().pop().unwrap();
        assert!(concat.args.join(" ").contains("-f concat -safe 0"));
        assert!(sandbox.output_dir().join("cut.mp4").exists());
        assert_eq!(sandbox.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_cut_at_start_publishes_single_segment() {
        let sandbox = Sandbox::new();
        let engine = Arc::new(FakeEngine::new(10.0));
        let ctx = sandbox.context(engine.clone());

        let job = job(&sandbox.source_url, "00:00:00", "00:00:04");
        let logger = JobLogger::new(&job.id, EditKind::RemoveSegment);
        run_pipeline(&ctx, &job, &logger).await.unwrap();

        // No concat step
        assert_eq!(engine.programs(), vec!["ffprobe", "ffmpeg"]);
        assert!(engine.calls()[1].args.join(" ").contains("-ss 4.000"));
        assert!(sandbox.output_dir().join("cut.mp4").exists());
        assert_eq!(sandbox.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_removing_whole_video_fails_without_output() {
        let sandbox = Sandbox::new();
        let engine = Arc::new(FakeEngine::new(8.0));
        let ctx = sandbox.context(engine.clone());

        let job = job(&sandbox.source_url, "00:00:00", "00:00:09");
        let logger = JobLogger::new(&job.id, EditKind::RemoveSegment);
        let err = run_pipeline(&ctx, &job, &logger).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Validation);
        assert_eq!(engine.programs(), vec!["ffprobe"]);
        assert!(!sandbox.output_dir().join("cut.mp4").exists());
        assert_eq!(sandbox.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_equal_bounds_rejected_before_download() {
        let sandbox = Sandbox::new();
        let engine = Arc::new(FakeEngine::new(10.0));
        let ctx = sandbox.context(engine.clone());

        let job = job(&sandbox.source_url, "00:00:05", "00:00:05");
        let logger = JobLogger::new(&job.id, EditKind::RemoveSegment);
        let err = run_pipeline(&ctx, &job, &logger).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Validation);
        assert!(engine.calls().is_empty());
        assert_eq!(sandbox.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_relative_work_dir_writes_absolute_concat_entries() {
        let sandbox = Sandbox::new();
        let engine = Arc::new(FakeEngine::new(10.0));
        let relative = PathBuf::from(format!("work-rel-{}", uuid::Uuid::new_v4().simple()));
        let mut config = sandbox.config();
        config.work_dir = relative.clone();
        let ctx = PipelineContext::new(config, engine.clone());

        let job = job(&sandbox.source_url, "00:00:03", "00:00:05");
        let logger = JobLogger::new(&job.id, EditKind::RemoveSegment);
        let result = run_pipeline(&ctx, &job, &logger).await;
        std::fs::remove_dir_all(&relative).unwrap();
        result.unwrap();

        // Concat resolves list entries against the list's own directory
        let calls = engine.calls();
        for segment in &calls[1..3] {
            assert!(Path::new(segment.last_arg().unwrap()).is_absolute());
        }
        let concat = &calls[3];
        let list_pos = concat.args.iter().position(|a| a == "-i").unwrap();
        assert!(Path::new(&concat.args[list_pos + 1]).is_absolute());
        assert!(sandbox.output_dir().join("cut.mp4").exists());
    }
}
