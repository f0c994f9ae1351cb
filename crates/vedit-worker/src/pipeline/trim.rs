//! Trim: keep a single time range of the source.

use std::path::Path;

use vedit_media::{publish, FfmpegCommand, StagingArea};
use vedit_models::{TimeRange, TrimParams};

use super::{PipelineContext, PipelineStage};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Stream-copy `range` of `input` into `output`.
pub fn trim_command(input: &Path, output: &Path, range: &TimeRange) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .seek(range.start_secs)
        .until(range.end_secs)
        .codec_copy()
}

pub async fn run(
    ctx: &PipelineContext,
    staging: &mut StagingArea,
    params: &TrimParams,
    output: &Path,
    logger: &JobLogger,
) -> WorkerResult<()> {
    let range = TimeRange::parse(&params.start, &params.end)
        .map_err(|e| WorkerError::validation(e.to_string()))?;

    logger.log_stage(PipelineStage::Downloading);
    let input = staging.download(&ctx.downloader, &params.input_url).await?;

    logger.log_stage(PipelineStage::Transforming { step: 1, total: 1 });
    let staged = staging.new_temp_path(".mp4");
    let cmd = trim_command(&input, &staged, &range);
    ctx.engine
        .run(&cmd.invocation(), ctx.config.copy_timeout)
        .await?;

    publish(&staged, output).await?;
    logger.log_completion(&format!(
        "trimmed {:.3}s into {}",
        range.duration(),
        output.display()
    ));
    Ok(())
}
