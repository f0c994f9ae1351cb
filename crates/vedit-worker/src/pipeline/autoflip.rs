//! Autoflip: reframe the source to a target aspect ratio.

use std::path::Path;

use tracing::debug;
use vedit_media::{publish, select_provider, MediaError, ReframeRequest, StagingArea};
use vedit_models::AutoflipParams;

use super::{PipelineContext, PipelineStage};
use crate::error::WorkerResult;
use crate::logging::JobLogger;

pub async fn run(
    ctx: &PipelineContext,
    staging: &mut StagingArea,
    params: &AutoflipParams,
    output: &Path,
    logger: &JobLogger,
) -> WorkerResult<()> {
    logger.log_stage(PipelineStage::Downloading);
    let input = staging.download(&ctx.downloader, &params.input_url).await?;

    let provider = select_provider(&ctx.reframers, ctx.fallback.as_ref());
    if params.debug {
        logger.log_progress(&format!(
            "reframing to {} with {} (probed {} script(s))",
            params.aspect_ratio,
            provider.name(),
            ctx.reframers.len()
        ));
    } else {
        debug!("Reframing to {} with {}", params.aspect_ratio, provider.name());
    }

    logger.log_stage(PipelineStage::Transforming { step: 1, total: 1 });
    let request = ReframeRequest {
        aspect_ratio: params.aspect_ratio,
        debug: params.debug,
    };
    let staged = staging.new_temp_path(".mp4");
    let invocation = provider.invocation(&input, &staged, &request);
    ctx.engine
        .run(&invocation, ctx.config.reframe_timeout)
        .await?;

    // A script may exit cleanly without writing anything
    if !tokio::fs::try_exists(&staged).await.unwrap_or(false) {
        return Err(MediaError::engine_failed(
            invocation.program.clone(),
            format!("{} produced no output", provider.name()),
            Some(0),
        )
        .into());
    }

    publish(&staged, output).await?;
    logger.log_completion(&format!("reframed to {}", params.aspect_ratio));
    Ok(())
}
