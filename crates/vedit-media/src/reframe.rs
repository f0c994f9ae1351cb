//! Reframe providers for aspect-ratio conversion.
//!
//! An external script is preferred when one is installed; otherwise a
//! center crop computed by ffmpeg is used. Providers only build the
//! invocation, the pipeline runs it through the engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vedit_models::AspectRatio;

use crate::command::FfmpegCommand;
use crate::engine::Invocation;

/// Script locations probed when none are configured, in priority order.
pub const DEFAULT_REFRAME_SCRIPTS: &[&str] = &["/app/reframe.sh", "/app/run.sh", "/app/autoflip.sh"];

/// Parameters for one reframe.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReframeRequest {
    pub aspect_ratio: AspectRatio,
    /// Verbose engine output
    pub debug: bool,
}

/// Something that can convert a video to a target aspect ratio.
pub trait ReframeProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> String;

    /// Whether the provider can be used on this host right now.
    fn is_available(&self) -> bool;

    fn invocation(&self, input: &Path, output: &Path, request: &ReframeRequest) -> Invocation;
}

/// External script run through `bash <script> -i <in> -o <out> -a <W:H>`.
#[derive(Debug, Clone)]
pub struct ScriptReframer {
    script: PathBuf,
}

impl ScriptReframer {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }
}

impl ReframeProvider for ScriptReframer {
    fn name(&self) -> String {
        self.script.display().to_string()
    }

    fn is_available(&self) -> bool {
        self.script.is_file()
    }

    fn invocation(&self, input: &Path, output: &Path, request: &ReframeRequest) -> Invocation {
        Invocation::new("bash")
            .arg(self.script.to_string_lossy())
            .arg("-i")
            .arg(input.to_string_lossy())
            .arg("-o")
            .arg(output.to_string_lossy())
            .arg("-a")
            .arg(request.aspect_ratio.to_string())
    }
}

/// Deterministic ffmpeg center crop; always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct CenterCropReframer;

impl ReframeProvider for CenterCropReframer {
    fn name(&self) -> String {
        "center-crop".to_string()
    }

    fn is_available(&self) -> bool {
        true
    }

    fn invocation(&self, input: &Path, output: &Path, request: &ReframeRequest) -> Invocation {
        let level = if request.debug { "info" } else { "error" };
        FfmpegCommand::new(input, output)
            .log_level(level)
            .video_filter(request.aspect_ratio.center_crop_filter())
            .audio_codec("copy")
            .invocation()
    }
}

/// Pick the first available provider, or `fallback` when none is.
pub fn select_provider<'a>(
    providers: &'a [Arc<dyn ReframeProvider>],
    fallback: &'a dyn ReframeProvider,
) -> &'a dyn ReframeProvider {
    providers
        .iter()
        .find(|p| p.is_available())
        .map(|p| p.as_ref())
        .unwrap_or(fallback)
}

/// Script providers for the given paths, preserving order.
pub fn script_providers<I, P>(scripts: I) -> Vec<Arc<dyn ReframeProvider>>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    scripts
        .into_iter()
        .map(|p| Arc::new(ScriptReframer::new(p)) as Arc<dyn ReframeProvider>)
        .collect()
}
