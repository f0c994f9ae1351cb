//! FFmpeg CLI wrapper for the vedit worker.
//!
//! This crate provides:
//! - A subprocess media engine with timeouts and captured diagnostics
//! - Type-safe FFmpeg/FFprobe command building
//! - Source download and per-job staging of scratch files
//! - Reframe providers (external scripts with a center-crop fallback)

pub mod command;
pub mod download;
pub mod engine;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod reframe;
pub mod staging;

pub use command::{concat_list_contents, ffprobe_json, FfmpegCommand};
pub use download::{Downloader, DEFAULT_DOWNLOAD_TIMEOUT};
pub use engine::{check_program, EngineOutput, Invocation, MediaEngine, ProcessEngine};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{move_file, remove_if_exists};
pub use probe::{probe_video, VideoInfo};
pub use reframe::{
    script_providers, select_provider, CenterCropReframer, ReframeProvider, ReframeRequest,
    ScriptReframer, DEFAULT_REFRAME_SCRIPTS,
};
pub use staging::{publish, StagingArea};
