//! Debate audio cleaning
//!
//! Downloads the audio track of a video, removes crowd and background noise
//! with a speech-enhancement backend, and optionally keeps only the most
//! prominent speakers using diarisation.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`fetch`] | Audio download via yt-dlp |
//! | [`enhance`] | Speech-enhancement backends |
//! | [`diarize`] | Speaker diarisation and top-K speaker masking |
//! | [`pipeline`] | Stage orchestration |
//! | [`config`] | JSON pipeline configuration |

pub mod audio_util;
pub mod config;
pub mod diarize;
pub mod enhance;
pub mod error;
pub mod fetch;
pub mod pipeline;

pub use config::{Device, EnhancerKind, PipelineConfig};
pub use error::PipelineError;
pub use pipeline::{Pipeline, Stage};
