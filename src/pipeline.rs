//! Cleaning pipeline orchestration
//!
//! Runs the stages in order: fetch, enhance, then diarise if a diarizer is
//! available, and finally publish `debate_clean.wav` into the work dir.
//! Intermediates live in a scratch directory that is removed when the run
//! ends, unless the caller asked to keep them.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::audio_util::move_file;
use crate::config::{DiarizationSettings, PipelineConfig};
use crate::diarize::Diarizer;
use crate::enhance::Enhancer;
use crate::error::PipelineError;
use crate::fetch::{AudioFetcher, RAW_AUDIO_FILE};

/// Name of the published result inside the work dir
pub const FINAL_FILE: &str = "debate_clean.wav";

/// Name of the enhancement output
pub const ENHANCED_FILE: &str = "enhanced.wav";

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Fetched,
    Enhanced,
    Diarized,
    Skipped,
    Finalized,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Fetched => "fetched",
            Stage::Enhanced => "enhanced",
            Stage::Diarized => "diarized",
            Stage::Skipped => "diarisation skipped",
            Stage::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Box<dyn AudioFetcher>,
    enhancer: Box<dyn Enhancer>,
    diarizer: Option<Box<dyn Diarizer>>,
}

impl Pipeline {
    /// Assemble a pipeline from already-constructed backends. Creates the
    /// work dir.
    pub fn new(
        config: PipelineConfig,
        fetcher: Box<dyn AudioFetcher>,
        enhancer: Box<dyn Enhancer>,
        diarizer: Option<Box<dyn Diarizer>>,
    ) -> Result<Self, PipelineError> {
        std::fs::create_dir_all(&config.work_dir)?;
        Ok(Self {
            config,
            fetcher,
            enhancer,
            diarizer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Clean the audio behind `url`, keeping intermediates as configured.
    pub fn clean(&self, url: &str) -> Result<PathBuf, PipelineError> {
        self.clean_with(url, self.config.keep_intermediates)
    }

    /// Clean the audio behind `url` and return the path of the final WAV.
    pub fn clean_with(
        &self,
        url: &str,
        keep_intermediates: bool,
    ) -> Result<PathBuf, PipelineError> {
        let work_dir = self.config.work_dir.as_path();
        let final_path = work_dir.join(FINAL_FILE);
        let mut stage = Stage::Init;
        log::info!("Cleaning {} -> {:?}", url, work_dir);

        let scratch = tempfile::Builder::new()
            .prefix(".debate-clean-")
            .tempdir_in(work_dir)?;

        let raw = self.fetcher.fetch(url, scratch.path())?;
        advance(&mut stage, Stage::Fetched);

        let enhanced = scratch.path().join(ENHANCED_FILE);
        self.enhancer.enhance(&raw, &enhanced)?;
        advance(&mut stage, Stage::Enhanced);

        match &self.diarizer {
            Some(diarizer) => {
                self.diarize(diarizer.as_ref(), &enhanced, &final_path, &mut stage)?
            }
            None => {
                log::info!("No diarizer configured, publishing enhanced audio");
                advance(&mut stage, Stage::Skipped);
            }
        }

        if stage == Stage::Skipped {
            move_file(&enhanced, &final_path)?;
        }

        if keep_intermediates {
            keep(&raw, &work_dir.join(RAW_AUDIO_FILE))?;
            if enhanced.exists() {
                keep(&enhanced, &work_dir.join(ENHANCED_FILE))?;
            }
        }

        advance(&mut stage, Stage::Finalized);
        log::info!("Clean audio -> {:?}", final_path);
        Ok(final_path)
    }

    fn diarize(
        &self,
        diarizer: &dyn Diarizer,
        enhanced: &Path,
        final_path: &Path,
        stage: &mut Stage,
    ) -> Result<(), PipelineError> {
        let k = self
            .config
            .diarization
            .as_ref()
            .map(|d| d.num_speakers)
            .unwrap_or_else(|| DiarizationSettings::default().num_speakers);

        match diarizer.filter_top_speakers(enhanced, final_path, k) {
            Ok(()) => {
                advance(stage, Stage::Diarized);
                Ok(())
            }
            Err(e) if e.is_unavailable() => {
                log::warn!("Diarisation unavailable ({}), keeping enhanced audio", e);
                advance(stage, Stage::Skipped);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    log::info!("Stage: {} -> {}", stage, next);
    *stage = next;
}

fn keep(from: &Path, to: &Path) -> Result<(), PipelineError> {
    std::fs::copy(from, to)?;
    log::info!("Kept intermediate -> {:?}", to);
    Ok(())
}
