use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use debate_clean::config::{Device, EnhancerKind, PipelineConfig};
use debate_clean::diarize;
use debate_clean::enhance::build_enhancer;
use debate_clean::fetch::YtDlpFetcher;
use debate_clean::{Pipeline, PipelineError};

/// Download a debate video's audio and clean it for listening
#[derive(Parser)]
#[command(name = "debate-clean", version)]
#[command(
    about = "Remove crowd noise from debate audio and keep the main speakers",
    long_about = None
)]
struct Cli {
    /// Video URL to pull the audio track from
    #[arg(value_name = "URL")]
    url: String,

    /// Output directory (default: ./output)
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Run models on CUDA
    #[arg(long)]
    gpu: bool,

    /// Skip speaker diarisation
    #[arg(long)]
    no_diar: bool,

    /// Keep raw and enhanced audio next to the result
    #[arg(long)]
    keep_intermediates: bool,

    /// Enhancement backend: rnnoise, demucs, onnx or passthrough
    #[arg(long, value_name = "NAME")]
    enhancer: Option<EnhancerKind>,

    /// Number of speakers to keep after diarisation
    #[arg(long, value_name = "K")]
    speakers: Option<usize>,

    /// ONNX restoration model (for --enhancer onnx)
    #[arg(long, value_name = "PATH")]
    onnx_model: Option<PathBuf>,

    /// JSON pipeline configuration; flags take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig, PipelineError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(out) = &self.out {
            config.work_dir = out.clone();
        }
        if self.gpu {
            config.device = Device::Cuda;
        }
        if self.keep_intermediates {
            config.keep_intermediates = true;
        }
        if let Some(kind) = self.enhancer {
            config.enhancer = kind;
        } else if config.device == Device::Cuda && config.enhancer == EnhancerKind::Rnnoise {
            // rnnoise is CPU only
            log::info!("No enhancer chosen for cuda, using {}", EnhancerKind::Demucs);
            config.enhancer = EnhancerKind::Demucs;
        }
        if let Some(path) = &self.onnx_model {
            config.onnx.model_path = Some(path.clone());
        }
        if self.no_diar {
            config.diarization = None;
        } else if let Some(k) = self.speakers {
            config.diarization.get_or_insert_with(Default::default).num_speakers = k;
        }

        Ok(config)
    }
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} | {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn run(cli: &Cli) -> Result<PathBuf, PipelineError> {
    let config = cli.pipeline_config()?;

    let fetcher = YtDlpFetcher::new(config.fetch.clone())?;
    let enhancer = build_enhancer(&config)?;
    let diarizer = config
        .diarization
        .as_ref()
        .and_then(|settings| diarize::detect(settings, config.device));

    let pipeline = Pipeline::new(config, Box::new(fetcher), enhancer, diarizer)?;
    pipeline.clean(&cli.url)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match run(&cli) {
        Ok(path) => {
            log::info!("Done: {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Processing failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "debate-clean",
            "https://youtu.be/abc",
            "--out",
            "/tmp/debate",
            "--gpu",
            "--enhancer",
            "passthrough",
            "--speakers",
            "3",
        ]);
        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.work_dir, PathBuf::from("/tmp/debate"));
        assert_eq!(config.device, Device::Cuda);
        assert_eq!(config.enhancer, EnhancerKind::Passthrough);
        assert_eq!(config.diarization.unwrap().num_speakers, 3);
    }

    #[test]
    fn test_gpu_alone_picks_cuda_capable_enhancer() {
        let cli = Cli::parse_from(["debate-clean", "https://youtu.be/abc", "--gpu"]);
        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.device, Device::Cuda);
        assert_eq!(config.enhancer, EnhancerKind::Demucs);
    }

    #[test]
    fn test_gpu_keeps_explicit_enhancer() {
        let cli = Cli::parse_from([
            "debate-clean",
            "https://youtu.be/abc",
            "--gpu",
            "--enhancer",
            "onnx",
        ]);
        assert_eq!(cli.pipeline_config().unwrap().enhancer, EnhancerKind::Onnx);
    }

    #[test]
    fn test_cpu_keeps_rnnoise_default() {
        let cli = Cli::parse_from(["debate-clean", "https://youtu.be/abc"]);
        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.enhancer, EnhancerKind::Rnnoise);
    }

    #[test]
    fn test_no_diar_drops_diarisation() {
        let cli = Cli::parse_from([
            "debate-clean",
            "https://youtu.be/abc",
            "--no-diar",
            "--speakers",
            "3",
        ]);
        assert!(cli.pipeline_config().unwrap().diarization.is_none());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"workDir": "/data/debates", "keepIntermediates": true, "enhancer": "demucs"}"#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "debate-clean",
            "https://youtu.be/abc",
            "--config",
            path.to_str().unwrap(),
            "--enhancer",
            "rnnoise",
        ]);
        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.work_dir, PathBuf::from("/data/debates"));
        assert!(config.keep_intermediates);
        assert_eq!(config.enhancer, EnhancerKind::Rnnoise);
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let cli = Cli::parse_from([
            "debate-clean",
            "https://youtu.be/abc",
            "--config",
            "/nonexistent/config.json",
        ]);
        assert!(matches!(cli.pipeline_config(), Err(PipelineError::Config(_))));
    }
}
