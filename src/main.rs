use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use news_video::api::{GatewayClient, TokioClock, VoiceProfile};
use news_video::config::ConfigOverrides;
use news_video::prompts::Prompts;
use news_video::storage::FsStore;
use news_video::video::Ffmpeg;
use news_video::{PipelineConfig, PipelineController, Stage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "news-video")]
#[command(about = "Generate a short news video about a topic using AI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline, or one stage of it
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Topic of the news video
    #[arg(short, long)]
    topic: String,

    /// Stage to run
    #[arg(short, long, value_enum, default_value_t = Stage::All)]
    stage: Stage,

    /// Directory for scripts, scene media, the final video and the progress log
    #[arg(short, long, default_value = "outputs")]
    output_dir: PathBuf,

    /// Reuse the saved search context instead of searching the web again
    #[arg(long)]
    skip_search: bool,

    /// Narrator voice
    #[arg(long, value_enum)]
    voice: Option<VoiceProfile>,

    /// JSON credential file with GOOGLE_API_KEY
    #[arg(long, default_value = "env.json")]
    credentials: PathBuf,

    /// Gateway API key
    #[arg(long)]
    api_key: Option<String>,

    /// Gateway base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Directory with search_prompt.txt, compose_prompt.txt and scene_prompt.txt overrides
    #[arg(long)]
    prompts_dir: Option<PathBuf>,

    /// FFmpeg binary
    #[arg(long)]
    ffmpeg: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let Command::Run(args) = Cli::parse().command;

    let config = PipelineConfig::load(ConfigOverrides {
        credentials: args.credentials,
        output_dir: args.output_dir,
        api_key: args.api_key,
        base_url: args.base_url,
        voice: args.voice,
        prompts_dir: args.prompts_dir,
        ffmpeg: args.ffmpeg,
    })
    .context("Failed to load configuration")?;

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .context("Failed to create output directory")?;

    info!("Topic: {}", args.topic);
    info!("Output directory: {}", config.output_dir.display());

    if let Err(e) = run_pipeline(&config, &args.topic, args.stage, args.skip_search).await {
        match e.downcast_ref::<news_video::VideoError>() {
            Some(err) => match err.scene_id() {
                Some(scene) => error!("Stage {} failed at scene {} ({}): {}", args.stage, scene, err.kind(), err),
                None => error!("Stage {} failed ({}): {}", args.stage, err.kind(), err),
            },
            None => error!("Stage {} failed: {:#}", args.stage, e),
        }
        std::process::exit(1);
    }

    info!("Stage {} completed successfully!", args.stage);
    Ok(())
}

async fn run_pipeline(
    config: &PipelineConfig,
    topic: &str,
    stage: Stage,
    skip_search: bool,
) -> anyhow::Result<()> {
    let store = Arc::new(FsStore::new(&config.output_dir));
    let ai = Arc::new(GatewayClient::new(config).context("Failed to create HTTP client")?);
    let media = Arc::new(Ffmpeg::new(config.ffmpeg_path.clone()));
    let prompts = Prompts::load(config.prompts_dir.as_deref()).await;

    let controller = PipelineController::new(
        config,
        ai,
        media,
        store,
        Arc::new(TokioClock::default()),
        prompts,
    );
    controller.run(topic, stage, skip_search).await?;
    Ok(())
}
