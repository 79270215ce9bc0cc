//! CLI for Cinefy - cinematic photo transformation.

use cinefy::{
    GeminiBackend, GeminiModel, GenerativeBackend, ImagePayload, TransformRequester,
    NO_IMAGE_MESSAGE,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cinefy")]
#[command(about = "Turn a photo into a cinematic still via Gemini image models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Model to use
    #[arg(short, long, global = true, value_enum, default_value = "flash-image-preview")]
    model: ModelArg,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform a photo into a cinematic still
    Transform(TransformArgs),

    /// Check that the API key and model are usable
    Check,
}

#[derive(Args)]
struct TransformArgs {
    /// Path to the input photo (PNG, JPEG or WebP)
    input: PathBuf,

    /// Output file path
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    FlashImagePreview,
    FlashImage,
    ProImagePreview,
}

impl From<ModelArg> for GeminiModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::FlashImagePreview => GeminiModel::FlashImagePreview,
            ModelArg::FlashImage => GeminiModel::FlashImage,
            ModelArg::ProImagePreview => GeminiModel::ProImagePreview,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cinefy=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Missing credentials are fatal before any work starts.
    let backend = GeminiBackend::builder().build()?;
    let requester = TransformRequester::builder(backend)
        .model(GeminiModel::from(cli.model).as_str())
        .build();

    match cli.command {
        Commands::Transform(args) => transform(&requester, args, cli.json).await?,
        Commands::Check => check(&requester, cli.json).await?,
    }

    Ok(())
}

async fn transform(
    requester: &TransformRequester<GeminiBackend>,
    args: TransformArgs,
    json_output: bool,
) -> anyhow::Result<()> {
    let input = ImagePayload::read(&args.input).await?;
    tracing::info!(
        input = %args.input.display(),
        mime_type = input.mime_type(),
        size_bytes = input.size(),
        "transforming photo"
    );

    let start = Instant::now();
    let Some(image) = requester.transform(input).await? else {
        if json_output {
            let result = serde_json::json!({
                "success": false,
                "error": NO_IMAGE_MESSAGE,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }
        anyhow::bail!(NO_IMAGE_MESSAGE);
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    image.save(&args.output).await?;

    if json_output {
        let result = serde_json::json!({
            "success": true,
            "output": args.output.display().to_string(),
            "size_bytes": image.size(),
            "format": image.format().extension(),
            "model": requester.model(),
            "backend": requester.backend().name(),
            "duration_ms": duration_ms,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Cinematic still: {} ({} bytes) via {} on {}",
            args.output.display(),
            image.size(),
            requester.model(),
            requester.backend().name()
        );
        println!("Duration: {}ms", duration_ms);
    }

    Ok(())
}

async fn check(
    requester: &TransformRequester<GeminiBackend>,
    json_output: bool,
) -> anyhow::Result<()> {
    requester.health_check().await?;

    if json_output {
        let result = serde_json::json!({
            "success": true,
            "model": requester.model(),
            "backend": requester.backend().name(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "✓ {} is reachable via {}",
            requester.model(),
            requester.backend().name()
        );
    }

    Ok(())
}
