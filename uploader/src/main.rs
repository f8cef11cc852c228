use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use uploader::{covers::content_type_for_path, session::UploadClientManager, types::Environment};

/// Upload a book cover image with temporary storage credentials
#[derive(Debug, Parser)]
#[command(name = "cover-upload", version)]
struct Args {
    /// Image file to upload
    file: PathBuf,

    /// Content type of the image; guessed from the file extension when omitted
    #[arg(long)]
    content_type: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let environment = Environment::from_env();

    // JSON logs for staging/production, plain text for development
    let filter = EnvFilter::builder()
        .with_default_directive(environment.tracing_level().into())
        .from_env_lossy();
    if environment.json_logs() {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    let content_type = match args.content_type {
        Some(content_type) => content_type,
        None => content_type_for_path(&args.file)
            .map(ToString::to_string)
            .ok_or_else(|| {
                anyhow!(
                    "cannot guess the content type of {}, pass --content-type",
                    args.file.display()
                )
            })?,
    };

    let body = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let manager = UploadClientManager::from_environment(&environment)?;
    let client = manager
        .acquire()
        .await
        .context("Uploads are unavailable: could not obtain storage credentials")?;

    let result = client.upload_cover(body, &content_type).await;
    client.dispose().await;

    let cover = result.map_err(|e| anyhow!("{} ({e})", e.user_message()))?;
    info!("Cover available at {}", cover.url);
    println!("{}", serde_json::to_string_pretty(&cover)?);

    Ok(())
}
