use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "veriface", about = "veriface face-verification CLI")]
struct Cli {
    /// Base URL of the verifaced daemon.
    #[arg(long, default_value = "http://127.0.0.1:8001")]
    url: String,

    /// Request timeout in seconds. A timeout or connection failure means
    /// the verification service is unavailable, not that verification failed.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register (or re-register) a student's face from an image file
    Register {
        /// Student identifier
        student_id: String,
        /// Path to an image containing exactly one face
        image: PathBuf,
    },
    /// Verify an image against a claimed student identity (1:1)
    Verify {
        /// Claimed student identifier
        student_id: String,
        /// Path to the captured probe image
        image: PathBuf,
    },
    /// Identify the best-matching student for an image (1:N)
    Identify {
        /// Path to the captured probe image
        image: PathBuf,
    },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let outcome = match cli.command {
        Commands::Register { student_id, image } => {
            post_image(&client, &cli.url, "/register", Some(&student_id), &image).await
        }
        Commands::Verify { student_id, image } => {
            post_image(&client, &cli.url, "/verify", Some(&student_id), &image).await
        }
        Commands::Identify { image } => {
            post_image(&client, &cli.url, "/verify", None, &image).await
        }
        Commands::Status => {
            let response = client
                .get(format!("{}/", cli.url.trim_end_matches('/')))
                .send()
                .await
                .map_err(unavailable)?;
            response.json().await.context("invalid status response")
        }
    }?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

/// POST a multipart image (plus optional student_id) and return the JSON
/// body. Service-level failures (4xx/5xx) still carry a JSON body; print it
/// rather than hiding the reason behind an HTTP error.
async fn post_image(
    client: &reqwest::Client,
    base_url: &str,
    endpoint: &str,
    student_id: Option<&str>,
    image: &Path,
) -> Result<serde_json::Value> {
    let bytes = std::fs::read(image)
        .with_context(|| format!("failed to read image {}", image.display()))?;
    let file_name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    let mut form = reqwest::multipart::Form::new()
        .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));
    if let Some(id) = student_id {
        form = form.text("student_id", id.to_string());
    }

    let url = format!("{}{}", base_url.trim_end_matches('/'), endpoint);
    let response = client
        .post(&url)
        .multipart(form)
        .send()
        .await
        .map_err(unavailable)?;

    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .with_context(|| format!("non-JSON response from {url} ({status})"))?;

    if status.is_server_error() {
        bail!("service error ({status}): {body}");
    }

    Ok(body)
}

fn unavailable(err: reqwest::Error) -> anyhow::Error {
    anyhow::anyhow!("verification service unavailable: {err}")
}
