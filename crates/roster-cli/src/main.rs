use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "roster")]
#[command(about = "Alumni roster sync between the response spreadsheet and the published snapshot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Pull the spreadsheet, notify about new responses and publish the snapshot.
    Download,
    /// Write operator annotations from the snapshot back to the spreadsheet.
    Upload,
    /// Run the web API, plus the periodic download when ROSTER_SCHEDULER_ENABLED is set.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Download => {
            let summary = roster_sync::run_download_from_env().await?;
            info!(run_id = %summary.run_id, "download finished");
            println!(
                "download complete: run_id={} partitions={} records={} pending={} new={}",
                summary.run_id,
                summary.partitions,
                summary.records,
                summary.pending,
                summary.new_attention.len()
            );
        }
        Commands::Upload => {
            let summary = roster_sync::run_upload_from_env().await?;
            println!(
                "upload complete: partitions={} rows={} skipped={}",
                summary.partitions,
                summary.rows,
                summary.skipped.join(",")
            );
        }
        Commands::Serve => roster_web::serve_from_env().await?,
    }

    Ok(())
}
