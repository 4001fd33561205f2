use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use ops::Ops;
use scatterfold::{config::WorkerConfig, worker::WorkerServer};
use tracing::info;

mod init;

#[derive(Parser, Debug)]
pub struct Cli {
    #[command(flatten)]
    pub options: WorkerConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init::tracing();
    let args = Cli::parse();

    let worker = WorkerServer::<Ops>::new(args.options).start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    worker.stop().await;

    Ok(())
}
