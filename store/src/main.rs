use clap::Parser;
use log::info;
use std::time::Duration;
use store::network::Server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Seconds between idle-room sweeps
    #[arg(long, default_value = "60")]
    sweep_secs: u64,

    /// Seconds a room may sit idle before it expires
    #[arg(long, default_value = "3600")]
    room_idle_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    info!("Starting room store on {}", addr);

    let mut server = Server::new(
        &addr,
        Duration::from_secs(args.sweep_secs),
        Duration::from_secs(args.room_idle_secs),
    )
    .await?;

    server.run().await?;

    Ok(())
}
