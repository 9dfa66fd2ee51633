use clap::Parser;
use client::network::Client;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Store address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Your display name
    #[arg(short, long)]
    name: String,

    /// Create a new room instead of joining one
    #[arg(long)]
    create: bool,

    /// Room code to join, or to claim when creating (random otherwise)
    #[arg(short, long)]
    code: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Store: {}", args.server);

    let mut client = Client::new(&args.server, &args.name).await?;

    if args.create {
        client.create_room(args.code.as_deref()).await?;
    } else if let Some(code) = args.code.as_deref() {
        client.join_room(code).await?;
    } else {
        eprintln!("Pass --create to open a room, or --code <CODE> to join one.");
        return Ok(());
    }

    println!("Type 'help' for commands.");
    client.run().await?;

    Ok(())
}
