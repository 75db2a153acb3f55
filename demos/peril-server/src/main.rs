use peril::SERVER_HELP;
use peril::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = PerilConfig::from_env();
    let connection = AmqpConnection::connect(&config.broker_url).await?;
    let server = PerilServer::start(connection, &config).await?;
    eprintln!("peril server connected, game log at {}", config.game_log.display());
    println!("{SERVER_HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.parse::<ServerCommand>() {
                    Ok(ServerCommand::Pause) => server.pause().await?,
                    Ok(ServerCommand::Resume) => server.resume().await?,
                    Ok(ServerCommand::Help) => println!("{SERVER_HELP}"),
                    Ok(ServerCommand::Quit) => break,
                    Err(peril::CommandError::Empty) => {}
                    Err(e) => eprintln!("{e}"),
                }
            }
        }
    }

    server.shutdown().await?;
    eprintln!("peril server stopped");
    Ok(())
}
