use peril::prelude::*;
use peril::{CLIENT_HELP, CommandError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

async fn prompt_username(lines: &mut Lines<BufReader<Stdin>>) -> std::io::Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"username: ").await?;
    stdout.flush().await?;
    Ok(lines.next_line().await?.map(|name| name.trim().to_string()))
}

async fn run(client: &PerilClient<AmqpConnection>, command: ClientCommand) -> Result<(), PerilError> {
    match command {
        ClientCommand::Spawn { location, units } => {
            client.spawn(location, units).await?;
            println!("spawned {units} units in {location}");
        }
        ClientCommand::Move { from, to, units } => {
            client.move_units(from, to, units).await?;
            println!("moved {units} units from {from} to {to}");
        }
        ClientCommand::Spam { count } => client.spam(count).await?,
        ClientCommand::Status => println!("{}", client.status().await?),
        ClientCommand::Help => println!("{CLIENT_HELP}"),
        ClientCommand::Quit => {}
    }
    Ok(())
}

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
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let username = match config.username.clone() {
        Some(name) => name,
        None => match prompt_username(&mut lines).await? {
            Some(name) => name,
            None => return Ok(()),
        },
    };

    let connection = AmqpConnection::connect(&config.broker_url).await?;
    let client = PerilClient::join(connection, &username).await?;
    println!("welcome, {username}\n{CLIENT_HELP}");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.parse::<ClientCommand>() {
                    Ok(ClientCommand::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = run(&client, command).await {
                            tracing::warn!(error = %e, "command failed");
                        }
                    }
                    Err(CommandError::Empty) => {}
                    Err(e) => eprintln!("{e}"),
                }
            }
        }
    }

    client.shutdown().await?;
    Ok(())
}
