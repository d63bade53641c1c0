//! Interactive lamp console: `toggle`, `status`, `exit`.

use anyhow::Result;
use rendezvous_core::RpcClient;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Toggle,
    Status,
    Exit,
    Unknown,
}

impl Command {
    fn parse(line: &str) -> Self {
        match line.trim().to_lowercase().as_str() {
            "toggle" => Command::Toggle,
            "status" => Command::Status,
            "exit" => Command::Exit,
            _ => Command::Unknown,
        }
    }
}

pub async fn run(client: RpcClient) -> Result<()> {
    let registry = client.registry().endpoint().clone();
    println!("==================================");
    println!("  Lamp Control Console");
    println!("==================================");
    println!("Registry: {}", registry);
    println!("Commands:");
    println!("  toggle - Toggle the lamp on/off");
    println!("  status - Check lamp status");
    println!("  exit   - Exit the console");
    println!("==================================");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nEnter command: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let outcome = match Command::parse(&line) {
            Command::Toggle => client
                .invoke_as::<String>("toggle", vec![])
                .await
                .map(|result| println!("Result: {}", result)),
            Command::Status => client.invoke_as::<bool>("isOn", vec![]).await.map(|on| {
                println!("Lamp is currently: {}", if on { "ON" } else { "OFF" })
            }),
            Command::Exit => {
                println!("Exiting...");
                break;
            }
            Command::Unknown => {
                println!("Unknown command. Available commands: toggle, status, exit");
                Ok(())
            }
        };

        if let Err(e) = outcome {
            error!("RPC error: {}", e);
            println!("Error: {}", e.full_message());
        }
    }
    Ok(())
}
