//! Interactive console for an HM-10 module.
//!
//! Run with: cargo run --example hm10_console
//!
//! Commands: scan, stop, connect <index|address>, on, off, disconnect,
//! status, quit

use hm10_ble::{ClientConfig, Hm10Client, Result, SessionEvent, SessionSnapshot};
use tokio::io::{AsyncBufReadExt, BufReader};

fn print_snapshot(snapshot: &SessionSnapshot) {
    println!("Status: {} ({})", snapshot.status, snapshot.session_state);
    println!("Scan: {}", snapshot.scan_state);
    for (i, candidate) in snapshot.candidates.iter().enumerate() {
        println!("  [{}] {}", i, candidate.label());
    }
    if snapshot.status.is_connected() {
        println!("Toggle: {}", if snapshot.toggled_on { "ON" } else { "OFF" });
        for line in &snapshot.log {
            println!("  | {}", line);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hm10_ble=info".parse().unwrap()),
        )
        .init();

    let (client, task) = Hm10Client::with_btleplug(ClientConfig::default()).await?;

    let mut events = client.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::CandidateDiscovered(c) => println!("Found {}", c.label()),
                SessionEvent::Ready { address } => println!("Ready: {}", address),
                SessionEvent::Disconnected { address } => println!("Disconnected: {}", address),
                SessionEvent::ScanFailed { code } => println!("Scan failed ({})", code),
                SessionEvent::Error(e) => println!("Error: {}", e),
                other => println!("{:?}", other),
            }
        }
    });

    println!("HM-10 console. Type 'scan' to begin, 'quit' to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("scan"), _) => client.scan().await?,
            (Some("stop"), _) => client.stop_scan().await?,
            (Some("connect"), Some(target)) => {
                let snapshot = client.snapshot();
                let address = target
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| snapshot.candidates.get(i))
                    .map(|c| c.address.clone())
                    .unwrap_or_else(|| target.to_string());
                client.connect(address).await?;
            }
            (Some("on"), _) => client.toggle(true).await?,
            (Some("off"), _) => client.toggle(false).await?,
            (Some("disconnect"), _) => client.disconnect().await?,
            (Some("status"), _) => print_snapshot(&client.snapshot()),
            (Some("quit"), _) => break,
            (None, _) => {}
            _ => println!("Unknown command"),
        }
    }

    client.shutdown().await?;
    let _ = task.await;
    println!("Done!");

    Ok(())
}
