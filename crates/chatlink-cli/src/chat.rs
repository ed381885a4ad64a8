use anyhow::{bail, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use chatlink_core::display::{
    classify_inbound, format_chat_line, format_join_notice, format_leave_notice, DisplayMessage,
};
use chatlink_core::{ClientConfig, ConnectionEvent};
use chatlink_transport_client::ConnectionManager;

use crate::ServerArgs;

pub(crate) async fn run(config: ClientConfig, server: ServerArgs) -> Result<()> {
    let user = server.user.trim().to_owned();
    let (mut conn, events) = ConnectionManager::new(config);
    let printer = tokio::spawn(print_events(events, user.clone()));

    if !conn.connect(&server.host, server.port).await {
        drop(conn);
        let _ = printer.await;
        bail!("could not connect to {}:{}", server.host, server.port);
    }
    conn.send_message(&format_join_notice(&user)).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if !conn.is_connected() {
            warn!("Connection lost; stopping");
            break;
        }
        if conn.send_message(&format_chat_line(&user, text)).await {
            println!("{} (you): {}", user, text);
        }
    }

    if conn.is_connected() {
        conn.send_message(&format_leave_notice(&user)).await;
    }
    conn.disconnect().await;
    drop(conn);
    let _ = printer.await;
    Ok(())
}

/// Runs until every sender is gone, i.e. the manager and its receive task
/// have been dropped.
async fn print_events(mut events: mpsc::Receiver<ConnectionEvent>, user: String) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Status(text) => println!("* {}", text),
            ConnectionEvent::Error(e) => eprintln!("! {}", e),
            ConnectionEvent::Message(msg) => match classify_inbound(msg.as_str()) {
                DisplayMessage::User { sender, .. } if sender == user => {
                    debug!("Skipping echo of own message");
                }
                DisplayMessage::User { sender, content } => println!("{}: {}", sender, content),
                DisplayMessage::Broadcast(text) => println!("[server] {}", text),
                DisplayMessage::Ack => debug!("Server acknowledged message"),
                DisplayMessage::System(text) => println!("* {}", text),
            },
        }
    }
}
