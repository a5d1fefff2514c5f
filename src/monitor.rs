use crate::error::Result;
use crate::packet::{Message, Packet};
use crate::session::Session;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Drain the OOB queue: fetch and log every newly stored SMS, optionally
/// deleting it afterwards. Returns when the queue closes.
pub async fn run(session: Arc<Session>, mut oob: mpsc::Receiver<Packet>, delete_after_read: bool) {
    while let Some(packet) = oob.recv().await {
        match packet {
            Packet::MessageNotification { storage, index } => {
                info!("New SMS in {} at index {}", storage, index);
                if let Err(e) = handle_new_message(&session, index, delete_after_read).await {
                    error!("Failed to process message {}: {}", index, e);
                }
            }
            Packet::ServiceStatus { status } => info!("Service status: {}", status),
            Packet::NetworkStatus { network } => info!("Network: {}", network),
            other => warn!("Unhandled OOB packet: {:?}", other),
        }
    }
    info!("OOB queue closed, monitor stopping");
}

async fn handle_new_message(
    session: &Session,
    index: i64,
    delete_after_read: bool,
) -> Result<Message> {
    let msg = session.get_message(index).await?;
    match serde_json::to_string(&msg) {
        Ok(json) => info!("SMS: {}", json),
        Err(e) => warn!("Failed to serialize message {}: {}", index, e),
    }

    // Delete SMS after reading to save space
    if delete_after_read {
        session.delete_message(index).await?;
        info!("Deleted message {}", index);
    }
    Ok(msg)
}
