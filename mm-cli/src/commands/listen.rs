//! Listen command - hold a connection open and print inbound events.

use chrono::{DateTime, Local, Utc};
use console::style;
use tokio::sync::broadcast::error::RecvError;

use mm_core::config::ConfigHandle;
use mm_core::error::MmResult;
use mm_socket::{endpoint, ConnectionState, InboundEvent, ManagerSnapshot, SocketManager};

use crate::OutputFormat;

/// Run the listen command.
pub async fn run(
    config: ConfigHandle,
    user: u64,
    url: Option<String>,
    format: OutputFormat,
) -> MmResult<()> {
    let base_url = super::resolve_base_url(&config, url).await?;
    let socket_url = endpoint::socket_url(&base_url, user)?;

    let manager = SocketManager::from_config(&*config.read().await);
    let mut events = manager.subscribe();
    let mut state = manager.state_receiver();

    if format == OutputFormat::Text {
        println!(
            "{} Connecting to {} as user {user}...",
            style("[..]").bold().dim(),
            socket_url
        );
    }
    manager.connect(user).await;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(ev) => print_event(&ev, format),
                    Err(RecvError::Lagged(n)) => {
                        eprintln!("  {} Missed {n} events (slow consumer)", style("WARN").yellow());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                print_state(&manager.snapshot(), format);
            }
            _ = tokio::signal::ctrl_c() => {
                if format == OutputFormat::Text {
                    println!("\n  Disconnecting...");
                }
                manager.disconnect().await;
                break;
            }
        }
    }

    Ok(())
}

fn print_state(snapshot: &ManagerSnapshot, format: OutputFormat) {
    let state = snapshot.state;
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "state": state.to_string(),
                "identity": snapshot.identity,
                "reconnectAttempts": snapshot.reconnect_attempts,
            });
            println!("{json}");
        }
        OutputFormat::Text => {
            let label = match state {
                ConnectionState::Connected => style("CONNECTED").green().bold(),
                ConnectionState::Connecting => style("CONNECTING").yellow(),
                ConnectionState::Disconnected => style("DISCONNECTED").red().bold(),
            };
            println!("  {} {label}", timestamp(None));
            if state == ConnectionState::Connected {
                println!("  Listening for events... (Ctrl+C to stop)");
            }
        }
    }
}

fn print_event(event: &InboundEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("  {} failed to encode event: {e}", style("WARN").yellow()),
        },
        OutputFormat::Text => {
            let (at, line) = describe(event);
            println!(
                "  {} {} {line}",
                timestamp(at),
                style(format!("[{}]", event.kind())).cyan()
            );
        }
    }
}

/// Event timestamp (or now) in local time.
fn timestamp(at: Option<DateTime<Utc>>) -> String {
    let at = at.map(|t| t.with_timezone(&Local)).unwrap_or_else(Local::now);
    style(at.format("%H:%M:%S").to_string()).dim().to_string()
}

fn describe(event: &InboundEvent) -> (Option<DateTime<Utc>>, String) {
    match event {
        InboundEvent::ChatMessage(msg) => {
            let chat = msg
                .chat_id
                .map(|id| format!("chat {id} "))
                .unwrap_or_default();
            (
                msg.created_at,
                format!("{chat}from {}: {}", msg.sender_id, super::truncate(&msg.content, 120)),
            )
        }
        InboundEvent::ChatRequest(req) => {
            let from = match &req.sender_name {
                Some(name) => format!("{name} ({})", req.sender_id),
                None => req.sender_id.to_string(),
            };
            let note = req
                .message
                .as_deref()
                .map(|m| format!(": {}", super::truncate(m, 120)))
                .unwrap_or_default();
            let status = req
                .status
                .as_deref()
                .map(|s| format!(" [{s}]"))
                .unwrap_or_default();
            (req.created_at, format!("from {from}{note}{status}"))
        }
        InboundEvent::Notification(n) => {
            let title = n.title.as_deref().unwrap_or("notification");
            let body = n
                .body
                .as_deref()
                .map(|b| format!(": {}", super::truncate(b, 120)))
                .unwrap_or_default();
            let kind = n
                .notification_type
                .as_deref()
                .map(|t| format!(" [{t}]"))
                .unwrap_or_default();
            (n.created_at, format!("{title}{body}{kind}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_socket::{ChatRequestPayload, NotificationPayload};

    #[test]
    fn test_describe_chat_request() {
        let event = InboundEvent::ChatRequest(ChatRequestPayload {
            id: Some(1),
            sender_id: 7,
            receiver_id: Some(42),
            sender_name: Some("Asha".into()),
            message: Some("hi!".into()),
            status: Some("PENDING".into()),
            created_at: None,
        });
        let (_, line) = describe(&event);
        assert_eq!(line, "from Asha (7): hi! [PENDING]");
    }

    #[test]
    fn test_describe_bare_notification() {
        let event = InboundEvent::Notification(NotificationPayload {
            id: None,
            title: None,
            body: None,
            notification_type: None,
            reference_id: None,
            created_at: None,
        });
        let (at, line) = describe(&event);
        assert!(at.is_none());
        assert_eq!(line, "notification");
    }
}
