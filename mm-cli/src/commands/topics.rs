//! Topics command - show what a session for a user would subscribe to.

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use console::style;

use mm_core::config::ConfigHandle;
use mm_core::error::MmResult;
use mm_socket::{endpoint, SUBSCRIPTIONS};

use crate::OutputFormat;

/// Run the topics command.
pub async fn run(
    config: ConfigHandle,
    user: u64,
    url: Option<String>,
    format: OutputFormat,
) -> MmResult<()> {
    let base_url = super::resolve_base_url(&config, url).await?;
    let socket_url = endpoint::socket_url(&base_url, user)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&topics_json(&socket_url, user))?);
        }
        OutputFormat::Text => {
            println!("{} {}", style("Endpoint").bold(), socket_url);
            println!();

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(vec!["Destination", "Kind"]);
            for sub in SUBSCRIPTIONS {
                table.add_row(vec![sub.resolve(user), sub.kind.to_string()]);
            }
            println!("{table}");
        }
    }

    Ok(())
}

fn topics_json(socket_url: &str, user: u64) -> serde_json::Value {
    let topics: Vec<_> = SUBSCRIPTIONS
        .iter()
        .map(|sub| {
            serde_json::json!({
                "destination": sub.resolve(user),
                "kind": sub.kind.as_str(),
            })
        })
        .collect();
    serde_json::json!({
        "endpoint": socket_url,
        "topics": topics,
    })
}
