//! Minimal REPL over a conversational session.
//!
//! ```bash
//! cargo run --example conversation_repl -- pm
//! ```
//!
//! Type messages; `/end` closes the conversation and prints the summary.

use anyhow::Context;
use bmad_runtime::{Client, ProviderConfig, SessionOptions, get_model};
use std::io::Write;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let agent_id = std::env::args().nth(1).unwrap_or_else(|| "pm".to_string());
    let model = get_model(Some("qwen2.5-32b-instruct"), true)
        .context("no model configured (set BMAD_MODEL)")?;

    let client = Client::builder()
        .provider_config(ProviderConfig::openai_compatible(model))
        .build()?;
    let conversation = client.create_conversation(&agent_id, SessionOptions::new())?;

    println!("conversation {} with agent {agent_id}", conversation.id());
    println!("type a message, or /end to finish\n");

    loop {
        print!("you> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/end" {
            break;
        }

        match conversation.send(line).await {
            Ok(turn) => {
                println!("{}> {}", agent_id, turn.agent_response);
                if !turn.tool_calls.is_empty() {
                    println!("  (tools: {})", turn.tool_calls.join(", "));
                }
            }
            Err(e) => {
                eprintln!("turn failed: {e}");
                break;
            }
        }
    }

    let result = conversation.end().await?;
    println!(
        "\n{} turns, {} documents, ${:.4}",
        result.turns.len(),
        result.documents.len(),
        result.costs.total_cost
    );
    for doc in &result.documents {
        println!("  {}", doc.path);
    }
    Ok(())
}
