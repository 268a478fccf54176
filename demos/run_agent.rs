//! Run a single agent command against a local OpenAI-compatible server.
//!
//! ```bash
//! BMAD_BASE_URL=http://localhost:11434/v1 \
//! cargo run --example run_agent -- pm create-prd
//! ```
//!
//! Expects agent definitions under `./.bmad-core/agents/`.

use anyhow::Context;
use bmad_runtime::{
    Client, ProviderConfig, QuestionEvent, SessionEvents, SessionOptions, get_model,
};
use std::io::Write;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let agent_id = args.next().unwrap_or_else(|| "pm".to_string());
    let command = args.next().unwrap_or_else(|| "help".to_string());

    let model = get_model(Some("qwen2.5-32b-instruct"), true)
        .context("no model configured (set BMAD_MODEL)")?;

    let client = Client::builder()
        .provider_config(ProviderConfig::openai_compatible(model))
        .build()?;

    let events = SessionEvents::new().on_question(|event: QuestionEvent| async move {
        println!("\n[agent asks] {}", event.question);
        if let Some(context) = event.context {
            println!("  context: {context}");
        }
    });

    let session = client.create_session_with_events(
        &agent_id,
        &command,
        SessionOptions::new().with_cost_limit(5.0),
        events,
    )?;

    // Answer questions from stdin while the session runs.
    let runner = session.clone();
    let handle = tokio::spawn(async move { runner.execute().await });

    loop {
        if handle.is_finished() {
            break;
        }
        if session.has_pending_question() {
            print!("> ");
            std::io::stdout().flush()?;
            let mut answer = String::new();
            std::io::stdin().read_line(&mut answer)?;
            session.answer(answer.trim()).await?;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    let result = handle.await??;
    println!("\nstatus: {:?}", result.status);
    if let Some(response) = &result.final_response {
        println!("\n{response}");
    }
    if let Some(error) = &result.error {
        println!("error: {error}");
    }
    for doc in &result.documents {
        println!("document: {} ({} bytes)", doc.path, doc.content.len());
    }
    println!(
        "cost: ${:.4} over {} provider calls",
        result.costs.total_cost, result.costs.api_calls
    );
    Ok(())
}
