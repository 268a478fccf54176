//! System-prompt composition.
//!
//! The prompt is the stable contract between the runtime and the model:
//! plaintext markdown assembled in a fixed section order with fixed
//! vocabulary. Changing headings or section order here changes model
//! behavior, so the layout is pinned by tests.
//!
//! Section order: preamble, `## Available Tools`, `## Tool Usage Rules`,
//! `## Workflow Guidelines`, `## Agent Persona`, raw customization (when
//! present), `## Available Commands`, `## Activation Instructions`, closing
//! directive.

use crate::agent::AgentDefinition;
use crate::executor::ToolDefinition;

const PREAMBLE: &str = "You are a specialized AI agent operating inside a document-generation \
runtime. You have access to a set of specialized tools for reading and writing files, asking \
the user questions, running commands, and delegating work to other agents.";

const TOOL_USAGE_RULES: &str = "\
- Always call `read_file` on a file before calling `edit_file` on it.
- All file paths must be absolute (starting with `/`). Relative paths are rejected.
- Never write files speculatively; write only artifacts the current command calls for.
- Tool errors come back as text; read them and adjust instead of repeating the same call.";

const WORKFLOW_GUIDELINES: &str = "\
1. Understand the command you were given.
2. Gather the context you need (read files, ask the user if truly necessary).
3. Act: produce or modify the artifacts.
4. Report what you produced and where it lives.";

const CLOSING: &str = "Adopt the persona described above and await commands. Stay in character \
for the entire session.";

/// Assembles the system prompt for an agent and tool catalog.
pub fn compose_system_prompt(agent: &AgentDefinition, tools: &[ToolDefinition]) -> String {
    let mut prompt = String::new();

    prompt.push_str(PREAMBLE);
    prompt.push_str("\n\n");

    prompt.push_str("## Available Tools\n\n");
    for tool in tools {
        prompt.push_str(&format!("### {}\n\n{}\n\n", tool.name, tool.description));
        let schema = serde_json::to_string_pretty(&tool.input_schema)
            .unwrap_or_else(|_| "{}".to_string());
        prompt.push_str(&format!("Parameters:\n```json\n{schema}\n```\n\n"));
        prompt.push_str(&format!("Example: `{}`\n\n", tool.example));
    }

    prompt.push_str("## Tool Usage Rules\n\n");
    prompt.push_str(TOOL_USAGE_RULES);
    prompt.push_str("\n\n");

    prompt.push_str("## Workflow Guidelines\n\n");
    prompt.push_str(WORKFLOW_GUIDELINES);
    prompt.push_str("\n\n");

    prompt.push_str("## Agent Persona\n\n");
    prompt.push_str(&format!("**Name:** {}\n", agent.name));
    if let Some(persona) = &agent.persona {
        if let Some(role) = &persona.role {
            prompt.push_str(&format!("**Role:** {role}\n"));
        }
    }
    if let Some(title) = &agent.title {
        prompt.push_str(&format!("**Title:** {title}\n"));
    }
    if let Some(icon) = &agent.icon {
        prompt.push_str(&format!("**Icon:** {icon}\n"));
    }
    if let Some(persona) = &agent.persona {
        if let Some(style) = &persona.style {
            prompt.push_str(&format!("**Style:** {style}\n"));
        }
        if let Some(identity) = &persona.identity {
            prompt.push_str(&format!("**Identity:** {identity}\n"));
        }
        if let Some(focus) = &persona.focus {
            prompt.push_str(&format!("**Focus:** {focus}\n"));
        }
        if !persona.core_principles.is_empty() {
            prompt.push_str("**Core Principles:**\n");
            for principle in &persona.core_principles {
                prompt.push_str(&format!("- {principle}\n"));
            }
        }
    }
    prompt.push('\n');

    if let Some(customization) = &agent.customization {
        prompt.push_str(customization);
        prompt.push_str("\n\n");
    }

    if !agent.commands.is_empty() {
        prompt.push_str("## Available Commands\n\n");
        for command in &agent.commands {
            prompt.push_str(&format!("- {command}\n"));
        }
        prompt.push('\n');
    }

    prompt.push_str("## Activation Instructions\n\n");
    if agent.activation_instructions.is_empty() {
        prompt.push_str("Follow the persona and commands above.\n");
    } else {
        for (index, instruction) in agent.activation_instructions.iter().enumerate() {
            prompt.push_str(&format!("{}. {instruction}\n", index + 1));
        }
    }
    prompt.push('\n');

    prompt.push_str(CLOSING);
    prompt
}
