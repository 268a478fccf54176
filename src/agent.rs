//! Agent definitions: the declarative role descriptors that drive sessions.
//!
//! An agent definition is a markdown file with YAML front-matter. Only the
//! front-matter is interpreted; the body is informational. The required keys
//! are `agent.name` and `agent.id`; everything else (persona, commands,
//! dependencies, activation instructions) is optional.
//!
//! ```text
//! ---
//! agent:
//!   name: Product Manager
//!   id: pm
//!   title: Product strategy and PRDs
//!   icon: "📋"
//! persona:
//!   role: Senior product manager
//!   core_principles:
//!     - Write for the reader
//! commands:
//!   - create-prd
//! ---
//! Body text is ignored by the runtime.
//! ```
//!
//! [`AgentLocator`] resolves an agent id through the configured search chain
//! and discovers every definition visible to a session so the model can find
//! its peers via `glob_pattern` on `/.bmad-core/agents/*.md`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Optional persona section of an agent definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Persona {
    /// The professional role the model should adopt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Communication style guidance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,

    /// Self-description the model should maintain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    /// What the agent concentrates on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,

    /// Principles listed under the persona in the system prompt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub core_principles: Vec<String>,
}

/// Optional dependency lists of an agent definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Dependencies {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checklists: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<String>,
}

/// A parsed agent definition.
///
/// Immutable once loaded; sessions resolve definitions on demand through the
/// [`AgentLocator`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentDefinition {
    /// Unique agent id, used in file names and `invoke_agent` calls.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Short title line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Emoji or short icon string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Hint describing when this agent should be chosen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_to_use: Option<String>,

    /// Raw text inlined verbatim into the system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customization: Option<String>,

    /// Persona guidance for the system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<Persona>,

    /// Commands the agent advertises.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,

    /// Resource dependencies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Dependencies>,

    /// Numbered activation steps for the system prompt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activation_instructions: Vec<String>,
}

// Front-matter wire shape: `agent:` header plus optional sibling sections.
#[derive(Debug, Deserialize)]
struct FrontMatter {
    agent: AgentHeader,
    #[serde(default)]
    persona: Option<Persona>,
    #[serde(default)]
    commands: Vec<String>,
    #[serde(default)]
    dependencies: Option<Dependencies>,
    #[serde(default)]
    activation_instructions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AgentHeader {
    #[serde(default)]
    name: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default, rename = "whenToUse")]
    when_to_use: Option<String>,
    #[serde(default)]
    customization: Option<String>,
}

/// Splits a markdown source into (front matter, body).
fn split_front_matter(source: &str) -> Result<(&str, &str)> {
    let rest = source
        .strip_prefix("---")
        .ok_or_else(|| Error::invalid_input("agent definition must start with YAML front-matter"))?;
    let end = rest
        .find("\n---")
        .ok_or_else(|| Error::invalid_input("unterminated YAML front-matter"))?;
    Ok((&rest[..end], &rest[end + 4..]))
}

/// Parses an agent definition from markdown with YAML front-matter.
///
/// # Errors
///
/// Fails when the front-matter is missing or malformed, or when `agent.name`
/// or `agent.id` is absent or empty.
pub fn parse_agent_definition(source: &str) -> Result<AgentDefinition> {
    let (front_matter, _body) = split_front_matter(source)?;
    let parsed: FrontMatter = serde_yaml::from_str(front_matter)?;

    if parsed.agent.id.trim().is_empty() {
        return Err(Error::invalid_input("agent.id is required"));
    }
    if parsed.agent.name.trim().is_empty() {
        return Err(Error::invalid_input("agent.name is required"));
    }

    Ok(AgentDefinition {
        id: parsed.agent.id,
        name: parsed.agent.name,
        title: parsed.agent.title,
        icon: parsed.agent.icon,
        when_to_use: parsed.agent.when_to_use,
        customization: parsed.agent.customization,
        persona: parsed.persona,
        commands: parsed.commands,
        dependencies: parsed.dependencies,
        activation_instructions: parsed.activation_instructions,
    })
}

/// A definition discovered for VFS population.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredAgent {
    /// Absolute VFS path the file should be written to.
    pub vfs_path: String,

    /// Raw markdown source.
    pub source: String,
}

/// Resolves agent ids to definitions and discovers all visible definitions.
///
/// Resolution order: local `./.bmad-core/agents/{id}.md`, then the shared
/// authoring checkout `../bmad-export-author/.bmad-core/agents/{id}.md`,
/// then each configured expansion pack scanned for `.bmad-*/agents/{id}.md`,
/// then bundled definitions registered in memory. First match wins.
///
/// Discovery order (for VFS population): bundled, then expansion packs, then
/// the local directory; the caller writes entries in order, so a local
/// definition overwrites an earlier one at the same VFS path.
#[derive(Debug, Clone)]
pub struct AgentLocator {
    local_agents_dir: PathBuf,
    shared_agents_dir: PathBuf,
    expansion_pack_paths: Vec<PathBuf>,
    bundled: Vec<(String, String)>,
}

impl Default for AgentLocator {
    fn default() -> Self {
        Self {
            local_agents_dir: PathBuf::from("./.bmad-core/agents"),
            shared_agents_dir: PathBuf::from("../bmad-export-author/.bmad-core/agents"),
            expansion_pack_paths: Vec::new(),
            bundled: Vec::new(),
        }
    }
}

impl AgentLocator {
    /// Creates a locator with the default search chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the local agents directory.
    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_agents_dir = dir.into();
        self
    }

    /// Overrides the shared authoring directory.
    pub fn with_shared_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shared_agents_dir = dir.into();
        self
    }

    /// Adds an expansion pack root to scan for `.bmad-*/agents/`.
    pub fn add_expansion_pack(&mut self, dir: impl Into<PathBuf>) {
        self.expansion_pack_paths.push(dir.into());
    }

    /// Registers an in-memory bundled definition, the lowest-precedence
    /// fallback in both resolution and discovery.
    pub fn add_bundled(&mut self, id: impl Into<String>, source: impl Into<String>) {
        self.bundled.push((id.into(), source.into()));
    }

    /// Resolves an agent definition by id through the search chain.
    pub fn resolve(&self, id: &str) -> Result<AgentDefinition> {
        let file_name = format!("{id}.md");

        for dir in [&self.local_agents_dir, &self.shared_agents_dir] {
            let candidate = dir.join(&file_name);
            if let Ok(source) = std::fs::read_to_string(&candidate) {
                return parse_agent_definition(&source);
            }
        }

        for pack_root in &self.expansion_pack_paths {
            for pack_dir in bmad_dirs(pack_root) {
                let candidate = pack_dir.join("agents").join(&file_name);
                if let Ok(source) = std::fs::read_to_string(&candidate) {
                    return parse_agent_definition(&source);
                }
            }
        }

        if let Some((_, source)) = self.bundled.iter().find(|(bundled_id, _)| bundled_id == id) {
            return parse_agent_definition(source);
        }

        Err(Error::AgentNotFound(id.to_string()))
    }

    /// Discovers every visible definition, in VFS write order.
    pub fn discover(&self) -> Vec<DiscoveredAgent> {
        let mut discovered = Vec::new();

        for (id, source) in &self.bundled {
            discovered.push(DiscoveredAgent {
                vfs_path: format!("/.bmad-core/agents/{id}.md"),
                source: source.clone(),
            });
        }

        for pack_root in &self.expansion_pack_paths {
            for pack_dir in bmad_dirs(pack_root) {
                let pack_name = pack_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                for (file_name, source) in markdown_files(&pack_dir.join("agents")) {
                    discovered.push(DiscoveredAgent {
                        vfs_path: format!("/{pack_name}/agents/{file_name}"),
                        source,
                    });
                }
            }
        }

        for (file_name, source) in markdown_files(&self.local_agents_dir) {
            discovered.push(DiscoveredAgent {
                vfs_path: format!("/.bmad-core/agents/{file_name}"),
                source,
            });
        }

        discovered
    }

    /// The closed set of agent ids `invoke_agent` accepts.
    pub fn known_ids(&self) -> Vec<String> {
        let mut ids: BTreeSet<String> = BTreeSet::new();

        for (id, _) in &self.bundled {
            ids.insert(id.clone());
        }
        for dir in [&self.local_agents_dir, &self.shared_agents_dir] {
            for (file_name, _) in markdown_files(dir) {
                if let Some(stem) = file_name.strip_suffix(".md") {
                    ids.insert(stem.to_string());
                }
            }
        }
        for pack_root in &self.expansion_pack_paths {
            for pack_dir in bmad_dirs(pack_root) {
                for (file_name, _) in markdown_files(&pack_dir.join("agents")) {
                    if let Some(stem) = file_name.strip_suffix(".md") {
                        ids.insert(stem.to_string());
                    }
                }
            }
        }

        ids.into_iter().collect()
    }
}

/// `.bmad-*` subdirectories of a pack root, sorted by name.
fn bmad_dirs(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_dir()
                && p.file_name()
                    .map(|n| {
                        let name = n.to_string_lossy();
                        name.starts_with(".bmad-") && name.len() > ".bmad-".len()
                    })
                    .unwrap_or(false)
        })
        .collect();
    dirs.sort();
    dirs
}

/// `(file_name, content)` for every `.md` file in a directory, sorted.
fn markdown_files(dir: &Path) -> Vec<(String, String)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map(|e| e == "md").unwrap_or(false))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            match std::fs::read_to_string(&path) {
                Ok(content) => Some((name, content)),
                Err(e) => {
                    log::warn!("skipping unreadable agent file {}: {e}", path.display());
                    None
                }
            }
        })
        .collect()
}
