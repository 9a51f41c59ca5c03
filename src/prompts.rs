//! Prompt templates with `{placeholder}` slots.
//!
//! Built-in wording is used unless the prompts directory holds a file with
//! the same name.

use std::path::{Path, PathBuf};
use tracing::debug;

pub const SEARCH_PROMPT_FILE: &str = "search_prompt.txt";
pub const COMPOSE_PROMPT_FILE: &str = "compose_prompt.txt";
pub const SCENE_PROMPT_FILE: &str = "scene_prompt.txt";

const SEARCH_PROMPT: &str = r#"Search the web for the most recent, verifiable facts about: {topic}.
Summarise what happened, when, where, who was involved and why it matters.
List concrete figures and dates. Cite sources inline. Do not speculate."#;

const COMPOSE_PROMPT: &str = r#"You are a TV news script writer. Write a {scene_count}-scene news video script about: {topic}.
Use only the facts in the context below.

Return ONLY a JSON array, one object per scene, in order:
[{"scene_id": 1, "ssml": "<speak>...</speak>", "visual_desc": "...", "transition_hint": "..."}]

- scene_id starts at 1 and increases by one.
- ssml is the narration for about 8 seconds of speech, as valid SSML.
- visual_desc describes one cinematic 8-second shot with no on-screen text.
- transition_hint says how the shot continues from the previous scene.

Context:
{context}"#;

const SCENE_PROMPT: &str = r#"Cinematic 8-second news footage, no on-screen text.
Previous shot: {prev_visual}
Transition: {transition_hint}
This shot: {main_visual}"#;

/// Loaded prompt templates.
#[derive(Debug, Clone)]
pub struct Prompts {
    search: String,
    compose: String,
    scene: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            search: SEARCH_PROMPT.to_string(),
            compose: COMPOSE_PROMPT.to_string(),
            scene: SCENE_PROMPT.to_string(),
        }
    }
}

impl Prompts {
    pub async fn load(dir: Option<&Path>) -> Self {
        let Some(dir) = dir else {
            return Self::default();
        };
        Self {
            search: read_or(dir.join(SEARCH_PROMPT_FILE), SEARCH_PROMPT).await,
            compose: read_or(dir.join(COMPOSE_PROMPT_FILE), COMPOSE_PROMPT).await,
            scene: read_or(dir.join(SCENE_PROMPT_FILE), SCENE_PROMPT).await,
        }
    }

    pub fn search(&self, topic: &str) -> String {
        fill(&self.search, &[("topic", topic)])
    }

    pub fn compose(&self, topic: &str, context: &str, scene_count: usize) -> String {
        fill(
            &self.compose,
            &[
                ("topic", topic),
                ("scene_count", &scene_count.to_string()),
                ("context", context),
            ],
        )
    }

    pub fn scene(&self, prev_visual: &str, transition_hint: &str, main_visual: &str) -> String {
        fill(
            &self.scene,
            &[
                ("prev_visual", prev_visual),
                ("transition_hint", transition_hint),
                ("main_visual", main_visual),
            ],
        )
    }
}

async fn read_or(path: PathBuf, fallback: &str) -> String {
    match tokio::fs::read_to_string(&path).await {
        Ok(text) if !text.trim().is_empty() => {
            debug!("Using prompt template {}", path.display());
            text
        }
        _ => fallback.to_string(),
    }
}

/// Substitute `{name}` slots in a single pass, so values are never re-expanded.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Cut `text` to at most `limit` characters.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
