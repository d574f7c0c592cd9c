//! Chain export: renders a complete chain as a notebook markdown note.

use crate::clock::utc_today;
use crate::error::HubResult;
use crate::notebook::{Frontmatter, NotebookVault};
use crate::servers::chains::chain::ReasoningChain;

/// Export file name: `reasoning-YYYY-MM-DD-<chainid8>.md`.
pub fn export_name(chain: &ReasoningChain) -> String {
    let short: String = chain.id.chars().take(8).collect();
    format!("reasoning-{}-{}.md", utc_today(), short)
}

/// Frontmatter for the exported note: title, chain_id, status, created, and
/// the optional goal/tags.
pub fn export_frontmatter(chain: &ReasoningChain) -> Frontmatter {
    let mut fm = Frontmatter::new();
    let title = if chain.prompt.len() > 60 {
        let mut cut = 60;
        while !chain.prompt.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &chain.prompt[..cut])
    } else {
        chain.prompt.clone()
    };
    fm.insert("title", title);
    fm.insert("chain_id", chain.id.as_str());
    fm.insert("status", chain.status.as_str());
    fm.insert("created", chain.created_at.as_str());
    if let Some(goal) = &chain.goal {
        fm.insert("goal", goal.as_str());
    }
    if !chain.tags.is_empty() {
        fm.insert("tags", chain.tags.clone());
    }
    fm
}

/// Body of the exported note: Prompt, one subsection per step, Conclusion.
pub fn export_body(chain: &ReasoningChain) -> String {
    let mut out = String::new();
    out.push_str("## Prompt\n\n");
    out.push_str(&chain.prompt);
    out.push_str("\n\n## Reasoning Steps\n");
    for step in &chain.steps {
        out.push_str(&format!(
            "\n### Step {}: {}\n\n{}\n",
            step.step_number,
            step.step_type.as_str(),
            step.thought
        ));
        if let Some(data) = &step.data {
            out.push_str(&format!(
                "\n```json\n{}\n```\n",
                serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
            ));
        }
        if let Some(confidence) = step.confidence {
            out.push_str(&format!("\n*Confidence: {}*\n", confidence));
        }
    }
    out.push_str("\n## Conclusion\n\n");
    out.push_str(chain.conclusion.as_deref().unwrap_or("(none)"));
    out.push('\n');
    if let Some(confidence) = chain.confidence {
        out.push_str(&format!("\n*Confidence: {}*\n", confidence));
    }
    out
}

/// Writes the export into the vault, returning the note name.
pub async fn export_chain(vault: &NotebookVault, chain: &ReasoningChain) -> HubResult<String> {
    let name = export_name(chain);
    let fm = export_frontmatter(chain);
    vault.write(&name, &export_body(chain), Some(&fm)).await?;
    Ok(name)
}
