//! `cadence list`: show workflows and their triggers.

use anyhow::Result;
use colored::Colorize;

use cadence::workflow::Workflow;

pub fn cmd_list(json: bool) -> Result<()> {
    let dir = super::ensure_initialized()?;
    let workflows = Workflow::load_all(&dir)?;

    if json {
        let items: Vec<serde_json::Value> = workflows
            .iter()
            .map(|wf| {
                serde_json::json!({
                    "name": wf.display_name(),
                    "file": wf.path.as_ref().map(|p| p.display().to_string()),
                    "events": wf.on.entries.iter().map(|(k, _)| k.to_string()).collect::<Vec<_>>(),
                    "jobs": wf.jobs.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if workflows.is_empty() {
        println!("No workflows found");
        return Ok(());
    }

    for wf in &workflows {
        let events: Vec<String> = wf.on.entries.iter().map(|(k, _)| k.to_string()).collect();
        let file = wf
            .path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        println!(
            "{}  {}  on: {}  {} job(s)",
            wf.display_name().cyan(),
            file.dimmed(),
            events.join(", "),
            wf.jobs.len()
        );
    }
    Ok(())
}
