use anyhow::Result;

use clipd::ServiceConfig;

pub fn cmd_episodes(config: &ServiceConfig, json: bool) -> Result<()> {
    let summaries = config
        .catalog()
        .summaries(|id| config.remote.thumbnail_for(id));

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "episodes": summaries }))?
        );
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No episodes configured. Add [[episodes]] tables to the config file.");
        return Ok(());
    }

    for episode in &summaries {
        let kind = if episode.is_folder { "folder" } else { "file" };
        println!(
            "{:>4}  {:<40}  {:<6}  {}",
            episode.episode_number, episode.title, kind, episode.id
        );
    }
    println!("\n({} episodes)", summaries.len());
    Ok(())
}
