use std::path::Path;
use std::time::Instant;

use anyhow::Result;

use clipd::{ClipPipeline, ClipRequest, ServiceConfig};

pub async fn cmd_clip(
    config: &ServiceConfig,
    source: &str,
    folder: bool,
    start: &str,
    end: &str,
    output: &Path,
) -> Result<()> {
    // Validate before touching the network
    let request = ClipRequest::parse(Some(source), folder, Some(start), Some(end))?;

    println!(
        "✂️  Cutting {}s from {} ({} → {})",
        request.window.duration(),
        request.source_ref,
        clipd::format_timestamp(request.window.start),
        clipd::format_timestamp(request.window.end),
    );

    let started = Instant::now();
    let pipeline = ClipPipeline::from_config(config);
    let clip = pipeline.run(&request).await?;
    let bytes = clip.persist(output).await?;

    println!(
        "💾 Saved {} bytes to {} in {:.1}s",
        bytes,
        output.display(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
