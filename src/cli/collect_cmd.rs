//! `mapscout collect <url>`: load a page and collect every declared source map.

use crate::config::HarvestConfig;
use crate::events::{EventBus, HarvestEvent};
use crate::harvest::{MapOutcome, SourceMapHarvest};
use crate::inspector::chromium::ChromiumInspector;
use crate::inspector::Inspector;
use anyhow::Result;
use std::time::Duration;
use tracing::{debug, warn};

/// Run the collect command.
pub async fn run(url: &str, config: HarvestConfig, json: bool) -> Result<()> {
    let inspector = ChromiumInspector::new().await?;
    let page = inspector.new_page("about:blank").await?;

    let bus = EventBus::new(64);
    let mut progress = bus.subscribe();
    let reporter = tokio::spawn(async move {
        while let Ok(event) = progress.recv().await {
            match &event {
                HarvestEvent::MapFailed { script_url, error } => {
                    warn!(%script_url, %error, "source map resolution failed")
                }
                other => debug!(event = ?other, "harvest progress"),
            }
        }
    });

    let mut harvest = SourceMapHarvest::with_bus(config.clone(), bus);
    harvest.begin(page.as_ref()).await?;
    page.navigate(url, config.navigation_timeout_ms).await?;
    tokio::time::sleep(Duration::from_millis(config.settle_ms)).await;
    let outcomes = harvest.finish(page.as_ref()).await?;
    reporter.abort();

    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        print_summary(url, &outcomes);
    }

    page.close().await?;
    inspector.shutdown().await?;
    Ok(())
}

fn print_summary(url: &str, outcomes: &[MapOutcome]) {
    let resolved = outcomes.iter().filter(|o| o.is_resolved()).count();
    println!(
        "{url}: {} scripts with source maps, {resolved} resolved, {} failed",
        outcomes.len(),
        outcomes.len() - resolved
    );
    for outcome in outcomes {
        match outcome {
            MapOutcome::Resolved {
                script_url,
                source_map_url,
                ..
            } => {
                let location = source_map_url.as_deref().unwrap_or("(inline)");
                println!("  ok    {script_url} <- {location}");
            }
            MapOutcome::Failed {
                script_url, error, ..
            } => {
                println!("  fail  {script_url}: {error}");
            }
        }
    }
}
