use anyhow::anyhow;
use std::path::Path;

use reviewq_core::cache::QueueKey;
use reviewq_core::types::{ObjectiveId, QueueFilter, ViewBucket};

use super::{block_on, connect};
use crate::output::{print_json, print_table, truncate};

// ---------------------------------------------------------------------------
// queue
// ---------------------------------------------------------------------------

pub fn list(
    config: &Path,
    offline: bool,
    status: &str,
    filter: &str,
    json: bool,
) -> anyhow::Result<()> {
    let key = QueueKey::new(status.parse::<ViewBucket>()?, filter.parse::<QueueFilter>()?);
    let engine = connect(config, offline)?;
    let loaded = block_on(engine.queue(key))?;
    let page = match (loaded.data, loaded.error) {
        (Some(page), None) => page,
        (Some(page), Some(err)) => {
            eprintln!("warning: showing cached data: {}", err.user_message());
            page
        }
        (None, Some(err)) => return Err(anyhow!(err).context(format!("failed to load {key}"))),
        (None, None) => Default::default(),
    };

    if json {
        return print_json(&page);
    }
    if page.cards.is_empty() {
        println!("No cards in {key}.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = page
        .cards
        .iter()
        .map(|c| {
            vec![
                c.id.to_string(),
                c.risk_level.to_string(),
                format!("{}%", c.confidence),
                c.sender.name.clone(),
                truncate(&c.summary, 48),
            ]
        })
        .collect();
    print_table(&["ID", "RISK", "CONF", "FROM", "SUMMARY"], &rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// stats
// ---------------------------------------------------------------------------

pub fn stats(config: &Path, offline: bool, json: bool) -> anyhow::Result<()> {
    let engine = connect(config, offline)?;
    let aggregates = block_on(engine.aggregates())?;
    if json {
        return print_json(&aggregates);
    }
    let Some(stats) = aggregates.stats.data else {
        let message = aggregates
            .stats
            .error
            .map(|e| e.user_message())
            .unwrap_or_else(|| "no stats available".to_string());
        return Err(anyhow!(message));
    };

    println!("{}", stats.global_status.message);
    println!();
    let counts = stats.navigation_counts;
    let rows: Vec<Vec<String>> = ViewBucket::all()
        .iter()
        .map(|b| vec![b.to_string(), counts.get(*b).to_string()])
        .collect();
    print_table(&["VIEW", "COUNT"], &rows);
    let eff = stats.efficiency_stats;
    println!();
    println!(
        "Handled autonomously today: {}/{} ({}%)",
        eff.handled_autonomously, eff.total_today, eff.percentage
    );
    for d in &aggregates.drift {
        eprintln!(
            "warning: {} count is {} but the list shows {}",
            d.bucket, d.counted, d.listed
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// conversation
// ---------------------------------------------------------------------------

pub fn conversation(
    config: &Path,
    offline: bool,
    objective: &str,
    json: bool,
) -> anyhow::Result<()> {
    let engine = connect(config, offline)?;
    let loaded = block_on(engine.conversation_for(&ObjectiveId::from(objective)))?;
    let thread = match (loaded.data, loaded.error) {
        (Some(thread), _) => thread,
        (None, Some(err)) => return Err(anyhow!(err)),
        (None, None) => return Err(anyhow!("no conversation for {objective}")),
    };
    if json {
        return print_json(&thread);
    }
    if let Some(subject) = &thread.subject {
        println!("{subject}");
        println!();
    }
    if thread.messages.is_empty() {
        println!("No messages.");
    }
    for m in &thread.messages {
        println!("[{}] {}: {}", m.sent_at.format("%Y-%m-%d %H:%M"), m.author, m.body);
    }
    Ok(())
}
