//! Background refresh loop for tracked guilds

use crate::store::{PollOutcome, SharedGuildContextStore};
use crate::tiering::TierReport;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Poll every tracked guild once, concurrently, then run tier maintenance on each
pub async fn poll_all(store: &SharedGuildContextStore) -> Vec<(String, PollOutcome)> {
    let guild_ids = store.guild_ids();
    let polls = guild_ids.iter().map(|id| store.poll_guild(id));
    let outcomes = futures::future::join_all(polls).await;

    let mut maintenance = TierReport::default();
    for guild_id in &guild_ids {
        if let Some(report) = store.run_tier_maintenance(guild_id) {
            maintenance.merge(report);
        }
    }

    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, PollOutcome::Failed { .. }))
        .count();
    if failed > 0 {
        warn!("{} of {} guild polls failed", failed, guild_ids.len());
    }
    debug!(
        "Poll cycle done: {} guilds, {} warmed, {} cooled, {} summarized",
        guild_ids.len(),
        maintenance.warmed,
        maintenance.cooled,
        maintenance.summarized
    );

    guild_ids.into_iter().zip(outcomes).collect()
}

/// Start the recurring poll loop. The first cycle runs immediately.
///
/// Returns None when auto polling is disabled. Aborting the handle stops the loop.
pub fn spawn_auto_poll(store: SharedGuildContextStore) -> Option<JoinHandle<()>> {
    let config = store.config();
    if !config.auto_poll {
        info!("Auto polling disabled");
        return None;
    }

    let period = config.poll_interval.max(Duration::from_secs(1));
    info!(
        "Auto polling every {}s via {}",
        period.as_secs(),
        store.source_name()
    );

    Some(tokio::spawn(async move {
        let mut ticker = interval(period);
        // A slow cycle should not trigger a burst of catch-up polls
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            poll_all(&store).await;
        }
    }))
}
