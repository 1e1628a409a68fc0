//! Hot/warm/cold aging of cached messages and compaction of the cold tail

use crate::config::ContextManagerConfig;
use crate::sources::Summarizer;
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Counts of transitions performed by one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierReport {
    pub warmed: usize,
    pub cooled: usize,
    pub summarized: usize,
}

impl TierReport {
    pub fn merge(&mut self, other: TierReport) {
        self.warmed += other.warmed;
        self.cooled += other.cooled;
        self.summarized += other.summarized;
    }

    pub fn is_empty(&self) -> bool {
        *self == TierReport::default()
    }
}

/// Tier a message of the given age belongs to, ignoring count limits
pub fn tier_for_age(age: Duration, config: &ContextManagerConfig) -> Tier {
    if age < config.hot_max_age {
        Tier::Hot
    } else if age < config.warm_max_age {
        Tier::Warm
    } else {
        Tier::Cold
    }
}

fn age_at(message: &MessageContext, now: DateTime<Utc>) -> Duration {
    // Clock skew can put created_at in the future; treat that as brand new
    (now - message.created_at).to_std().unwrap_or_default()
}

/// Apply a demotion, never moving a message back toward hot
fn demote(message: &mut MessageContext, target: Tier, report: &mut TierReport) {
    if target <= message.tier {
        return;
    }
    if message.tier == Tier::Hot {
        report.warmed += 1;
    }
    if target == Tier::Cold {
        report.cooled += 1;
    }
    message.tier = target;
}

/// Demote messages by age, and anything older than the newest `max_hot_messages` out of hot
pub fn age_channel(
    channel: &mut ChannelContext,
    now: DateTime<Utc>,
    config: &ContextManagerConfig,
) -> TierReport {
    let mut report = TierReport::default();
    let len = channel.recent_messages.len();

    for (idx, message) in channel.recent_messages.iter_mut().enumerate() {
        let newest_rank = len - 1 - idx;
        let mut target = tier_for_age(age_at(message, now), config);
        if target == Tier::Hot && newest_rank >= config.max_hot_messages {
            target = Tier::Warm;
        }
        demote(message, target, &mut report);
    }

    report
}

/// Keep at most `max_hot` hot messages, demoting the oldest extras to warm
pub fn enforce_hot_cap(channel: &mut ChannelContext, max_hot: usize) -> usize {
    let mut report = TierReport::default();
    let len = channel.recent_messages.len();
    for (idx, message) in channel.recent_messages.iter_mut().enumerate() {
        if len - 1 - idx >= max_hot {
            demote(message, Tier::Warm, &mut report);
        }
    }
    report.warmed
}

/// Summarize the oldest cold messages beyond `summarize_after_messages`, dropping their content.
/// Lossy and one-way. Returns the number of messages newly compacted.
pub fn compact_channel(
    channel: &mut ChannelContext,
    config: &ContextManagerConfig,
    summarizer: &dyn Summarizer,
) -> usize {
    let cold = channel.tier_count(Tier::Cold);
    if cold <= config.summarize_after_messages {
        return 0;
    }

    let mut excess = cold - config.summarize_after_messages;
    let mut summarized = 0;
    for message in channel.recent_messages.iter_mut() {
        if excess == 0 {
            break;
        }
        if message.tier != Tier::Cold {
            continue;
        }
        excess -= 1;
        if message.summary.is_none() {
            message.summary = Some(summarizer.summarize(message));
            message.content.clear();
            summarized += 1;
        }
    }
    summarized
}
