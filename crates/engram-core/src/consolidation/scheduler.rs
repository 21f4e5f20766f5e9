//! Consolidation trigger evaluation (section 4.6)
//!
//! Decides whether a sleep cycle should run right now, and if so, which
//! `ConsolidationTrigger` explains it. Mirrors the teacher's
//! `sleep::SleepConsolidation` trigger checks but against this crate's
//! own trigger taxonomy.

use chrono::{DateTime, Utc};

use crate::config::EngramConfig;
use crate::model::{ConsolidationRun, ConsolidationTrigger};

const MANY_NEW_MEMORIES_THRESHOLD: u64 = 50;
const IDLE_NEW_MEMORIES_THRESHOLD: u64 = 10;
const IDLE_DURATION: chrono::Duration = chrono::Duration::hours(1);
const SCHEDULED_INTERVAL: chrono::Duration = chrono::Duration::hours(6);
const DEEP_SLEEP_INTERVAL: chrono::Duration = chrono::Duration::hours(24);

/// Decide whether consolidation should run now, and under which trigger.
///
/// `new_memories_since_last_run` counts episodes+facts written since
/// `last_run` finished; `idle_since` is how long it's been since the last
/// write of any kind. `last_run` is `None` the very first time an agent
/// is ever used.
pub fn evaluate(
    config: &EngramConfig,
    last_run: Option<&ConsolidationRun>,
    now: DateTime<Utc>,
    new_memories_since_last_run: u64,
    idle_since: Option<chrono::Duration>,
) -> Option<ConsolidationTrigger> {
    let last_finished = last_run.and_then(|r| r.finished_at);

    if let Some(finished) = last_finished {
        if now - finished < config.consolidation_min_interval {
            return None;
        }
    }

    if last_run.is_none() {
        return Some(ConsolidationTrigger::InitialConsolidation);
    }

    let Some(finished) = last_finished else {
        return None;
    };

    let elapsed = now - finished;

    if elapsed >= DEEP_SLEEP_INTERVAL {
        return Some(ConsolidationTrigger::DeepSleepConsolidation);
    }
    if elapsed >= SCHEDULED_INTERVAL {
        return Some(ConsolidationTrigger::ScheduledConsolidation);
    }
    if new_memories_since_last_run >= MANY_NEW_MEMORIES_THRESHOLD {
        return Some(ConsolidationTrigger::ManyNewMemories);
    }
    if let Some(idle) = idle_since {
        if idle >= IDLE_DURATION && new_memories_since_last_run >= IDLE_NEW_MEMORIES_THRESHOLD {
            return Some(ConsolidationTrigger::IdleTimeConsolidation);
        }
    }

    None
}
