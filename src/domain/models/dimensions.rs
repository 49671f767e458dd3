//! Dimension sets, fingerprinting, and the `queue_number` ordering key.
//!
//! Bots advertise a dimension set (`key -> set of values`, e.g.
//! `os -> {Linux, Ubuntu, Ubuntu-22.04}`). Task requests name dimensions
//! they require (`key -> value`). A bot matches a task when every
//! required `(key, value)` pair is present among the bot's advertised
//! values for that key. This is a pure subset test; `properties_hash`
//! and `dimensions_hash` only narrow the search space, they never decide
//! a match on their own.

use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, BTreeSet};

/// Dimensions a task requires: one value per key.
pub type TaskDimensions = BTreeMap<String, String>;

/// Dimensions a bot advertises: a set of acceptable values per key.
pub type BotDimensions = BTreeMap<String, BTreeSet<String>>;

/// Largest dimension set a task request may carry before it is rejected
/// as a validation error. Mirrors the guard against runaway powerset
/// expansion during matching.
pub const MAX_DIMENSIONS: usize = 32;

/// Largest cartesian product of a bot's advertised per-key value sets
/// before the bot is quarantined instead of offered work. Distinct from
/// [`MAX_DIMENSIONS`]: that guard bounds what a *task* may require, this
/// one bounds what a *bot* may advertise.
pub const MAX_BOT_DIMENSION_POWERSET: usize = 4096;

/// True if every key/value pair required by the task is advertised by the bot.
pub fn matches(task: &TaskDimensions, bot: &BotDimensions) -> bool {
    task.iter().all(|(key, value)| bot.get(key).is_some_and(|values| values.contains(value)))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DimensionsError {
    #[error("task has {0} dimensions, exceeding the limit of {MAX_DIMENSIONS}")]
    TooManyDimensions(usize),
    #[error("dimension key must not be empty")]
    EmptyKey,
    #[error("bot advertises a dimension powerset of size {0}, exceeding the limit of {MAX_BOT_DIMENSION_POWERSET}")]
    BotPowersetTooLarge(usize),
}

pub fn validate_task_dimensions(dims: &TaskDimensions) -> Result<(), DimensionsError> {
    if dims.len() > MAX_DIMENSIONS {
        return Err(DimensionsError::TooManyDimensions(dims.len()));
    }
    if dims.keys().any(|k| k.is_empty()) {
        return Err(DimensionsError::EmptyKey);
    }
    Ok(())
}

/// Size of the cartesian product of a bot's per-key advertised value
/// sets, e.g. `os -> {Linux, Ubuntu}, pool -> {default}` has size 2.
pub fn bot_dimensions_powerset_size(bot: &BotDimensions) -> usize {
    bot.values().fold(1usize, |acc, values| acc.saturating_mul(values.len().max(1)))
}

/// Reject a bot's advertised dimensions if their powerset is large
/// enough to make matching pathological. Callers quarantine the bot
/// rather than reject the poll outright (see `services::reservation`).
pub fn validate_bot_dimensions(bot: &BotDimensions) -> Result<(), DimensionsError> {
    let size = bot_dimensions_powerset_size(bot);
    if size > MAX_BOT_DIMENSION_POWERSET {
        return Err(DimensionsError::BotPowersetTooLarge(size));
    }
    Ok(())
}

/// SHA-1 fingerprint over the sorted `(key, value)` pairs of a task's
/// required dimensions. Used as a coarse index column; the authoritative
/// check is always [`matches`].
pub fn dimensions_hash(dims: &TaskDimensions) -> String {
    let mut hasher = Sha1::new();
    for (key, value) in dims {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// SHA-1 fingerprint over a task's canonical properties: its dimensions
/// plus its ordered command line and input data references. Two requests
/// with identical properties hash to the same value, which callers use
/// to deduplicate otherwise-identical task submissions.
pub fn properties_hash(dims: &TaskDimensions, commands: &[Vec<String>]) -> String {
    let mut hasher = Sha1::new();
    for (key, value) in dims {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update([0xffu8]);
    for command in commands {
        for arg in command {
            hasher.update(arg.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([0xfeu8]);
    }
    hex::encode(hasher.finalize())
}

/// Packs priority and enqueue time into a single 63-bit integer such
/// that ascending numeric order is dispatch order: highest priority
/// (lowest `priority` value) first, then oldest `created_ts` first.
///
/// Layout: 8 bits of priority in the high bits, followed by 55 bits of
/// inverted millisecond timestamp. Inverting the timestamp (subtracting
/// it from a ceiling) turns "oldest first" into "numerically smallest
/// first" so the whole key sorts correctly with one comparison.
pub fn queue_number(priority: u8, created_ts_millis: i64) -> i64 {
    const TIMESTAMP_BITS: u32 = 55;
    const TIMESTAMP_CEILING: i64 = (1i64 << TIMESTAMP_BITS) - 1;
    let inverted = TIMESTAMP_CEILING - created_ts_millis.clamp(0, TIMESTAMP_CEILING);
    (i64::from(priority) << TIMESTAMP_BITS) | inverted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(pairs: &[(&str, &str)]) -> TaskDimensions {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    fn bot_dims(pairs: &[(&str, &[&str])]) -> BotDimensions {
        pairs
            .iter()
            .map(|(k, vs)| ((*k).to_string(), vs.iter().map(|v| (*v).to_string()).collect()))
            .collect()
    }

    #[test]
    fn subset_match_succeeds_when_all_required_values_present() {
        let task = dims(&[("os", "Linux"), ("pool", "default")]);
        let bot = bot_dims(&[("os", &["Linux", "Ubuntu-22.04"]), ("pool", &["default"])]);
        assert!(matches(&task, &bot));
    }

    #[test]
    fn subset_match_fails_on_missing_key() {
        let task = dims(&[("gpu", "nvidia")]);
        let bot = bot_dims(&[("os", &["Linux"])]);
        assert!(!matches(&task, &bot));
    }

    #[test]
    fn subset_match_fails_on_value_not_advertised() {
        let task = dims(&[("os", "Windows")]);
        let bot = bot_dims(&[("os", &["Linux"])]);
        assert!(!matches(&task, &bot));
    }

    #[test]
    fn empty_task_dimensions_match_any_bot() {
        let task = dims(&[]);
        let bot = bot_dims(&[("os", &["Linux"])]);
        assert!(matches(&task, &bot));
    }

    #[test]
    fn too_many_dimensions_is_rejected() {
        let mut dims = TaskDimensions::new();
        for i in 0..=MAX_DIMENSIONS {
            dims.insert(format!("key{i}"), "value".to_string());
        }
        assert!(matches!(validate_task_dimensions(&dims), Err(DimensionsError::TooManyDimensions(_))));
    }

    #[test]
    fn modest_bot_dimensions_pass_the_powerset_guard() {
        let bot = bot_dims(&[("os", &["Linux", "Ubuntu-22.04"]), ("pool", &["default"])]);
        assert!(validate_bot_dimensions(&bot).is_ok());
    }

    #[test]
    fn pathological_bot_dimensions_exceed_the_powerset_guard() {
        let mut bot = BotDimensions::new();
        for i in 0..16 {
            bot.insert(format!("key{i}"), BTreeSet::from(["a".to_string(), "b".to_string(), "c".to_string()]));
        }
        assert!(matches!(validate_bot_dimensions(&bot), Err(DimensionsError::BotPowersetTooLarge(_))));
    }

    #[test]
    fn dimensions_hash_is_order_independent() {
        let a = dims(&[("os", "Linux"), ("pool", "default")]);
        let b = dims(&[("pool", "default"), ("os", "Linux")]);
        assert_eq!(dimensions_hash(&a), dimensions_hash(&b));
    }

    #[test]
    fn dimensions_hash_differs_on_value_change() {
        let a = dims(&[("os", "Linux")]);
        let b = dims(&[("os", "Windows")]);
        assert_ne!(dimensions_hash(&a), dimensions_hash(&b));
    }

    #[test]
    fn properties_hash_is_stable_for_identical_input() {
        let d = dims(&[("os", "Linux")]);
        let commands = vec![vec!["echo".to_string(), "hi".to_string()]];
        assert_eq!(properties_hash(&d, &commands), properties_hash(&d, &commands));
    }

    #[test]
    fn queue_number_orders_higher_priority_first() {
        let high = queue_number(0, 1_000);
        let low = queue_number(200, 1_000);
        assert!(high < low, "lower priority value must sort first");
    }

    #[test]
    fn queue_number_orders_older_first_at_equal_priority() {
        let older = queue_number(100, 1_000);
        let newer = queue_number(100, 2_000);
        assert!(older < newer, "older created_ts must sort first");
    }
}
