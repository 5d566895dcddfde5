/// Ranking metrics over time-filtered chat and reaction tables.
///
/// Grouping uses insertion-ordered maps so that subjects keep their first
/// (chronologically earliest) appearance as the secondary order; every sort
/// here is stable, which makes that the tie-break for equal scores.
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Serialize;

use crate::model::{MessageRecord, ReactionRecord, Sentiment};
use crate::timefmt::civil_day;

/// Per-subject occurrence count, descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountEntry {
    pub username: String,
    pub count: usize,
}

/// Per-subject ratio metric, descending.
#[derive(Debug, Clone, PartialEq)]
pub struct RatioEntry {
    pub username: String,
    pub ratio: f64,
}

/// One (day, subject, value) sample of a period-bucketed series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub day: NaiveDate,
    pub username: String,
    pub value: f64,
}

/// Round half-to-even at the given number of decimal digits.
pub fn round_half_even(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    let scaled = value * factor;
    let floor = scaled.floor();
    let frac = scaled - floor;

    let rounded = if (frac - 0.5).abs() < 1e-9 {
        if (floor as i64) % 2 == 0 {
            floor
        } else {
            floor + 1.0
        }
    } else if frac > 0.5 {
        floor + 1.0
    } else {
        floor
    };
    rounded / factor
}

/// Period-over-period change in percent, one decimal. An empty baseline
/// yields 0 rather than a division error.
pub fn percent_delta(current: usize, baseline: usize) -> f64 {
    if baseline == 0 {
        return 0.0;
    }
    let change = (current as f64 - baseline as f64) / baseline as f64 * 100.0;
    round_half_even(change, 1)
}

/// Occurrence counts grouped by subject, descending; ties keep first-seen
/// (earliest) order.
pub fn count_by<'a>(names: impl Iterator<Item = &'a str>) -> Vec<CountEntry> {
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for name in names {
        *counts.entry(name.to_string()).or_insert(0) += 1;
    }

    let mut entries: Vec<CountEntry> = counts
        .into_iter()
        .map(|(username, count)| CountEntry { username, count })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries
}

fn sort_descending(entries: &mut [RatioEntry]) {
    entries.sort_by(|a, b| b.ratio.total_cmp(&a.ratio));
}

/// Fun metric: reactions received per message sent, for users with at least
/// one message and one received reaction in-window. Users without a message
/// never appear, even when reactions are recorded against them.
pub fn fun_metric(chat: &[MessageRecord], reactions: &[ReactionRecord]) -> Vec<RatioEntry> {
    let mut message_counts: IndexMap<&str, usize> = IndexMap::new();
    for message in chat {
        *message_counts.entry(message.username.as_str()).or_insert(0) += 1;
    }

    let mut received: IndexMap<&str, usize> = IndexMap::new();
    for reaction in reactions {
        *received
            .entry(reaction.reacted_to_username.as_str())
            .or_insert(0) += 1;
    }

    let mut entries: Vec<RatioEntry> = received
        .iter()
        .filter_map(|(username, reaction_count)| {
            let message_count = *message_counts.get(username)?;
            if message_count == 0 {
                return None;
            }
            Some(RatioEntry {
                username: username.to_string(),
                ratio: round_half_even(*reaction_count as f64 / message_count as f64, 2),
            })
        })
        .collect();
    sort_descending(&mut entries);
    entries
}

/// Wholesome metric: reactions given per reaction received, for users with at
/// least one received reaction. Descending; sort ascending for the
/// "unwholesome" view.
pub fn wholesome_metric(reactions: &[ReactionRecord]) -> Vec<RatioEntry> {
    let mut received: IndexMap<&str, usize> = IndexMap::new();
    let mut given: IndexMap<&str, usize> = IndexMap::new();
    for reaction in reactions {
        *received
            .entry(reaction.reacted_to_username.as_str())
            .or_insert(0) += 1;
        *given
            .entry(reaction.reacting_username.as_str())
            .or_insert(0) += 1;
    }

    let mut entries: Vec<RatioEntry> = received
        .iter()
        .filter(|(_, count)| **count > 0)
        .filter_map(|(username, received_count)| {
            let given_count = *given.get(username)?;
            Some(RatioEntry {
                username: username.to_string(),
                ratio: round_half_even(given_count as f64 / *received_count as f64, 2),
            })
        })
        .collect();
    sort_descending(&mut entries);
    entries
}

/// Ascending copy of a ratio table (same stable tie order).
pub fn sorted_ascending(entries: &[RatioEntry]) -> Vec<RatioEntry> {
    let mut reversed = entries.to_vec();
    reversed.sort_by(|a, b| a.ratio.total_cmp(&b.ratio));
    reversed
}

fn daily_counts<'a>(
    rows: impl Iterator<Item = (NaiveDate, &'a str)>,
) -> IndexMap<(NaiveDate, String), usize> {
    let mut counts: IndexMap<(NaiveDate, String), usize> = IndexMap::new();
    for (day, username) in rows {
        *counts.entry((day, username.to_string())).or_insert(0) += 1;
    }
    counts
}

fn into_series(counts: IndexMap<(NaiveDate, String), usize>) -> Vec<SeriesPoint> {
    let mut series: Vec<SeriesPoint> = counts
        .into_iter()
        .map(|((day, username), count)| SeriesPoint {
            day,
            username,
            value: count as f64,
        })
        .collect();
    series.sort_by(|a, b| a.day.cmp(&b.day).then_with(|| a.username.cmp(&b.username)));
    series
}

/// Messages per (civil day, author), chronological then by subject.
pub fn message_count_series(chat: &[MessageRecord]) -> Vec<SeriesPoint> {
    into_series(daily_counts(
        chat.iter()
            .map(|m| (civil_day(m.timestamp), m.username.as_str())),
    ))
}

/// Reactions received per (civil day, recipient), chronological then by
/// subject.
pub fn reactions_received_series(reactions: &[ReactionRecord]) -> Vec<SeriesPoint> {
    into_series(daily_counts(
        reactions
            .iter()
            .map(|r| (civil_day(r.timestamp), r.reacted_to_username.as_str())),
    ))
}

/// Day-bucketed fun ratio. Buckets messages and received reactions per
/// (civil day, user) and inner-joins the two sides: a (day, user) pair
/// missing on either side is dropped, not zero-filled. Chronological, then
/// descending ratio within a day.
pub fn fun_metric_series(chat: &[MessageRecord], reactions: &[ReactionRecord]) -> Vec<SeriesPoint> {
    let message_buckets = daily_counts(
        chat.iter()
            .map(|m| (civil_day(m.timestamp), m.username.as_str())),
    );
    let reaction_buckets = daily_counts(
        reactions
            .iter()
            .map(|r| (civil_day(r.timestamp), r.reacted_to_username.as_str())),
    );

    let mut series: Vec<SeriesPoint> = message_buckets
        .iter()
        .filter_map(|(key, message_count)| {
            let reaction_count = *reaction_buckets.get(key)?;
            Some(SeriesPoint {
                day: key.0,
                username: key.1.clone(),
                value: round_half_even(reaction_count as f64 / *message_count as f64, 2),
            })
        })
        .collect();
    series.sort_by(|a, b| a.day.cmp(&b.day).then_with(|| b.value.total_cmp(&a.value)));
    series
}

/// Keep only the embedded per-message reaction emojis matching the sentiment.
pub fn filter_message_reactions(
    messages: Vec<MessageRecord>,
    sentiment: Sentiment,
) -> Vec<MessageRecord> {
    messages
        .into_iter()
        .map(|mut message| {
            message
                .reaction_emojis
                .retain(|emoji| sentiment.matches(emoji));
            message
        })
        .collect()
}

/// Keep only reaction events matching the sentiment.
pub fn filter_reactions(
    reactions: Vec<ReactionRecord>,
    sentiment: Sentiment,
) -> Vec<ReactionRecord> {
    reactions
        .into_iter()
        .filter(|reaction| sentiment.matches(&reaction.emoji))
        .collect()
}

/// Order messages by reaction count, then by ascending timestamp for equal
/// counts.
pub fn rank_messages_by_reactions(mut messages: Vec<MessageRecord>) -> Vec<MessageRecord> {
    messages.sort_by(|a, b| {
        b.reaction_count()
            .cmp(&a.reaction_count())
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });
    messages
}
