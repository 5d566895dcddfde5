/// Report orchestration: one handler per chat command.
///
/// Every handler runs the same pipeline: reload the cache if the ingestion
/// job flagged an update, resolve arguments, scope the tables to the
/// requested window, derive the metrics and format the reply. Argument
/// failures come back as a plain reply payload; only storage faults
/// propagate as errors.
use anyhow::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::args::{self, ArgError, ArgKind, ArgSpec, Query};
use crate::cache::ArchiveCache;
use crate::chart::{ChartRenderer, ChartSpec};
use crate::format;
use crate::metrics;
use crate::model::{MessageKind, MessageRecord, ReactionRecord, Sentiment, MAX_USERNAME_LEN};
use crate::window::{filter_shifted_window, filter_window};

/// Reply handed to the transport layer; delivery is fire-and-forget.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyPayload {
    /// Plain text.
    Text(String),
    /// MarkdownV2 text, reserved characters already escaped.
    Markdown(String),
    /// Media artifact with a caption.
    Media {
        kind: MessageKind,
        path: PathBuf,
        caption: String,
    },
}

const TOP_SUMMARY: usize = 3;
const TOP_LISTING: usize = 5;
const DEFAULT_LAST_COUNT: u32 = 10;

pub struct ChatCommands {
    cache: ArchiveCache,
    media_dir: PathBuf,
    renderer: Box<dyn ChartRenderer>,
}

impl ChatCommands {
    pub fn new(data_dir: &Path, renderer: Box<dyn ChartRenderer>) -> Result<Self> {
        Ok(Self {
            cache: ArchiveCache::load(data_dir)?,
            media_dir: data_dir.join("media"),
            renderer,
        })
    }

    fn user_period_spec() -> ArgSpec {
        ArgSpec::new(&[(ArgKind::User, true), (ArgKind::Period, true)])
    }

    fn error_reply(err: ArgError) -> Vec<ReplyPayload> {
        info!(%err, "argument resolution failed");
        vec![ReplyPayload::Text(err.to_string())]
    }

    /// Window-filter both tables, apply the sentiment partition to the
    /// per-message reaction lists, rank messages by reactions and scope the
    /// chat table to the requested user.
    fn scoped_tables(
        &self,
        query: &Query,
        sentiment: Sentiment,
    ) -> (Vec<MessageRecord>, Vec<ReactionRecord>) {
        let now = Utc::now();
        let chat = filter_window(&self.cache.chat, query.period, now);
        let reactions = filter_window(&self.cache.reactions, query.period, now);

        let chat = metrics::filter_message_reactions(chat, sentiment);
        let mut chat = metrics::rank_messages_by_reactions(chat);
        if let Some(user) = &query.user {
            chat.retain(|message| &message.username == user);
        }
        (chat, reactions)
    }

    /// Chat summary: totals with period-over-period deltas, top spammers,
    /// fun/wholesome meters, liked/disliked rankings and the top message.
    pub fn summary(&mut self, tokens: &[String]) -> Result<Vec<ReplyPayload>> {
        self.cache.reload_if_stale()?;
        let query = match args::resolve(&self.cache.users, tokens, &Self::user_period_spec()) {
            Ok(query) => query,
            Err(err) => return Ok(Self::error_reply(err)),
        };

        let (chat, reactions) = self.scoped_tables(&query, Sentiment::All);

        let now = Utc::now();
        let mut shifted_chat = filter_shifted_window(&self.cache.chat, query.period, now);
        let mut shifted_reactions =
            filter_shifted_window(&self.cache.reactions, query.period, now);
        if let Some(user) = &query.user {
            shifted_chat.retain(|message| &message.username == user);
            shifted_reactions.retain(|reaction| &reaction.reacted_to_username == user);
        }

        let sad_reactions = metrics::filter_reactions(reactions.clone(), Sentiment::Negative);
        let images_num = chat
            .iter()
            .filter(|m| m.kind == MessageKind::Image)
            .count();

        let message_counts = metrics::count_by(chat.iter().map(|m| m.username.as_str()));
        let received = metrics::count_by(reactions.iter().map(|r| r.reacted_to_username.as_str()));
        let given = metrics::count_by(reactions.iter().map(|r| r.reacting_username.as_str()));
        let sad_received =
            metrics::count_by(sad_reactions.iter().map(|r| r.reacted_to_username.as_str()));
        let sad_given =
            metrics::count_by(sad_reactions.iter().map(|r| r.reacting_username.as_str()));

        let fun = metrics::fun_metric(&chat, &reactions);
        let wholesome = metrics::wholesome_metric(&reactions);
        let unwholesome = metrics::sorted_ascending(&wholesome);

        let message_delta = metrics::percent_delta(chat.len(), shifted_chat.len());
        let reaction_delta = metrics::percent_delta(reactions.len(), shifted_reactions.len());

        let mut text = format::headline("*Chat summary*", query.user.as_deref(), query.period);
        text.push_str(&format!(
            "\n- *Total*: *{} ({})* messages, *{} ({})* reactions and *{}* images",
            chat.len(),
            format::format_delta(message_delta),
            reactions.len(),
            format::format_delta(reaction_delta),
            images_num
        ));
        text.push_str(&format!(
            "\n- *Top spammer*: {}",
            format::count_fragment(&message_counts, TOP_SUMMARY)
        ));
        text.push_str(&format!(
            "\n- *Fun meter*: {}",
            format::ratio_fragment(&fun, TOP_SUMMARY)
        ));
        text.push_str(&format!(
            "\n- *Wholesome meter*: {}",
            format::ratio_fragment(&wholesome, TOP_SUMMARY)
        ));
        text.push_str(&format!(
            "\n- *Unwholesome meter*: {}",
            format::ratio_fragment(&unwholesome, TOP_SUMMARY)
        ));
        text.push_str(&format!(
            "\n- *Most liked*: {}",
            format::count_fragment(&received, TOP_SUMMARY)
        ));
        text.push_str(&format!(
            "\n- *Most liking*: {}",
            format::count_fragment(&given, TOP_SUMMARY)
        ));
        text.push_str(&format!(
            "\n- *Most disliked*: {}",
            format::count_fragment(&sad_received, TOP_SUMMARY)
        ));
        text.push_str(&format!(
            "\n- *Most disliking*: {}",
            format::count_fragment(&sad_given, TOP_SUMMARY)
        ));

        if let Some(top) = chat.iter().find(|m| m.has_text()) {
            text.push_str(&format!(
                "\n- *Top message*: {} [{}]: {} [{}]",
                top.username,
                crate::timefmt::format_timestamp(top.timestamp),
                top.text,
                top.reaction_emojis.join("")
            ));
        }

        Ok(vec![ReplyPayload::Markdown(format::escape_markdown(&text))])
    }

    /// Top (or, with the negative partition, worst) 5 text messages by
    /// reaction count.
    pub fn top_messages(
        &mut self,
        tokens: &[String],
        sentiment: Sentiment,
    ) -> Result<Vec<ReplyPayload>> {
        self.cache.reload_if_stale()?;
        let query = match args::resolve(&self.cache.users, tokens, &Self::user_period_spec()) {
            Ok(query) => query,
            Err(err) => return Ok(Self::error_reply(err)),
        };

        let (chat, _) = self.scoped_tables(&query, sentiment);
        let label = format!("{} {} messages", sentiment.label(), TOP_LISTING);
        let mut text = format::headline(&label, query.user.as_deref(), query.period);

        let with_username = query.user.is_none();
        for (i, message) in chat.iter().filter(|m| m.has_text()).take(TOP_LISTING).enumerate() {
            if message.reaction_count() == 0 {
                break;
            }
            text.push_str(&format::message_row(i, message, with_username));
        }

        Ok(vec![ReplyPayload::Text(format::enforce_length(text))])
    }

    /// Top 5 media messages by reaction count, as media payloads referencing
    /// the stored artifacts. Video and video notes rank together.
    pub fn top_media(
        &mut self,
        tokens: &[String],
        kind: MessageKind,
        sentiment: Sentiment,
    ) -> Result<Vec<ReplyPayload>> {
        self.cache.reload_if_stale()?;
        let query = match args::resolve(&self.cache.users, tokens, &Self::user_period_spec()) {
            Ok(query) => query,
            Err(err) => return Ok(Self::error_reply(err)),
        };

        let (mut chat, _) = self.scoped_tables(&query, sentiment);
        chat.retain(|message| match kind {
            MessageKind::Video => {
                matches!(message.kind, MessageKind::Video | MessageKind::VideoNote)
            }
            other => message.kind == other,
        });

        let label = format!("{} {} {}", sentiment.label(), TOP_LISTING, kind);
        let headline = format::headline(&label, query.user.as_deref(), query.period);
        let mut replies = vec![ReplyPayload::Text(headline)];

        let with_username = query.user.is_none();
        for (i, message) in chat.iter().take(TOP_LISTING).enumerate() {
            let caption = format::message_row(i, message, with_username);
            replies.push(ReplyPayload::Media {
                kind: message.kind,
                path: self.media_path(message),
                caption: caption.trim_start().to_string(),
            });
        }
        Ok(replies)
    }

    /// Last n messages, newest first.
    pub fn last_messages(&mut self, tokens: &[String]) -> Result<Vec<ReplyPayload>> {
        self.cache.reload_if_stale()?;
        let spec = ArgSpec::new(&[(ArgKind::User, true), (ArgKind::Number, true)]);
        let query = match args::resolve(&self.cache.users, tokens, &spec) {
            Ok(query) => query,
            Err(err) => return Ok(Self::error_reply(err)),
        };

        let (mut chat, _) = self.scoped_tables(&query, Sentiment::All);
        chat.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let count = query.number.unwrap_or(DEFAULT_LAST_COUNT) as usize;
        let mut text = format!("Last {} messages", count);
        match &query.user {
            Some(user) => text.push_str(&format!(" by {}", user)),
            None => text.push(':'),
        }

        let with_username = query.user.is_none();
        for (i, message) in chat.iter().take(count).enumerate() {
            text.push_str(&format::message_row(i, message, with_username));
        }

        Ok(vec![ReplyPayload::Text(format::enforce_length(text))])
    }

    /// Full fun-meter listing as an aligned code block.
    pub fn fun(&mut self, tokens: &[String]) -> Result<Vec<ReplyPayload>> {
        self.cache.reload_if_stale()?;
        let spec = ArgSpec::new(&[(ArgKind::Period, true)]);
        let query = match args::resolve(&self.cache.users, tokens, &spec) {
            Ok(query) => query,
            Err(err) => return Ok(Self::error_reply(err)),
        };

        let (chat, reactions) = self.scoped_tables(&query, Sentiment::All);
        let fun = metrics::fun_metric(&chat, &reactions);
        Ok(Self::ratio_listing("Funmeter", &query, &fun))
    }

    /// Full wholesome-meter listing as an aligned code block.
    pub fn wholesome(&mut self, tokens: &[String]) -> Result<Vec<ReplyPayload>> {
        self.cache.reload_if_stale()?;
        let spec = ArgSpec::new(&[(ArgKind::Period, true)]);
        let query = match args::resolve(&self.cache.users, tokens, &spec) {
            Ok(query) => query,
            Err(err) => return Ok(Self::error_reply(err)),
        };

        let (_, reactions) = self.scoped_tables(&query, Sentiment::All);
        let wholesome = metrics::wholesome_metric(&reactions);
        Ok(Self::ratio_listing("Wholesome meter", &query, &wholesome))
    }

    fn ratio_listing(
        label: &str,
        query: &Query,
        entries: &[metrics::RatioEntry],
    ) -> Vec<ReplyPayload> {
        let mut body = format::headline(label, query.user.as_deref(), query.period);
        for (i, entry) in entries.iter().enumerate() {
            body.push_str(&format::ratio_row(i, entry));
        }
        // Code fences keep the column alignment; the body itself carries no
        // reserved markup inside a pre block.
        let text = format!("```{}\n```", body);
        vec![ReplyPayload::Markdown(format::enforce_length(text))]
    }

    /// Day-bucketed fun-ratio chart.
    pub fn fun_chart(&mut self, tokens: &[String]) -> Result<Vec<ReplyPayload>> {
        self.chart(tokens, "Funmeter", "funratio", |chat, reactions| {
            metrics::fun_metric_series(chat, reactions)
        })
    }

    /// Day-bucketed message-count chart.
    pub fn spam_chart(&mut self, tokens: &[String]) -> Result<Vec<ReplyPayload>> {
        self.chart(tokens, "Spamchart", "messages", |chat, _| {
            metrics::message_count_series(chat)
        })
    }

    /// Day-bucketed reactions-received chart.
    pub fn like_chart(&mut self, tokens: &[String]) -> Result<Vec<ReplyPayload>> {
        self.chart(tokens, "Likechart", "likes received", |_, reactions| {
            metrics::reactions_received_series(reactions)
        })
    }

    fn chart(
        &mut self,
        tokens: &[String],
        label: &str,
        y_label: &str,
        series_fn: impl Fn(&[MessageRecord], &[ReactionRecord]) -> Vec<metrics::SeriesPoint>,
    ) -> Result<Vec<ReplyPayload>> {
        self.cache.reload_if_stale()?;
        let query = match args::resolve(&self.cache.users, tokens, &Self::user_period_spec()) {
            Ok(query) => query,
            Err(err) => return Ok(Self::error_reply(err)),
        };

        let (chat, reactions) = self.scoped_tables(&query, Sentiment::All);
        let users = match &query.user {
            Some(user) => vec![user.clone()],
            None => self
                .cache
                .users
                .iter()
                .map(|u| u.username.clone())
                .collect(),
        };

        let headline = format::headline(label, query.user.as_deref(), query.period);
        let series = series_fn(&chat, &reactions);
        let spec = ChartSpec::new(headline.clone(), "time", y_label, users, series);
        let path = self.renderer.render(&spec)?;
        info!(path = %path.display(), "chart artifact rendered");

        Ok(vec![ReplyPayload::Media {
            kind: MessageKind::Image,
            path,
            caption: headline,
        }])
    }

    /// All users with their nicknames.
    pub fn list_users(&mut self) -> Result<Vec<ReplyPayload>> {
        self.cache.reload_if_stale()?;

        let mut text = "All ye who dost partake in this discourse:".to_string();
        for user in self.cache.users.iter() {
            text.push_str(&format!(
                "\n- *{}*: [{}]",
                user.username,
                user.nicknames.join(", ")
            ));
        }
        Ok(vec![ReplyPayload::Markdown(format::escape_markdown(&text))])
    }

    /// Add a nickname for the invoking user, bounded per user.
    pub fn add_nickname(&mut self, user_id: i64, tokens: &[String]) -> Result<Vec<ReplyPayload>> {
        self.cache.reload_if_stale()?;
        let spec = ArgSpec::new(&[(ArgKind::Text, false)]).text_bounds(3, 20, "Nickname");
        let query = match args::resolve(&self.cache.users, tokens, &spec) {
            Ok(query) => query,
            Err(err) => return Ok(Self::error_reply(err)),
        };
        let nickname = query.text.expect("text argument is required");

        let (username, nicknames) = match self.cache.users.add_nickname(user_id, &nickname) {
            Ok(user) => (user.username.clone(), user.nicknames.join(", ")),
            Err(err) => {
                return Ok(vec![ReplyPayload::Markdown(format::escape_markdown(
                    &err.to_string(),
                ))])
            }
        };
        self.cache.persist_users()?;

        let text = format!(
            "Nickname *{}* added for *{}*. Resulting in the following nicknames: *{}*. \
             It will get updated in a few minutes.",
            nickname, username, nicknames
        );
        Ok(vec![ReplyPayload::Markdown(format::escape_markdown(&text))])
    }

    /// Change the invoking user's display username.
    pub fn set_username(&mut self, user_id: i64, tokens: &[String]) -> Result<Vec<ReplyPayload>> {
        self.cache.reload_if_stale()?;
        let spec =
            ArgSpec::new(&[(ArgKind::Text, false)]).text_bounds(3, MAX_USERNAME_LEN, "Username");
        let query = match args::resolve(&self.cache.users, tokens, &spec) {
            Ok(query) => query,
            Err(err) => return Ok(Self::error_reply(err)),
        };
        let username = query.text.expect("text argument is required");

        let previous = match self.cache.users.set_username(user_id, &username) {
            Ok(previous) => previous,
            Err(err) => {
                return Ok(vec![ReplyPayload::Markdown(format::escape_markdown(
                    &err.to_string(),
                ))])
            }
        };
        self.cache.persist_users()?;

        let text = format!(
            "Username changed from: *{}* to *{}*. It will get updated in a few minutes.",
            previous, username
        );
        Ok(vec![ReplyPayload::Markdown(format::escape_markdown(&text))])
    }

    fn media_path(&self, message: &MessageRecord) -> PathBuf {
        self.media_dir.join(format!(
            "{}.{}",
            message.message_id,
            message.kind.media_extension()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveDb;
    use crate::chart::SeriesArtifactRenderer;
    use crate::model::{ReactionRecord, UserRecord, UserTable};
    use chrono::{DateTime, Duration, Utc};
    use tempfile::TempDir;

    fn seed_archive(dir: &Path) {
        let db = ArchiveDb::open(dir).unwrap();
        let base = Utc::now() - Duration::hours(2);

        db.save_users(&UserTable::new(vec![
            UserRecord {
                user_id: 1,
                username: "alice".to_string(),
                nicknames: vec![],
            },
            UserRecord {
                user_id: 2,
                username: "bob".to_string(),
                nicknames: vec![],
            },
        ]))
        .unwrap();

        let message = |id: i64, user: &str, at: DateTime<Utc>, text: &str, emojis: &[&str]| {
            MessageRecord {
                message_id: id,
                username: user.to_string(),
                timestamp: at,
                kind: MessageKind::Text,
                text: text.to_string(),
                reaction_emojis: emojis.iter().map(|e| e.to_string()).collect(),
            }
        };
        db.insert_message(&message(1, "alice", base, "first", &["👍", "👍"]))
            .unwrap();
        db.insert_message(&message(2, "alice", base + Duration::minutes(1), "second", &[]))
            .unwrap();
        db.insert_message(&message(3, "bob", base + Duration::minutes(2), "third", &["💩"]))
            .unwrap();

        let reaction = |from: &str, to: &str, emoji: &str, at: DateTime<Utc>| ReactionRecord {
            reacting_username: from.to_string(),
            reacted_to_username: to.to_string(),
            emoji: emoji.to_string(),
            timestamp: at,
        };
        db.insert_reaction(&reaction("bob", "alice", "👍", base + Duration::minutes(3)))
            .unwrap();
        db.insert_reaction(&reaction("bob", "alice", "👍", base + Duration::minutes(4)))
            .unwrap();
        db.insert_reaction(&reaction("alice", "bob", "💩", base + Duration::minutes(5)))
            .unwrap();
    }

    fn commands(dir: &TempDir) -> ChatCommands {
        seed_archive(dir.path());
        let renderer = SeriesArtifactRenderer::new(dir.path().join("charts"));
        ChatCommands::new(dir.path(), Box::new(renderer)).unwrap()
    }

    fn text_of(replies: &[ReplyPayload]) -> String {
        replies
            .iter()
            .map(|reply| match reply {
                ReplyPayload::Text(text) | ReplyPayload::Markdown(text) => text.clone(),
                ReplyPayload::Media { caption, .. } => caption.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn summary_reports_counts_and_meters() {
        let dir = tempfile::tempdir().unwrap();
        let mut commands = commands(&dir);

        let replies = commands.summary(&[]).unwrap();
        let text = text_of(&replies);
        assert!(text.contains("Chat summary"));
        assert!(text.contains("3"), "message total missing: {}", text);
        assert!(text.contains("Top spammer"));
        assert!(text.contains("alice"));
        // Fun meter: alice 2 reactions / 2 messages = 1, bob 1/1 = 1.
        assert!(text.contains("Fun meter"));
    }

    #[test]
    fn argument_error_becomes_reply_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut commands = commands(&dir);

        let replies = commands.fun(&["48x".to_string()]).unwrap();
        assert_eq!(
            replies,
            vec![ReplyPayload::Text(
                "There is no such command mode as 48x.".to_string()
            )]
        );
    }

    #[test]
    fn top_messages_ranks_by_reactions() {
        let dir = tempfile::tempdir().unwrap();
        let mut commands = commands(&dir);

        let replies = commands.top_messages(&[], Sentiment::All).unwrap();
        let text = text_of(&replies);
        let first = text.find("first").unwrap();
        let third = text.find("third").unwrap();
        assert!(first < third, "expected 'first' (2 reactions) before 'third'");
        // "second" has no reactions and must not be listed.
        assert!(!text.contains("second"));
    }

    #[test]
    fn worst_messages_use_negative_partition() {
        let dir = tempfile::tempdir().unwrap();
        let mut commands = commands(&dir);

        let replies = commands
            .top_messages(&[], Sentiment::Negative)
            .unwrap();
        let text = text_of(&replies);
        assert!(text.starts_with("Worst 5 messages"));
        assert!(text.contains("third"));
        assert!(!text.contains("first"));
    }

    #[test]
    fn last_messages_newest_first_and_user_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let mut commands = commands(&dir);

        let replies = commands
            .last_messages(&["alice".to_string(), "2".to_string()])
            .unwrap();
        let text = text_of(&replies);
        assert!(text.starts_with("Last 2 messages by alice"));
        let second = text.find("second").unwrap();
        let first = text.find("first").unwrap();
        assert!(second < first, "expected newest message first");
        assert!(!text.contains("third"));
    }

    #[test]
    fn fun_listing_contains_ranked_users() {
        let dir = tempfile::tempdir().unwrap();
        let mut commands = commands(&dir);

        let replies = commands.fun(&[]).unwrap();
        let text = text_of(&replies);
        assert!(text.contains("Funmeter"));
        assert!(text.contains("alice"));
        assert!(text.contains("bob"));
        assert!(text.starts_with("```"));
    }

    #[test]
    fn chart_reply_references_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut commands = commands(&dir);

        let replies = commands.spam_chart(&[]).unwrap();
        assert_eq!(replies.len(), 1);
        match &replies[0] {
            ReplyPayload::Media { kind, path, caption } => {
                assert_eq!(*kind, MessageKind::Image);
                assert!(path.exists());
                assert!(caption.contains("Spamchart"));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn nickname_flow_adds_and_rejects_over_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut commands = commands(&dir);

        for i in 0..5 {
            let replies = commands
                .add_nickname(1, &[format!("nick{:02}", i)])
                .unwrap();
            assert!(text_of(&replies).contains("added for"));
        }

        let replies = commands.add_nickname(1, &["toomany".to_string()]).unwrap();
        let text = text_of(&replies);
        assert!(text.contains("limit is 5"));
    }

    #[test]
    fn set_username_rejects_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut commands = commands(&dir);

        let replies = commands.set_username(2, &["alice".to_string()]).unwrap();
        assert!(text_of(&replies).contains("already taken"));

        let replies = commands.set_username(2, &["bobby".to_string()]).unwrap();
        assert!(text_of(&replies).contains("Username changed from"));
    }
}
