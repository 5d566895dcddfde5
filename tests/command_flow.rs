//! End-to-end command flow against an on-disk archive.
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;

use chatmeter::archive::ArchiveDb;
use chatmeter::chart::SeriesArtifactRenderer;
use chatmeter::commands::{ChatCommands, ReplyPayload};
use chatmeter::model::{MessageKind, MessageRecord, ReactionRecord, Sentiment, UserRecord, UserTable};

fn message(id: i64, user: &str, at: DateTime<Utc>, text: &str, emojis: &[&str]) -> MessageRecord {
    MessageRecord {
        message_id: id,
        username: user.to_string(),
        timestamp: at,
        kind: MessageKind::Text,
        text: text.to_string(),
        reaction_emojis: emojis.iter().map(|e| e.to_string()).collect(),
    }
}

fn reaction(from: &str, to: &str, emoji: &str, at: DateTime<Utc>) -> ReactionRecord {
    ReactionRecord {
        reacting_username: from.to_string(),
        reacted_to_username: to.to_string(),
        emoji: emoji.to_string(),
        timestamp: at,
    }
}

fn seed(dir: &Path) -> Result<ArchiveDb> {
    let db = ArchiveDb::open(dir)?;
    db.save_users(&UserTable::new(vec![
        UserRecord {
            user_id: 1,
            username: "alice".to_string(),
            nicknames: vec![],
        },
        UserRecord {
            user_id: 2,
            username: "bob".to_string(),
            nicknames: vec!["bobcat".to_string()],
        },
    ]))?;

    let base = Utc::now() - Duration::hours(3);
    db.insert_message(&message(1, "alice", base, "old news", &["👍"]))?;
    db.insert_message(&message(
        2,
        "bob",
        base + Duration::minutes(10),
        "breaking news",
        &["👍", "❤️", "💩"],
    ))?;
    db.insert_reaction(&reaction("bob", "alice", "👍", base + Duration::minutes(1)))?;
    db.insert_reaction(&reaction("alice", "bob", "👍", base + Duration::minutes(11)))?;
    db.insert_reaction(&reaction("alice", "bob", "❤️", base + Duration::minutes(12)))?;
    db.insert_reaction(&reaction("alice", "bob", "💩", base + Duration::minutes(13)))?;
    Ok(db)
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

fn commands_for(dir: &Path) -> Result<ChatCommands> {
    let renderer = SeriesArtifactRenderer::new(dir.join("charts"));
    ChatCommands::new(dir, Box::new(renderer))
}

#[test]
fn summary_over_whole_archive() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let mut commands = commands_for(dir.path())?;

    let text = text_of(&commands.summary(&["total".to_string()])?);
    assert!(text.contains("Chat summary"));
    assert!(text.contains("Top spammer"));
    assert!(text.contains("Most liked"));
    assert!(text.contains("Most disliked"));
    // bob received 3 reactions for 1 message, alice 1 for 1.
    assert!(text.contains("bob"));
    Ok(())
}

#[test]
fn new_rows_only_visible_after_update_flag() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = seed(dir.path())?;
    let mut commands = commands_for(dir.path())?;

    let before = text_of(&commands.last_messages(&["5".to_string()])?);
    assert!(!before.contains("fresh message"));

    db.insert_message(&message(3, "alice", Utc::now(), "fresh message", &[]))?;
    let still_stale = text_of(&commands.last_messages(&["5".to_string()])?);
    assert!(!still_stale.contains("fresh message"));

    db.set_update_pending(true)?;
    let after = text_of(&commands.last_messages(&["5".to_string()])?);
    assert!(after.contains("fresh message"));
    Ok(())
}

#[test]
fn username_change_applies_to_later_queries() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let mut commands = commands_for(dir.path())?;

    let text = text_of(&commands.set_username(2, &["robert".to_string()])?);
    assert!(text.contains("Username changed from"));

    // The old name no longer resolves; the error enumerates current names.
    let text = text_of(&commands.last_messages(&["bobcat".to_string()])?);
    assert!(text.contains("There is no such user as bobcat"));
    assert!(text.contains("robert"));

    let text = text_of(&commands.last_messages(&["robert".to_string()])?);
    assert!(text.starts_with("Last 10 messages by robert"));
    Ok(())
}

#[test]
fn sad_ranking_counts_only_negative_reactions() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let mut commands = commands_for(dir.path())?;

    let text = text_of(&commands.top_messages(&[], Sentiment::Negative)?);
    assert!(text.contains("breaking news"));
    assert!(!text.contains("old news"));
    Ok(())
}

#[test]
fn fun_chart_writes_series_artifact() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed(dir.path())?;
    let mut commands = commands_for(dir.path())?;

    let replies = commands.fun_chart(&["alice".to_string()])?;
    match &replies[0] {
        ReplyPayload::Media { path, caption, .. } => {
            assert!(path.exists());
            assert!(caption.contains("Funmeter for alice"));
            let artifact: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(path)?)?;
            let series = artifact["series"].as_array().unwrap();
            assert!(series
                .iter()
                .all(|point| point["username"] == "alice"));
        }
        other => panic!("unexpected reply: {:?}", other),
    }
    Ok(())
}

#[test]
fn empty_archive_degrades_gracefully() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // No seeding at all: archive file does not exist yet.
    let mut commands = commands_for(dir.path())?;

    let text = text_of(&commands.summary(&[])?);
    assert!(text.contains("Chat summary"));
    assert!(text.contains("0"));

    let text = text_of(&commands.fun(&[])?);
    assert!(text.contains("Funmeter"));
    Ok(())
}
