/// In-memory copy of the archive tables, reloaded on the ingestion signal.
///
/// Commands call [`ArchiveCache::reload_if_stale`] as the first step of their
/// preprocessing; the check-then-reload is unsynchronized on purpose, the
/// transport dispatch serializes commands.
use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::archive::ArchiveDb;
use crate::model::{MessageRecord, ReactionRecord, UserTable};

pub struct ArchiveCache {
    db: ArchiveDb,
    pub chat: Vec<MessageRecord>,
    pub reactions: Vec<ReactionRecord>,
    pub users: UserTable,
}

impl ArchiveCache {
    /// Open the archive and load all tables.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let db = ArchiveDb::open(data_dir)?;
        let chat = db.load_messages()?;
        let reactions = db.load_reactions()?;
        let users = db.load_users()?;
        info!(
            messages = chat.len(),
            reactions = reactions.len(),
            users = users.len(),
            "archive loaded"
        );
        Ok(Self {
            db,
            chat,
            reactions,
            users,
        })
    }

    /// Reload all tables when the ingestion job has flagged an update, then
    /// clear the flag. Returns whether a reload happened.
    pub fn reload_if_stale(&mut self) -> Result<bool> {
        if !self.db.update_pending()? {
            return Ok(false);
        }

        info!("reloading archive tables after ingestion update");
        self.chat = self.db.load_messages()?;
        self.reactions = self.db.load_reactions()?;
        self.users = self.db.load_users()?;
        self.db.set_update_pending(false)?;
        Ok(true)
    }

    /// Persist the current user table after a mutation.
    pub fn persist_users(&self) -> Result<()> {
        self.db.save_users(&self.users)
    }
}
