use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use chatmeter::chart::SeriesArtifactRenderer;
use chatmeter::commands::{ChatCommands, ReplyPayload};
use chatmeter::logging;
use chatmeter::model::{MessageKind, Sentiment};

#[derive(Parser)]
#[command(name = "chatmeter", disable_help_subcommand = true)]
#[command(about = "Chat archive statistics reporter", long_about = None)]
struct Cli {
    /// Data directory holding the archive database, media files and logs
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Acting user id, required for nickname/username mutations
    #[arg(long)]
    user_id: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat summary with period-over-period deltas
    Summary { args: Vec<String> },
    /// Top 5 messages by reaction count
    Top { args: Vec<String> },
    /// Worst 5 messages by negative-reaction count
    Sad { args: Vec<String> },
    /// Top 5 media messages of a kind (image, video, audio, gif)
    Media { kind: String, args: Vec<String> },
    /// Last n messages, newest first
    Last { args: Vec<String> },
    /// Full fun-meter listing
    Fun { args: Vec<String> },
    /// Full wholesome-meter listing
    Wholesome { args: Vec<String> },
    /// Day-bucketed fun-ratio chart
    Funchart { args: Vec<String> },
    /// Day-bucketed message-count chart
    Spamchart { args: Vec<String> },
    /// Day-bucketed reactions-received chart
    Likechart { args: Vec<String> },
    /// All users with their nicknames
    Users,
    /// Add a nickname for the acting user
    AddNickname { args: Vec<String> },
    /// Change the acting user's display username
    SetUsername { args: Vec<String> },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.data_dir)?;

    let renderer = SeriesArtifactRenderer::new(cli.data_dir.join("charts"));
    let mut commands = ChatCommands::new(&cli.data_dir, Box::new(renderer))?;

    let acting_user = |cli: &Cli| {
        cli.user_id
            .context("--user-id is required for this command")
    };

    let replies = match &cli.command {
        Commands::Summary { args } => commands.summary(args)?,
        Commands::Top { args } => commands.top_messages(args, Sentiment::All)?,
        Commands::Sad { args } => commands.top_messages(args, Sentiment::Negative)?,
        Commands::Media { kind, args } => {
            let kind: MessageKind = kind.parse().map_err(anyhow::Error::msg)?;
            commands.top_media(args, kind, Sentiment::All)?
        }
        Commands::Last { args } => commands.last_messages(args)?,
        Commands::Fun { args } => commands.fun(args)?,
        Commands::Wholesome { args } => commands.wholesome(args)?,
        Commands::Funchart { args } => commands.fun_chart(args)?,
        Commands::Spamchart { args } => commands.spam_chart(args)?,
        Commands::Likechart { args } => commands.like_chart(args)?,
        Commands::Users => commands.list_users()?,
        Commands::AddNickname { args } => commands.add_nickname(acting_user(&cli)?, args)?,
        Commands::SetUsername { args } => commands.set_username(acting_user(&cli)?, args)?,
    };

    deliver(&replies);
    Ok(())
}

/// Print reply payloads; the real transport delivers these to the chat
/// service instead.
fn deliver(replies: &[ReplyPayload]) {
    for reply in replies {
        match reply {
            ReplyPayload::Text(text) | ReplyPayload::Markdown(text) => println!("{}", text),
            ReplyPayload::Media {
                kind,
                path,
                caption,
            } => println!("[{} {}] {}", kind, path.display(), caption),
        }
    }
}
