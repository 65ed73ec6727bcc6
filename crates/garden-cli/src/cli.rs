use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use garden_config::schema::Language;

/// garden-tracker: drive MindGarden presence and engagement tracking.
#[derive(Parser, Debug)]
#[command(name = "garden-tracker", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Use the in-memory backend instead of Supabase.
    #[arg(long)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Visit routes in order as a tracked view, then unmount.
    Track {
        /// Routes to visit.
        #[arg(required = true)]
        paths: Vec<String>,

        /// Lab the view belongs to.
        #[arg(long)]
        lab: Option<String>,

        /// Signed-in user id; also keeps their presence fresh.
        #[arg(long)]
        user: Option<String>,

        /// Seconds to stay on each route.
        #[arg(long, default_value_t = 60)]
        dwell: u64,
    },

    /// Show the unread message count for a user.
    Unread {
        user: String,

        /// Keep following changes until interrupted.
        #[arg(long)]
        follow: bool,
    },

    /// Resolve a user's derived status flags.
    Status { user: String },

    /// Translate text with the translation assist.
    Translate {
        text: String,

        /// Target language (defaults to the configured language).
        #[arg(long, value_enum)]
        to: Option<LanguageArg>,
    },

    /// Check or mark an announcement version as seen.
    Announcement {
        version: String,

        /// Mark the version as seen.
        #[arg(long)]
        mark: bool,
    },

    /// Print the effective configuration with secrets redacted.
    Config,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LanguageArg {
    En,
    Es,
}

impl From<LanguageArg> for Language {
    fn from(arg: LanguageArg) -> Self {
        match arg {
            LanguageArg::En => Language::En,
            LanguageArg::Es => Language::Es,
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
