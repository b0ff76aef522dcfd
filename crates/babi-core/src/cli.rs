use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::model::{MoodValue, PartnerRole};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "babi",
    version,
    about = "Babi Time: a shared space for two partners",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "babirc", global = true)]
    pub babirc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Log in as one partner (male/ronron or female/bribri).
    Login {
        #[arg(value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<PartnerRole>()))]
        role: PartnerRole,
    },
    Logout,
    Whoami,
    /// Show or set the relationship start date (YYYY-MM-DD).
    Start { date: Option<String> },
    /// Duration counters and upcoming milestones.
    Overview,
    /// Month grid with milestones marked.
    Calendar {
        /// Month to show as YYYY-MM; defaults to the current month.
        #[arg(long)]
        month: Option<String>,
        /// Months to move from the shown month, e.g. -1 or 2.
        #[arg(long, allow_hyphen_values = true, default_value_t = 0)]
        shift: i32,
    },
    #[command(subcommand)]
    Chat(ChatCommand),
    #[command(subcommand)]
    Checkin(CheckinCommand),
    #[command(subcommand)]
    Idea(IdeaCommand),
    #[command(subcommand)]
    Memory(MemoryCommand),
    #[command(subcommand)]
    Invite(InviteCommand),
    /// Incoming invitation from your partner.
    Inbox {
        #[command(subcommand)]
        action: Option<InboxCommand>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ChatCommand {
    List,
    Send {
        text: Vec<String>,
        /// Image file to upload and attach.
        #[arg(long)]
        image: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CheckinCommand {
    Show,
    Set {
        #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<MoodValue>()))]
        mood: Option<MoodValue>,
        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum IdeaCommand {
    List,
    Pick,
    Add { text: Vec<String> },
}

#[derive(Subcommand, Debug, Clone)]
pub enum MemoryCommand {
    List,
    Add {
        text: Vec<String>,
        /// Defaults to today.
        #[arg(long)]
        date: Option<String>,
    },
    /// Toggle favorite by id or unique id prefix.
    Fav { id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum InviteCommand {
    Templates,
    List,
    New(InviteFields),
    /// Post a saved invitation to the chat.
    Send { id: String },
}

#[derive(Args, Debug, Clone)]
pub struct InviteFields {
    #[arg(long)]
    pub template: Option<String>,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub message: Option<String>,
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub time: Option<String>,
    #[arg(long)]
    pub place: String,
    /// Index into the built-in GIF list.
    #[arg(long)]
    pub gif: Option<usize>,
    #[arg(long = "custom-gif")]
    pub custom_gif: Option<String>,
    #[arg(long)]
    pub sticker: Option<String>,
    /// Also post the invitation to the chat.
    #[arg(long)]
    pub send: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxCommand {
    Show,
    Open,
    Accept,
    Decline,
    Dismiss,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` (or `rc.key:value`) overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest.split_once('=').or_else(|| rest.split_once(':'));
            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((format!("rc.{k}"), v.to_string()));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&["babi", "rc.color=off", "overview", "rc.x:y"]))
            .expect("preprocess");
        assert_eq!(pre.cleaned_args, args(&["babi", "overview"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.x".to_string(), "y".to_string())
            ]
        );
    }

    #[test]
    fn parses_nested_subcommands() {
        let cli = GlobalCli::try_parse_from(["babi", "-v", "chat", "send", "hi", "there"])
            .expect("parse");
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Some(Command::Chat(ChatCommand::Send { text, image })) => {
                assert_eq!(text, vec!["hi", "there"]);
                assert!(image.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = GlobalCli::try_parse_from(["babi", "login", "bribri"]).expect("parse");
        assert!(matches!(
            cli.command,
            Some(Command::Login {
                role: PartnerRole::Female
            })
        ));
        assert!(GlobalCli::try_parse_from(["babi", "login", "stranger"]).is_err());
    }

    #[test]
    fn calendar_accepts_negative_shift() {
        let cli = GlobalCli::try_parse_from(["babi", "calendar", "--shift", "-2"]).expect("parse");
        assert!(matches!(
            cli.command,
            Some(Command::Calendar { shift: -2, month: None })
        ));
    }

    #[test]
    fn no_subcommand_is_allowed() {
        let cli = GlobalCli::try_parse_from(["babi", "--rc", "color=off"]).expect("parse");
        assert!(cli.command.is_none());
        assert_eq!(cli.rc_overrides[0].key, "color");
    }
}
