use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Args, Parser, Subcommand};
use shared::domain::{DisplayName, GroupName, Message, ThreadKey};
use storage::{open_store_read_only, HubSnapshot, StoreLocation};

/// Inspect a hub snapshot without starting the server.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "json://./data/hub.json")]
    snapshot: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// List groups with member and message counts.
    Groups,
    /// List the members of one group.
    Members { group: String },
    /// List private threads by participant pair.
    Threads,
    /// Print the newest messages of a conversation.
    Tail(TailArgs),
}

#[derive(Args, Debug, PartialEq, Eq)]
struct TailArgs {
    #[arg(long, conflicts_with = "private", required_unless_present = "private")]
    group: Option<String>,
    #[arg(long, num_args = 2, value_names = ["A", "B"])]
    private: Option<Vec<String>>,
    #[arg(short = 'n', long, default_value_t = 20)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let location = StoreLocation::parse(&cli.snapshot);
    let store = open_store_read_only(&location).await?;
    let snapshot = store
        .load()
        .await?
        .with_context(|| format!("no snapshot found in {}", store.describe()))?;

    for line in render(&cli.command, &snapshot)? {
        println!("{line}");
    }
    Ok(())
}

fn render(command: &Command, snapshot: &HubSnapshot) -> Result<Vec<String>> {
    Ok(match command {
        Command::Groups => snapshot
            .groups
            .iter()
            .map(|(name, group)| {
                format!(
                    "{name}\tmembers={}\tmessages={}",
                    group.members.len(),
                    group.messages.len()
                )
            })
            .collect(),
        Command::Members { group } => {
            let name = GroupName::parse(group)?;
            let Some(record) = snapshot.groups.get(&name) else {
                bail!("group \"{name}\" does not exist");
            };
            record.members.iter().map(ToString::to_string).collect()
        }
        Command::Threads => snapshot
            .private_threads
            .iter()
            .map(|(key, thread)| {
                let pair = match key.participants() {
                    Some((a, b)) => format!("{a}\t{b}"),
                    None => key.to_string(),
                };
                format!("{pair}\tmessages={}", thread.messages.len())
            })
            .collect(),
        Command::Tail(args) => tail_messages(args, snapshot)?
            .iter()
            .map(format_message)
            .collect(),
    })
}

fn tail_messages<'a>(args: &TailArgs, snapshot: &'a HubSnapshot) -> Result<&'a [Message]> {
    let messages: &[Message] = match (&args.group, &args.private) {
        (Some(group), _) => {
            let name = GroupName::parse(group)?;
            snapshot
                .groups
                .get(&name)
                .map(|g| g.messages.as_slice())
                .with_context(|| format!("group \"{name}\" does not exist"))?
        }
        (None, Some(pair)) => {
            let [a, b] = pair.as_slice() else {
                bail!("--private takes exactly two names");
            };
            let key = ThreadKey::between(&DisplayName::parse(a)?, &DisplayName::parse(b)?)?;
            snapshot
                .private_threads
                .get(&key)
                .map(|t| t.messages.as_slice())
                .unwrap_or_default()
        }
        (None, None) => bail!("pass --group or --private"),
    };
    let skip = messages.len().saturating_sub(args.limit);
    Ok(&messages[skip..])
}

fn format_message(message: &Message) -> String {
    let when = DateTime::from_timestamp_millis(message.ts)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| message.ts.to_string());
    if message.system {
        format!("[{when}] * {}", message.text)
    } else {
        format!("[{when}] {}: {}", message.user, message.text)
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
