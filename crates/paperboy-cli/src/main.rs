use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::warn;

use paperboy_core::clock::{today_kst, validate_date};
use paperboy_core::{Mode, PaperboyConfig};
use paperboy_recipients::RecipientManager;
use paperboy_storage::{execution_key, Recipient, StorageBackend};
use paperboy_trackers::{ExecutionTracker, FailureTracker};

/// Operator tooling for the delivery-list state store.
#[derive(Parser)]
#[command(name = "paperboy", version, about = "Recipient and run-state administration")]
struct Cli {
    /// Config file (defaults to $PAPERBOY_CONFIG, then ~/.paperboy/paperboy.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a recipient
    Add { email: String, name: String },
    /// List every recipient
    List,
    /// List active recipients only
    ListActive,
    /// Hard-delete a recipient
    Remove { email: String },
    /// Mark a recipient unsubscribed
    Unsubscribe { email: String },
    /// Reactivate an unsubscribed recipient
    Resubscribe { email: String },
    /// Bulk-register from a file of `email,name` lines
    Import { file: PathBuf },
    /// Show execution and failure state for a date (today by default)
    Status {
        #[arg(long, default_value = "opr")]
        mode: String,
        #[arg(long)]
        date: Option<String>,
    },
    /// Delete the failure record for a date (today by default)
    ResetFailures {
        #[arg(long)]
        date: Option<String>,
    },
    /// Release claimed execution slots for a date (today by default)
    ResetExecution {
        /// Limit to one mode; both slots are released when omitted
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "paperboy_cli=info,paperboy_storage=info,paperboy_recipients=info,paperboy_trackers=info"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = PaperboyConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({}), using defaults", e);
        PaperboyConfig::default()
    });

    // One backend per process, selected by environment, injected everywhere.
    let backend = paperboy_storage::connect(&config.storage)
        .await
        .context("storage backend initialisation failed")?;
    let recipients = RecipientManager::new(Arc::clone(&backend));

    match cli.command {
        Command::Add { email, name } => {
            let recipient = recipients.register(&email, &name).await?;
            println!("added {} ({})", recipient.email, recipient.name);
        }
        Command::List => {
            let all = recipients.all_recipients().await?;
            println!("{} recipient(s):", all.len());
            for recipient in &all {
                print_recipient(recipient);
            }
        }
        Command::ListActive => {
            let active = recipients.active_recipients().await?;
            println!("{} active recipient(s):", active.len());
            for recipient in &active {
                print_recipient(recipient);
            }
        }
        Command::Remove { email } => {
            if recipients.delete(&email).await? {
                println!("removed {}", email);
            } else {
                println!("no such recipient: {}", email);
            }
        }
        Command::Unsubscribe { email } => {
            if recipients.unsubscribe(&email).await? {
                println!("unsubscribed {}", email);
            } else {
                println!("no such recipient: {}", email);
            }
        }
        Command::Resubscribe { email } => {
            if recipients.resubscribe(&email).await? {
                println!("resubscribed {}", email);
            } else {
                println!("no such recipient: {}", email);
            }
        }
        Command::Import { file } => {
            let entries = parse_import_file(&file)?;
            let report = recipients.register_bulk(&entries).await;
            println!("imported {} added, {} failed", report.added, report.failed);
            for email in &report.failed_emails {
                println!("  failed: {}", email);
            }
        }
        Command::Status { mode, date } => {
            let mode: Mode = mode.parse()?;
            if let Some(date) = &date {
                validate_date(date)?;
            }
            let execution = ExecutionTracker::new(Arc::clone(&backend));
            let failure = FailureTracker::new(Arc::clone(&backend));
            let target = date.clone().unwrap_or_else(today_kst);

            match execution.execution_info(mode, date.as_deref()).await {
                Some(record) => println!(
                    "execution {}: claimed at {} (request {})",
                    record.execution_key, record.execution_time, record.request_id
                ),
                None => println!("execution {}#{}: not claimed", target, mode),
            }
            match failure.failure_info(date.as_deref()).await {
                Some(record) => println!(
                    "failures {}: {} ({})",
                    record.date,
                    record.failure_count,
                    record.last_error.as_deref().unwrap_or("-")
                ),
                None => println!("failures {}: none", target),
            }
        }
        Command::ResetFailures { date } => {
            let target = match date {
                Some(date) => {
                    validate_date(&date)?;
                    date
                }
                None => today_kst(),
            };
            if backend.delete_failure(&target).await? {
                println!("failure record for {} deleted", target);
            } else {
                println!("no failure record for {}", target);
            }
        }
        Command::ResetExecution { mode, date } => {
            let target = match date {
                Some(date) => {
                    validate_date(&date)?;
                    date
                }
                None => today_kst(),
            };
            let modes: Vec<Mode> = match mode {
                Some(mode) => vec![mode.parse()?],
                None => vec![Mode::Test, Mode::Opr],
            };
            for mode in modes {
                let key = execution_key(&target, mode);
                if backend.delete_execution(&key).await? {
                    println!("released {}", key);
                } else {
                    println!("not claimed: {}", key);
                }
            }
        }
    }

    Ok(())
}

fn print_recipient(recipient: &Recipient) {
    let last_delivery = recipient.last_delivery_date.as_deref().unwrap_or("never");
    println!(
        "  {:<30} | {:<12} | {:<12} | last delivery: {:<10} | {}",
        recipient.email,
        recipient.name,
        recipient.status,
        last_delivery,
        recipient.created_at
    );
}

/// Parse an import file: one `email,name` pair per line, `#` comments and
/// blank lines skipped.
fn parse_import_file(path: &PathBuf) -> anyhow::Result<Vec<(String, String)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let mut entries = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once(',') {
            Some((email, name)) => {
                entries.push((email.trim().to_string(), name.trim().to_string()))
            }
            None => bail!("{}:{}: expected `email,name`", path.display(), lineno + 1),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_file_parses_pairs_and_skips_noise() {
        let dir = std::env::temp_dir().join("paperboy-cli-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("recipients.csv");
        std::fs::write(&path, "# team\na@x.com, Alice\n\nb@x.com,Bob\n").unwrap();

        let entries = parse_import_file(&path).unwrap();
        assert_eq!(
            entries,
            vec![
                ("a@x.com".to_string(), "Alice".to_string()),
                ("b@x.com".to_string(), "Bob".to_string()),
            ]
        );
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn import_file_rejects_malformed_lines() {
        let dir = std::env::temp_dir().join("paperboy-cli-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.csv");
        std::fs::write(&path, "not-a-pair\n").unwrap();
        assert!(parse_import_file(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
