//! DomoRoom first-start wizard.
//!
//! Asks for the bot token, the chats allowed to command the controller and
//! where to keep the database, then writes `config.toml` to the project root
//! (`DOMOROOM_ROOT`, or the current directory).

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

struct ConfigParams<'a> {
    tg_token: &'a str,
    chat_ids: &'a str,
    db_path: &'a str,
    snapshot_path: &'a str,
    console: bool,
}

/// Split a free-form list into ids, rejecting anything that is not an integer
fn parse_chat_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("'{s}' is not a chat id"))
        })
        .collect()
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> Result<String> {
    let ids = parse_chat_ids(p.chat_ids)?
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    let tg_token = p.tg_token;
    let db_path = p.db_path;
    let snapshot_path = p.snapshot_path;
    let console = p.console;

    Ok(format!(
        r#"[telegram]
bot_token = "{tg_token}"
allowed_chat_ids = [{ids}]
poll_timeout_secs = 10
retry_backoff_secs = 1

[storage]
database_path = "{db_path}"

[routines]
tick_interval_ms = 1000
max_failures = 60

[console]
enabled = {console}
read_timeout_secs = 5

[camera]
snapshot_path = "{snapshot_path}"
# motion_on_command = "systemctl start motion"
# motion_off_command = "systemctl stop motion"

[maintenance]
heartbeat_cron = "0 0 * * * *"
backup_cron = "0 */15 * * * *"

# Rename a command or change its help text:
# [commands.poweroff]
# name = "shutdown"
# description = "shut the controller down"
"#
    ))
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut buf = String::new();
    io::stdin().read_line(&mut buf)?;
    Ok(buf.trim().to_owned())
}

fn or_default(s: String, default: &str) -> String {
    if s.is_empty() {
        default.to_owned()
    } else {
        s
    }
}

fn run(project_root: &Path) -> Result<()> {
    println!("=== DomoRoom Setup ===\n");

    let tg_token = read_line("Telegram bot token: ")?;
    if tg_token.is_empty() {
        anyhow::bail!("A bot token is required");
    }

    let chat_ids = loop {
        let raw = read_line("Allowed chat IDs (comma-separated, may be empty): ")?;
        match parse_chat_ids(&raw) {
            Ok(_) => break raw,
            Err(e) => println!("  {e:#}, try again"),
        }
    };

    let db_path = or_default(read_line("Database path [domoroom.db]: ")?, "domoroom.db");
    let snapshot_path = or_default(
        read_line("Camera snapshot file [snapshots/latest.jpg]: ")?,
        "snapshots/latest.jpg",
    );
    let console = !read_line("Enable the local control panel? [Y/n]: ")?
        .eq_ignore_ascii_case("n");

    let config = format_config(&ConfigParams {
        tg_token: &tg_token,
        chat_ids: &chat_ids,
        db_path: &db_path,
        snapshot_path: &snapshot_path,
        console,
    })?;

    let config_path = project_root.join("config.toml");
    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\nconfig.toml saved to {}", config_path.display());
    println!("Run the controller with:  cargo run");
    Ok(())
}

fn main() -> Result<()> {
    let project_root =
        PathBuf::from(std::env::var("DOMOROOM_ROOT").unwrap_or_else(|_| ".".to_string()));
    run(&project_root)
}
