pub mod remind;
pub mod router;

use std::collections::HashMap;

use anyhow::Result;

use crate::config::CommandOverride;

/// Every command the controller understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Help,
    AddMe,
    Add,
    Remove,
    List,
    Remind,
    Routines,
    Cancel,
    Capture,
    Security,
    PowerOff,
}

impl CommandKind {
    /// Display order of the help listing
    pub const ALL: [CommandKind; 11] = [
        CommandKind::Help,
        CommandKind::AddMe,
        CommandKind::Add,
        CommandKind::Remove,
        CommandKind::List,
        CommandKind::Remind,
        CommandKind::Routines,
        CommandKind::Cancel,
        CommandKind::Capture,
        CommandKind::Security,
        CommandKind::PowerOff,
    ];

    /// Identifier used for `[commands.<id>]` overrides in the config file
    pub fn id(self) -> &'static str {
        match self {
            CommandKind::Help => "help",
            CommandKind::AddMe => "addme",
            CommandKind::Add => "add",
            CommandKind::Remove => "remove",
            CommandKind::List => "list",
            CommandKind::Remind => "remind",
            CommandKind::Routines => "routines",
            CommandKind::Cancel => "cancel",
            CommandKind::Capture => "capture",
            CommandKind::Security => "security",
            CommandKind::PowerOff => "poweroff",
        }
    }

    fn default_description(self) -> &'static str {
        match self {
            CommandKind::Help => "show this list",
            CommandKind::AddMe => "request access to the bot",
            CommandKind::Add => "<chat_id> allow a chat",
            CommandKind::Remove => "<position|chat_id> revoke a chat",
            CommandKind::List => "show allowed chats",
            CommandKind::Remind => {
                "<name> <dd/mm/yy> <hh:mm:ss> <chat_id|blank> <message> set a reminder"
            }
            CommandKind::Routines => "show pending routines",
            CommandKind::Cancel => "<name|position> drop a pending routine",
            CommandKind::Capture => "[chat_id] send a camera snapshot",
            CommandKind::Security => "<on|off> toggle motion detection",
            CommandKind::PowerOff => "shut the controller down",
        }
    }
}

#[derive(Debug, Clone)]
struct CommandEntry {
    keyword: String,
    description: String,
}

/// Keyword → command lookup, built once at startup
#[derive(Debug, Clone)]
pub struct CommandTable {
    entries: Vec<(CommandKind, CommandEntry)>,
    by_keyword: HashMap<String, CommandKind>,
}

impl CommandTable {
    /// Build the table from the defaults plus any configured overrides.
    /// Unknown override ids and keyword clashes are rejected.
    pub fn build(overrides: &HashMap<String, CommandOverride>) -> Result<Self> {
        if let Some(unknown) = overrides
            .keys()
            .find(|id| !CommandKind::ALL.iter().any(|kind| kind.id() == id.as_str()))
        {
            anyhow::bail!("Unknown command '{}' in [commands] configuration", unknown);
        }

        let mut entries = Vec::with_capacity(CommandKind::ALL.len());
        let mut by_keyword = HashMap::new();

        for kind in CommandKind::ALL {
            let custom = overrides.get(kind.id());
            let keyword = custom
                .and_then(|c| c.name.as_deref())
                .unwrap_or(kind.id())
                .trim()
                .to_lowercase();
            let description = custom
                .and_then(|c| c.description.clone())
                .unwrap_or_else(|| kind.default_description().to_string());

            if keyword.is_empty() || keyword.contains(char::is_whitespace) {
                anyhow::bail!("Invalid keyword {:?} for command '{}'", keyword, kind.id());
            }
            if let Some(existing) = by_keyword.insert(keyword.clone(), kind) {
                anyhow::bail!(
                    "Keyword '{}' is used by both '{}' and '{}'",
                    keyword,
                    existing.id(),
                    kind.id()
                );
            }

            entries.push((
                kind,
                CommandEntry {
                    keyword,
                    description,
                },
            ));
        }

        Ok(Self {
            entries,
            by_keyword,
        })
    }

    pub fn lookup(&self, keyword: &str) -> Option<CommandKind> {
        self.by_keyword.get(keyword).copied()
    }

    pub fn keyword(&self, kind: CommandKind) -> &str {
        self.entries
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, entry)| entry.keyword.as_str())
            .unwrap_or(kind.id())
    }

    /// `keyword - description`, one per line
    pub fn help(&self) -> String {
        self.entries
            .iter()
            .map(|(_, entry)| format!("{} - {}", entry.keyword, entry.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A parsed line of input
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Lower-cased first token
    pub keyword: String,
    /// Remaining tokens, separated by single spaces or tabs. Empty tokens
    /// are kept so that a doubled separator can express a blank field.
    pub args: Vec<String>,
    pub source: i64,
}

impl Command {
    pub fn parse(text: &str, source: i64) -> Self {
        let mut tokens = text.trim().split([' ', '\t']);
        let keyword = tokens.next().unwrap_or_default().to_lowercase();
        Self {
            keyword,
            args: tokens.map(str::to_string).collect(),
            source,
        }
    }

    /// First non-blank argument
    pub fn first_arg(&self) -> Option<&str> {
        self.args
            .iter()
            .map(String::as_str)
            .find(|arg| !arg.is_empty())
    }
}
