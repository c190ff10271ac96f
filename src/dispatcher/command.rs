//! Command line classification
//!
//! Synonyms are alternate keys in one table; every key maps to exactly
//! one subcommand.

/// Closed set of subcommands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subcommand {
    Help,
    Test,
    Clear,
    List,
    Free,
    Task,
}

const SUBCOMMANDS: &[(&str, Subcommand)] = &[
    ("help", Subcommand::Help),
    ("?", Subcommand::Help),
    ("帮助", Subcommand::Help),
    ("test", Subcommand::Test),
    ("status", Subcommand::Test),
    ("ping", Subcommand::Test),
    ("测试", Subcommand::Test),
    ("状态", Subcommand::Test),
    ("clear", Subcommand::Clear),
    ("reset", Subcommand::Clear),
    ("清除", Subcommand::Clear),
    ("重置", Subcommand::Clear),
    ("list", Subcommand::List),
    ("ls", Subcommand::List),
    ("列表", Subcommand::List),
    ("free", Subcommand::Free),
    ("自由", Subcommand::Free),
    ("task", Subcommand::Task),
    ("tasks", Subcommand::Task),
    ("任务", Subcommand::Task),
];

impl Subcommand {
    pub fn lookup(token: &str) -> Option<Self> {
        let token = token.to_lowercase();
        SUBCOMMANDS
            .iter()
            .find(|(key, _)| *key == token)
            .map(|(_, cmd)| *cmd)
    }
}

/// `free` argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeAction {
    On,
    Off,
    Status,
}

impl FreeAction {
    fn lookup(token: &str) -> Option<Self> {
        match token.to_lowercase().as_str() {
            "" | "status" | "状态" => Some(Self::Status),
            "on" | "enable" | "开启" | "开" => Some(Self::On),
            "off" | "disable" | "关闭" | "关" => Some(Self::Off),
            _ => None,
        }
    }
}

/// `task` argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    List,
    Clear,
    Help,
}

impl TaskAction {
    fn lookup(token: &str) -> Option<Self> {
        match token.to_lowercase().as_str() {
            "" | "list" | "ls" | "列表" => Some(Self::List),
            "clear" | "清除" => Some(Self::Clear),
            "help" | "帮助" => Some(Self::Help),
            _ => None,
        }
    }
}

/// Classified command arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Help,
    Test,
    Clear,
    List,
    /// `None` for an unrecognised argument
    Free(Option<FreeAction>),
    /// Unrecognised arguments fall back to help
    Task(TaskAction),
    /// Free text for the chat pipeline (not yet validated)
    Chat(&'a str),
}

/// Classify everything after the command word
pub fn classify(args: &str) -> Command<'_> {
    let args = args.trim();
    let (first, rest) = split_first_token(args);

    match Subcommand::lookup(first) {
        _ if first.is_empty() => Command::Help,
        Some(Subcommand::Help) => Command::Help,
        Some(Subcommand::Test) => Command::Test,
        Some(Subcommand::Clear) => Command::Clear,
        Some(Subcommand::List) => Command::List,
        Some(Subcommand::Free) => Command::Free(FreeAction::lookup(split_first_token(rest).0)),
        Some(Subcommand::Task) => {
            Command::Task(TaskAction::lookup(split_first_token(rest).0).unwrap_or(TaskAction::Help))
        }
        None => Command::Chat(args),
    }
}

/// Recognise `<prefix><command>[@bot] args` and return the args
pub fn parse_command_line<'a>(text: &'a str, command_name: &str) -> Option<&'a str> {
    let rest = text
        .trim_start()
        .strip_prefix(|c: char| matches!(c, '.' | '/' | '。'))?;

    let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let (word, args) = rest.split_at(word_end);
    // Telegram appends the bot name in groups: /chat@my_bot
    let word = word.split('@').next().unwrap_or(word);

    if word.is_empty() || !word.eq_ignore_ascii_case(command_name) {
        return None;
    }
    Some(args.trim())
}

fn split_first_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(idx) => (&s[..idx], s[idx..].trim_start()),
        None => (s, ""),
    }
}
