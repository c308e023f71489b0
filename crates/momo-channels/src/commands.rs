//! Chat command parsing.

use momo_core::{ScopeLevel, ScopeSelector};

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Status,
    /// `/borrar`
    Clear,
    /// `/aceptar`
    Accept,
    /// `/nacional`, `/ccaa <name>`, `/provincia <name>`
    Toggle(ScopeSelector),
    /// `/ccaa` or `/provincia` without a name.
    MissingName(ScopeLevel),
    /// `/settime HH:MM`. Range is checked by the registry.
    SetTime { hour: u32, minute: u32 },
    /// `/settime` with a malformed argument.
    BadTime,
    Unknown,
}

/// Parse a message text. `/cmd@BotName` is accepted; names are case-insensitive.
pub fn parse(text: &str) -> Command {
    let text = text.trim();
    let Some(rest) = text.strip_prefix('/') else {
        return Command::Unknown;
    };
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((h, a)) => (h, a.trim()),
        None => (rest, ""),
    };
    let name = head.split('@').next().unwrap_or(head).to_lowercase();

    match name.as_str() {
        "start" | "menu" => Command::Start,
        "help" | "ayuda" => Command::Help,
        "estado" | "status" => Command::Status,
        "borrar" => Command::Clear,
        "aceptar" => Command::Accept,
        "nacional" => Command::Toggle(ScopeSelector::National),
        "ccaa" => area(ScopeLevel::Region, args),
        "provincia" => area(ScopeLevel::Province, args),
        "settime" => parse_time(args),
        _ => Command::Unknown,
    }
}

fn area(level: ScopeLevel, name: &str) -> Command {
    if name.is_empty() {
        return Command::MissingName(level);
    }
    let name = name.to_string();
    match level {
        ScopeLevel::Region => Command::Toggle(ScopeSelector::Region(name)),
        ScopeLevel::Province => Command::Toggle(ScopeSelector::Province(name)),
        ScopeLevel::National => Command::Toggle(ScopeSelector::National),
    }
}

fn parse_time(args: &str) -> Command {
    let Some((h, m)) = args.split_once(':') else {
        return Command::BadTime;
    };
    match (h.trim().parse::<u32>(), m.trim().parse::<u32>()) {
        (Ok(hour), Ok(minute)) => Command::SetTime { hour, minute },
        _ => Command::BadTime,
    }
}
