//! Input line parsing
//!
//! Lines starting with `/` are commands; anything else is a query for the
//! connected server.

use thiserror::Error;

use pa_core::ServerDescriptor;

/// Help text listing every command
pub const HELP: &str = "\
Commands:
  /servers                       List discovered servers
  /connect <number|name>         Connect to a server
  /stop                          Stop the current response
  /clear                         Clear the conversation
  /apply                         Reload configuration and reconnect
  /config get <section> <key>    Show a configuration value
  /config set <section> <key> <value>
                                 Change a configuration value (in memory)
  /save                          Write the configuration to disk
  /status                        Show connection status
  /help                          Show this help
  /quit                          Exit
Anything else is sent to the connected server.";

/// A parsed input line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Text for the server, passed through untrimmed
    Query(String),
    Servers,
    Connect(String),
    Stop,
    Clear,
    Apply,
    ConfigGet {
        section: String,
        key: String,
    },
    ConfigSet {
        section: String,
        key: String,
        value: toml::Value,
    },
    Save,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: /{0} (try /help)")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

/// Parse one input line
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let Some(rest) = line.trim_start().strip_prefix('/') else {
        return Ok(Command::Query(line.to_string()));
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    match (name, args.as_slice()) {
        ("servers" | "list", []) => Ok(Command::Servers),
        ("connect", []) => Err(CommandError::Usage("/connect <number|name>")),
        ("connect", selector) => Ok(Command::Connect(selector.join(" "))),
        ("stop", []) => Ok(Command::Stop),
        ("clear", []) => Ok(Command::Clear),
        ("apply", []) => Ok(Command::Apply),
        ("config", ["get", section, key]) => Ok(Command::ConfigGet {
            section: section.to_string(),
            key: key.to_string(),
        }),
        ("config", ["set", section, key, value @ ..]) if !value.is_empty() => {
            Ok(Command::ConfigSet {
                section: section.to_string(),
                key: key.to_string(),
                value: parse_value(&value.join(" ")),
            })
        }
        ("config", _) => Err(CommandError::Usage(
            "/config get <section> <key> | /config set <section> <key> <value>",
        )),
        ("save", []) => Ok(Command::Save),
        ("status", []) => Ok(Command::Status),
        ("help" | "?", _) => Ok(Command::Help),
        ("quit" | "exit", []) => Ok(Command::Quit),
        (
            "servers" | "list" | "stop" | "clear" | "apply" | "save" | "status" | "quit" | "exit",
            _,
        ) => Err(CommandError::Usage("this command takes no arguments")),
        (other, _) => Err(CommandError::Unknown(other.to_string())),
    }
}

/// Interpret `raw` as a TOML value, falling back to a plain string
pub fn parse_value(raw: &str) -> toml::Value {
    let raw = raw.trim();
    toml::from_str::<toml::Table>(&format!("value = {}", raw))
        .ok()
        .and_then(|mut table| table.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

/// Pick a server by 1-based position or case-insensitive name
pub fn select_server<'a>(
    servers: &'a [ServerDescriptor],
    selector: &str,
) -> Option<&'a ServerDescriptor> {
    let selector = selector.trim();
    if let Ok(position) = selector.parse::<usize>() {
        return position.checked_sub(1).and_then(|index| servers.get(index));
    }
    servers
        .iter()
        .find(|server| server.name.eq_ignore_ascii_case(selector))
}
