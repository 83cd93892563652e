//! Output formatting utilities for the terminal front-end
//!
//! Tables for discovered servers, the status summary, and colored
//! one-line feedback messages.

use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use pa_core::ServerDescriptor;

/// Format discovered servers as a numbered table.
///
/// The numbers are the selectors accepted by `/connect`.
pub fn format_servers(servers: &[ServerDescriptor]) -> String {
    if servers.is_empty() {
        return "No servers found".to_string();
    }

    #[derive(Tabled)]
    struct ServerRow {
        #[tabled(rename = "#")]
        number: usize,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "DESCRIPTION")]
        description: String,
        #[tabled(rename = "FILE")]
        file: String,
    }

    let rows: Vec<ServerRow> = servers
        .iter()
        .enumerate()
        .map(|(index, server)| ServerRow {
            number: index + 1,
            name: server.name.clone(),
            description: truncate(&server.description, 48),
            file: server
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(100))
        .to_string()
}

/// Snapshot of the orchestrator shown by `/status`
pub struct StatusSummary<'a> {
    pub status: &'a str,
    pub connected: bool,
    pub server: Option<&'a str>,
    pub entries: usize,
    pub config_path: &'a std::path::Path,
}

/// Format the status summary as aligned lines
pub fn format_status(summary: &StatusSummary<'_>) -> String {
    let mut output = String::new();
    output.push_str(&format!("Status: {}\n", summary.status));
    output.push_str(&format!(
        "Server: {}\n",
        match (summary.connected, summary.server) {
            (true, Some(name)) => name.to_string(),
            (true, None) => "connected".to_string(),
            (false, _) => "not connected".to_string(),
        }
    ));
    output.push_str(&format!("Conversation: {} entries\n", summary.entries));
    output.push_str(&format!("Config: {}\n", summary.config_path.display()));
    output
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
