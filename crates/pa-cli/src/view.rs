//! Terminal rendering of the conversation log
//!
//! Each entry is printed once as `[HH:MM:SS] Role: text`. An entry that
//! keeps growing (a streaming answer) is left open and its new text is
//! written inline until the response finishes.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use pa_core::time::clock_label;
use pa_orchestrator::{LogEntry, OrchestratorEvent, Role, SessionOrchestrator, SubscriptionId};

/// Renders conversation changes to a writer
pub struct TerminalView<W> {
    state: Mutex<ViewState<W>>,
}

struct ViewState<W> {
    out: W,
    /// Bytes of text already printed, per entry id
    printed: HashMap<u64, usize>,
    /// Entry whose line has not been terminated yet
    open: Option<u64>,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self {
            state: Mutex::new(ViewState {
                out,
                printed: HashMap::new(),
                open: None,
            }),
        }
    }

    /// Print whatever part of `entries` has not been printed yet
    pub fn render(&self, entries: &[LogEntry]) -> io::Result<()> {
        let mut state = self.state.lock();

        for entry in entries {
            let already = state.printed.get(&entry.id).copied();
            match already {
                Some(len) if len >= entry.text.len() => {}
                Some(len) if state.open == Some(entry.id) => {
                    let delta = entry.text.get(len..).unwrap_or_default();
                    write!(state.out, "{}", delta)?;
                    state.printed.insert(entry.id, entry.text.len());
                }
                _ => {
                    // Streaming placeholders are shown once text arrives
                    if entry.text.is_empty() && entry.role == Role::Assistant {
                        continue;
                    }
                    state.close_line()?;
                    write!(
                        state.out,
                        "[{}] {}",
                        clock_label(entry.timestamp),
                        entry
                    )?;
                    state.printed.insert(entry.id, entry.text.len());
                    if entry.role == Role::Assistant {
                        state.open = Some(entry.id);
                    } else {
                        writeln!(state.out)?;
                    }
                }
            }
        }

        let live: Vec<u64> = entries.iter().map(|e| e.id).collect();
        state.printed.retain(|id, _| live.contains(id));
        state.out.flush()
    }

    /// Terminate a line left open by a streaming answer
    pub fn finish_response(&self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.close_line()?;
        state.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.state.into_inner().out
    }
}

impl<W: Write> ViewState<W> {
    fn close_line(&mut self) -> io::Result<()> {
        if self.open.take().is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }
}

/// Subscribe `view` to the conversation of `orchestrator`
pub fn attach<W>(view: Arc<TerminalView<W>>, orchestrator: &SessionOrchestrator) -> SubscriptionId
where
    W: Write + Send + 'static,
{
    let source = orchestrator.clone();
    orchestrator.subscribe(move |event| {
        let result = match event {
            OrchestratorEvent::ConversationChanged => view.render(&source.conversation()),
            OrchestratorEvent::ResponseFinished => view.finish_response(),
            _ => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to render conversation: {}", e);
        }
    })
}
