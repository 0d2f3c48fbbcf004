// Raw-mode keyboard console
//
// Esc=stop, m=start, z=zero, 0-3=mode, q / Ctrl-C=quit

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::operator::OperatorCommand;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleEvent {
    Command(OperatorCommand),
    Quit,
}

/// Map one key press to a console event
pub fn map_key(key: KeyEvent) -> Option<ConsoleEvent> {
    if !matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
        return None;
    }
    match key.code {
        // Raw mode swallows SIGINT
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(ConsoleEvent::Quit)
        }
        KeyCode::Char('q') => Some(ConsoleEvent::Quit),
        KeyCode::Esc => Some(ConsoleEvent::Command(OperatorCommand::Stop)),
        KeyCode::Char(c) => OperatorCommand::from_key(c).map(ConsoleEvent::Command),
        _ => None,
    }
}

/// Read keys on a blocking thread until `running` is cleared, a quit key is
/// pressed or the receiver goes away.
pub fn spawn(tx: mpsc::Sender<ConsoleEvent>, running: Arc<AtomicBool>) -> JoinHandle<io::Result<()>> {
    tokio::task::spawn_blocking(move || {
        enable_raw_mode()?;
        let result = read_keys(&tx, &running);
        disable_raw_mode()?;
        if let Err(e) = &result {
            warn!("Console stopped: {}", e);
        }
        result
    })
}

fn read_keys(tx: &mpsc::Sender<ConsoleEvent>, running: &AtomicBool) -> io::Result<()> {
    while running.load(Ordering::Acquire) {
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        let Some(event) = map_key(key) else {
            continue;
        };

        debug!("Console: {:?}", event);
        if tx.blocking_send(event).is_err() || event == ConsoleEvent::Quit {
            break;
        }
    }
    Ok(())
}
