//! Terminal application loop.

use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
};
use tokio::sync::watch;

use crate::adapter::AssistantAdapter;
use crate::config::Config;
use crate::health::{HealthClient, HealthState};
use crate::ui::conversation::{ConversationManager, ManagerAction};

pub type Tui = Terminal<CrosstermBackend<Stdout>>;

const TICK_INTERVAL: Duration = Duration::from_millis(50);

pub fn init_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    execute!(io::stdout(), EnterAlternateScreen)?;
    let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    Ok(terminal)
}

pub fn restore_terminal() -> Result<()> {
    execute!(io::stdout(), LeaveAlternateScreen)?;
    disable_raw_mode()?;
    Ok(())
}

/// Restore the terminal before the default panic output runs.
pub fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = restore_terminal();
        original_hook(panic_info);
    }));
}

/// Periodically probe the upstream and publish the latest state.
fn spawn_health_watcher(health: HealthClient, interval: Duration) -> watch::Receiver<HealthState> {
    let (tx, rx) = watch::channel(HealthState::Unknown);
    tokio::spawn(async move {
        loop {
            let state = health.state().await;
            if tx.send(state).is_err() {
                break;
            }
            tokio::time::sleep(interval).await;
        }
    });
    rx
}

pub async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let adapter = AssistantAdapter::new(config.clone())?;
    let health = HealthClient::new(config.clone())?;

    let mut manager = ConversationManager::new(adapter, config.language);
    let health_rx = spawn_health_watcher(health, config.health_interval);

    install_panic_hook();
    let mut terminal = init_terminal().context("failed to initialize terminal")?;
    let result = event_loop(&mut terminal, &mut manager, health_rx).await;
    restore_terminal()?;
    result
}

async fn event_loop(
    terminal: &mut Tui,
    manager: &mut ConversationManager,
    health_rx: watch::Receiver<HealthState>,
) -> Result<()> {
    loop {
        manager.process_events();

        let health = health_rx.borrow().clone();
        terminal.draw(|frame| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(1), Constraint::Min(8)])
                .split(frame.size());

            frame.render_widget(status_bar(manager, &health), chunks[0]);
            manager.render(chunks[1], frame.buffer_mut());
        })?;

        if !event::poll(TICK_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(());
            }
            KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                manager.toggle_language();
            }
            KeyCode::Esc => {
                // Esc cancels a pending reply; with nothing pending it exits.
                if manager.is_waiting() {
                    manager.cancel_current();
                } else {
                    return Ok(());
                }
            }
            _ => match manager.handle_key(key) {
                ManagerAction::Exit => return Ok(()),
                ManagerAction::ShowHealth => {
                    manager.push_health_notice(&health_rx.borrow().clone());
                }
                ManagerAction::None => {}
            },
        }
    }
}

fn status_bar(manager: &ConversationManager, health: &HealthState) -> Paragraph<'static> {
    let copy = manager.copy();
    let (dot, dot_color, health_label) = match health {
        HealthState::Unknown => ("●", Color::DarkGray, "checking".to_string()),
        HealthState::Mock => ("●", Color::Yellow, "mock".to_string()),
        HealthState::Online { model: Some(model) } => ("●", Color::Green, model.clone()),
        HealthState::Online { model: None } => ("●", Color::Green, "online".to_string()),
        HealthState::Offline => ("●", Color::Red, "offline".to_string()),
    };

    let mut spans = vec![
        Span::styled(
            format!(" {}", copy.heading),
            Style::default().fg(Color::LightYellow),
        ),
        Span::styled(
            format!(" · {}", manager.language().label()),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(format!(" {dot}"), Style::default().fg(dot_color)),
        Span::styled(
            format!(" {health_label}"),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if manager.is_waiting() {
        spans.push(Span::styled(
            format!(" · {}", copy.typing_label),
            Style::default().fg(Color::DarkGray),
        ));
    }
    Paragraph::new(Line::from(spans))
}
