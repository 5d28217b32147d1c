use std::io::{self, Write};
use std::time::Duration;

use clap::Parser;
use crossterm::event::KeyEventKind;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

mod ai;
mod app;
mod cli;
mod config;
mod db;
mod error;
mod models;
mod reminders;
mod services;
mod sync;
mod tui;

use app::App;
use cli::Cli;
use config::Config;
use error::Result;
use tui::{draw, handle_key_event, handle_mouse_event, InputMode};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Warnings and errors only unless raised with -v
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(cli::log_level(args.verbose).into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Headless subcommands run and exit
    if let Some(command) = args.command {
        return cli::run(command, &config).await;
    }

    let mut app = App::new(&config).await?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    // Flush pending writes to the remote before leaving
    app.shutdown().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    Ok(())
}

async fn run_app<B: Backend + Write>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|frame| draw(frame, app))?;

        // Apply finished coach, weather, calendar and sync work
        app.poll_background().await?;

        app.check_reminders().await?;
        if app.take_bell() {
            ring_bell(terminal.backend_mut())?;
        }

        // Poll for events with timeout to allow async operations
        if !event::poll(Duration::from_millis(100))? {
            continue;
        }

        let action = match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                let mode = if app.show_help {
                    InputMode::Help
                } else if app.picker.is_some() {
                    InputMode::Picker
                } else {
                    InputMode::Normal
                };
                handle_key_event(key, mode)
            }
            Event::Mouse(mouse) if !app.show_help && app.picker.is_none() => {
                handle_mouse_event(mouse)
            }
            _ => None,
        };

        if let Some(action) = action {
            match app.handle_action(action).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                // storage and network hiccups stay on the status line
                Err(e) => {
                    tracing::error!("Action failed: {}", e);
                    app.set_status(format!("Error: {}", e));
                }
            }
        }
    }
}

/// Terminal bell for reminders
fn ring_bell<W: Write>(out: &mut W) -> io::Result<()> {
    out.write_all(b"\x07")?;
    Write::flush(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bell_writes_a_single_bel() {
        let mut out = Vec::new();
        ring_bell(&mut out).unwrap();
        assert_eq!(out, b"\x07");
    }
}
