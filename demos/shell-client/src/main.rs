//! Raw-mode terminal client for a device agent.
//!
//! Run with: cargo run -p shell-client -- <device-id>
//!
//! Reads `AGENT_LINK_*` environment variables (defaults target the local
//! `agent-stub`). Press Ctrl+] to quit.

use std::{
    io::{self, Write},
    sync::Arc,
};

use agent_link_core::{DeviceContext, LinkConfig};
use agent_link_transport::{
    AgentSession, SessionError, SessionOptions, TerminalSurface, TransportState, WsConnector, tui,
};
use anyhow::Context;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Writes agent output straight to the local terminal.
struct StdoutSurface;

impl TerminalSurface for StdoutSurface {
    fn write(&self, data: &[u8]) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(data);
        let _ = out.flush();
    }

    fn release(&self) {
        let _ = io::stdout().flush();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let device_id = std::env::args()
        .nth(1)
        .context("usage: shell-client <device-id>")?;
    let config = LinkConfig::from_env()?;
    config.validate()?;
    let ctx = DeviceContext::new(config.organization_id.clone(), device_id.as_str());

    let options = match tui::local_dimensions() {
        Ok(dimensions) => SessionOptions::default().with_dimensions(dimensions),
        Err(_) => SessionOptions::default(),
    };
    let session = AgentSession::open(
        Arc::new(WsConnector::new()),
        &config,
        &ctx,
        Arc::new(StdoutSurface),
        options,
    )?;

    enable_raw_mode()?;
    let result = run(&session).await;
    disable_raw_mode()?;

    session.close();
    let reason = session.join().await;
    eprintln!("\r\n[session closed: {reason:?}]");
    result
}

fn is_quit(event: &Event) -> bool {
    matches!(
        event,
        Event::Key(KeyEvent {
            code: KeyCode::Char(']'),
            modifiers: KeyModifiers::CONTROL,
            ..
        })
    )
}

async fn run(session: &AgentSession) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    // crossterm's blocking reader lives on its own thread.
    std::thread::spawn(move || {
        while let Ok(event) = event::read() {
            if tx.send(event).is_err() {
                break;
            }
        }
    });

    let mut state = session.subscribe();
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                if is_quit(&event) {
                    break;
                }
                match tui::forward_event(session, &event) {
                    Ok(_) => {}
                    Err(SessionError::Closed) => break,
                    Err(e) => return Err(e.into()),
                }
            }
            _ = state.wait_for(TransportState::is_closed) => break,
        }
    }
    Ok(())
}
