//! Live Chat
//!
//! Talk to the model through the default microphone and speakers.
//! Prints transcripts as they arrive; Ctrl+C ends the session.
//!
//! Usage: `live-chat [--config <path>] [--list-devices]`

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_voice::{
    audio::{list_devices, CpalBackend},
    config::AppConfig,
    session::{SessionController, SessionEvent, SessionState},
    transcript::Speaker,
    transport::WebSocketConnector,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--list-devices") {
        print_devices();
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);

    let config = AppConfig::load(config_path.as_deref()).context("failed to load configuration")?;
    config.validate_for_connect()?;

    let connector = WebSocketConnector::new(config.api.endpoint.clone(), config.api.api_key.clone());
    let mut session = SessionController::new(connector, CpalBackend, config.session_options());

    tracing::info!(session = %session.id(), model = %config.api.model, "Starting live chat");
    session.start().await.context("failed to start session")?;

    println!("\n=== Live chat ({}) ===", config.api.model);
    println!("Speak into the microphone. Press Ctrl+C to stop.\n");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                tracing::info!("Ctrl+C received, stopping");
                session.stop();
            }
            event = session.next_event() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
        }
    }

    let stats = session.stats();
    println!("\n=== Session stats ===");
    if let Some(duration) = stats.duration() {
        println!("  Duration:        {:.1}s", duration.num_milliseconds() as f64 / 1000.0);
    }
    println!("  Frames sent:     {}", stats.frames_sent);
    println!("  Frames received: {}", stats.frames_received);
    println!("  Decode errors:   {}", stats.decode_errors);
    println!("  Interruptions:   {}", stats.interruptions);
    println!("  Turns:           {}", stats.turns_completed);

    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged(SessionState::Closed) => println!("[session closed]"),
        SessionEvent::StateChanged(state) => tracing::debug!(%state, "state changed"),
        SessionEvent::PartialTranscript { .. } => {}
        SessionEvent::Turn(turn) => {
            let who = match turn.speaker {
                Speaker::User => "You",
                Speaker::Model => "Model",
            };
            println!("{:>5}: {}", who, turn.text.trim());
        }
        SessionEvent::Interrupted { flushed } => {
            tracing::debug!(flushed, "model interrupted");
            println!("  [interrupted]");
        }
        SessionEvent::Error(message) => eprintln!("error: {}", message),
    }
}

fn print_devices() {
    println!("\n=== Available Audio Devices ===");
    for device in list_devices() {
        let device_type = match (device.is_input, device.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            _ => "Unknown",
        };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {} ({}){}:", device.name, device_type, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}
