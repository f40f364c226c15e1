use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;
use voice_duplex::native::{CpalMicrophone, CpalSpeaker};
use voice_duplex::utils::device;
use voice_duplex::{Config, EngineBuilder, EngineEvent};

#[derive(Parser)]
struct Cli {
    /// Print the available audio devices and exit
    #[arg(long)]
    list_devices: bool,
    /// Input device name; the host default when omitted
    #[arg(long)]
    input: Option<String>,
    /// Output device name; the host default when omitted
    #[arg(long)]
    output: Option<String>,
    /// Speech backend WebSocket URL, overriding VOICE_BACKEND_URL
    #[arg(long)]
    backend_url: Option<String>,
    /// Say this once the session is listening
    #[arg(long)]
    greeting: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let args = Cli::parse();
    if args.list_devices {
        println!("inputs:\n{}", device::get_available_inputs()?);
        println!("outputs:\n{}", device::get_available_outputs()?);
        return Ok(());
    }

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(url) = &args.backend_url {
        config = config.into_builder().with_backend_url(url).build();
    }

    let speaker =
        CpalSpeaker::new(args.output.as_deref()).context("Failed to open output device")?;
    let engine = EngineBuilder::new(config)
        .with_source(CpalMicrophone::new(args.input.as_deref()))
        .with_sink(speaker)
        .spawn()?;

    let mut events = engine.subscribe();
    engine.start_session()?;

    let greeting = args.greeting.clone();
    let printer = engine.clone();
    let event_handle = tokio::spawn(async move {
        let mut greeted = greeting.is_none();
        while let Ok(event) = events.recv().await {
            match event {
                EngineEvent::StateChanged { from, to } => {
                    tracing::info!("state: {:?} -> {:?}", from, to);
                    if !greeted && to == voice_duplex::ConversationState::Listening {
                        greeted = true;
                        if let Some(text) = &greeting {
                            let _ = printer.speak(text);
                        }
                    }
                }
                EngineEvent::PartialTranscript(text) => tracing::debug!("...{}", text),
                EngineEvent::FinalTranscript(text) => println!("Human: {}", text),
                EngineEvent::UtteranceStarted { id, chunks } => {
                    tracing::info!("speaking {} in {} chunks", id, chunks)
                }
                EngineEvent::BargeIn(trigger) => println!("(interrupted: {:?})", trigger),
                EngineEvent::Error(report) => tracing::error!("{}", report.message),
                other => tracing::debug!("{:?}", other),
            }
        }
    });

    tokio::select! {
        _ = event_handle => {},
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl-C, shutting down...");
        }
    }
    engine.end_session()?;
    engine.shutdown()?;
    println!("sent {} frames", engine.transport_stats().frames_sent());
    Ok(())
}
