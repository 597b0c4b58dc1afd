use anyhow::Context;
use clap::Parser;

use voicebridge::cli::{Cli, Commands};
use voicebridge::config::AudioConfig;
use voicebridge::session::Session;
use voicebridge::transport::{Listener, Transport};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    cli.validate_tls().context("TLS flag validation failed")?;

    let cfg = AudioConfig::default();

    match cli.command {
        Commands::Server { listen, .. } => {
            let listener = Listener::bind(&listen).context("failed to bind listen address")?;
            log::info!("listening on {listen}");
            let transport = listener.accept().context("failed to accept connection")?;
            run_call(transport, cfg)
        }
        Commands::Client { dial } => {
            log::info!("dialing {dial}");
            let transport = Transport::dial(&dial).context("failed to dial peer")?;
            run_call(transport, cfg)
        }
    }
}

fn run_call(transport: Transport, cfg: AudioConfig) -> anyhow::Result<()> {
    let session = Session::establish(transport, cfg).context("handshake failed")?;
    session.run().context("session ended with an error")?;
    Ok(())
}
