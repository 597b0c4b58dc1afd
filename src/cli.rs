//! Command-line surface: run as a relay server or dial one as a client.
//! TLS flags are parsed and checked for a file at the given path, but the
//! actual TLS handshake is a no-op here, so this crate logs a warning
//! rather than silently pretending to encrypt the transport.

use std::path::Path;

use clap::{Parser, Subcommand};

use crate::error::CliError;

#[derive(Debug, Parser)]
#[command(name = "voicebridge", about = "Peer-to-peer full-duplex voice call relay")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Listen for one incoming call and relay its audio.
    Server {
        /// Address to bind, e.g. 0.0.0.0:9000
        #[arg(long, default_value = "0.0.0.0:9000")]
        listen: String,

        /// Accepted for interface parity; TLS termination is not implemented.
        #[arg(long)]
        tls_cert: Option<String>,

        /// Accepted for interface parity; TLS termination is not implemented.
        #[arg(long)]
        tls_key: Option<String>,
    },
    /// Dial a running server and start a call.
    Client {
        /// URL to dial, e.g. ws://localhost:9000 or wss://example.com
        #[arg(long)]
        dial: String,
    },
}

impl Cli {
    /// Checks that any given `--tls-cert`/`--tls-key` path actually exists on
    /// disk, then warns that TLS termination itself is not implemented.
    /// A flag that's simply absent is not an error; a flag whose path does
    /// not exist is.
    pub fn validate_tls(&self) -> Result<(), CliError> {
        if let Commands::Server { tls_cert, tls_key, .. } = &self.command {
            if let Some(path) = tls_cert {
                if !Path::new(path).exists() {
                    return Err(CliError::TlsCertMissing(path.clone()));
                }
            }
            if let Some(path) = tls_key {
                if !Path::new(path).exists() {
                    return Err(CliError::TlsKeyMissing(path.clone()));
                }
            }
            if tls_cert.is_some() || tls_key.is_some() {
                log::warn!("--tls-cert/--tls-key were given but TLS termination is not implemented; running in plaintext");
            }
        }
        Ok(())
    }
}
