//! Orchestrates a single call over one transport: key exchange, then a
//! Transmit task (drain VoiceQueue -> batch -> encrypt -> send) and a
//! Receive task (recv -> decrypt -> unbatch -> push to audio), joined on
//! either side's failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;

use crate::audio_stream::AudioStream;
use crate::batch;
use crate::codec::CodecSession;
use crate::config::AudioConfig;
use crate::crypto::{Crypto, SessionKeys};
use crate::error::{AudioError, HandshakeError, SessionError};
use crate::queue::{Queue, POLL_SLEEP};
use crate::transport::Transport;

/// How long a single `Transport::recv_binary` call may block before
/// yielding the shared lock back to Transmit (see transport.rs).
const TRANSPORT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Runs one call end-to-end: handshake, then Transmit/Receive until either
/// side hits a fatal error, then tears the `AudioStream` down.
pub struct Session {
    transport: Arc<Mutex<Transport>>,
    audio: AudioStream,
    crypto: Arc<Mutex<Crypto>>,
    cancel: Arc<AtomicBool>,
    batch_size: usize,
}

impl Session {
    /// Performs the handshake over `transport`, builds the two codec
    /// sessions and the `AudioStream` they drive.
    pub fn establish(mut transport: Transport, cfg: AudioConfig) -> Result<Self, SessionError> {
        let crypto = handshake(&mut transport)?;
        transport
            .set_read_timeout(Some(TRANSPORT_READ_TIMEOUT))
            .map_err(HandshakeError::Transport)?;

        let encode_codec = Arc::new(Mutex::new(
            CodecSession::new(&cfg).map_err(|_| SessionError::Audio(AudioError::DeviceError))?,
        ));
        let decode_codec = Arc::new(Mutex::new(
            CodecSession::new(&cfg).map_err(|_| SessionError::Audio(AudioError::DeviceError))?,
        ));

        let mut audio = AudioStream::new(cfg, encode_codec, decode_codec);
        audio.start()?;

        Ok(Self {
            transport: Arc::new(Mutex::new(transport)),
            audio,
            crypto: Arc::new(Mutex::new(crypto)),
            cancel: Arc::new(AtomicBool::new(false)),
            batch_size: cfg.batch_size,
        })
    }

    /// Spawns Transmit and Receive, waits for either to finish (fatally or
    /// otherwise), cancels the other, joins both, then tears down the
    /// `AudioStream`.
    pub fn run(mut self) -> Result<(), SessionError> {
        let (done_tx, done_rx) = bounded::<Result<(), SessionError>>(2);

        let transmit_handle = {
            let transport = self.transport.clone();
            let voice_queue = self.audio.voice_queue.clone();
            let crypto = self.crypto.clone();
            let cancel = self.cancel.clone();
            let batch_size = self.batch_size;
            let done_tx = done_tx.clone();
            thread::spawn(move || {
                let result = transmit_loop(transport, voice_queue, crypto, cancel, batch_size);
                let _ = done_tx.send(result);
            })
        };

        let receive_handle = {
            let transport = self.transport.clone();
            let audio_queue = self.audio.audio_queue.clone();
            let crypto = self.crypto.clone();
            let cancel = self.cancel.clone();
            thread::spawn(move || {
                let result = receive_loop(transport, audio_queue, crypto, cancel);
                let _ = done_tx.send(result);
            })
        };

        // Block until either task reports done (fatal error or clean
        // cancellation), then cancel the other side.
        let first_result = done_rx.recv().unwrap_or(Ok(()));
        self.cancel.store(true, Ordering::SeqCst);

        let _ = transmit_handle.join();
        let _ = receive_handle.join();
        // Drain a possible second result so the channel doesn't leak.
        let _ = done_rx.try_recv();

        self.audio.close();
        first_result
    }
}

/// Exactly one 32-byte public key each way, then the shared key is
/// precomputed and the outbound nonce counter starts at 0.
fn handshake(transport: &mut Transport) -> Result<Crypto, HandshakeError> {
    let mut keys = SessionKeys::generate();
    transport
        .send_binary(keys.public.to_bytes().to_vec())
        .map_err(HandshakeError::Transport)?;

    let peer_key = loop {
        match transport.recv_binary().map_err(HandshakeError::Transport)? {
            Some(data) => break data,
            None => continue,
        }
    };
    keys.complete(&peer_key)?;

    Ok(Crypto::new(&keys))
}

fn transmit_loop(
    transport: Arc<Mutex<Transport>>,
    voice_queue: Arc<Queue<Vec<u8>>>,
    crypto: Arc<Mutex<Crypto>>,
    cancel: Arc<AtomicBool>,
    batch_size: usize,
) -> Result<(), SessionError> {
    let mut batch_buffer: Vec<Vec<u8>> = Vec::with_capacity(batch_size);

    while !cancel.load(Ordering::SeqCst) {
        match voice_queue.pop() {
            Some(chunk) => {
                let sealed = {
                    let mut crypto = crypto.lock().unwrap();
                    crypto.encrypt(&chunk)
                };
                match sealed {
                    Ok(sealed) => batch_buffer.push(sealed),
                    Err(e) => {
                        log::warn!("encrypt failed, dropping chunk: {e}");
                        continue;
                    }
                }

                if batch_buffer.len() >= batch_size {
                    let packed = batch::pack(&batch_buffer);
                    batch_buffer.clear();

                    let send_result = {
                        let mut transport = transport.lock().unwrap();
                        transport.send_binary(packed)
                    };
                    if let Err(e) = send_result {
                        log::error!("transport write failed, ending session: {e}");
                        return Err(SessionError::Transport(e));
                    }
                }
            }
            None => thread::sleep(POLL_SLEEP),
        }
    }
    Ok(())
}

fn receive_loop(
    transport: Arc<Mutex<Transport>>,
    audio_queue: Arc<Queue<Vec<u8>>>,
    crypto: Arc<Mutex<Crypto>>,
    cancel: Arc<AtomicBool>,
) -> Result<(), SessionError> {
    while !cancel.load(Ordering::SeqCst) {
        let message = {
            let mut transport = transport.lock().unwrap();
            transport.recv_binary()
        };

        let message = match message {
            Ok(Some(m)) => m,
            Ok(None) => continue, // read timed out, give Transmit a turn
            Err(e) => {
                log::error!("transport read failed, ending session: {e}");
                return Err(SessionError::Transport(e));
            }
        };

        let frames = match batch::unpack(&message) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("malformed batch, dropping wire frame: {e}");
                continue;
            }
        };

        for frame in frames {
            let opened = {
                let crypto = crypto.lock().unwrap();
                crypto.decrypt(&frame)
            };
            match opened {
                Ok(plaintext) => {
                    audio_queue.push(plaintext);
                }
                Err(e) => log::warn!("decrypt failed, dropping chunk: {e}"),
            }
        }
    }
    Ok(())
}
