//! Error kinds, one enum per module boundary, rather than one flat error.

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("failed to open audio device")]
    DeviceError,
    #[error("failed to start audio stream")]
    StreamStartError,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("codec setup failed")]
    SetupFailed,
    #[error("cannot compress empty input")]
    EmptyInput,
    #[error("frame encode failed: {0}")]
    EncodeFailed(String),
    #[error("frame decode failed: {0}")]
    DecodeFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("malformed batch: {0}")]
    MalformedBatch(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("bad public key length: expected 32 bytes, got {0}")]
    BadPublicKey(usize),
    #[error("ciphertext too short: expected at least 24 bytes, got {0}")]
    TooShort(usize),
    #[error("AEAD authentication failed")]
    AuthFailed,
    #[error("nonce counter would wrap")]
    NonceWrap,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(String),
    #[error("transport handshake error: {0}")]
    Handshake(String),
    #[error("peer closed the connection")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Top-level error surfaced by `Session::run` to the CLI boundary.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("audio stream error: {0}")]
    Audio(#[from] AudioError),
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("--tls-cert file not found: {0}")]
    TlsCertMissing(String),
    #[error("--tls-key file not found: {0}")]
    TlsKeyMissing(String),
}
