//! Shared-key challenge/response handshake
//!
//! Runs once on a fresh connection before any frame is exchanged. All bytes
//! are raw, not framed:
//!
//! 1. challenger sends a random nonce of [`NONCE_LENGTH`] bytes
//! 2. responder answers with HMAC-SHA256(key, nonce)
//! 3. challenger verifies and sends a single verdict byte, 1 or 0
//!
//! Both sides report the outcome as a plain `bool`. Short reads and I/O
//! failures count as a failed handshake.

use hmac::{Hmac, Mac};
use log::debug;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::IpcError;
use crate::frame::read_full;

type HmacSha256 = Hmac<Sha256>;

pub const NONCE_LENGTH: usize = 32;

/// Output size of HMAC-SHA256
pub const DIGEST_LENGTH: usize = 32;

const ACCEPTED: u8 = 1;
const REJECTED: u8 = 0;

fn keyed_mac(authkey: &[u8], nonce: &[u8]) -> Result<HmacSha256, IpcError> {
    let mut mac = HmacSha256::new_from_slice(authkey)
        .map_err(|_| IpcError::Usage("authentication key rejected by HMAC"))?;
    mac.update(nonce);
    Ok(mac)
}

/// Challenge the peer to prove it holds `authkey`. Returns whether it did.
pub async fn send_challenge<S>(stream: &mut S, authkey: &[u8]) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    match challenge(stream, authkey).await {
        Ok(accepted) => accepted,
        Err(err) => {
            debug!("Handshake failed on challenger side: {}", err);
            false
        }
    }
}

/// Prove to the peer that we hold `authkey`. Returns the peer's verdict.
pub async fn answer_challenge<S>(stream: &mut S, authkey: &[u8]) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    match answer(stream, authkey).await {
        Ok(accepted) => accepted,
        Err(err) => {
            debug!("Handshake failed on responder side: {}", err);
            false
        }
    }
}

async fn challenge<S>(stream: &mut S, authkey: &[u8]) -> Result<bool, IpcError>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let mut nonce = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce);
    stream.write_all(&nonce).await?;
    stream.flush().await?;

    let mut digest = [0u8; DIGEST_LENGTH];
    let accepted = match read_full(stream, &mut digest).await {
        Ok(()) => keyed_mac(authkey, &nonce)?.verify_slice(&digest).is_ok(),
        Err(err) => {
            debug!("Short digest from responder: {}", err);
            false
        }
    };

    // The verdict byte is written even on failure
    let verdict = if accepted { ACCEPTED } else { REJECTED };
    stream.write_all(&[verdict]).await?;
    stream.flush().await?;
    Ok(accepted)
}

async fn answer<S>(stream: &mut S, authkey: &[u8]) -> Result<bool, IpcError>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let mut nonce = [0u8; NONCE_LENGTH];
    read_full(stream, &mut nonce).await?;

    let digest = keyed_mac(authkey, &nonce)?.finalize().into_bytes();
    stream.write_all(&digest).await?;
    stream.flush().await?;

    let mut verdict = [0u8; 1];
    read_full(stream, &mut verdict).await?;
    Ok(verdict[0] == ACCEPTED)
}
