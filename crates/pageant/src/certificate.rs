//! Loading OpenSSH certificates into a patched Pageant.
//!
//! The certificate arrives as a single `authorized_keys`-style line and is
//! re-encoded as the vendor add-identity message (see
//! [`AgentRequest::LoadCertificate`]).

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::bridge::channel::SerializedChannel;
use crate::bridge::codec::{AgentCodec, LENGTH_PREFIX_LEN, declared_len};
use crate::bridge::protocol::{AgentRequest, SSH_AGENT_SUCCESS};
use crate::bridge::transport::Exchange;
use crate::error::{PageantError, Result};

/// Bytes of the reply we look at: the length prefix and the status byte.
const STATUS_REPLY_LEN: usize = LENGTH_PREFIX_LEN + 1;

/// `<type> <base64-blob> [comment]`, already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateLine {
    pub cert_type: String,
    pub blob: Vec<u8>,
    pub comment: String,
}

impl CertificateLine {
    /// Split on the first two runs of whitespace. Everything after the blob
    /// is the comment, inner spacing included.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (cert_type, rest) = line
            .split_once(char::is_whitespace)
            .ok_or(PageantError::InvalidCertificateLine)?;
        let rest = rest.trim_start();
        let (encoded, comment) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if encoded.is_empty() {
            return Err(PageantError::InvalidCertificateLine);
        }

        Ok(Self {
            cert_type: cert_type.to_string(),
            blob: STANDARD.decode(encoded)?,
            comment: comment.trim_start().to_string(),
        })
    }

    pub fn into_request(self) -> AgentRequest {
        AgentRequest::LoadCertificate {
            cert_type: self.cert_type,
            key_blob: self.blob,
            comment: self.comment,
        }
    }
}

/// Hand a certificate line to Pageant and check it was accepted.
///
/// Malformed lines fail before anything is sent. The request and its status
/// reply form one conversation on the channel.
pub fn load_certificate<E: Exchange>(channel: &SerializedChannel<E>, line: &str) -> Result<()> {
    let parsed = CertificateLine::parse(line)?;
    tracing::debug!(cert_type = %parsed.cert_type, comment = %parsed.comment, "Loading certificate");

    let mut frame = BytesMut::new();
    AgentCodec::new().encode(parsed.into_request(), &mut frame)?;

    let mut stream = channel.conversation();
    stream.write_all(&frame)?;

    let mut reply = [0u8; STATUS_REPLY_LEN];
    let mut filled = 0;
    while filled < reply.len() {
        let n = stream.read(&mut reply[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled < STATUS_REPLY_LEN {
        return Err(PageantError::ShortReply { len: filled });
    }

    // Don't leave the rest of this reply in front of the next one.
    let remaining = declared_len(&reply).map_or(0, |len| len.saturating_sub(1));
    stream.discard(remaining);

    match reply[LENGTH_PREFIX_LEN] {
        SSH_AGENT_SUCCESS => {
            tracing::info!("Certificate loaded into Pageant");
            Ok(())
        }
        status => Err(PageantError::CertificateRejected { status }),
    }
}
