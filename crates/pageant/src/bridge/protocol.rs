//! Wire protocol types for agent communication.
//!
//! Only the slice of the SSH agent protocol this bridge consumes: listing
//! identities, signing, and the vendor certificate upload. Every message is
//! a frame `Length:u32 Payload[Length]` whose first payload byte is the
//! message type. Field encoding (`uint32`, length-prefixed strings) is
//! `ssh_encoding`'s.

use bytes::Bytes;
use ssh_encoding::{Decode, Encode, Reader};

use crate::error::{PageantError, Result};
use crate::key::{KeyDescriptor, Signature};

pub const SSH_AGENT_FAILURE: u8 = 5;
pub const SSH_AGENT_SUCCESS: u8 = 6;
pub const SSH_AGENTC_REQUEST_IDENTITIES: u8 = 11;
pub const SSH_AGENT_IDENTITIES_ANSWER: u8 = 12;
pub const SSH_AGENTC_SIGN_REQUEST: u8 = 13;
pub const SSH_AGENT_SIGN_RESPONSE: u8 = 14;
pub const SSH_AGENTC_ADD_IDENTITY: u8 = 17;

/// Sign-request flags (draft-miller-ssh-agent §5.3).
pub const SSH_AGENT_RSA_SHA2_256: u32 = 2;
pub const SSH_AGENT_RSA_SHA2_512: u32 = 4;

/// Messages from client to agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentRequest {
    RequestIdentities,

    SignRequest {
        key_blob: Vec<u8>,
        data: Vec<u8>,
        flags: u32,
    },

    /// Certificate upload understood only by the patched Pageant build.
    ///
    /// Reuses `SSH_AGENTC_ADD_IDENTITY` but carries the certificate type name
    /// (e.g. `ssh-ed25519-cert-v01@openssh.com`) in the key-type field and the
    /// certificate blob where a private key would go. A standard agent will
    /// reject or misparse it: do not send it to anything else.
    LoadCertificate {
        cert_type: String,
        key_blob: Vec<u8>,
        comment: String,
    },
}

impl AgentRequest {
    pub fn kind(&self) -> u8 {
        match self {
            Self::RequestIdentities => SSH_AGENTC_REQUEST_IDENTITIES,
            Self::SignRequest { .. } => SSH_AGENTC_SIGN_REQUEST,
            Self::LoadCertificate { .. } => SSH_AGENTC_ADD_IDENTITY,
        }
    }

    /// Payload without the frame length prefix.
    pub fn to_payload(&self) -> Result<Bytes> {
        let mut dst = Vec::new();
        self.kind().encode(&mut dst)?;
        match self {
            Self::RequestIdentities => {}
            Self::SignRequest {
                key_blob,
                data,
                flags,
            } => {
                key_blob.encode(&mut dst)?;
                data.encode(&mut dst)?;
                flags.encode(&mut dst)?;
            }
            Self::LoadCertificate {
                cert_type,
                key_blob,
                comment,
            } => {
                cert_type.encode(&mut dst)?;
                key_blob.encode(&mut dst)?;
                comment.encode(&mut dst)?;
            }
        }
        Ok(dst.into())
    }
}

/// Messages from agent to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentResponse {
    Success,
    Failure,
    Identities(Vec<KeyDescriptor>),
    Signature(Signature),
    /// Anything else. We don't interpret it, but the caller sees the type.
    Other { kind: u8 },
}

impl AgentResponse {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut reader = payload;
        if reader.is_finished() {
            return Err(PageantError::protocol("empty reply"));
        }

        match u8::decode(&mut reader)? {
            SSH_AGENT_SUCCESS => Ok(Self::Success),
            SSH_AGENT_FAILURE => Ok(Self::Failure),
            SSH_AGENT_IDENTITIES_ANSWER => {
                let count = u32::decode(&mut reader)? as usize;
                // Each identity needs at least two length prefixes.
                if count > reader.remaining_len() / 8 {
                    return Err(PageantError::protocol(format!(
                        "identity count {count} exceeds reply size"
                    )));
                }
                let mut keys = Vec::with_capacity(count);
                for _ in 0..count {
                    let blob = Vec::<u8>::decode(&mut reader)?;
                    let comment = Vec::<u8>::decode(&mut reader)?;
                    keys.push(KeyDescriptor::new(
                        blob,
                        String::from_utf8_lossy(&comment).into_owned(),
                    ));
                }
                Ok(Self::Identities(keys))
            }
            SSH_AGENT_SIGN_RESPONSE => {
                let blob = Vec::<u8>::decode(&mut reader)?;
                let mut blob = blob.as_slice();
                let algorithm = Vec::<u8>::decode(&mut blob)?;
                let bytes = Vec::<u8>::decode(&mut blob)?;
                Ok(Self::Signature(Signature {
                    algorithm: String::from_utf8_lossy(&algorithm).into_owned(),
                    bytes,
                }))
            }
            kind => Ok(Self::Other { kind }),
        }
    }
}
