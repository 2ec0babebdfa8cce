//! Minimal agent client over any request-then-read byte stream.
//!
//! Understands the replies to the two requests it sends (identities, sign)
//! and nothing more.

use std::io::{Read, Write};

use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::bridge::codec::{AgentCodec, MAX_MESSAGE_LEN};
use crate::bridge::protocol::{AgentRequest, AgentResponse};
use crate::error::{PageantError, Result};
use crate::key::{KeyDescriptor, Signature};

pub struct AgentClient<S> {
    stream: S,
    codec: AgentCodec,
}

impl<S: Read + Write> AgentClient<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            codec: AgentCodec::new(),
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Send one request and read back exactly one reply frame.
    pub fn call(&mut self, request: AgentRequest) -> Result<AgentResponse> {
        let mut out = BytesMut::new();
        self.codec.encode(request, &mut out)?;
        self.stream.write_all(&out)?;
        self.stream.flush()?;

        let mut inbound = BytesMut::with_capacity(MAX_MESSAGE_LEN);
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(response) = self.codec.decode(&mut inbound)? {
                return Ok(response);
            }
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Err(PageantError::protocol(format!(
                    "truncated reply ({} bytes buffered)",
                    inbound.len()
                )));
            }
            inbound.extend_from_slice(&chunk[..n]);
        }
    }

    pub fn request_identities(&mut self) -> Result<Vec<KeyDescriptor>> {
        match self.call(AgentRequest::RequestIdentities)? {
            AgentResponse::Identities(keys) => Ok(keys),
            other => Err(unexpected(other)),
        }
    }

    pub fn sign(&mut self, key: &KeyDescriptor, data: &[u8], flags: u32) -> Result<Signature> {
        let request = AgentRequest::SignRequest {
            key_blob: key.blob.clone(),
            data: data.to_vec(),
            flags,
        };
        match self.call(request)? {
            AgentResponse::Signature(signature) => Ok(signature),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: AgentResponse) -> PageantError {
    use crate::bridge::protocol::{
        SSH_AGENT_IDENTITIES_ANSWER, SSH_AGENT_SIGN_RESPONSE, SSH_AGENT_SUCCESS,
    };

    match response {
        AgentResponse::Failure => PageantError::AgentFailure,
        AgentResponse::Success => PageantError::UnexpectedReply {
            kind: SSH_AGENT_SUCCESS,
        },
        AgentResponse::Identities(_) => PageantError::UnexpectedReply {
            kind: SSH_AGENT_IDENTITIES_ANSWER,
        },
        AgentResponse::Signature(_) => PageantError::UnexpectedReply {
            kind: SSH_AGENT_SIGN_RESPONSE,
        },
        AgentResponse::Other { kind } => PageantError::UnexpectedReply { kind },
    }
}
