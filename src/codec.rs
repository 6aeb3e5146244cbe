//! Newline-delimited JSON framing, one [`ClientMessage`] or [`ServerMessage`]
//! per line, per spec.md §6. The teacher frames its editor protocol the same
//! way (`editor.rs`'s `EditorProtocolCodec`), though it reads lines via
//! `LinesCodec` and parses JSON itself; here the framing and the parsing are
//! combined into one `Decoder` impl since there's exactly one message type
//! per direction.
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::RelayError;
use crate::protocol::{ClientMessage, ServerMessage};

/// Generic newline-JSON codec; monomorphized below for each direction so a
/// connection's read half decodes [`ClientMessage`] while its write half
/// encodes [`ServerMessage`].
#[derive(Debug, Default)]
pub struct LineJsonCodec<In, Out> {
    _in: std::marker::PhantomData<In>,
    _out: std::marker::PhantomData<Out>,
}

impl<In, Out> LineJsonCodec<In, Out> {
    #[must_use]
    pub fn new() -> Self {
        Self { _in: std::marker::PhantomData, _out: std::marker::PhantomData }
    }
}

impl<In: DeserializeOwned, Out> Decoder for LineJsonCodec<In, Out> {
    type Item = In;
    type Error = RelayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(newline_index) = src.iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };

        let line = src.split_to(newline_index + 1);
        let line = &line[..line.len() - 1];
        let line = if line.last() == Some(&b'\r') { &line[..line.len() - 1] } else { line };

        if line.is_empty() {
            return self.decode(src);
        }

        let item = serde_json::from_slice(line)
            .map_err(|e| RelayError::OutOfRange { detail: format!("malformed message: {e}") })?;
        Ok(Some(item))
    }
}

impl<In, Out: Serialize> Encoder<Out> for LineJsonCodec<In, Out> {
    type Error = RelayError;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut payload = serde_json::to_vec(&item)
            .map_err(|e| RelayError::OutOfRange { detail: format!("unserializable message: {e}") })?;
        payload.push(b'\n');
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

pub type ClientCodec = LineJsonCodec<ClientMessage, ServerMessage>;
pub type ServerCodec = LineJsonCodec<ServerMessage, ClientMessage>;
