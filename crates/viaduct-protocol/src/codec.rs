//! Packet framing for byte streams.
//!
//! Frames are length-delimited (4-byte big-endian prefix). Each frame holds a
//! JSON `{"name", "header", "body"}` with header and body base64-encoded.
//!
//! A frame that splits cleanly but does not hold a packet is skipped and
//! counted. The prefix has already located the next frame, so one bad
//! packet never ends a session. An oversized prefix does: past it the
//! stream cannot be trusted to stay aligned.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec, LengthDelimitedCodecError};

use crate::{Packet, ProtocolError};

/// Maximum frame size: 16 MB.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Codec for framing [`Packet`] values over a byte stream.
///
/// Keeps partial-frame state between calls: use one instance per stream.
#[derive(Debug)]
pub struct PacketCodec {
    frames: LengthDelimitedCodec,
    skipped: u64,
}

impl PacketCodec {
    pub fn new() -> Self {
        let frames = LengthDelimitedCodec::builder()
            .length_field_length(4)
            .big_endian()
            .max_frame_length(MAX_FRAME_SIZE)
            .new_codec();
        Self { frames, skipped: 0 }
    }

    /// Frames dropped so far because they did not hold a packet.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(frame) = self.frames.decode(src).map_err(frame_error)? else {
                return Ok(None);
            };
            match serde_json::from_slice::<Packet>(&frame) {
                Ok(packet) => return Ok(Some(packet)),
                Err(error) => {
                    self.skipped += 1;
                    tracing::warn!(
                        frame_len = frame.len(),
                        %error,
                        "codec: skipping frame that is not a packet"
                    );
                }
            }
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        self.frames
            .encode(Bytes::from(payload), dst)
            .map_err(frame_error)
    }
}

/// The length-delimited layer reports an oversized prefix as an
/// `InvalidData` I/O error wrapping its own error type.
fn frame_error(error: std::io::Error) -> ProtocolError {
    let oversized = error
        .get_ref()
        .is_some_and(|inner| inner.is::<LengthDelimitedCodecError>());
    if oversized {
        ProtocolError::FrameTooLarge { max: MAX_FRAME_SIZE }
    } else {
        ProtocolError::Io(error)
    }
}
