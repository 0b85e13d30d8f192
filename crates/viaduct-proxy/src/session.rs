//! Session pipe -- translate one direction of a session's packet stream.
//!
//! One task per session leg. Frames are decoded, translated and written in
//! arrival order; a packet that fails to translate is forwarded as it came.
//! A frame that is not a packet at all is dropped and the leg carries on;
//! only I/O errors and oversized frames end it.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};
use viaduct_engine::Translator;
use viaduct_protocol::{Packet, PacketCodec, ProtocolError, ProtocolVersion};

/// Initial read buffer size.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// One direction of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leg {
    pub from: ProtocolVersion,
    pub to: ProtocolVersion,
}

impl Leg {
    pub fn new(from: ProtocolVersion, to: ProtocolVersion) -> Self {
        Self { from, to }
    }

    pub fn reversed(self) -> Self {
        Self {
            from: self.to,
            to: self.from,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipeStats {
    pub packets: u64,
    /// Packets forwarded untranslated after a failure.
    pub fallbacks: u64,
    /// Frames dropped because they did not hold a packet at all.
    pub skipped: u64,
}

/// Run one leg until `reader` reaches EOF.
pub async fn run_pipe<R, W>(
    translator: Arc<Translator>,
    leg: Leg,
    mut reader: R,
    mut writer: W,
) -> Result<PipeStats, ProtocolError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut codec = PacketCodec::new();
    let mut inbound = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut outbound = BytesMut::new();
    let mut stats = PipeStats::default();

    loop {
        while let Some(packet) = codec.decode(&mut inbound)? {
            let packet = translate_one(&translator, leg, packet, &mut stats);
            codec.encode(packet, &mut outbound)?;
            writer.write_all(&outbound).await?;
            outbound.clear();
        }

        if reader.read_buf(&mut inbound).await? == 0 {
            if !inbound.is_empty() {
                tracing::warn!(
                    trailing = inbound.len(),
                    "pipe: stream ended mid-frame, dropping partial frame"
                );
            }
            break;
        }
    }
    stats.skipped = codec.skipped();

    writer.flush().await?;
    tracing::info!(
        from = %leg.from,
        to = %leg.to,
        packets = stats.packets,
        fallbacks = stats.fallbacks,
        skipped = stats.skipped,
        "pipe: session leg closed"
    );
    Ok(stats)
}

/// Spawn [`run_pipe`] as its own task.
pub fn spawn_pipe<R, W>(
    translator: Arc<Translator>,
    leg: Leg,
    reader: R,
    writer: W,
) -> tokio::task::JoinHandle<Result<PipeStats, ProtocolError>>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(run_pipe(translator, leg, reader, writer))
}

fn translate_one(translator: &Translator, leg: Leg, packet: Packet, stats: &mut PipeStats) -> Packet {
    stats.packets += 1;
    let Packet { name, header, body } = packet;
    let body = match translator.translate(leg.from, leg.to, &name, &header, body) {
        Ok(body) => body,
        Err(failure) => {
            stats.fallbacks += 1;
            tracing::warn!(
                packet = name.as_str(),
                from = %leg.from,
                to = %leg.to,
                error = %failure.error,
                "pipe: forwarding untranslated body"
            );
            failure.original
        }
    };
    Packet { name, header, body }
}
