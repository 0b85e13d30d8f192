//! Test harness for in-process session legs.
//!
//! Provides TestLeg: a spawned pipe task wired to in-memory duplex streams,
//! with helpers to send frames in and read translated frames out.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::codec::{Decoder, Encoder};
use viaduct_engine::{EngineConfig, Translator};
use viaduct_mapping::{CommandTable, MappingHandle};
use viaduct_protocol::{
    Packet, PacketCodec, ProtocolError, UnionCmd, UnionCmdNotify, V3_2, V4_2,
};
use viaduct_proxy::session::{self, Leg, PipeStats};

/// Duplex buffer size; large enough that tests never block on backpressure.
const DUPLEX_BUFFER: usize = 1024 * 1024;

/// How long a single recv waits before the test fails.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub fn sample_table() -> CommandTable {
    CommandTable::from_entries([
        (V3_2, "Foo", 5),
        (V3_2, "SceneEntityAppearNotify", 221),
        (V3_2, "UnionCmdNotify", 9),
        (V4_2, "Foo", 17),
        (V4_2, "SceneEntityAppearNotify", 340),
        (V4_2, "UnionCmdNotify", 30),
    ])
    .unwrap()
}

pub fn translator_with(handle: Arc<MappingHandle>) -> Arc<Translator> {
    Arc::new(Translator::new(EngineConfig::default(), handle))
}

pub fn translator() -> Arc<Translator> {
    translator_with(Arc::new(MappingHandle::new(sample_table())))
}

pub fn packet(name: &str, body: &str) -> Packet {
    Packet::new(name, Vec::new(), body.as_bytes().to_vec())
}

pub fn container(entries: &[(u16, &str)]) -> String {
    let notify = UnionCmdNotify {
        cmd_list: entries
            .iter()
            .map(|(id, body)| UnionCmd {
                message_id: *id,
                body: bytes::Bytes::copy_from_slice(body.as_bytes()),
            })
            .collect(),
    };
    serde_json::to_string(&notify).unwrap()
}

pub fn parse_container(packet: &Packet) -> UnionCmdNotify {
    serde_json::from_slice(&packet.body).unwrap()
}

/// A running session leg.
pub struct TestLeg {
    input: DuplexStream,
    output: DuplexStream,
    codec: PacketCodec,
    received: BytesMut,
    handle: tokio::task::JoinHandle<Result<PipeStats, ProtocolError>>,
}

#[allow(dead_code)]
impl TestLeg {
    pub fn spawn(translator: Arc<Translator>, leg: Leg) -> Self {
        let (input, pipe_in) = tokio::io::duplex(DUPLEX_BUFFER);
        let (pipe_out, output) = tokio::io::duplex(DUPLEX_BUFFER);
        let handle = session::spawn_pipe(translator, leg, pipe_in, pipe_out);
        Self {
            input,
            output,
            codec: PacketCodec::new(),
            received: BytesMut::new(),
            handle,
        }
    }

    pub async fn send(&mut self, packet: Packet) {
        let mut buf = BytesMut::new();
        PacketCodec::new().encode(packet, &mut buf).unwrap();
        self.input.write_all(&buf).await.unwrap();
    }

    /// Write raw bytes, bypassing the codec.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.input.write_all(bytes).await.unwrap();
    }

    /// Write one length-prefixed frame around arbitrary JSON.
    pub async fn send_frame(&mut self, json: &[u8]) {
        let mut frame = (json.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(json);
        self.send_raw(&frame).await;
    }

    /// Wait for the next translated frame.
    pub async fn recv(&mut self) -> Packet {
        tokio::time::timeout(RECV_TIMEOUT, async {
            loop {
                if let Some(packet) = self.codec.decode(&mut self.received).unwrap() {
                    return packet;
                }
                let n = self.output.read_buf(&mut self.received).await.unwrap();
                assert!(n > 0, "pipe closed before a frame arrived");
            }
        })
        .await
        .expect("timed out waiting for a translated frame")
    }

    /// Close the input, drain the remaining output and join the task.
    pub async fn finish(mut self) -> (Vec<Packet>, PipeStats) {
        drop(self.input);
        let mut rest = Vec::new();
        self.output.read_to_end(&mut rest).await.unwrap();
        self.received.extend_from_slice(&rest);

        let stats = self.handle.await.unwrap().unwrap();

        let mut packets = Vec::new();
        while let Some(packet) = self.codec.decode(&mut self.received).unwrap() {
            packets.push(packet);
        }
        (packets, stats)
    }
}
