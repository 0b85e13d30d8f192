//! Single-leg pipe tests: ordering, fail-open forwarding, container remap.

use viaduct_protocol::{V3_2, V4_2};
use viaduct_proxy::session::Leg;

use crate::harness::{container, packet, parse_container, translator, TestLeg};

/// Packets leave a leg in the order they arrived, whatever their kind.
#[tokio::test]
async fn test_packets_forwarded_in_arrival_order() {
    let mut leg = TestLeg::spawn(translator(), Leg::new(V4_2, V3_2));

    let names = [
        "PingReq",
        "SceneEntityInfo",
        "EvtCreateGadgetNotify",
        "GetPlayerTokenRsp",
        "PingReq",
        "SceneEntityInfo",
    ];
    for (i, name) in names.iter().enumerate() {
        leg.send(packet(name, &format!("{{\"seq\":{i}}}"))).await;
    }

    let (out, stats) = leg.finish().await;
    let got: Vec<&str> = out.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(got, names);
    for (i, p) in out.iter().enumerate() {
        let body: serde_json::Value = serde_json::from_slice(&p.body).unwrap();
        assert_eq!(body["seq"], i);
    }
    assert_eq!(stats.packets, names.len() as u64);
    assert_eq!(stats.fallbacks, 0);
}

/// A body that cannot be decoded is forwarded byte-for-byte and counted.
#[tokio::test]
async fn test_malformed_body_forwarded_untouched() {
    let mut leg = TestLeg::spawn(translator(), Leg::new(V4_2, V3_2));

    leg.send(packet("SceneEntityInfo", "{not json")).await;
    let bad = leg.recv().await;
    assert_eq!(bad.name, "SceneEntityInfo");
    assert_eq!(&bad.body[..], b"{not json");

    leg.send(packet("PingReq", "{}")).await;
    let next = leg.recv().await;
    assert_eq!(next.name, "PingReq");

    let (_, stats) = leg.finish().await;
    assert_eq!(stats.packets, 2);
    assert_eq!(stats.fallbacks, 1);
}

/// Relocated fields are rewritten in flight.
#[tokio::test]
async fn test_relocated_field_rewritten_in_flight() {
    let mut leg = TestLeg::spawn(translator(), Leg::new(V4_2, V3_2));

    leg.send(packet(
        "SceneEntityInfo",
        r#"{"gadget":{"trifleGadget":{"trifleItem":{"itemId":7}}}}"#,
    ))
    .await;
    let out = leg.recv().await;
    let body: serde_json::Value = serde_json::from_slice(&out.body).unwrap();
    assert_eq!(body["gadget"]["trifleItem"]["itemId"], 7);
    assert!(body["gadget"].get("trifleGadget").is_none());

    leg.finish().await;
}

/// Container entries get the destination revision's ids, in order.
#[tokio::test]
async fn test_container_remapped_through_pipe() {
    let mut leg = TestLeg::spawn(translator(), Leg::new(V3_2, V4_2));

    let body = container(&[(5, "{\"a\":1}"), (221, "{\"b\":2}")]);
    leg.send(packet("UnionCmdNotify", &body)).await;

    let out = leg.recv().await;
    assert_eq!(out.name, "UnionCmdNotify");
    let notify = parse_container(&out);
    let ids: Vec<u16> = notify.cmd_list.iter().map(|c| c.message_id).collect();
    assert_eq!(ids, vec![17, 340]);

    let (_, stats) = leg.finish().await;
    assert_eq!(stats.fallbacks, 0);
}

/// A container holding an id the table does not know is forwarded whole.
#[tokio::test]
async fn test_unknown_container_entry_falls_back() {
    let mut leg = TestLeg::spawn(translator(), Leg::new(V3_2, V4_2));

    let body = container(&[(5, "{}"), (999, "{}")]);
    leg.send(packet("UnionCmdNotify", &body)).await;

    let out = leg.recv().await;
    assert_eq!(&out.body[..], body.as_bytes());

    let (_, stats) = leg.finish().await;
    assert_eq!(stats.fallbacks, 1);
}

/// A stream cut mid-frame ends the leg cleanly; complete frames still go out.
#[tokio::test]
async fn test_truncated_stream_drops_partial_frame() {
    let mut leg = TestLeg::spawn(translator(), Leg::new(V4_2, V3_2));

    leg.send(packet("PingReq", "{}")).await;
    leg.send_raw(&[0, 0, 0, 50, b'{']).await;

    let (out, stats) = leg.finish().await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].name, "PingReq");
    assert_eq!(stats.packets, 1);
}

/// A frame that is not a packet is dropped; the packets after it still flow.
#[tokio::test]
async fn test_undecodable_frame_does_not_end_leg() {
    let mut leg = TestLeg::spawn(translator(), Leg::new(V4_2, V3_2));

    leg.send_frame(br#"{"name":"PingReq","body":"!!!"}"#).await;
    leg.send(packet("PingReq", "{\"after\":true}")).await;

    let next = leg.recv().await;
    assert_eq!(next.name, "PingReq");
    assert_eq!(&next.body[..], br#"{"after":true}"#);

    let (rest, stats) = leg.finish().await;
    assert!(rest.is_empty());
    assert_eq!(stats.packets, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.fallbacks, 0);
}
