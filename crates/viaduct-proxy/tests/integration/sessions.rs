//! Multi-leg tests: independent sessions sharing one translator, and
//! command table republish while sessions are live.

use std::sync::Arc;

use viaduct_mapping::{CommandTable, MappingHandle};
use viaduct_protocol::{V3_2, V4_2};
use viaduct_proxy::session::Leg;

use crate::harness::{
    container, packet, parse_container, sample_table, translator, translator_with, TestLeg,
};

/// Both legs of a session run concurrently against one translator.
#[tokio::test]
async fn test_two_legs_share_translator() {
    let shared = translator();
    let mut up = TestLeg::spawn(shared.clone(), Leg::new(V3_2, V4_2));
    let mut down = TestLeg::spawn(shared, Leg::new(V3_2, V4_2).reversed());

    up.send(packet("UnionCmdNotify", &container(&[(5, "{}")]))).await;
    down.send(packet("UnionCmdNotify", &container(&[(17, "{}")]))).await;

    let up_out = parse_container(&up.recv().await);
    let down_out = parse_container(&down.recv().await);
    assert_eq!(up_out.cmd_list[0].message_id, 17);
    assert_eq!(down_out.cmd_list[0].message_id, 5);

    up.finish().await;
    down.finish().await;
}

/// Many sessions at once each keep their own ordering.
#[tokio::test]
async fn test_concurrent_sessions_keep_order() {
    let shared = translator();
    let mut legs: Vec<TestLeg> = (0..8)
        .map(|_| TestLeg::spawn(shared.clone(), Leg::new(V4_2, V3_2)))
        .collect();

    for (s, leg) in legs.iter_mut().enumerate() {
        for i in 0..10 {
            leg.send(packet("SceneEntityInfo", &format!("{{\"s\":{s},\"i\":{i}}}")))
                .await;
        }
    }

    for (s, leg) in legs.into_iter().enumerate() {
        let (out, stats) = leg.finish().await;
        assert_eq!(out.len(), 10);
        assert_eq!(stats.fallbacks, 0);
        for (i, p) in out.iter().enumerate() {
            let body: serde_json::Value = serde_json::from_slice(&p.body).unwrap();
            assert_eq!(body["s"], s);
            assert_eq!(body["i"], i);
        }
    }
}

/// A republished table is seen by the next packet on a live leg.
#[tokio::test]
async fn test_republished_table_applies_to_later_packets() {
    let handle = Arc::new(MappingHandle::new(sample_table()));
    let mut leg = TestLeg::spawn(translator_with(handle.clone()), Leg::new(V3_2, V4_2));

    let body = container(&[(5, "{}")]);
    leg.send(packet("UnionCmdNotify", &body)).await;
    assert_eq!(parse_container(&leg.recv().await).cmd_list[0].message_id, 17);

    handle.publish(
        CommandTable::from_entries([
            (V3_2, "Foo", 5),
            (V4_2, "Foo", 18),
        ])
        .unwrap(),
    );

    leg.send(packet("UnionCmdNotify", &body)).await;
    assert_eq!(parse_container(&leg.recv().await).cmd_list[0].message_id, 18);

    leg.finish().await;
}
