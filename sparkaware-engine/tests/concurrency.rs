mod utils;

use std::{sync::Arc, time::Duration};

use sparkaware_broker::channel::{BrokerHarness, ChannelEventSource};
use sparkaware_engine::{AwareConfig, Engine, SessionPhase};
use sparkaware_types::JsonPayloadCodec;
use utils::*;

fn new_engine() -> (Arc<Engine>, BrokerHarness) {
    let (_source, broker, harness) = ChannelEventSource::new();
    let engine = Arc::new(Engine::new(
        broker,
        JsonPayloadCodec::new(),
        AwareConfig::new(Duration::from_secs(60)),
    ));
    (engine, harness)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unrelated_identities_never_interfere() {
    let (engine, _harness) = new_engine();
    let mut tasks = Vec::new();
    for n in 0..8 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let node = format!("node{n}");
            let birth_topic = format!("spBv1.0/plant1/NBIRTH/{node}");
            let data_topic = format!("spBv1.0/plant1/NDATA/{node}");
            let client = format!("edge{n}");
            engine
                .process_event(publish(&client, &birth_topic, &birth_payload(0, 0)))
                .await;
            for seq in 1..=50 {
                engine
                    .process_event(publish(&client, &data_topic, &payload(seq)))
                    .await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(engine.session_count(), 8);
    for n in 0..8 {
        let view = engine
            .inspect("plant1", &format!("node{n}"))
            .await
            .unwrap();
        assert_eq!(view.phase, SessionPhase::Birthed);
        assert_eq!(view.last_seq, 50);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_births_initialize_exactly_once() {
    let (engine, _harness) = new_engine();
    let mut tasks = Vec::new();
    for n in 0..16 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let client = format!("edge-attempt{n}");
            engine
                .process_event(publish(
                    &client,
                    "spBv1.0/plant1/NBIRTH/press",
                    &birth_payload(0, 0),
                ))
            .await
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // however the births interleaved, exactly one initialized session remains
    assert_eq!(engine.session_count(), 1);
    let view = engine.inspect("plant1", "press").await.unwrap();
    assert_eq!(view.phase, SessionPhase::Birthed);
    assert_eq!(view.last_seq, 0);
    assert!(view.devices.is_empty());

    // and it is a coherent baseline for an in-order stream
    for seq in 1..=5 {
        engine
            .process_event(publish(
                &view.client_id,
                "spBv1.0/plant1/NDATA/press",
                &payload(seq),
            ))
            .await;
    }
    assert_eq!(
        engine.inspect("plant1", "press").await.unwrap().last_seq,
        5
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn commands_do_not_disturb_a_data_stream() {
    let (engine, _harness) = new_engine();

    let spammer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                engine
                    .process_event(publish(
                        "scada1",
                        "spBv1.0/plant1/NCMD/press",
                        &empty_payload(),
                    ))
                    .await;
            }
        })
    };

    engine
        .process_event(publish(
            "edge1",
            "spBv1.0/plant1/NBIRTH/press",
            &birth_payload(0, 0),
        ))
        .await;
    for seq in 1..=50 {
        engine
            .process_event(publish(
                "edge1",
                "spBv1.0/plant1/NDATA/press",
                &payload(seq),
            ))
            .await;
    }
    spammer.await.unwrap();

    let view = engine.inspect("plant1", "press").await.unwrap();
    assert_eq!(view.phase, SessionPhase::Birthed);
    assert_eq!(view.last_seq, 50);
}
