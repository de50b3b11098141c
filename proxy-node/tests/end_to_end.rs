//! End-to-end scenarios exercising a small group of proxies against the
//! in-process registry/driver fakes on the real thread scheduler, rather
//! than against mocked time.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use proxy_node::testing::{InMemoryRegistry, Network};
use proxy_node::Proxy;
use proxy_types::{
    Config, ComponentName, Destination, GroupName, Message, PeerType, ProxyError, SessionId,
    SessionStage, SessionType, Tag,
};

fn config(
    group: &str,
    self_type: &str,
    self_name: &str,
    expected: &[(&str, usize)],
) -> Config {
    let mut expected_peers = HashMap::new();
    for (peer_type, count) in expected {
        expected_peers.insert(PeerType::new(*peer_type), *count);
    }
    Config::builder(GroupName::new(group), PeerType::new(self_type), expected_peers)
        .component_name(ComponentName::new(self_name))
        .max_retries(40)
        .base_retry_interval(Duration::from_millis(2))
        .build()
}

fn task(source: &str, dest: &str, sid: &str, payload: serde_json::Value) -> Message {
    Message {
        tag: Tag::new("t"),
        source: ComponentName::new(source),
        destination: Destination::Peer(ComponentName::new(dest)),
        session_id: SessionId::new(sid),
        session_type: SessionType::Task,
        session_stage: SessionStage::Request,
        payload,
    }
}

/// Scenario 1: learner(1)/actor(2) all resolve each other through the
/// shared registry and connect over the shared in-process network.
#[test]
fn two_role_rendezvous_resolves_every_peer() {
    let registry = Arc::new(InMemoryRegistry::new());
    let network = Arc::new(Network::new());

    let handles: Vec<_> = [
        ("L", "learner", vec![("actor", 2usize)]),
        ("A1", "actor", vec![("learner", 1usize)]),
        ("A2", "actor", vec![("learner", 1usize)]),
    ]
    .into_iter()
    .map(|(name, role, expected)| {
        let registry = registry.clone();
        let network = network.clone();
        thread::spawn(move || {
            let driver = Arc::new(network.driver());
            let cfg = config("g", role, name, &expected);
            Proxy::join(cfg, registry, driver).unwrap()
        })
    })
    .collect();

    let proxies: Vec<Proxy> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let learner = &proxies[0];
    assert_eq!(
        learner.peers(&PeerType::new("actor")).len(),
        2,
        "learner should see both actors onboard"
    );
    for actor in &proxies[1..] {
        assert_eq!(actor.peers(&PeerType::new("learner")).len(), 1);
    }

    assert_eq!(registry.hkeys("g:learner").unwrap(), vec!["L"]);
    let mut actors = registry.hkeys("g:actor").unwrap();
    actors.sort();
    assert_eq!(actors, vec!["A1", "A2"]);
}

/// Scenario 2: scatter from the learner, each actor receives and replies,
/// and the learner's scatter call returns both replies under the shared
/// session id.
#[test]
fn scatter_reply_round_trip() {
    let registry = Arc::new(InMemoryRegistry::new());
    let network = Arc::new(Network::new());

    let handles: Vec<_> = [
        ("L", "learner", vec![("actor", 2usize)]),
        ("A1", "actor", vec![("learner", 1usize)]),
        ("A2", "actor", vec![("learner", 1usize)]),
    ]
    .into_iter()
    .map(|(name, role, expected)| {
        let registry = registry.clone();
        let network = network.clone();
        thread::spawn(move || {
            let driver = Arc::new(network.driver());
            let cfg = config("g", role, name, &expected);
            Proxy::join(cfg, registry, driver).unwrap()
        })
    })
    .collect();
    let mut proxies: Vec<Proxy> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let a2 = proxies.pop().unwrap();
    let a1 = proxies.pop().unwrap();
    let learner = proxies.pop().unwrap();

    let actor_threads: Vec<_> = [(a1, "ok-A1"), (a2, "ok-A2")]
        .into_iter()
        .map(|(proxy, reply)| {
            thread::spawn(move || {
                let msg = proxy.router().receive(false).next().unwrap().unwrap();
                proxy
                    .router()
                    .reply(&msg, None, Some(serde_json::json!(reply)), false)
                    .unwrap();
            })
        })
        .collect();

    let replies = learner
        .router()
        .scatter(
            Tag::new("t"),
            SessionType::Task,
            vec![
                (ComponentName::new("A1"), serde_json::json!(1)),
                (ComponentName::new("A2"), serde_json::json!(2)),
            ],
            Some(SessionId::new("s0")),
        )
        .unwrap();

    for handle in actor_threads {
        handle.join().unwrap();
    }

    assert_eq!(replies.len(), 2);
    let payloads: Vec<_> = replies.iter().map(|m| m.payload.clone()).collect();
    assert!(payloads.contains(&serde_json::json!("ok-A1")));
    assert!(payloads.contains(&serde_json::json!("ok-A2")));
    assert!(replies.iter().all(|m| m.session_id == SessionId::new("s0")));
}

/// Scenario 3: replies arrive out of order; the one not currently awaited
/// is preserved in the message cache for a later `receive_by_id`.
#[test]
fn out_of_order_replies_are_cached_for_a_later_call() {
    let registry = Arc::new(InMemoryRegistry::new());
    let network = Arc::new(Network::new());

    let handles: Vec<_> = [
        ("L", "learner", vec![("actor", 1usize)]),
        ("A1", "actor", vec![("learner", 1usize)]),
    ]
    .into_iter()
    .map(|(name, role, expected)| {
        let registry = registry.clone();
        let network = network.clone();
        thread::spawn(move || {
            let driver = Arc::new(network.driver());
            let cfg = config("g", role, name, &expected);
            Proxy::join(cfg, registry, driver).unwrap()
        })
    })
    .collect();
    let mut proxies: Vec<Proxy> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let a1 = proxies.pop().unwrap();
    let learner = proxies.pop().unwrap();

    // A1 replies to "y" before "x", reversing the order the learner asks
    // for them in.
    a1.router()
        .isend(task("A1", "L", "y", serde_json::json!("reply-y")))
        .unwrap();
    a1.router()
        .isend(task("A1", "L", "x", serde_json::json!("reply-x")))
        .unwrap();

    let x = learner
        .router()
        .receive_by_id(&[SessionId::new("x")])
        .unwrap();
    assert_eq!(x[0].payload, serde_json::json!("reply-x"));

    let y = learner
        .router()
        .receive_by_id(&[SessionId::new("y")])
        .unwrap();
    assert_eq!(y[0].payload, serde_json::json!("reply-y"));
}

/// Scenario 4: with rejoin and the cache both enabled, a send to a peer
/// that has dropped off the registry is buffered, and dispatched once
/// reconcile sees the peer reappear at a new address.
#[test]
fn peer_restart_drains_the_rejoin_cache() {
    let registry = Arc::new(InMemoryRegistry::new());
    let network = Arc::new(Network::new());

    let a1_driver = network.driver();
    registry
        .hset("g:actor", "A1", &serde_json::to_string(&a1_driver.address()).unwrap())
        .unwrap();
    let a2_driver = network.driver();
    registry
        .hset("g:actor", "A2", &serde_json::to_string(&a2_driver.address()).unwrap())
        .unwrap();

    let learner_driver = Arc::new(network.driver());
    let cfg = Config::builder(
        GroupName::new("g"),
        PeerType::new("learner"),
        HashMap::from([(PeerType::new("actor"), 2)]),
    )
    .component_name(ComponentName::new("L"))
    .max_retries(20)
    .base_retry_interval(Duration::from_millis(2))
    .enable_rejoin(true)
    .enable_message_cache_for_rejoin(true)
    .peer_update_frequency(Duration::from_millis(20))
    // A1 going down still leaves one actor (A2) onboard, which meets
    // this minimum, so the proxy never degrades during this scenario.
    .minimal_peers(proxy_types::MinimalPeers::Scalar(0.5))
    .build();
    let learner = Proxy::join(cfg, registry.clone(), learner_driver).unwrap();

    // A1 disappears from the registry (process killed); A2 stays onboard.
    registry.hdel("g:actor", "A1").unwrap();
    thread::sleep(Duration::from_millis(60));

    let ids = learner
        .router()
        .isend(task("L", "A1", "buffered", serde_json::json!("hello again")))
        .unwrap();
    assert_eq!(ids, vec![SessionId::new("buffered")]);

    // A1 restarts at a new address.
    let a1_restarted = network.driver();
    registry
        .hset(
            "g:actor",
            "A1",
            &serde_json::to_string(&a1_restarted.address()).unwrap(),
        )
        .unwrap();

    let delivered = a1_restarted
        .recv(Some(Duration::from_secs(2)))
        .unwrap()
        .expect("cached message should be dispatched once A1 reconnects");
    assert_eq!(delivered.session_id, SessionId::new("buffered"));

    learner.shutdown();
}

/// Scenario 5: losing every actor breaches `minimal_peers` and the proxy
/// degrades, so further sends fail fast with `PeersMiss`.
#[test]
fn minimum_peer_breach_degrades_the_proxy() {
    let registry = Arc::new(InMemoryRegistry::new());
    let network = Arc::new(Network::new());

    let a1_driver = network.driver();
    let a2_driver = network.driver();
    registry
        .hset("g:actor", "A1", &serde_json::to_string(&a1_driver.address()).unwrap())
        .unwrap();
    registry
        .hset("g:actor", "A2", &serde_json::to_string(&a2_driver.address()).unwrap())
        .unwrap();

    let learner_driver = Arc::new(network.driver());
    let cfg = Config::builder(
        GroupName::new("g"),
        PeerType::new("learner"),
        HashMap::from([(PeerType::new("actor"), 2)]),
    )
    .component_name(ComponentName::new("L"))
    .max_retries(20)
    .base_retry_interval(Duration::from_millis(2))
    .enable_rejoin(true)
    .minimal_peers(proxy_types::MinimalPeers::Scalar(0.6))
    .peer_update_frequency(Duration::from_millis(20))
    .build();
    let learner = Proxy::join(cfg, registry.clone(), learner_driver).unwrap();
    assert!(!learner.is_degraded());

    registry.hdel("g:actor", "A1").unwrap();
    registry.hdel("g:actor", "A2").unwrap();
    thread::sleep(Duration::from_millis(80));

    assert!(learner.is_degraded());
    let err = learner
        .router()
        .send(task("L", "A1", "s", serde_json::json!("ping")))
        .unwrap_err();
    assert!(matches!(err, ProxyError::PeersMiss(_)));

    learner.shutdown();
}

/// Scenario 6: shutdown removes the proxy's registry entry, idempotently.
#[test]
fn shutdown_deregisters_from_the_registry() {
    let registry = Arc::new(InMemoryRegistry::new());
    let network = Arc::new(Network::new());
    let driver = Arc::new(network.driver());

    let cfg = config("g", "actor", "A1", &[]);
    let proxy = Proxy::join(cfg, registry.clone(), driver).unwrap();
    assert_eq!(registry.hkeys("g:actor").unwrap(), vec!["A1"]);

    proxy.shutdown();
    proxy.shutdown();
    assert!(registry.hkeys("g:actor").unwrap().is_empty());
}
