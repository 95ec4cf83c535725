mod common;

use tokengate_engine_core::EngineEvent;

use common::{default_config, evm_handle, harness, harness_with_config, log_contains};

#[test]
fn a_miss_is_idempotent_with_no_observable_side_effects() {
    let mut h = harness();
    h.host.clear_injected();

    assert!(h.engine.probe().expect("probe").is_none());
    assert!(h.engine.probe().expect("probe").is_none());
    assert_eq!(h.host.probe_count(), 2);
    assert!(h.engine.drain_log().is_empty());
    assert!(h.engine.drain_events().is_empty());
}

#[test]
fn the_watch_finds_a_provider_injected_mid_loop() {
    let mut h = harness();
    h.host.clear_injected();
    h.engine.begin_probe_watch().expect("watch");

    // First attempt fires immediately and misses.
    h.engine.tick().expect("tick");
    assert!(h.engine.session().is_none());

    h.host.inject(evm_handle());
    h.clock.advance(800);
    h.engine.tick().expect("tick");

    let log = h.engine.drain_log();
    assert!(log_contains(&log, "detected injected evm provider"));
    h.engine.connect().expect("connect after detection");
}

#[test]
fn the_watch_gives_up_after_the_attempt_ceiling() {
    let mut h = harness();
    h.host.clear_injected();
    h.engine.begin_probe_watch().expect("watch");

    for _ in 0..20 {
        h.engine.tick().expect("tick");
        h.clock.advance(800);
    }
    let log = h.engine.drain_log();
    assert!(log_contains(&log, "no wallet provider found"));
    assert_eq!(h.host.probe_count(), 15);

    // The watch is over; further ticks probe nothing.
    for _ in 0..5 {
        h.clock.advance(800);
        h.engine.tick().expect("tick");
    }
    assert_eq!(h.host.probe_count(), 15);
}

#[test]
fn cancelling_the_watch_stops_it_deterministically() {
    let mut h = harness();
    h.host.clear_injected();
    h.engine.begin_probe_watch().expect("watch");
    h.engine.tick().expect("tick");
    let probes = h.host.probe_count();

    h.engine.cancel().expect("cancel");
    for _ in 0..10 {
        h.clock.advance(800);
        h.engine.tick().expect("tick");
    }
    assert_eq!(h.host.probe_count(), probes);
}

#[test]
fn mobile_hosts_get_exactly_one_deep_link_suggestion() {
    let mut config = default_config();
    config.deep_link_template =
        Some("https://link.trustwallet.com/open_url?coin_id=56&url=https%3A%2F%2Fexample.org".to_owned());
    let mut h = harness_with_config(config);
    h.host.clear_injected();
    h.host.set_mobile(true);

    h.engine.begin_probe_watch().expect("watch");
    for _ in 0..6 {
        h.engine.tick().expect("tick");
        h.clock.advance(800);
    }

    let suggestions = h
        .engine
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::DeepLinkSuggested { .. }))
        .count();
    assert_eq!(suggestions, 1);
}

#[test]
fn desktop_hosts_never_get_a_deep_link() {
    let mut config = default_config();
    config.deep_link_template = Some("https://example.org/open".to_owned());
    let mut h = harness_with_config(config);
    h.host.clear_injected();

    h.engine.begin_probe_watch().expect("watch");
    for _ in 0..6 {
        h.engine.tick().expect("tick");
        h.clock.advance(800);
    }
    assert!(h
        .engine
        .drain_events()
        .iter()
        .all(|e| !matches!(e, EngineEvent::DeepLinkSuggested { .. })));
}
