//! Property tests for the assertion builder.

use std::collections::BTreeMap;

use netverify_assertions::{AssertionBuilder, BuildContext, Stage};
use netverify_inventory::{exposed_endpoints, ServiceEndpoint, ServiceRecord};
use proptest::prelude::*;

fn builder() -> AssertionBuilder {
    AssertionBuilder::new(BuildContext {
        target_host: Some("192.168.49.2".to_string()),
        extra_reachability: Vec::new(),
        expected_interfaces: vec!["ge-0/0/0".to_string()],
    })
}

/// Unique service names mapped to ports.
fn inventory() -> impl Strategy<Value = BTreeMap<String, u16>> {
    prop::collection::btree_map("[a-z][a-z0-9-]{0,12}", 1u16..=65535, 0..16)
}

/// Unique service names mapped to optional ports.
fn records() -> impl Strategy<Value = BTreeMap<String, Option<u16>>> {
    prop::collection::btree_map(
        "[a-z][a-z0-9-]{0,12}",
        prop::option::of(1u16..=65535),
        0..16,
    )
}

fn shuffled_endpoints(services: &BTreeMap<String, u16>, seed: usize) -> Vec<ServiceEndpoint> {
    let mut endpoints: Vec<ServiceEndpoint> = services
        .iter()
        .map(|(name, port)| ServiceEndpoint::new(name.clone(), *port))
        .collect();
    if !endpoints.is_empty() {
        let len = endpoints.len();
        endpoints.rotate_left(seed % len);
    }
    endpoints
}

proptest! {
    #[test]
    fn prop_one_assertion_per_endpoint_in_name_order(services in inventory(), seed in 0usize..64) {
        let endpoints = shuffled_endpoints(&services, seed);
        let expected_names: Vec<&str> = services.keys().map(String::as_str).collect();

        for stage in [Stage::Config, Stage::Traffic] {
            let assertions = builder().build(stage, &endpoints).unwrap();
            prop_assert_eq!(assertions.len(), endpoints.len());

            let names: Vec<&str> = assertions.iter().map(|a| a.subject()).collect();
            prop_assert_eq!(&names, &expected_names);
        }
    }

    #[test]
    fn prop_build_is_deterministic(services in inventory(), seed_a in 0usize..64, seed_b in 0usize..64) {
        let first = builder().build(Stage::Traffic, &shuffled_endpoints(&services, seed_a)).unwrap();
        let second = builder().build(Stage::Traffic, &shuffled_endpoints(&services, seed_b)).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_absent_ports_yield_no_assertion(records in records()) {
        let raw: Vec<ServiceRecord> = records
            .iter()
            .map(|(name, port)| ServiceRecord::new(name.clone(), port.map(i64::from)))
            .collect();

        let endpoints = exposed_endpoints(raw.clone()).unwrap();
        let assertions = builder().build(Stage::Config, &endpoints).unwrap();

        let exposed = records.values().filter(|p| p.is_some()).count();
        prop_assert_eq!(assertions.len(), exposed);
        for assertion in &assertions {
            prop_assert!(records[assertion.subject()].is_some());
        }

        // Same records, same assertions.
        let again = builder()
            .build(Stage::Config, &exposed_endpoints(raw).unwrap())
            .unwrap();
        prop_assert_eq!(assertions, again);
    }
}
