//! Canonical identifiers derived from service names.
//!
//! Every place that refers to a device object, policy, or test for a service
//! goes through these functions so the names always agree.

/// Prefix of application objects on the device.
pub const APPLICATION_PREFIX: &str = "k8s";

/// Prefix of security policies on the device.
pub const POLICY_PREFIX: &str = "K8SPOLICY_ALLOW_";

/// Application object name: lowercase `k8s` prefix plus the service name.
pub fn application_name(service: &str) -> String {
    format!("{APPLICATION_PREFIX}{service}")
}

/// Security policy name: uppercased service name after a fixed prefix.
pub fn policy_name(service: &str) -> String {
    format!("{POLICY_PREFIX}{}", service.to_uppercase())
}

/// Name of the configuration test for a service.
pub fn config_test_name(service: &str) -> String {
    format!("test_app_{service}")
}

/// Label of the traffic test run for a service.
pub fn testrun_label(service: &str) -> String {
    format!("test-{service}")
}

/// Name of a reachability statement.
pub fn ping_statement_name(subject: &str) -> String {
    format!("pingtest_{subject}")
}
