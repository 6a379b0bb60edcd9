//! Verifier configuration (env-driven, with CLI overrides applied in `main`).

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use netverify_assertions::{BuildContext, ReachabilityTarget};
use netverify_inventory::KubernetesConfig;

use crate::logging::LogFormat;
use crate::stages::traffic::TrafficSettings;

/// Interfaces the lab firewall is expected to expose.
const DEFAULT_INTERFACES: &str = "ge-0/0/0,ge-0/0/1,ge-0/0/2";

/// Fixed reachability checks run alongside the per-service ones.
const DEFAULT_PING_TARGETS: &str = "bastionmachine=192.168.100.10";

/// Shortest pause between coordinator polls.
const MIN_POLL_SECS: u64 = 1;

/// Managed device connection settings.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Management address.
    pub host: String,

    /// NETCONF/SSH port, handed to the checker gateway.
    pub port: u16,

    /// REST API port used for configuration pushes.
    pub rest_port: u16,

    /// Login user.
    pub username: String,

    /// Login password (only needed for configuration pushes).
    pub password: Option<String>,
}

/// Verifier configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Orchestration platform API.
    pub kube: KubernetesConfig,

    /// Managed device.
    pub device: DeviceConfig,

    /// Base URL of the config-assertion and compliance gateway.
    pub checker_url: String,

    /// Base URL of the load-test coordinator API (including `/v1`).
    pub coordinator_url: String,

    /// Address where service node ports are exposed.
    pub target_host: Option<String>,

    /// Extra reachability targets for the operational stage.
    pub ping_targets: Vec<ReachabilityTarget>,

    /// Interface inventory the device must report.
    pub expected_interfaces: Vec<String>,

    /// Traffic stage settings.
    pub traffic: TrafficSettings,

    /// Per-request HTTP timeout for back-end calls.
    pub http_timeout: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let http_timeout = Duration::from_secs(parse_var("NETVERIFY_HTTP_TIMEOUT_SECS")?.unwrap_or(30));

        let kube = KubernetesConfig {
            api_url: std::env::var("NETVERIFY_KUBE_API_URL").ok(),
            accept_invalid_certs: flag("NETVERIFY_KUBE_INSECURE"),
            timeout: http_timeout,
        };

        let device = DeviceConfig {
            host: var_or("NETVERIFY_DEVICE_HOST", "127.0.0.1"),
            port: parse_var("NETVERIFY_DEVICE_PORT")?.unwrap_or(830),
            rest_port: parse_var("NETVERIFY_DEVICE_REST_PORT")?.unwrap_or(3000),
            username: var_or("NETVERIFY_DEVICE_USER", "root"),
            password: std::env::var("NETVERIFY_DEVICE_PASSWORD").ok(),
        };

        let ping_targets = split_list(&var_or("NETVERIFY_PING_TARGETS", DEFAULT_PING_TARGETS))
            .iter()
            .map(|s| s.parse::<ReachabilityTarget>())
            .collect::<Result<Vec<_>, _>>()
            .context("NETVERIFY_PING_TARGETS must be a comma-separated list of name=host")?;

        let expected_interfaces =
            split_list(&var_or("NETVERIFY_EXPECTED_INTERFACES", DEFAULT_INTERFACES));

        let defaults = TrafficSettings::default();
        let traffic = TrafficSettings {
            group_label: var_or("NETVERIFY_AGENT_GROUP", &defaults.group_label),
            agent_hostname_pattern: var_or(
                "NETVERIFY_AGENT_HOSTNAME_PATTERN",
                &defaults.agent_hostname_pattern,
            ),
            min_agents: parse_var("NETVERIFY_MIN_AGENTS")?.unwrap_or(defaults.min_agents),
            agent_poll_interval: parse_var("NETVERIFY_AGENT_POLL_SECS")?
                .map(poll_interval)
                .unwrap_or(defaults.agent_poll_interval),
            result_poll_interval: parse_var("NETVERIFY_RESULT_POLL_SECS")?
                .map(poll_interval)
                .unwrap_or(defaults.result_poll_interval),
            agent_wait_timeout: parse_var("NETVERIFY_AGENT_WAIT_TIMEOUT_SECS")?
                .map(Duration::from_secs),
            result_wait_timeout: parse_var("NETVERIFY_RESULT_WAIT_TIMEOUT_SECS")?
                .map(Duration::from_secs),
        };

        let log_format = parse_var("NETVERIFY_LOG_FORMAT")?.unwrap_or_default();
        let log_level = var_or("NETVERIFY_LOG_LEVEL", "info");

        Ok(Self {
            kube,
            device,
            checker_url: var_or("NETVERIFY_CHECKER_URL", "http://127.0.0.1:8081"),
            coordinator_url: var_or("NETVERIFY_COORDINATOR_URL", "http://192.168.100.10:8080/v1"),
            target_host: std::env::var("NETVERIFY_TARGET_HOST").ok(),
            ping_targets,
            expected_interfaces,
            traffic,
            http_timeout,
            log_level,
            log_format,
        })
    }

    /// Context handed to the assertion builder.
    pub fn build_context(&self) -> BuildContext {
        BuildContext {
            target_host: self.target_host.clone(),
            extra_reachability: self.ping_targets.clone(),
            expected_interfaces: self.expected_interfaces.clone(),
        }
    }

    /// Base URL of the device REST API.
    pub fn device_rest_url(&self) -> String {
        format!("http://{}:{}", self.device.host, self.device.rest_port)
    }
}

/// Poll intervals are clamped so a zero setting cannot hammer the coordinator.
fn poll_interval(secs: u64) -> Duration {
    Duration::from_secs(secs.max(MIN_POLL_SECS))
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(name)
        .ok()
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{e}"))
                .with_context(|| format!("{name} has an invalid value: {v:?}"))
        })
        .transpose()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
