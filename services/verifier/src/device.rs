//! Device configuration sessions.
//!
//! A session accepts merge candidates and then either commits them or
//! discards them. [`apply_candidate`] scopes a session so that every exit
//! path, failures included, ends in commit or discard followed by close.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::DeviceConfig;
use crate::error::VerifyError;

const BACKEND: &str = "device";

/// Identity of the managed device as handed to checker back ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRef {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl From<&DeviceConfig> for DeviceRef {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
        }
    }
}

/// Opens configuration sessions on the device.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    async fn open(&self) -> Result<Box<dyn DeviceSession>, VerifyError>;
}

/// An open configuration session.
#[async_trait]
pub trait DeviceSession: Send {
    /// Stage a configuration fragment to be merged on commit.
    async fn load_merge_candidate(&mut self, candidate: &str) -> Result<(), VerifyError>;

    /// Apply everything staged so far.
    async fn commit(&mut self) -> Result<(), VerifyError>;

    /// Drop everything staged so far.
    async fn discard(&mut self) -> Result<(), VerifyError>;

    /// Release the session.
    async fn close(&mut self) -> Result<(), VerifyError>;
}

/// Push `candidate` as a merge and commit it.
///
/// On failure the candidate is discarded before the session is closed; the
/// original error wins over any discard or close error.
pub async fn apply_candidate(
    driver: &dyn DeviceDriver,
    candidate: &str,
) -> Result<(), VerifyError> {
    let mut session = driver.open().await?;

    let outcome = load_and_commit(session.as_mut(), candidate).await;
    if let Err(e) = &outcome {
        warn!(error = %e, "Configuration push failed, discarding candidate");
        if let Err(discard_err) = session.discard().await {
            error!(error = %discard_err, "Failed to discard candidate");
        }
    }

    let closed = session.close().await;
    if let Err(close_err) = &closed {
        warn!(error = %close_err, "Failed to close device session");
    }

    outcome?;
    closed?;

    info!(bytes = candidate.len(), "Configuration committed");
    Ok(())
}

async fn load_and_commit(session: &mut dyn DeviceSession, candidate: &str) -> Result<(), VerifyError> {
    session.load_merge_candidate(candidate).await?;
    session.commit().await
}

/// Driver for the Junos REST API.
///
/// The REST API is stateless, so a session buffers its candidates and sends
/// lock, load, commit, and unlock as one RPC batch on commit. Nothing reaches
/// the device before commit, which makes discard purely local.
#[derive(Debug, Clone)]
pub struct JunosRestDriver {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl JunosRestDriver {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(VerifyError::transport(BACKEND))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

#[async_trait]
impl DeviceDriver for JunosRestDriver {
    async fn open(&self) -> Result<Box<dyn DeviceSession>, VerifyError> {
        debug!(device = %self.base_url, "Opening configuration session");
        Ok(Box::new(JunosRestSession {
            driver: self.clone(),
            pending: Vec::new(),
        }))
    }
}

struct JunosRestSession {
    driver: JunosRestDriver,
    pending: Vec<String>,
}

#[async_trait]
impl DeviceSession for JunosRestSession {
    async fn load_merge_candidate(&mut self, candidate: &str) -> Result<(), VerifyError> {
        if candidate.trim().is_empty() {
            return Err(VerifyError::Device("empty configuration candidate".to_string()));
        }
        self.pending.push(candidate.to_string());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), VerifyError> {
        if self.pending.is_empty() {
            debug!("Nothing staged, skipping commit");
            return Ok(());
        }

        let url = format!("{}/rpc?stop-on-error=1", self.driver.base_url);
        let response = self
            .driver
            .client
            .post(&url)
            .basic_auth(&self.driver.username, Some(&self.driver.password))
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(rpc_batch(&self.pending))
            .send()
            .await
            .map_err(VerifyError::transport(BACKEND))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(VerifyError::Backend {
                backend: BACKEND,
                status: status.as_u16(),
                body,
            });
        }
        if body.contains("<xnm:error") || body.contains("<rpc-error") {
            return Err(VerifyError::Device(format!("commit rejected: {}", body.trim())));
        }

        self.pending.clear();
        Ok(())
    }

    async fn discard(&mut self) -> Result<(), VerifyError> {
        debug!(staged = self.pending.len(), "Discarding staged candidates");
        self.pending.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), VerifyError> {
        if !self.pending.is_empty() {
            warn!(staged = self.pending.len(), "Closing session with uncommitted candidates");
            self.pending.clear();
        }
        Ok(())
    }
}

fn rpc_batch(candidates: &[String]) -> String {
    let mut body = String::from("<lock-configuration/>\n");
    for candidate in candidates {
        body.push_str("<load-configuration action=\"merge\" format=\"xml\">\n");
        body.push_str(candidate.trim());
        body.push_str("\n</load-configuration>\n");
    }
    body.push_str("<commit-configuration/>\n<unlock-configuration/>\n");
    body
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn test_rpc_batch_order() {
        let body = rpc_batch(&["<configuration/>".to_string()]);
        let lock = body.find("<lock-configuration/>").unwrap();
        let load = body.find("<load-configuration").unwrap();
        let commit = body.find("<commit-configuration/>").unwrap();
        let unlock = body.find("<unlock-configuration/>").unwrap();
        assert!(lock < load && load < commit && commit < unlock);
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
        fail_commit: bool,
    }

    struct RecordingDriver(Arc<Recorder>);

    struct RecordingSession(Arc<Recorder>);

    impl RecordingSession {
        fn record(&self, call: &'static str) {
            self.0.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl DeviceDriver for RecordingDriver {
        async fn open(&self) -> Result<Box<dyn DeviceSession>, VerifyError> {
            self.0.calls.lock().unwrap().push("open");
            Ok(Box::new(RecordingSession(Arc::clone(&self.0))))
        }
    }

    #[async_trait]
    impl DeviceSession for RecordingSession {
        async fn load_merge_candidate(&mut self, _candidate: &str) -> Result<(), VerifyError> {
            self.record("load");
            Ok(())
        }

        async fn commit(&mut self) -> Result<(), VerifyError> {
            self.record("commit");
            if self.0.fail_commit {
                return Err(VerifyError::Device("commit check failed".to_string()));
            }
            Ok(())
        }

        async fn discard(&mut self) -> Result<(), VerifyError> {
            self.record("discard");
            Ok(())
        }

        async fn close(&mut self) -> Result<(), VerifyError> {
            self.record("close");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_successful_push_commits_and_closes() {
        let recorder = Arc::new(Recorder::default());
        apply_candidate(&RecordingDriver(Arc::clone(&recorder)), "<configuration/>")
            .await
            .unwrap();

        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["open", "load", "commit", "close"]
        );
    }

    #[tokio::test]
    async fn test_failed_commit_discards_then_closes() {
        let recorder = Arc::new(Recorder {
            fail_commit: true,
            ..Default::default()
        });

        let err = apply_candidate(&RecordingDriver(Arc::clone(&recorder)), "<configuration/>")
            .await
            .unwrap_err();

        assert!(matches!(err, VerifyError::Device(_)));
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["open", "load", "commit", "discard", "close"]
        );
    }
}
