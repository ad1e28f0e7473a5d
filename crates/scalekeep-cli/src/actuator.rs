//! Actuators available from the command line.
//!
//! [`WebhookActuator`] POSTs the target replica count as JSON to a plain
//! HTTP endpoint owned by the platform integration:
//!
//! ```text
//! POST /scale
//! {"service":"shop/api","project":"shop","name":"api","replicas":3}
//! ```
//!
//! Any 2xx is accepted. A body of `{"activated": false}` means the
//! configuration was stored but the deploy trigger failed (partial).

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use serde_json::{json, Value};
use tracing::{debug, info};

use scalekeep_autoscale::{ActuationError, ActuationOutcome, Actuator};
use scalekeep_core::{ReplicaCount, ServiceIdentity};

#[derive(Debug, Clone)]
pub struct WebhookActuator {
    uri: http::Uri,
    /// `host:port` to connect to.
    address: String,
}

impl WebhookActuator {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let uri: http::Uri = url.parse()?;
        if uri.scheme_str() != Some("http") {
            anyhow::bail!("actuator url must use http://, got {url}");
        }
        let host = uri
            .host()
            .ok_or_else(|| anyhow::anyhow!("actuator url has no host: {url}"))?;
        let port = uri.port_u16().unwrap_or(80);
        let address = format!("{host}:{port}");
        Ok(Self { uri, address })
    }

    async fn post(&self, body: Vec<u8>) -> Result<(http::StatusCode, Bytes), ActuationError> {
        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| ActuationError::Transport(format!("connect {}: {e}", self.address)))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ActuationError::Transport(format!("handshake: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "actuator connection closed with error");
            }
        });

        let req = http::Request::builder()
            .method("POST")
            .uri(self.uri.clone())
            .header("host", &self.address)
            .header("content-type", "application/json")
            .header("user-agent", "scalekeep/0.1")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| ActuationError::Transport(format!("build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ActuationError::Transport(format!("send: {e}")))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ActuationError::Transport(format!("read body: {e}")))?
            .to_bytes();
        Ok((status, body))
    }
}

impl Actuator for WebhookActuator {
    async fn scale(
        &self,
        id: &ServiceIdentity,
        replicas: ReplicaCount,
    ) -> Result<ActuationOutcome, ActuationError> {
        let payload = json!({
            "service": id.to_string(),
            "project": id.project(),
            "name": id.service(),
            "replicas": replicas,
        });
        let (status, body) = self.post(payload.to_string().into_bytes()).await?;

        if !status.is_success() {
            return Err(ActuationError::Rejected(format!("HTTP {status}")));
        }
        debug!(service = %id, replicas, %status, "scale request accepted");
        Ok(outcome_from_body(&body))
    }
}

/// Interpret a 2xx response body. Empty or non-JSON bodies count as applied.
fn outcome_from_body(body: &[u8]) -> ActuationOutcome {
    let Ok(doc) = serde_json::from_slice::<Value>(body) else {
        return ActuationOutcome::Applied;
    };
    if doc.get("activated").and_then(Value::as_bool) == Some(false) {
        let reason = doc
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("activation failed")
            .to_string();
        return ActuationOutcome::Partial { reason };
    }
    ActuationOutcome::Applied
}

/// Logs the request and reports success without contacting anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunActuator;

impl Actuator for DryRunActuator {
    async fn scale(
        &self,
        id: &ServiceIdentity,
        replicas: ReplicaCount,
    ) -> Result<ActuationOutcome, ActuationError> {
        info!(service = %id, replicas, "dry run: would scale");
        Ok(ActuationOutcome::Applied)
    }
}
