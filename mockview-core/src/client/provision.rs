//! Relay credential provisioning.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::check_status;
use crate::error::{MockviewError, Result};

/// Everything needed to open the relay for one interview session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub ws_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub template_id: String,
    #[serde(default)]
    pub region: Option<String>,
}

impl ConnectionParams {
    /// Fill in the template id from the agent id when missing and pin
    /// unversioned templates to `:latest`. Rejects non-websocket URLs.
    pub fn normalized(mut self) -> Result<Self> {
        if self.template_id.trim().is_empty() {
            self.template_id = self.agent_id.clone();
        }
        if self.template_id.trim().is_empty() {
            return Err(MockviewError::ConnectionUnavailable(
                "credentials carry neither template_id nor agent_id".into(),
            ));
        }
        if !self.template_id.contains(':') {
            self.template_id.push_str(":latest");
        }

        let url = Url::parse(&self.ws_url).map_err(|e| {
            MockviewError::ConnectionUnavailable(format!("invalid ws_url {:?}: {e}", self.ws_url))
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(MockviewError::ConnectionUnavailable(format!(
                "ws_url must be ws:// or wss://, got {}",
                url.scheme()
            )));
        }
        Ok(self)
    }
}

/// `GET {api_base}/api/speechmatics-credentials/{session_id}`.
///
/// Every failure, including backend errors and malformed bodies, is
/// reported as `ConnectionUnavailable` so the host can offer a retry.
pub async fn fetch_connection_params(
    http: &reqwest::Client,
    api_base: &Url,
    session_id: &str,
) -> Result<ConnectionParams> {
    let result = async {
        let mut url = api_base.clone();
        url.path_segments_mut()
            .map_err(|_| MockviewError::ConnectionUnavailable(format!("bad api base {api_base}")))?
            .pop_if_empty()
            .extend(["api", "speechmatics-credentials", session_id]);
        debug!(%url, "fetching relay credentials");

        let response = check_status(http.get(url).send().await?).await?;
        let params: ConnectionParams = response.json().await?;
        params.normalized()
    }
    .await;

    result.map_err(|e| match e {
        MockviewError::ConnectionUnavailable(_) => e,
        other => {
            warn!(error = %other, session_id, "credential fetch failed");
            MockviewError::ConnectionUnavailable(other.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(template_id: &str, ws_url: &str) -> ConnectionParams {
        ConnectionParams {
            ws_url: ws_url.into(),
            api_key: Some("k".into()),
            agent_id: "agent-1".into(),
            template_id: template_id.into(),
            region: Some("eu2".into()),
        }
    }

    #[test]
    fn unversioned_template_is_pinned_to_latest() {
        let p = params("tmpl", "wss://relay.example/ws").normalized().unwrap();
        assert_eq!(p.template_id, "tmpl:latest");
        let p = params("tmpl:v3", "wss://relay.example/ws").normalized().unwrap();
        assert_eq!(p.template_id, "tmpl:v3");
    }

    #[test]
    fn missing_template_falls_back_to_agent() {
        let p = params("", "ws://localhost:8000/api/proxy/s1").normalized().unwrap();
        assert_eq!(p.template_id, "agent-1:latest");
    }

    #[test]
    fn http_url_is_rejected() {
        let err = params("t", "https://relay.example").normalized().unwrap_err();
        assert!(matches!(err, MockviewError::ConnectionUnavailable(_)));
    }
}
