//! Cloud metadata endpoint probing
//!
//! Every major cloud exposes an instance metadata service on a link-local
//! address. A host answering one of them with the vendor's signature is
//! considered to run on that vendor.

use crate::info::{CloudProvider, ProviderKind};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const LINK_LOCAL_BASE: &str = "http://169.254.169.254";
const GCP_METADATA_BASE: &str = "http://metadata.google.internal";
const AWS_TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const AWS_TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";

/// Identifies the cloud the host runs on
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    async fn identify(&self) -> CloudProvider;
}

/// Probe with a fixed answer, for hosts where probing is disabled
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub CloudProvider);

#[async_trait]
impl MetadataProbe for StaticProbe {
    async fn identify(&self) -> CloudProvider {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Recognized(ProviderKind),
    Answered,
    Silent,
}

/// HTTP probe querying all vendor metadata services concurrently
///
/// The first vendor to recognize the host wins. Probes still pending at the
/// deadline count as unreachable.
pub struct HttpMetadataProbe {
    client: reqwest::Client,
    link_local_base: String,
    gcp_base: String,
    deadline: Duration,
}

impl HttpMetadataProbe {
    pub fn new(timeout: Duration) -> Self {
        Self::with_endpoints(timeout, LINK_LOCAL_BASE, GCP_METADATA_BASE)
    }

    /// Probe against custom base URLs
    pub fn with_endpoints(
        timeout: Duration,
        link_local_base: impl Into<String>,
        gcp_base: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .no_proxy()
            .build()
            .unwrap_or_default();

        Self {
            client,
            link_local_base: link_local_base.into().trim_end_matches('/').to_string(),
            gcp_base: gcp_base.into().trim_end_matches('/').to_string(),
            deadline: timeout,
        }
    }

    fn link_local(&self, path: &str) -> String {
        format!("{}{}", self.link_local_base, path)
    }

    async fn fetch(&self, request: RequestBuilder) -> Option<(StatusCode, HeaderMap, String)> {
        match request.send().await {
            Ok(response) => {
                let status = response.status();
                let headers = response.headers().clone();
                let body = response.text().await.unwrap_or_default();
                Some((status, headers, body))
            }
            Err(e) => {
                debug!(error = %e, "Metadata endpoint unreachable");
                None
            }
        }
    }

    async fn probe_aws(&self) -> Signal {
        let mut request = self.client.get(self.link_local("/latest/meta-data/instance-id"));
        let token = self
            .fetch(
                self.client
                    .put(self.link_local("/latest/api/token"))
                    .header(AWS_TOKEN_TTL_HEADER, "21600"),
            )
            .await;
        let answered = token.is_some();

        // IMDSv1 fallback when no token is handed out
        if let Some((status, _, token)) = token {
            if status.is_success() {
                request = request.header(AWS_TOKEN_HEADER, token.trim());
            }
        }

        match self.fetch(request).await {
            Some((status, _, body)) if status.is_success() && body.trim().starts_with("i-") => {
                Signal::Recognized(ProviderKind::Aws)
            }
            Some(_) => Signal::Answered,
            None if answered => Signal::Answered,
            None => Signal::Silent,
        }
    }

    async fn probe_azure(&self) -> Signal {
        let request = self
            .client
            .get(self.link_local("/metadata/instance?api-version=2021-02-01"))
            .header("Metadata", "true");

        match self.fetch(request).await {
            Some((status, _, body)) if status.is_success() => {
                let recognized = serde_json::from_str::<serde_json::Value>(&body)
                    .ok()
                    .and_then(|v| v.get("compute").cloned())
                    .is_some_and(|c| c.get("vmId").is_some() || c.get("azEnvironment").is_some());
                if recognized {
                    Signal::Recognized(ProviderKind::Azure)
                } else {
                    Signal::Answered
                }
            }
            Some(_) => Signal::Answered,
            None => Signal::Silent,
        }
    }

    async fn probe_gcp(&self) -> Signal {
        let request = self
            .client
            .get(format!("{}/computeMetadata/v1/instance/id", self.gcp_base))
            .header("Metadata-Flavor", "Google");

        match self.fetch(request).await {
            Some((status, headers, _)) if status.is_success() => {
                let flavor = headers
                    .get("metadata-flavor")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                if flavor.eq_ignore_ascii_case("google") {
                    Signal::Recognized(ProviderKind::Gcp)
                } else {
                    Signal::Answered
                }
            }
            Some(_) => Signal::Answered,
            None => Signal::Silent,
        }
    }

    async fn probe_digitalocean(&self) -> Signal {
        let request = self.client.get(self.link_local("/metadata/v1/id"));

        match self.fetch(request).await {
            Some((status, _, body))
                if status.is_success()
                    && !body.trim().is_empty()
                    && body.trim().chars().all(|c| c.is_ascii_digit()) =>
            {
                Signal::Recognized(ProviderKind::DigitalOcean)
            }
            Some(_) => Signal::Answered,
            None => Signal::Silent,
        }
    }

    async fn probe_ovh(&self) -> Signal {
        let request = self
            .client
            .get(self.link_local("/openstack/latest/meta_data.json"));

        match self.fetch(request).await {
            Some((status, _, body)) if status.is_success() => {
                // OVH Public Cloud is plain OpenStack; only its naming gives it away
                let lowered = body.to_ascii_lowercase();
                if serde_json::from_str::<serde_json::Value>(&body).is_ok() && lowered.contains("ovh")
                {
                    Signal::Recognized(ProviderKind::Ovh)
                } else {
                    Signal::Answered
                }
            }
            Some(_) => Signal::Answered,
            None => Signal::Silent,
        }
    }
}

#[async_trait]
impl MetadataProbe for HttpMetadataProbe {
    async fn identify(&self) -> CloudProvider {
        let mut probes: FuturesUnordered<BoxFuture<'_, Signal>> = [
            self.probe_aws().boxed(),
            self.probe_azure().boxed(),
            self.probe_gcp().boxed(),
            self.probe_digitalocean().boxed(),
            self.probe_ovh().boxed(),
        ]
        .into_iter()
        .collect();

        let deadline = Instant::now() + self.deadline;
        let mut answered = false;
        loop {
            match tokio::time::timeout_at(deadline, probes.next()).await {
                Ok(Some(Signal::Recognized(kind))) => {
                    debug!(%kind, "Metadata service recognized");
                    return kind.into();
                }
                Ok(Some(Signal::Answered)) => answered = true,
                Ok(Some(Signal::Silent)) => {}
                Ok(None) => break,
                Err(_) => {
                    debug!(pending = probes.len(), "Metadata probes still pending at deadline");
                    break;
                }
            }
        }

        if answered {
            CloudProvider::Unknown
        } else {
            CloudProvider::None
        }
    }
}
