//! Coordinator protocol
//!
//! The coordinator is an HTTP JSON service with two form-encoded POST
//! endpoints: `/request` returns a [`Job`], `/response` accepts the outcome.
//! Both share the transport policy in [`retry`].

mod messages;
mod retry;

pub use messages::{Account, DownloadDirective, IDLE_MARKER, Job, WorkRequest};
pub use retry::{RetryPolicy, is_premature_close};

use crate::http::{ClientBuildError, HttpConfig};
use async_trait::async_trait;
use reqwest::{Client, Response};
use thiserror::Error;
use tracing::{debug, warn};

const REQUEST_ENDPOINT: &str = "request";
const RESPONSE_ENDPOINT: &str = "response";

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("coordinator unreachable at /{endpoint} after {attempts} attempt(s): {reason}")]
    CoordinatorUnreachable {
        endpoint: String,
        attempts: u32,
        reason: String,
    },

    #[error("undecodable job from coordinator: {0}")]
    ProtocolDecodeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// The two calls a work cycle makes to the coordinator
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Send node status and receive the next job
    async fn request_work(&self, request: &WorkRequest) -> Result<Job>;

    /// Send node status plus the outcome of the last job
    async fn report(&self, report: &WorkRequest) -> Result<()>;
}

/// HTTP client for the coordinator service
#[derive(Clone)]
pub struct CoordinatorClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl CoordinatorClient {
    pub fn new(
        base_url: &str,
        http: &HttpConfig,
        retry: RetryPolicy,
    ) -> std::result::Result<Self, ClientBuildError> {
        Ok(Self {
            client: http.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn post(&self, endpoint: &str, payload: &WorkRequest) -> Result<Response> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let form = payload.form_fields();
        debug!(endpoint, payload = ?form, "Posting to coordinator");

        let (url, form) = (url.as_str(), &form);
        let response = retry::with_retry(&self.retry, endpoint, || async move {
            // Keep the URL out of the error text; a host name must never
            // read like a premature close
            self.client
                .post(url)
                .form(form)
                .send()
                .await
                .map_err(reqwest::Error::without_url)
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint, status = status.as_u16(), "Coordinator returned non-success status");
        }

        Ok(response)
    }
}

#[async_trait]
impl Coordinator for CoordinatorClient {
    async fn request_work(&self, request: &WorkRequest) -> Result<Job> {
        let response = self.post(REQUEST_ENDPOINT, request).await?;

        let body = response.bytes().await.map_err(|e| {
            CoordinatorError::CoordinatorUnreachable {
                endpoint: REQUEST_ENDPOINT.to_string(),
                attempts: 1,
                reason: retry::error_chain(&e.without_url()),
            }
        })?;

        let job: Job = serde_json::from_slice(&body)?;
        debug!(?job, "Received job");

        Ok(job)
    }

    async fn report(&self, report: &WorkRequest) -> Result<()> {
        let response = self.post(RESPONSE_ENDPOINT, report).await?;
        // Body carries nothing we act on
        let _ = response.bytes().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NodeStatus;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn work_request() -> WorkRequest {
        WorkRequest::new(
            &Account {
                email: "host@example.com".to_string(),
                protocol_version: "0.6r".to_string(),
            },
            &NodeStatus {
                identity: "12D3KooWNode".to_string(),
                software_version: "0.23.0".to_string(),
                online: true,
                peer_count: 3,
            },
        )
    }

    fn client_for(server: &MockServer) -> CoordinatorClient {
        let retry = RetryPolicy {
            max_retries: 5,
            backoff: Duration::from_millis(1),
        };
        CoordinatorClient::new(&server.uri(), &HttpConfig::default(), retry).unwrap()
    }

    #[tokio::test]
    async fn test_request_work_posts_form_and_decodes_job() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/request"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("email=host%40example.com"))
            .and(body_string_contains("ipfs_id=12D3KooWNode"))
            .and(body_string_contains("online=true"))
            .and(body_string_contains("peers=3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "download": "https://x/ep.mp3",
                "filename": "ep.mp3"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let job = client_for(&server).request_work(&work_request()).await.unwrap();
        assert_eq!(job.download().map(|d| d.url), Some("https://x/ep.mp3"));
    }

    #[tokio::test]
    async fn test_malformed_job_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(path("/request"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>busy</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).request_work(&work_request()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::ProtocolDecodeError(_)));
    }

    #[tokio::test]
    async fn test_report_posts_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/response"))
            .and(body_string_contains("downloaded=A%2FB"))
            .and(body_string_contains("length=1000"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut report = work_request();
        report.downloaded = Some("A/B".to_string());
        report.length = Some(1000);

        client_for(&server).report(&report).await.unwrap();
    }

    #[tokio::test]
    async fn test_host_name_never_triggers_retry() {
        // "geofence" contains "eof"; name resolution fails for .invalid
        let client = CoordinatorClient::new(
            "http://geofence.invalid",
            &HttpConfig::with_timeout(Duration::from_secs(10)),
            RetryPolicy {
                max_retries: 5,
                backoff: Duration::from_millis(1),
            },
        )
        .unwrap();

        match client.request_work(&work_request()).await.unwrap_err() {
            CoordinatorError::CoordinatorUnreachable { attempts, reason, .. } => {
                assert_eq!(attempts, 1, "retried on: {reason}");
                assert!(!reason.contains("geofence"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dropped_connections_are_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicU32::new(0));

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        });

        let client = CoordinatorClient::new(
            &format!("http://{address}"),
            &HttpConfig::default(),
            RetryPolicy {
                max_retries: 5,
                backoff: Duration::from_millis(1),
            },
        )
        .unwrap();

        let err = client.request_work(&work_request()).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::CoordinatorUnreachable { attempts: 6, .. }
        ));
        assert_eq!(accepted.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_refused_connection_fails_without_retry() {
        let client = CoordinatorClient::new(
            "http://127.0.0.1:1",
            &HttpConfig::default(),
            RetryPolicy::default(),
        )
        .unwrap();

        // Default backoff is 5s; finishing promptly shows no retry happened
        let result = tokio::time::timeout(
            Duration::from_secs(4),
            client.request_work(&work_request()),
        )
        .await
        .expect("refused connection must not be retried");

        assert!(matches!(
            result,
            Err(CoordinatorError::CoordinatorUnreachable { attempts: 1, .. })
        ));
    }
}
