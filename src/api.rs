use std::collections::HashSet;
use std::future::Future;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{extract_error_message, PollError, StopError, SubmitError, GENERIC_SUBMIT_ERROR};
use crate::types::{
    DashboardStats, JobId, JobList, ProgressSnapshot, ResultsPage, ScanRequest, SubmitResponse,
};

/// Header carrying the anti-forgery token on state-changing requests.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// The three calls the lifecycle controller makes against the scanner API.
pub trait ScanBackend {
    fn submit(
        &self,
        request: &ScanRequest,
    ) -> impl Future<Output = Result<JobId, SubmitError>> + Send;

    fn progress(&self, job_id: &JobId)
        -> impl Future<Output = Result<ProgressSnapshot, PollError>> + Send;

    fn stop(&self, job_id: &JobId) -> impl Future<Output = Result<(), StopError>> + Send;
}

/// `ScanBackend` over the scanner's JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    root: String,
    csrf_token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            root: config.api_root().to_string(),
            csrf_token: config.csrf_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.root, path)
    }

    fn with_csrf(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.csrf_token {
            Some(token) => req.header(CSRF_HEADER, token),
            None => req,
        }
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let resp = self.client.get(self.url("/api/dashboard/stats/")).send().await?;
        let resp = resp.error_for_status()?;
        Ok(resp.json::<DashboardStats>().await?)
    }

    pub async fn recent_jobs(&self, limit: usize) -> Result<JobList> {
        let resp = self
            .client
            .get(self.url("/api/scans/"))
            .query(&[("limit", limit)])
            .send()
            .await?;
        let resp = resp.error_for_status()?;
        Ok(resp.json::<JobList>().await?)
    }

    /// Fetch every page of a job's port results. Stops early if the server
    /// links back to a page it already served.
    pub async fn results(&self, job_id: &JobId) -> Result<ResultsPage> {
        let mut url = self.url(&format!("/api/scans/{job_id}/results/"));
        let mut all = ResultsPage::default();
        let mut fetched = HashSet::new();
        loop {
            if !fetched.insert(url.clone()) {
                warn!(%url, "results page links back to a page already fetched");
                break;
            }
            let resp = self.client.get(&url).send().await?.error_for_status()?;
            let page = resp
                .json::<ResultsPage>()
                .await
                .with_context(|| format!("malformed results page from {url}"))?;
            all.count = page.count;
            all.results.extend(page.results);
            match page.next {
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }
        Ok(all)
    }
}

impl ScanBackend for HttpBackend {
    async fn submit(&self, request: &ScanRequest) -> Result<JobId, SubmitError> {
        debug!(target_host = %request.target, ports = %request.ports, "submitting scan");
        let req = self.with_csrf(self.client.post(self.url("/api/scans/")).json(request));
        let resp = req
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let message = error_message(resp)
                .await
                .unwrap_or_else(|| GENERIC_SUBMIT_ERROR.to_string());
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        let body = resp
            .json::<SubmitResponse>()
            .await
            .map_err(|e| SubmitError::Decode(e.to_string()))?;
        Ok(body.job_id)
    }

    async fn progress(&self, job_id: &JobId) -> Result<ProgressSnapshot, PollError> {
        let resp = self
            .client
            .get(self.url(&format!("/api/scans/{job_id}/progress/")))
            .send()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PollError::Status(status.as_u16()));
        }
        resp.json::<ProgressSnapshot>()
            .await
            .map_err(|e| PollError::Decode(e.to_string()))
    }

    async fn stop(&self, job_id: &JobId) -> Result<(), StopError> {
        let req = self.with_csrf(
            self.client
                .post(self.url(&format!("/api/scans/{job_id}/stop/"))),
        );
        let resp = req
            .send()
            .await
            .map_err(|e| StopError::Transport(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let message = error_message(resp)
            .await
            .unwrap_or_else(|| status_reason(status));
        Err(StopError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

async fn error_message(resp: Response) -> Option<String> {
    let body = resp.json::<serde_json::Value>().await.ok()?;
    extract_error_message(&body)
}

fn status_reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("unexpected status")
        .to_string()
}
