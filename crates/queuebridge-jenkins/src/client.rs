//! HTTP client for a Jenkins-compatible CI server.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Method, Response, redirect};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use queuebridge_core::property::request_properties;
use queuebridge_core::{
    BuildProgress, BuildProperty, BuildStatus, Error, QueueItemResolver, Result,
};

use crate::descriptor::JobDescriptor;
use crate::job_url::job_base_path;
use crate::retry::RetryPolicy;
use crate::xml;

const CRUMB_ISSUER_PATH: &str = "crumbIssuer/api/xml";
const QUEUE_PATH: &str = "queue/api/xml";

/// Parameter Jenkins reads the build-trigger auth token from.
const TOKEN_PARAM: &str = "token";
/// Parameter carrying the human-readable build cause.
const CAUSE_PARAM: &str = "cause";

/// A CSRF token pair as issued by the server's crumb issuer.
///
/// No expiry is tracked locally; the crumb is renewed before every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crumb {
    pub field: String,
    pub value: String,
}

/// How to query the status of a queued-or-running build.
#[derive(Debug, Clone, Copy)]
pub enum StatusQuery<'a> {
    /// The queued-item id has not been resolved to a build URL yet.
    Pending,
    /// The build URL the id resolved to.
    Resolved(&'a str),
    /// The id is neither pending nor resolved.
    Unknown,
}

/// Stateless operations against the CI server's HTTP/XML API.
pub struct JenkinsClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
    crumb: Mutex<Option<Crumb>>,
    retry: RetryPolicy,
}

impl JenkinsClient {
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self> {
        // Redirects stay unfollowed: the queued-item id lives in the
        // Location header of the build-submission response.
        let http = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|error| Error::Internal(error.to_string()))?;

        let mut base = Url::parse(base_url)
            .map_err(|error| Error::InvalidConfig(format!("invalid CI server URL: {error}")))?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        Ok(Self {
            http,
            base_url: base,
            username: username.to_string(),
            password: password.to_string(),
            crumb: Mutex::new(None),
            retry: RetryPolicy::default(),
        })
    }

    /// Whether the server answers the queue endpoint with the configured
    /// credentials. Transport failures are logged and reported as `false`.
    pub async fn check_connection(&self) -> bool {
        match self.get(QUEUE_PATH).await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                warn!(error = %error, "connection check against the CI server failed");
                false
            }
        }
    }

    /// Queues a build and returns the queued-item id the server assigned.
    ///
    /// Reconciles the job's declared parameters first: any requested
    /// parameter the job does not declare is added to the descriptor, which
    /// is pushed back before the build request. A rejected descriptor push
    /// is a hard error; an unsuccessful descriptor fetch or build submission
    /// is a normal `Ok(None)` outcome.
    pub async fn queue_build(
        &self,
        job_path: &str,
        update_spec: &str,
        comment: &str,
        extra_properties: &HashMap<String, String>,
    ) -> Result<Option<String>> {
        let Some(raw_descriptor) = self.fetch_job_descriptor(job_path).await? else {
            return Ok(None);
        };
        let mut descriptor = JobDescriptor::parse(&raw_descriptor)?;

        let mut properties = request_properties(update_spec, extra_properties);
        let auth_token = descriptor.auth_token();

        let missing = descriptor.missing_parameters(&properties);
        if !missing.is_empty() {
            debug!(job = %job_path, missing = ?missing, "adding missing build parameters to the job");
            descriptor.add_parameters(&missing)?;
            self.push_job_descriptor(job_path, descriptor.payload())
                .await?;
        }

        if let Some(token) = auth_token {
            properties.push(BuildProperty::new(TOKEN_PARAM, token));
        }
        if !comment.is_empty() {
            properties.push(BuildProperty::new(CAUSE_PARAM, comment));
        }

        let path = format!(
            "{}/buildWithParameters?{}",
            job_base_path(job_path),
            encode_properties(&properties)
        );
        let response = self.post(&path).await?;
        if !response.status().is_success() {
            warn!(job = %job_path, status = %response.status(), "build submission was unsuccessful");
            return Ok(None);
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok());
        Ok(location.and_then(queued_item_id_from_location))
    }

    /// Queries the status of a build.
    ///
    /// A pending id yields a synthetic queued status with no network call;
    /// an unknown id, or an unsuccessful status request, yields `Ok(None)`.
    pub async fn query_status(&self, query: StatusQuery<'_>) -> Result<Option<BuildStatus>> {
        let build_url = match query {
            StatusQuery::Pending => return Ok(Some(BuildStatus::queued())),
            StatusQuery::Unknown => return Ok(None),
            StatusQuery::Resolved(build_url) => build_url,
        };

        let separator = if build_url.ends_with('/') { "" } else { "/" };
        let endpoint = Url::parse(&format!("{build_url}{separator}api/xml"))
            .map_err(|error| Error::Internal(format!("invalid build URL: {error}")))?;

        let response = self.request(Method::GET, endpoint, None).await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let body = read_body(response).await?;

        let result = xml::find_text(&body, &["*", "result"]).unwrap_or_default();
        let progress = parse_building_flag(xml::find_text(&body, &["*", "building"]).as_deref());
        Ok(Some(BuildStatus { progress, result }))
    }

    async fn fetch_job_descriptor(&self, job_path: &str) -> Result<Option<String>> {
        let path = format!("{}/config.xml", job_base_path(job_path));
        let response = self.get(&path).await?;
        if !response.status().is_success() {
            warn!(job = %job_path, status = %response.status(), "job descriptor fetch was unsuccessful");
            return Ok(None);
        }
        Ok(Some(read_body(response).await?))
    }

    async fn push_job_descriptor(&self, job_path: &str, payload: String) -> Result<()> {
        let path = format!("{}/config.xml", job_base_path(job_path));
        let response = self.post_xml(&path, payload).await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(Error::JobUpdateRejected {
            job: job_path.to_string(),
            reason: format!(
                "the server answered {} while pushing the descriptor with the required build parameters",
                response.status()
            ),
        })
    }

    async fn get(&self, path: &str) -> Result<Response> {
        let url = self.endpoint(path)?;
        self.request(Method::GET, url, None).await
    }

    async fn post(&self, path: &str) -> Result<Response> {
        let url = self.endpoint(path)?;
        self.request(Method::POST, url, None).await
    }

    async fn post_xml(&self, path: &str, payload: String) -> Result<Response> {
        let url = self.endpoint(path)?;
        self.request(Method::POST, url, Some(payload)).await
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|error| Error::Internal(format!("invalid endpoint [{path}]: {error}")))
    }

    async fn request(
        &self,
        method: Method,
        url: Url,
        xml_body: Option<String>,
    ) -> Result<Response> {
        self.renew_crumb().await;
        let crumb = self.crumb.lock().await.clone();

        self.retry
            .run(|| {
                let mut request = self
                    .http
                    .request(method.clone(), url.clone())
                    .basic_auth(&self.username, Some(&self.password));
                if let Some(crumb) = &crumb {
                    request = request.header(crumb.field.as_str(), crumb.value.as_str());
                }
                if let Some(body) = &xml_body {
                    request = request
                        .header(reqwest::header::CONTENT_TYPE, "application/xml")
                        .body(body.clone());
                }
                request.send()
            })
            .await
            .map_err(|error| Error::RetriesExhausted {
                attempts: self.retry.max_retries + 1,
                message: error.to_string(),
            })
    }

    /// Replaces the shared crumb with a freshly issued one, or clears it
    /// when the crumb issuer is unavailable (CSRF protection disabled).
    ///
    /// Concurrent requests race on this slot with last-writer-wins
    /// semantics; a stale crumb at worst costs the losing request a 403.
    async fn renew_crumb(&self) {
        let fetched = self.fetch_crumb().await;
        if fetched.is_none() {
            warn!("crumb issuer unavailable, proceeding without a CSRF crumb");
        }
        *self.crumb.lock().await = fetched;
    }

    async fn fetch_crumb(&self) -> Option<Crumb> {
        let url = self.base_url.join(CRUMB_ISSUER_PATH).ok()?;
        let response = self
            .retry
            .run(|| {
                self.http
                    .get(url.clone())
                    .basic_auth(&self.username, Some(&self.password))
                    .send()
            })
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body = response.text().await.ok()?;

        let field = xml::find_text(&body, &["defaultCrumbIssuer", "crumbRequestField"])
            .filter(|field| !field.is_empty())?;
        let value = xml::find_text(&body, &["defaultCrumbIssuer", "crumb"])
            .filter(|value| !value.is_empty())?;
        Some(Crumb { field, value })
    }
}

#[async_trait]
impl QueueItemResolver for JenkinsClient {
    async fn resolve_queued_item(&self, queued_item_id: &str) -> Result<Option<String>> {
        let response = self
            .get(&format!("queue/item/{queued_item_id}/api/xml"))
            .await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let body = read_body(response).await?;
        Ok(xml::find_text(&body, &["leftItem", "executable", "url"])
            .filter(|build_url| !build_url.is_empty()))
    }
}

async fn read_body(response: Response) -> Result<String> {
    response
        .text()
        .await
        .map_err(|error| Error::Transport(error.to_string()))
}

fn encode_properties(properties: &[BuildProperty]) -> String {
    properties
        .iter()
        .map(|property| {
            format!(
                "{}={}",
                urlencoding::encode(&property.name),
                urlencoding::encode(&property.value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Extracts the queued-item id from the build-submission redirect location:
/// its final path segment (`.../queue/item/123/` yields `123`).
fn queued_item_id_from_location(location: &str) -> Option<String> {
    let path = match Url::parse(location) {
        Ok(url) => url.path().to_string(),
        Err(_) => location.to_string(),
    };
    path.split('/')
        .rev()
        .map(str::trim)
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn parse_building_flag(building: Option<&str>) -> BuildProgress {
    match building.map(|flag| flag.trim().to_ascii_lowercase()) {
        Some(flag) if flag == "false" => BuildProgress::Finished,
        Some(flag) if flag == "true" => BuildProgress::InProgress,
        _ => BuildProgress::Undefined,
    }
}
