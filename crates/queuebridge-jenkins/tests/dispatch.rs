//! End-to-end dispatcher tests against a local stand-in CI server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};

use queuebridge_core::{BuildProgress, Error, QueueItemResolver};
use queuebridge_jenkins::{JenkinsClient, StatusQuery};

const JOB_DESCRIPTOR: &str = r#"<?xml version="1.1" encoding="UTF-8"?>
<project>
  <authToken>01234</authToken>
  <properties/>
  <builders/>
</project>"#;

#[derive(Default)]
struct FakeJenkins {
    base: String,
    crumb_enabled: bool,
    reject_descriptor_push: bool,
    reject_build: bool,
    log: Mutex<Vec<String>>,
}

impl FakeJenkins {
    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

async fn crumb_issuer(State(server): State<Arc<FakeJenkins>>) -> Response {
    if !server.crumb_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    let body = "<defaultCrumbIssuer>\
         <crumb>cafe</crumb>\
         <crumbRequestField>Jenkins-Crumb</crumbRequestField>\
         </defaultCrumbIssuer>";
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

async fn descriptor_get(State(server): State<Arc<FakeJenkins>>) -> Response {
    server.record("descriptor_get".to_string());
    ([(header::CONTENT_TYPE, "application/xml")], JOB_DESCRIPTOR).into_response()
}

async fn descriptor_post(State(server): State<Arc<FakeJenkins>>, body: String) -> Response {
    server.record(format!("descriptor_post {body}"));
    if server.reject_descriptor_push {
        return StatusCode::FORBIDDEN.into_response();
    }
    StatusCode::OK.into_response()
}

async fn build_with_parameters(
    State(server): State<Arc<FakeJenkins>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let crumb = headers
        .get("Jenkins-Crumb")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    server.record(format!(
        "build crumb=[{crumb}] query=[{}]",
        query.unwrap_or_default()
    ));
    if server.reject_build {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    (
        StatusCode::CREATED,
        [(header::LOCATION, format!("{}/queue/item/55/", server.base))],
    )
        .into_response()
}

async fn queue_item(State(server): State<Arc<FakeJenkins>>) -> Response {
    let body = format!(
        "<leftItem><executable>\
         <url>{}/job/teamA/job/build/55/</url>\
         </executable></leftItem>",
        server.base
    );
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

async fn build_status() -> Response {
    let body = "<freeStyleBuild>\
         <building>false</building>\
         <result>SUCCESS</result>\
         </freeStyleBuild>";
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

async fn queue_root() -> StatusCode {
    StatusCode::OK
}

async fn spawn_server(
    crumb_enabled: bool,
    reject_descriptor_push: bool,
    reject_build: bool,
) -> (String, Arc<FakeJenkins>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let server = Arc::new(FakeJenkins {
        base: base.clone(),
        crumb_enabled,
        reject_descriptor_push,
        reject_build,
        log: Mutex::new(Vec::new()),
    });
    let app = Router::new()
        .route("/crumbIssuer/api/xml", get(crumb_issuer))
        .route(
            "/job/teamA/job/build/config.xml",
            get(descriptor_get).post(descriptor_post),
        )
        .route(
            "/job/teamA/job/build/buildWithParameters",
            post(build_with_parameters),
        )
        .route("/queue/api/xml", get(queue_root))
        .route("/queue/item/55/api/xml", get(queue_item))
        .route("/job/teamA/job/build/55/api/xml", get(build_status))
        .with_state(server.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (base, server)
}

fn branch_property() -> HashMap<String, String> {
    let mut properties = HashMap::new();
    properties.insert("branch".to_string(), "main".to_string());
    properties
}

#[tokio::test]
async fn test_queue_build_reconciles_parameters_before_submitting() {
    let (base, server) = spawn_server(false, false, false).await;
    let client = JenkinsClient::new(&base, "user", "secret").unwrap();

    let queued_item_id = client
        .queue_build("teamA/build", "cs:42", "auto", &branch_property())
        .await
        .unwrap();
    assert_eq!(queued_item_id.as_deref(), Some("55"));

    let entries = server.entries();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0], "descriptor_get");

    // Exactly one descriptor push, before the build request, carrying both
    // missing parameters and the restored declared XML version.
    assert!(entries[1].starts_with("descriptor_post "));
    assert!(entries[1].contains("<?xml version=\"1.1\""));
    assert!(entries[1].contains("<name>queuebridge.update.spec</name>"));
    assert!(entries[1].contains("<name>branch</name>"));

    assert!(entries[2].starts_with("build "));
    assert!(entries[2].contains(
        "query=[queuebridge.update.spec=cs%3A42&branch=main&token=01234&cause=auto]"
    ));
}

#[tokio::test]
async fn test_queue_build_sends_a_fresh_crumb() {
    let (base, server) = spawn_server(true, false, false).await;
    let client = JenkinsClient::new(&base, "user", "secret").unwrap();

    let queued_item_id = client
        .queue_build("teamA/build", "cs:42", "", &HashMap::new())
        .await
        .unwrap();
    assert_eq!(queued_item_id.as_deref(), Some("55"));

    let entries = server.entries();
    let build_entry = entries
        .iter()
        .find(|entry| entry.starts_with("build "))
        .unwrap();
    assert!(build_entry.contains("crumb=[cafe]"));
}

#[tokio::test]
async fn test_rejected_descriptor_push_is_a_hard_error() {
    let (base, server) = spawn_server(false, true, false).await;
    let client = JenkinsClient::new(&base, "user", "secret").unwrap();

    let error = client
        .queue_build("teamA/build", "cs:42", "auto", &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(error, Error::JobUpdateRejected { .. }));

    // No build submission after the rejected push.
    assert!(!server.entries().iter().any(|entry| entry.starts_with("build ")));
}

#[tokio::test]
async fn test_rejected_build_submission_is_not_an_error() {
    let (base, _server) = spawn_server(false, false, true).await;
    let client = JenkinsClient::new(&base, "user", "secret").unwrap();

    let queued_item_id = client
        .queue_build("teamA/build", "cs:42", "auto", &HashMap::new())
        .await
        .unwrap();
    assert_eq!(queued_item_id, None);
}

#[tokio::test]
async fn test_resolve_queued_item_reads_the_left_item_url() {
    let (base, _server) = spawn_server(false, false, false).await;
    let client = JenkinsClient::new(&base, "user", "secret").unwrap();

    let build_url = client.resolve_queued_item("55").await.unwrap();
    assert_eq!(
        build_url,
        Some(format!("{base}/job/teamA/job/build/55/"))
    );

    // A queued item the server does not know stays unresolved.
    assert_eq!(client.resolve_queued_item("99").await.unwrap(), None);
}

#[tokio::test]
async fn test_query_status_of_a_resolved_build() {
    let (base, _server) = spawn_server(false, false, false).await;
    let client = JenkinsClient::new(&base, "user", "secret").unwrap();

    let build_url = format!("{base}/job/teamA/job/build/55");
    let status = client
        .query_status(StatusQuery::Resolved(&build_url))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.progress, BuildProgress::Finished);
    assert_eq!(status.result, "SUCCESS");
    assert!(status.is_finished());
    assert!(status.is_successful());
}

#[tokio::test]
async fn test_check_connection() {
    let (base, _server) = spawn_server(false, false, false).await;
    let client = JenkinsClient::new(&base, "user", "secret").unwrap();
    assert!(client.check_connection().await);

    let unreachable = JenkinsClient::new("http://127.0.0.1:1", "user", "secret").unwrap();
    assert!(!unreachable.check_connection().await);
}
