//! Translates inbound requests into dispatcher and mapper operations.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use queuebridge_core::BuildStatus;
use queuebridge_jenkins::{JenkinsClient, StatusQuery};
use queuebridge_mapper::QueueToBuildMapper;

use crate::messages::{self, GetStatusMessage, LaunchPlanMessage, RequestEnvelope};

pub struct RequestHandler {
    client: Arc<JenkinsClient>,
    mapper: QueueToBuildMapper,
}

impl RequestHandler {
    pub fn new(client: Arc<JenkinsClient>, mapper: QueueToBuildMapper) -> Self {
        Self { client, mapper }
    }

    /// Processes one raw request and always produces a response message;
    /// failures become error responses tied to the request id.
    pub async fn process_message(&self, raw: &str) -> String {
        let envelope: RequestEnvelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(err) => return messages::error_response("", &format!("malformed request: {err}")),
        };

        let result = match envelope.action.as_str() {
            "launchplan" => self.launch_plan(&envelope.request_id, raw).await,
            "getstatus" => self.get_status(&envelope.request_id, raw).await,
            other => Ok(messages::error_response(
                &envelope.request_id,
                &format!("the action '{other}' is not supported"),
            )),
        };

        match result {
            Ok(response) => response,
            Err(err) => {
                error!(action = %envelope.action, error = %err, "error processing request");
                messages::error_response(&envelope.request_id, &err.to_string())
            }
        }
    }

    async fn launch_plan(&self, request_id: &str, raw: &str) -> Result<String> {
        let message: LaunchPlanMessage = serde_json::from_str(raw)?;
        info!(
            plan = %message.plan_name,
            spec = %message.object_spec,
            comment = %message.comment,
            properties = message.properties.len(),
            "launch plan requested"
        );

        let queued_item_id = self
            .client
            .queue_build(
                &message.plan_name,
                &message.object_spec,
                &message.comment,
                &message.properties,
            )
            .await?;

        match queued_item_id {
            Some(id) if !id.is_empty() => {
                self.mapper.set_as_pending_to_resolve(&id).await?;
                Ok(messages::launch_plan_response(request_id, &id))
            }
            _ => Ok(messages::error_response(
                request_id,
                &format!(
                    "the CI server did not accept the build request for [{}]",
                    message.plan_name
                ),
            )),
        }
    }

    async fn get_status(&self, request_id: &str, raw: &str) -> Result<String> {
        let message: GetStatusMessage = serde_json::from_str(raw)?;
        info!(plan = %message.plan_name, execution_id = %message.execution_id, "plan status requested");

        let id = &message.execution_id;
        let status = if self.mapper.is_pending_to_resolve(id).await? {
            self.client.query_status(StatusQuery::Pending).await?
        } else {
            match self.mapper.get_build_url(id).await? {
                Some(build_url) => {
                    self.client
                        .query_status(StatusQuery::Resolved(&build_url))
                        .await?
                }
                None => self.client.query_status(StatusQuery::Unknown).await?,
            }
        };

        let (finished, successful) = summarize_status(status.as_ref());
        if finished {
            // The caller is done tracking this build.
            self.mapper.clear(id).await;
        }

        Ok(messages::get_status_response(
            request_id, finished, successful, "",
        ))
    }
}

/// Collapses a build status into the `{finished, successful}` pair the
/// request protocol expects. An absent status counts as finished and
/// unsuccessful; a finished build without a result is still in flight from
/// the protocol's point of view.
fn summarize_status(status: Option<&BuildStatus>) -> (bool, bool) {
    match status {
        None => (true, false),
        Some(status) if status.result.is_empty() => (false, false),
        Some(status) => (status.is_finished(), status.is_successful()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{StatusCode, header};
    use axum::routing::{get, post};
    use queuebridge_core::BuildProgress;
    use tempfile::NamedTempFile;

    fn status(progress: BuildProgress, result: &str) -> BuildStatus {
        BuildStatus {
            progress,
            result: result.to_string(),
        }
    }

    #[test]
    fn test_absent_status_is_finished_and_unsuccessful() {
        assert_eq!(summarize_status(None), (true, false));
    }

    #[test]
    fn test_empty_result_is_not_finished() {
        let queued = BuildStatus::queued();
        assert_eq!(summarize_status(Some(&queued)), (false, false));

        let running = status(BuildProgress::InProgress, "");
        assert_eq!(summarize_status(Some(&running)), (false, false));
    }

    #[test]
    fn test_finished_build_reports_outcome() {
        let passed = status(BuildProgress::Finished, "SUCCESS");
        assert_eq!(summarize_status(Some(&passed)), (true, true));

        let failed = status(BuildProgress::Finished, "FAILURE");
        assert_eq!(summarize_status(Some(&failed)), (true, false));
    }

    #[test]
    fn test_result_without_finished_progress_is_not_finished() {
        let odd = status(BuildProgress::Undefined, "SUCCESS");
        assert_eq!(summarize_status(Some(&odd)), (false, true));
    }

    const PARAMETERIZED_JOB: &str = "<project><properties>\
         <hudson.model.ParametersDefinitionProperty><parameterDefinitions>\
         <hudson.model.StringParameterDefinition>\
         <name>queuebridge.update.spec</name>\
         </hudson.model.StringParameterDefinition>\
         </parameterDefinitions></hudson.model.ParametersDefinitionProperty>\
         </properties></project>";

    /// Stand-in CI server that accepts any build for job `plan` and queues
    /// it as item 8. Everything else, crumb issuer included, is a 404.
    async fn spawn_ci_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let location = format!("{base}/queue/item/8/");
        let app = Router::new()
            .route("/job/plan/config.xml", get(|| async { PARAMETERIZED_JOB }))
            .route(
                "/job/plan/buildWithParameters",
                post(move || async move { (StatusCode::CREATED, [(header::LOCATION, location)]) }),
            );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    fn wire_up(base: &str, storage: &NamedTempFile) -> (RequestHandler, QueueToBuildMapper) {
        let client = Arc::new(JenkinsClient::new(base, "user", "secret").unwrap());
        let mapper = QueueToBuildMapper::new(client.clone(), storage.path());
        (RequestHandler::new(client, mapper.clone()), mapper)
    }

    #[tokio::test]
    async fn test_launched_build_is_pending_until_resolved() {
        let base = spawn_ci_server().await;
        let storage = NamedTempFile::new().unwrap();
        let (handler, mapper) = wire_up(&base, &storage);
        mapper.start().await.unwrap();

        let raw = r#"{"requestId":"r-1","action":"launchplan","planName":"plan","objectSpec":"cs:42","comment":"auto"}"#;
        let response: serde_json::Value =
            serde_json::from_str(&handler.process_message(raw).await).unwrap();
        assert_eq!(response["requestId"], "r-1");
        assert_eq!(response["value"], "8");
        assert!(mapper.is_pending_to_resolve("8").await.unwrap());

        // Still queued: not finished, not successful, id stays pending.
        let raw = r#"{"requestId":"r-2","action":"getstatus","executionId":"8"}"#;
        let response: serde_json::Value =
            serde_json::from_str(&handler.process_message(raw).await).unwrap();
        assert_eq!(response["requestId"], "r-2");
        assert_eq!(response["finished"], false);
        assert_eq!(response["succeeded"], false);
        assert!(mapper.is_pending_to_resolve("8").await.unwrap());
        mapper.stop();
    }

    #[tokio::test]
    async fn test_unsupported_action_and_malformed_request_become_error_responses() {
        let storage = NamedTempFile::new().unwrap();
        let (handler, _mapper) = wire_up("http://127.0.0.1:1", &storage);

        let raw = r#"{"requestId":"r-9","action":"reboot"}"#;
        let response: serde_json::Value =
            serde_json::from_str(&handler.process_message(raw).await).unwrap();
        assert_eq!(response["requestId"], "r-9");
        assert!(response["error"].as_str().unwrap().contains("reboot"));

        let response: serde_json::Value =
            serde_json::from_str(&handler.process_message("{not json").await).unwrap();
        assert_eq!(response["requestId"], "");
        assert!(!response["error"].as_str().unwrap().is_empty());
    }
}
