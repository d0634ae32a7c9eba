//! JSON messages exchanged with the request server.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::json;

/// Fields every request carries; the action-specific payload is parsed
/// separately once the action is known.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub action: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchPlanMessage {
    pub plan_name: String,
    pub object_spec: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStatusMessage {
    #[serde(default)]
    pub plan_name: String,
    pub execution_id: String,
}

pub fn launch_plan_response(request_id: &str, queued_item_id: &str) -> String {
    json!({
        "requestId": request_id,
        "value": queued_item_id,
    })
    .to_string()
}

pub fn get_status_response(
    request_id: &str,
    finished: bool,
    successful: bool,
    explanation: &str,
) -> String {
    json!({
        "requestId": request_id,
        "finished": finished,
        "succeeded": successful,
        "explanation": explanation,
    })
    .to_string()
}

pub fn error_response(request_id: &str, message: &str) -> String {
    json!({
        "requestId": request_id,
        "error": message,
    })
    .to_string()
}

pub fn register_message(plug_type: &str, name: &str, api_key: &str) -> String {
    json!({
        "action": "register",
        "type": plug_type,
        "name": name,
        "apikey": api_key,
    })
    .to_string()
}
