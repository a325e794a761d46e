//! Client side of the portal backend's form endpoints.
//!
//! The sidecar only ever calls out; it owns no wire format here. Success
//! bodies may come bare or wrapped in `{ "data": ... }`.

use std::time::Duration;

use reqwest::blocking::{multipart, Client, RequestBuilder};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::BackendConfig;
use crate::forms::template::FormTemplate;
use crate::forms::value::FormValues;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormInstance {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// Copy of the template frozen at submission time.
    #[serde(default, alias = "template", skip_serializing_if = "Option::is_none")]
    pub template_snapshot: Option<FormTemplate>,
    #[serde(default)]
    pub responses: FormValues,
    #[serde(default)]
    pub approved: Approval,
}

impl FormInstance {
    pub fn approve_status(&self) -> ApproveStatus {
        self.approved.approve_status
    }

    /// Update and delete are only allowed before a reviewer decides.
    pub fn is_pending(&self) -> bool {
        self.approved.approve_status == ApproveStatus::Pending
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    #[serde(default)]
    pub approve_status: ApproveStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApproveStatus {
    Pending,
    Approved,
    Rejected,
    /// Missing or unrecognized status. Never treated as pending.
    #[default]
    #[serde(other)]
    Unknown,
}

impl ApproveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered with a non-success status. `message` is the
    /// backend's own text.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid backend url: {0}")]
    Config(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InstanceBody<'a> {
    template_id: &'a str,
    responses: &'a FormValues,
}

/// Operations the submission flow and the handlers need from the backend.
pub trait FormsApi {
    fn fetch_template(&self, template_id: &str) -> Result<FormTemplate, ApiError>;
    fn list_instances(&self) -> Result<Vec<FormInstance>, ApiError>;
    fn fetch_instance(&self, instance_id: &str) -> Result<FormInstance, ApiError>;
    fn create_instance(
        &self,
        template_id: &str,
        responses: &FormValues,
    ) -> Result<FormInstance, ApiError>;
    fn update_instance(
        &self,
        instance_id: &str,
        template_id: &str,
        responses: &FormValues,
    ) -> Result<FormInstance, ApiError>;
    fn attach_signature(
        &self,
        instance_id: &str,
        key_insert: &str,
        png: &[u8],
    ) -> Result<(), ApiError>;
    fn delete_instance(&self, instance_id: &str) -> Result<(), ApiError>;
}

pub struct HttpFormsApi {
    base: Url,
    http: Client,
}

impl HttpFormsApi {
    pub fn new(config: &BackendConfig) -> Result<Self, ApiError> {
        let base = Url::parse(&config.api_base_url)
            .map_err(|e| ApiError::Config(format!("{}: {}", config.api_base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Config(config.api_base_url.clone()));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("academicd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base, http })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Config(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn execute(&self, req: RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let resp = req.send()?;
        let status = resp.status();
        let url = resp.url().clone();
        let body = resp.bytes()?;
        if !status.is_success() {
            let message = error_message(status, &body);
            tracing::warn!(%url, status = status.as_u16(), %message, "backend rejected request");
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        tracing::debug!(%url, status = status.as_u16(), "backend request ok");
        Ok(body.to_vec())
    }

    fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let url = self.url(segments)?;
        decode(&self.execute(self.http.get(url))?)
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    if let Ok(Envelope { data: Some(data) }) = serde_json::from_slice(body) {
        return Ok(data);
    }
    Ok(serde_json::from_slice(body)?)
}

impl FormsApi for HttpFormsApi {
    fn fetch_template(&self, template_id: &str) -> Result<FormTemplate, ApiError> {
        self.get(&["api", "form-template", template_id])
    }

    fn list_instances(&self) -> Result<Vec<FormInstance>, ApiError> {
        self.get(&["api", "form-instance"])
    }

    fn fetch_instance(&self, instance_id: &str) -> Result<FormInstance, ApiError> {
        self.get(&["api", "form-instance", instance_id])
    }

    fn create_instance(
        &self,
        template_id: &str,
        responses: &FormValues,
    ) -> Result<FormInstance, ApiError> {
        let url = self.url(&["api", "form-instance"])?;
        let body = InstanceBody {
            template_id,
            responses,
        };
        decode(&self.execute(self.http.post(url).json(&body))?)
    }

    fn update_instance(
        &self,
        instance_id: &str,
        template_id: &str,
        responses: &FormValues,
    ) -> Result<FormInstance, ApiError> {
        let url = self.url(&["api", "form-instance", instance_id])?;
        let body = InstanceBody {
            template_id,
            responses,
        };
        decode(&self.execute(self.http.put(url).json(&body))?)
    }

    fn attach_signature(
        &self,
        instance_id: &str,
        key_insert: &str,
        png: &[u8],
    ) -> Result<(), ApiError> {
        let url = self.url(&["api", "form-instance", instance_id, "signature"])?;
        let part = multipart::Part::bytes(png.to_vec())
            .file_name("signature.png")
            .mime_str("image/png")?;
        let form = multipart::Form::new()
            .part("insertSignature", part)
            .text("keyInsert", key_insert.to_string());
        self.execute(self.http.post(url).multipart(form))?;
        Ok(())
    }

    fn delete_instance(&self, instance_id: &str) -> Result<(), ApiError> {
        let url = self.url(&["api", "form-instance", instance_id])?;
        self.execute(self.http.delete(url))?;
        Ok(())
    }
}

/// Backend message for a failed call, preferring `message` fields in a JSON
/// body, then the raw body text, then the status reason.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(v) = serde_json::from_slice::<serde_json::Value>(body) {
        let found = v
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| {
                v.get("error")
                    .and_then(|e| e.get("message").or(Some(e)))
                    .and_then(|m| m.as_str())
            });
        if let Some(msg) = found {
            if !msg.trim().is_empty() {
                return msg.to_string();
            }
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if !text.is_empty() && text.len() <= 500 {
        return text.to_string();
    }
    status
        .canonical_reason()
        .map(|r| format!("{} {}", status.as_u16(), r))
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_backend_text() {
        assert_eq!(
            error_message(
                StatusCode::BAD_REQUEST,
                r#"{"message":"Biểu mẫu đã được duyệt"}"#.as_bytes()
            ),
            "Biểu mẫu đã được duyệt"
        );
        assert_eq!(
            error_message(StatusCode::CONFLICT, br#"{"error":{"message":"locked"}}"#),
            "locked"
        );
        assert_eq!(
            error_message(StatusCode::CONFLICT, br#"{"error":"locked"}"#),
            "locked"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, b"upstream down"), "upstream down");
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, b""),
            "500 Internal Server Error"
        );
    }

    #[test]
    fn instance_parses_backend_shape() {
        let inst: FormInstance = serde_json::from_value(serde_json::json!({
            "_id": "inst-1",
            "templateId": "tpl-1",
            "responses": { "subjects": "Math,Physics", "agree": true },
            "approved": { "approveStatus": "approved" }
        }))
        .expect("instance json");
        assert_eq!(inst.id, "inst-1");
        assert_eq!(inst.approve_status(), ApproveStatus::Approved);
        assert!(!inst.is_pending());

        let missing: FormInstance =
            serde_json::from_value(serde_json::json!({ "id": "inst-2" })).expect("minimal");
        assert_eq!(missing.approve_status(), ApproveStatus::Unknown);
        assert!(!missing.is_pending());

        let empty_approval: FormInstance =
            serde_json::from_value(serde_json::json!({ "_id": "inst-3", "approved": {} }))
                .expect("empty approval");
        assert!(!empty_approval.is_pending());
    }

    #[test]
    fn url_segments_are_escaped() {
        let api = HttpFormsApi::new(&BackendConfig {
            api_base_url: "http://localhost:5000/portal/".into(),
            ..BackendConfig::default()
        })
        .expect("client");
        let url = api.url(&["api", "form-template", "a/b"]).expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/portal/api/form-template/a%2Fb"
        );
    }
}
