//! HTTP adapter for the external CAD active-calls API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::{Call, CallOrigin, ErrorCode, PipelineError, Priority, Timestamp};
use crate::ports::CadClient;

/// Wire representation of a call as the CAD API returns it. Kept
/// separate from the domain `Call`; conversion is the only place wire
/// vocabulary is interpreted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CadCallDto {
    id: String,
    origin: String,
    priority: u8,
    #[serde(default)]
    location: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    units: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ActiveCallsResponse {
    calls: Vec<CadCallDto>,
}

impl CadCallDto {
    /// Converts to a domain call, or `None` for origins outside the
    /// pipeline's scope (dispatcher-created and unrecognized origins).
    fn into_tracked_call(self) -> Option<Call> {
        let origin = match self.origin.as_str() {
            "emergency_line" => CallOrigin::EmergencyLine,
            "dispatcher_created" => CallOrigin::DispatcherCreated,
            other => {
                tracing::debug!(call_id = %self.id, origin = other, "skipping unknown call origin");
                return None;
            }
        };
        if !origin.is_tracked() {
            return None;
        }

        Some(Call {
            id: crate::domain::CallId::new(&self.id),
            origin,
            priority: Priority(self.priority),
            location: self.location,
            description: self.description,
            units: self.units,
            last_seen_at: Timestamp::now(),
        })
    }
}

/// reqwest-backed implementation of the `CadClient` port.
pub struct HttpCadClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Secret<String>,
}

impl HttpCadClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Secret<String>,
        request_timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                PipelineError::new(ErrorCode::InternalError, "failed to build HTTP client")
                    .with_detail("source", e.to_string())
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn map_transport_error(err: reqwest::Error) -> PipelineError {
        if err.is_timeout() {
            PipelineError::upstream("CAD API request timed out")
        } else if err.is_connect() {
            PipelineError::upstream("could not connect to CAD API")
        } else {
            PipelineError::upstream(err.to_string())
        }
    }

    fn map_status_error(status: reqwest::StatusCode) -> PipelineError {
        let code = match status.as_u16() {
            401 | 403 => ErrorCode::UpstreamAuth,
            _ => ErrorCode::UpstreamUnavailable,
        };
        PipelineError::new(code, format!("CAD API returned {status}"))
            .with_detail("status", status.as_u16().to_string())
    }
}

#[async_trait]
impl CadClient for HttpCadClient {
    async fn fetch_active_calls(&self) -> Result<Vec<Call>, PipelineError> {
        let url = format!("{}/api/active-calls", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::map_status_error(status));
        }

        let body: ActiveCallsResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::serialization(e.to_string()))?;

        let total = body.calls.len();
        let calls: Vec<Call> = body
            .calls
            .into_iter()
            .filter_map(CadCallDto::into_tracked_call)
            .collect();

        tracing::debug!(
            total,
            tracked = calls.len(),
            "fetched active calls from CAD API"
        );
        Ok(calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto(id: &str, origin: &str) -> CadCallDto {
        CadCallDto {
            id: id.to_string(),
            origin: origin.to_string(),
            priority: 2,
            location: "400 Main St".to_string(),
            description: "Structure fire".to_string(),
            units: serde_json::json!(["E1", "L3"]),
        }
    }

    #[test]
    fn emergency_line_calls_are_tracked() {
        let call = dto("cad-1", "emergency_line").into_tracked_call().unwrap();
        assert_eq!(call.id.as_str(), "cad-1");
        assert_eq!(call.origin, CallOrigin::EmergencyLine);
        assert_eq!(call.priority, Priority(2));
    }

    #[test]
    fn dispatcher_created_calls_are_filtered() {
        assert!(dto("cad-2", "dispatcher_created")
            .into_tracked_call()
            .is_none());
    }

    #[test]
    fn unknown_origins_are_filtered_not_fatal() {
        assert!(dto("cad-3", "field_initiated").into_tracked_call().is_none());
    }

    #[test]
    fn response_parses_with_missing_optional_fields() {
        let json = r#"{"calls":[{"id":"cad-1","origin":"emergency_line","priority":1}]}"#;
        let parsed: ActiveCallsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.calls.len(), 1);
        assert!(parsed.calls[0].location.is_empty());
        assert!(parsed.calls[0].units.is_null());
    }

    #[test]
    fn auth_statuses_map_to_upstream_auth() {
        let err = HttpCadClient::map_status_error(reqwest::StatusCode::UNAUTHORIZED);
        assert_eq!(err.code, ErrorCode::UpstreamAuth);
        assert!(!err.is_transient());
    }

    #[test]
    fn server_errors_map_to_upstream_unavailable() {
        let err = HttpCadClient::map_status_error(reqwest::StatusCode::BAD_GATEWAY);
        assert_eq!(err.code, ErrorCode::UpstreamUnavailable);
        assert!(err.is_transient());
    }
}
