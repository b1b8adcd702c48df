//! Response Classification
//!
//! Turns a raw [`TransportResponse`] into one of three outcomes:
//!
//! 1. **Redirect**: a 503 carrying the leader endpoint header. The task is
//!    re-sent to the leader and the caller never sees the 503.
//! 2. **Rejected**: the body has the structured application error shape
//!    (whatever the status), or the status is 400 or above, or a JSON body
//!    could not be decoded.
//! 3. **Resolved**: everything else.

use bytes::Bytes;
use hostwise_common::protocol::headers::LEADER_ENDPOINT;
use hostwise_common::transport::TransportResponse;
use hostwise_common::{ApplicationError, HeaderMap, HostwiseError, Response, ResponseBody, StatusCode};
use http::header::CONTENT_TYPE;

/// What the dispatcher should do with a response
#[derive(Debug)]
pub enum Classification {
    /// Re-send the task to the leader at this URL
    Redirect { leader_url: String },
    Resolved(Response),
    Rejected(HostwiseError),
}

/// Classifies a response received from registry index `host`.
pub fn classify(response: TransportResponse, host: usize, expect_binary: bool) -> Classification {
    let TransportResponse {
        status,
        headers,
        body,
    } = response;

    if status == StatusCode::SERVICE_UNAVAILABLE {
        if let Some(leader_url) = leader_endpoint(&headers) {
            return Classification::Redirect { leader_url };
        }
    }

    let body = match decode_body(status, &headers, body, expect_binary) {
        Ok(body) => body,
        Err(e) => return Classification::Rejected(e),
    };

    if let ResponseBody::Json(value) = &body {
        if let Some(error) = ApplicationError::from_body(status.as_u16(), value) {
            return Classification::Rejected(HostwiseError::Application(error));
        }
    }

    if status.as_u16() >= 400 {
        return Classification::Rejected(HostwiseError::Http {
            status: status.as_u16(),
            body: body.to_text(),
        });
    }

    Classification::Resolved(Response {
        status,
        headers,
        body,
        served_by: host,
    })
}

fn leader_endpoint(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(LEADER_ENDPOINT)?.to_str().ok()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Whether the content type announces a JSON body
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("json") || ct.contains("javascript")
        })
        .unwrap_or(false)
}

fn decode_body(
    status: StatusCode,
    headers: &HeaderMap,
    body: Bytes,
    expect_binary: bool,
) -> Result<ResponseBody, HostwiseError> {
    if body.is_empty() {
        return Ok(ResponseBody::Empty);
    }

    if is_json_content_type(headers) {
        return match serde_json::from_slice(&body) {
            Ok(value) => Ok(ResponseBody::Json(value)),
            Err(_) if expect_binary => Ok(ResponseBody::Binary(body)),
            Err(source) => Err(HostwiseError::Parse {
                status: status.as_u16(),
                raw: body,
                source,
            }),
        };
    }

    if expect_binary {
        return Ok(ResponseBody::Binary(body));
    }

    Ok(ResponseBody::Text(String::from_utf8_lossy(&body).into_owned()))
}
