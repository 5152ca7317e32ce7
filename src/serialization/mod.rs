//! JSON encoding of request bodies and decoding of response bodies.

use crate::errors::{TargetProcessError, TargetProcessResult};
use crate::types::{ApiResponse, BodyShape, Request, RequestBody, Response};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

mod shape;

/// Content type sent with encoded JSON bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

const EMPTY_OBJECT: &str = "{}";

/// Shape the caller expects a decoded body to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// One value, or a mapping.
    Single,
    /// A list of values. A lone JSON object is accepted as a one-element list.
    Collection,
}

impl Expect {
    /// Shape implied by the decode target: `Collection` for types that
    /// deserialize from a sequence (`Vec`, `VecDeque`, sets, and options or
    /// newtypes around them), `Single` for everything else.
    pub fn of<T: DeserializeOwned>() -> Self {
        shape::expect_for::<T>()
    }
}

/// Encodes requests and decodes responses.
#[derive(Debug, Clone)]
pub struct JsonPipeline {
    accept: HeaderValue,
}

impl JsonPipeline {
    /// Creates a pipeline that defaults `Accept` to the given media type.
    pub fn new(media_type: &str) -> TargetProcessResult<Self> {
        let accept = HeaderValue::from_str(media_type).map_err(|_| {
            TargetProcessError::configuration(format!("Invalid media type '{}'", media_type))
        })?;
        Ok(Self { accept })
    }

    /// Encodes a structured body as JSON text and defaults `Accept`.
    ///
    /// Read-only methods and raw bodies pass through unchanged.
    pub fn serialize_request(&self, mut request: Request) -> TargetProcessResult<Request> {
        if !request.headers.contains_key(ACCEPT) {
            request.headers.insert(ACCEPT, self.accept.clone());
        }

        if request.is_read_only() {
            return Ok(request);
        }

        if let RequestBody::Structured(value) = &request.body {
            let text = serde_json::to_string(value).map_err(|e| {
                TargetProcessError::serialization("Failed to serialize request body", e)
            })?;
            request.body = RequestBody::Text(text);
            request
                .content_type
                .get_or_insert_with(|| JSON_CONTENT_TYPE.to_string());
        }

        Ok(request)
    }

    /// Decodes a successful response.
    ///
    /// Only bodies declared as `application/json` are decoded. An empty body
    /// or `{}` yields no content without running the decoder. A wrapped lone
    /// object is reported through [`BodyShape::WrappedSingleObject`].
    pub fn deserialize_response<T: DeserializeOwned>(
        &self,
        response: Response,
        expect: Expect,
    ) -> TargetProcessResult<ApiResponse<T>> {
        if response.status == StatusCode::NOT_MODIFIED {
            return Ok(ApiResponse::empty(response, BodyShape::NotModified));
        }

        if !response.is_json() {
            return Ok(ApiResponse::empty(response, BodyShape::NotJson));
        }

        let text = std::str::from_utf8(&response.body).map_err(|e| {
            TargetProcessError::serialization_message(format!(
                "Response body is not valid UTF-8: {}",
                e
            ))
        })?;
        let trimmed = text.trim();

        if trimmed.is_empty() || trimmed == EMPTY_OBJECT {
            return Ok(ApiResponse::empty(response, BodyShape::NoContent));
        }

        let (body, shape) = if expect == Expect::Collection && trimmed.starts_with('{') {
            let wrapped = format!("[{}]", trimmed);
            (decode::<T>(&wrapped)?, BodyShape::WrappedSingleObject)
        } else {
            (decode::<T>(trimmed)?, BodyShape::Json)
        };

        Ok(ApiResponse::with_body(response, body, shape))
    }
}

fn decode<T: DeserializeOwned>(text: &str) -> TargetProcessResult<T> {
    serde_json::from_str(text)
        .map_err(|e| TargetProcessError::serialization("Failed to deserialize response", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MEDIA_TYPE;
    use crate::types::HttpContent;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use reqwest::header::{HeaderMap, CONTENT_TYPE};
    use reqwest::Method;
    use serde::{Deserialize, Serialize};
    use url::Url;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Story {
        #[serde(rename = "Id")]
        id: u64,
        #[serde(rename = "Name")]
        name: String,
    }

    fn pipeline() -> JsonPipeline {
        JsonPipeline::new(DEFAULT_MEDIA_TYPE).unwrap()
    }

    fn request(method: Method, body: RequestBody) -> Request {
        Request {
            method,
            base_address: Url::parse("https://tp.example.com/api/v1/").unwrap(),
            endpoint: "UserStories".to_string(),
            headers: HeaderMap::new(),
            body,
            content_type: None,
            timeout: None,
        }
    }

    fn json_response(body: &'static str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        Response::new(StatusCode::OK, headers, Bytes::from_static(body.as_bytes()))
    }

    #[test]
    fn test_structured_body_is_encoded() {
        let body = RequestBody::json(&Story {
            id: 1,
            name: "Login".to_string(),
        })
        .unwrap();

        let encoded = pipeline()
            .serialize_request(request(Method::POST, body))
            .unwrap();

        assert_eq!(
            encoded.body,
            RequestBody::Text(r#"{"Id":1,"Name":"Login"}"#.to_string())
        );
        assert_eq!(encoded.content_type.as_deref(), Some(JSON_CONTENT_TYPE));
        assert_eq!(encoded.headers.get(ACCEPT).unwrap(), DEFAULT_MEDIA_TYPE);
    }

    #[test]
    fn test_raw_bodies_pass_through_unchanged() {
        let raw = [
            RequestBody::Text("{not json".to_string()),
            RequestBody::Bytes(Bytes::from_static(&[0xff, 0x00, 0x7b])),
            RequestBody::Content(HttpContent::new("image/png", &b"\x89PNG"[..])),
        ];

        for body in raw {
            let encoded = pipeline()
                .serialize_request(request(Method::POST, body.clone()))
                .unwrap();
            assert_eq!(encoded.body, body);
            assert!(encoded.content_type.is_none());
        }
    }

    #[test]
    fn test_read_only_methods_never_encode() {
        for method in [Method::GET, Method::HEAD] {
            let body = RequestBody::Structured(serde_json::json!({"Name": "x"}));
            let encoded = pipeline()
                .serialize_request(request(method, body.clone()))
                .unwrap();
            assert_eq!(encoded.body, body);
        }
    }

    #[test]
    fn test_caller_accept_header_is_kept() {
        let mut req = request(Method::GET, RequestBody::Empty);
        req.headers
            .insert(ACCEPT, HeaderValue::from_static("application/xml"));

        let encoded = pipeline().serialize_request(req).unwrap();
        assert_eq!(encoded.headers.get(ACCEPT).unwrap(), "application/xml");
    }

    #[test]
    fn test_round_trip() {
        let story = Story {
            id: 42,
            name: "Checkout \"fast\" ✓".to_string(),
        };
        let encoded = pipeline()
            .serialize_request(request(
                Method::PUT,
                RequestBody::json(&story).unwrap(),
            ))
            .unwrap();
        let text = match encoded.body {
            RequestBody::Text(text) => text,
            other => panic!("unexpected body {:?}", other),
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let response = Response::new(StatusCode::OK, headers, Bytes::from(text));
        let decoded: ApiResponse<Story> = pipeline()
            .deserialize_response(response, Expect::Single)
            .unwrap();

        assert_eq!(decoded.body, Some(story));
    }

    #[test]
    fn test_empty_and_empty_object_are_no_content() {
        for body in ["", "{}", "  {}\n"] {
            let decoded: ApiResponse<Vec<Story>> = pipeline()
                .deserialize_response(json_response(body), Expect::Collection)
                .unwrap();
            assert_eq!(decoded.shape, BodyShape::NoContent);
            assert!(decoded.body.is_none());
        }
    }

    #[test]
    fn test_single_object_is_wrapped_for_collections() {
        let decoded: ApiResponse<Vec<serde_json::Value>> = pipeline()
            .deserialize_response(json_response(r#"{"a":1}"#), Expect::Collection)
            .unwrap();

        assert_eq!(decoded.shape, BodyShape::WrappedSingleObject);
        assert_eq!(decoded.body, Some(vec![serde_json::json!({"a": 1})]));
    }

    #[test]
    fn test_single_object_is_not_wrapped_for_maps() {
        let decoded: ApiResponse<std::collections::HashMap<String, u32>> = pipeline()
            .deserialize_response(json_response(r#"{"a":1}"#), Expect::Single)
            .unwrap();

        assert_eq!(decoded.shape, BodyShape::Json);
        assert_eq!(decoded.body.unwrap().get("a"), Some(&1));
    }

    #[test]
    fn test_arrays_decode_as_is() {
        let decoded: ApiResponse<Vec<Story>> = pipeline()
            .deserialize_response(
                json_response(r#"[{"Id":1,"Name":"a"},{"Id":2,"Name":"b"}]"#),
                Expect::Collection,
            )
            .unwrap();

        assert_eq!(decoded.shape, BodyShape::Json);
        assert_eq!(decoded.body.unwrap().len(), 2);
    }

    #[test]
    fn test_non_json_content_type_is_left_raw() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let response = Response::new(StatusCode::OK, headers, Bytes::from_static(b"{\"a\":1}"));

        let decoded: ApiResponse<serde_json::Value> = pipeline()
            .deserialize_response(response, Expect::Single)
            .unwrap();

        assert_eq!(decoded.shape, BodyShape::NotJson);
        assert!(decoded.body.is_none());
        assert_eq!(decoded.http_response.body_text(), "{\"a\":1}");
    }

    #[test]
    fn test_not_modified() {
        let response = Response::new(StatusCode::NOT_MODIFIED, HeaderMap::new(), Bytes::new());
        let decoded: ApiResponse<Story> = pipeline()
            .deserialize_response(response, Expect::Single)
            .unwrap();
        assert_eq!(decoded.shape, BodyShape::NotModified);
    }

    #[test]
    fn test_decode_failure_is_serialization_error() {
        let err = pipeline()
            .deserialize_response::<Story>(json_response(r#"{"Id":"nope"}"#), Expect::Single)
            .unwrap_err();

        match err {
            TargetProcessError::Serialization { source, .. } => assert!(source.is_some()),
            other => panic!("expected serialization error, got {:?}", other),
        }
    }
}
