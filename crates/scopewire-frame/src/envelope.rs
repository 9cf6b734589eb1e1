use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// A new-request frame payload.
///
/// The `identifier` names the request kind (a stable string key such as
/// `"com.example.Echo"`); `payload` is the serialized request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestEnvelope {
    pub identifier: String,
    pub payload: Vec<u8>,
}

impl RequestEnvelope {
    /// Wrap an already-serialized body.
    pub fn new(identifier: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            identifier: identifier.into(),
            payload,
        }
    }

    /// Serialize a typed body and wrap it.
    pub fn from_value<T: Serialize>(identifier: impl Into<String>, value: &T) -> Result<Self> {
        let payload = serde_json::to_vec(value).map_err(FrameError::EncodingFailed)?;
        Ok(Self::new(identifier, payload))
    }

    /// Deserialize the body into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload).map_err(FrameError::DecodingFailed)
    }

    /// Serialize this envelope to its JSON wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(FrameError::EncodingFailed)
    }
}

/// A reply frame payload.
///
/// Carries no `identifier` field — that absence is what distinguishes a
/// reply from a request on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    pub payload: Vec<u8>,
}

impl ResponseEnvelope {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// An empty-payload reply, used when a handler has nothing to report.
    pub fn empty() -> Self {
        Self {
            payload: Vec::new(),
        }
    }

    /// Serialize a typed body and wrap it.
    pub fn from_value<T: Serialize>(value: &T) -> Result<Self> {
        let payload = serde_json::to_vec(value).map_err(FrameError::EncodingFailed)?;
        Ok(Self { payload })
    }

    /// Deserialize the body into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload).map_err(FrameError::DecodingFailed)
    }

    /// Serialize this envelope to its JSON wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(FrameError::EncodingFailed)
    }
}

/// A decoded frame payload: either a new request or a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request(RequestEnvelope),
    Response(ResponseEnvelope),
}

impl Envelope {
    /// Structurally discriminate a frame payload.
    ///
    /// The presence of the `identifier` key is the protocol's sole
    /// multiplexing mechanism: a payload carrying it must parse as a
    /// request, anything else is parsed as a reply. A payload that
    /// carries the key but is malformed (wrong type, bad shape) is
    /// rejected outright rather than misread as a reply, which would
    /// consume a pending waiter it does not answer.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(FrameError::DecodingFailed)?;
        if value.get("identifier").is_some() {
            serde_json::from_value::<RequestEnvelope>(value)
                .map(Envelope::Request)
                .map_err(FrameError::DecodingFailed)
        } else {
            serde_json::from_value::<ResponseEnvelope>(value)
                .map(Envelope::Response)
                .map_err(FrameError::DecodingFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Add {
        a: i64,
        b: i64,
    }

    #[test]
    fn request_envelope_roundtrips_typed_body() {
        let env = RequestEnvelope::from_value("com.example.Add", &Add { a: 1, b: 2 }).unwrap();
        assert_eq!(env.identifier, "com.example.Add");

        let body: Add = env.decode().unwrap();
        assert_eq!(body, Add { a: 1, b: 2 });
    }

    #[test]
    fn parse_discriminates_request_by_identifier_presence() {
        let env = RequestEnvelope::new("ping", b"{}".to_vec());
        let wire = env.to_bytes().unwrap();

        match Envelope::parse(&wire).unwrap() {
            Envelope::Request(req) => assert_eq!(req.identifier, "ping"),
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn parse_falls_back_to_response_without_identifier() {
        let env = ResponseEnvelope::new(b"3".to_vec());
        let wire = env.to_bytes().unwrap();

        match Envelope::parse(&wire).unwrap() {
            Envelope::Response(resp) => assert_eq!(resp.payload, b"3".to_vec()),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_non_envelope_payloads() {
        let err = Envelope::parse(b"not json at all").unwrap_err();
        assert!(matches!(err, FrameError::DecodingFailed(_)));
    }

    #[test]
    fn parse_rejects_malformed_request_rather_than_misreading_a_reply() {
        // Carries the identifier key, so it can only be a request — and a
        // broken one. Treating it as a reply would consume a waiter.
        let err = Envelope::parse(br#"{"identifier": 42, "payload": []}"#).unwrap_err();
        assert!(matches!(err, FrameError::DecodingFailed(_)));
    }

    #[test]
    fn parse_rejects_non_object_payloads() {
        let err = Envelope::parse(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, FrameError::DecodingFailed(_)));
    }

    #[test]
    fn empty_response_has_no_payload() {
        let env = ResponseEnvelope::empty();
        assert!(env.payload.is_empty());

        let wire = env.to_bytes().unwrap();
        match Envelope::parse(&wire).unwrap() {
            Envelope::Response(resp) => assert!(resp.payload.is_empty()),
            other => panic!("expected response, got {other:?}"),
        }
    }
}
