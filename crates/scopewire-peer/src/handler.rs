use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Error type handlers may fail with. Handler failures never tear down the
/// connection; they produce an empty-payload reply.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

type RawHandler = Arc<dyn Fn(Bytes) -> BoxFuture<HandlerResult<Vec<u8>>> + Send + Sync>;

/// A null body used for zero-argument requests and void responses.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NullPayload {}

impl NullPayload {
    pub const NULL: NullPayload = NullPayload {};
}

/// Encapsulates a message handler that processes requests and returns
/// responses.
///
/// JSON encoding/decoding happens at this boundary, so registered closures
/// work with typed values while the dispatch loop only sees bytes.
#[derive(Clone)]
pub struct MessageHandler {
    raw: RawHandler,
}

impl MessageHandler {
    /// A handler taking a typed request and returning a typed response.
    pub fn new<Req, Resp, F, Fut>(f: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Resp>> + Send + 'static,
    {
        let f = Arc::new(f);
        let raw: RawHandler = Arc::new(move |bytes: Bytes| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                let request: Req = serde_json::from_slice(&bytes)?;
                let response = f(request).await?;
                Ok(serde_json::to_vec(&response)?)
            })
        });
        Self { raw }
    }

    /// A handler taking a typed request and returning nothing.
    pub fn from_sink<Req, F, Fut>(f: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        Self::new(move |request: Req| {
            let fut = f(request);
            async move {
                fut.await?;
                Ok(NullPayload::NULL)
            }
        })
    }

    /// A handler taking no request body and returning a typed response.
    ///
    /// The inbound payload is ignored entirely.
    pub fn from_source<Resp, F, Fut>(f: F) -> Self
    where
        Resp: Serialize + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Resp>> + Send + 'static,
    {
        let f = Arc::new(f);
        let raw: RawHandler = Arc::new(move |_bytes: Bytes| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                let response = f().await?;
                Ok(serde_json::to_vec(&response)?)
            })
        });
        Self { raw }
    }

    /// A handler taking no request body and returning nothing.
    pub fn from_signal<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        Self::from_source(move || {
            let fut = f();
            async move {
                fut.await?;
                Ok(NullPayload::NULL)
            }
        })
    }

    /// Run the handler against a raw payload.
    pub fn call(&self, payload: Bytes) -> BoxFuture<HandlerResult<Vec<u8>>> {
        (self.raw)(payload)
    }
}

impl std::fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MessageHandler")
    }
}

/// Message handlers keyed by request identifier.
///
/// At most one handler per name; registering a second handler for the same
/// name replaces the first.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, MessageHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same name.
    pub fn insert(&mut self, name: impl Into<String>, handler: MessageHandler) {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            debug!(%name, "replaced existing message handler");
        } else {
            debug!(%name, "registered message handler");
        }
    }

    /// Look up the handler for a request identifier.
    pub fn get(&self, name: &str) -> Option<MessageHandler> {
        self.handlers.get(name).cloned()
    }

    /// Drop every registered handler.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn typed_handler_roundtrips_json() {
        let handler = MessageHandler::new(|input: String| async move { Ok(input.to_uppercase()) });

        let out = handler
            .call(Bytes::from(serde_json::to_vec("hello").unwrap()))
            .await
            .unwrap();
        let decoded: String = serde_json::from_slice(&out).unwrap();
        assert_eq!(decoded, "HELLO");
    }

    #[tokio::test]
    async fn sink_handler_returns_null_payload() {
        let handler = MessageHandler::from_sink(|_input: i64| async move { Ok(()) });

        let out = handler.call(Bytes::from_static(b"42")).await.unwrap();
        let decoded: NullPayload = serde_json::from_slice(&out).unwrap();
        assert_eq!(decoded, NullPayload::NULL);
    }

    #[tokio::test]
    async fn source_handler_ignores_inbound_payload() {
        let handler = MessageHandler::from_source(|| async move { Ok("pong".to_string()) });

        // Not JSON at all — a source handler must not care.
        let out = handler.call(Bytes::from_static(b"\xff\xfe")).await.unwrap();
        let decoded: String = serde_json::from_slice(&out).unwrap();
        assert_eq!(decoded, "pong");
    }

    #[tokio::test]
    async fn undecodable_request_fails_the_handler() {
        let handler = MessageHandler::new(|input: i64| async move { Ok(input + 1) });

        let result = handler.call(Bytes::from_static(b"not a number")).await;
        assert!(result.is_err());
    }

    #[test]
    fn registration_is_last_write_wins() {
        let mut registry = HandlerRegistry::new();
        registry.insert(
            "echo",
            MessageHandler::new(|s: String| async move { Ok(s) }),
        );
        registry.insert(
            "echo",
            MessageHandler::new(|s: String| async move { Ok(format!("second: {s}")) }),
        );

        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn replacement_handler_is_the_one_invoked() {
        let mut registry = HandlerRegistry::new();
        registry.insert(
            "greet",
            MessageHandler::new(|_: NullPayload| async move { Ok("first".to_string()) }),
        );
        registry.insert(
            "greet",
            MessageHandler::new(|_: NullPayload| async move { Ok("second".to_string()) }),
        );

        let handler = registry.get("greet").unwrap();
        let out = handler
            .call(Bytes::from(serde_json::to_vec(&NullPayload::NULL).unwrap()))
            .await
            .unwrap();
        let decoded: String = serde_json::from_slice(&out).unwrap();
        assert_eq!(decoded, "second");
    }
}
