//! Request cancellation support.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::types::RequestId;

/// Manages cancellation tokens for in-flight requests.
#[derive(Debug, Default)]
pub struct CancellationManager {
    tokens: Arc<RwLock<HashMap<RequestId, CancellationToken>>>,
}

impl CancellationManager {
    /// Create a new manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a token for a request.
    pub async fn create_token(&self, request_id: RequestId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.write().await.insert(request_id, token.clone());
        token
    }

    /// Cancel an in-flight request. Unknown ids are ignored; the request may
    /// have already completed.
    pub async fn cancel(&self, request_id: &RequestId) -> bool {
        let token = self.tokens.write().await.remove(request_id);
        match token {
            Some(token) => {
                token.cancel();
                true
            },
            None => false,
        }
    }

    /// Drop the token of a completed request.
    pub async fn remove(&self, request_id: &RequestId) {
        self.tokens.write().await.remove(request_id);
    }

    /// Cancel everything, used when the transport closes.
    pub async fn cancel_all(&self) {
        let mut tokens = self.tokens.write().await;
        for token in tokens.values() {
            token.cancel();
        }
        tokens.clear();
    }

    /// Number of in-flight requests with tokens.
    pub async fn in_flight(&self) -> usize {
        self.tokens.read().await.len()
    }
}

/// Per-request context passed to tool handlers.
#[derive(Clone, Debug)]
pub struct RequestHandlerExtra {
    /// Cancellation token for the request
    pub cancellation_token: CancellationToken,
    /// Request id, for logging
    pub request_id: RequestId,
}

impl RequestHandlerExtra {
    /// Create a new handler context.
    pub fn new(request_id: RequestId, cancellation_token: CancellationToken) -> Self {
        Self { cancellation_token, request_id }
    }

    /// Whether the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Wait for cancellation.
    pub async fn cancelled(&self) {
        self.cancellation_token.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_cancel() {
        let manager = CancellationManager::new();
        let token = manager.create_token(RequestId::Number(1)).await;
        assert!(!token.is_cancelled());

        assert!(manager.cancel(&RequestId::Number(1)).await);
        assert!(token.is_cancelled());
        assert_eq!(manager.in_flight().await, 0);
    }

    #[tokio::test]
    async fn cancel_unknown_request_is_noop() {
        let manager = CancellationManager::new();
        assert!(!manager.cancel(&RequestId::Number(404)).await);
    }

    #[tokio::test]
    async fn remove_does_not_cancel() {
        let manager = CancellationManager::new();
        let token = manager.create_token(RequestId::Number(2)).await;
        manager.remove(&RequestId::Number(2)).await;
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_all() {
        let manager = CancellationManager::new();
        let first = manager.create_token(RequestId::Number(1)).await;
        let second = manager.create_token(RequestId::String("a".into())).await;
        manager.cancel_all().await;
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());
        assert_eq!(manager.in_flight().await, 0);
    }

    #[tokio::test]
    async fn handler_extra_reflects_token() {
        let token = CancellationToken::new();
        let extra = RequestHandlerExtra::new(RequestId::Number(9), token.clone());
        assert!(!extra.is_cancelled());
        token.cancel();
        assert!(extra.is_cancelled());
    }
}
