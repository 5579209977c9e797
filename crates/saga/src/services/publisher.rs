//! Downstream notification of payment transaction events.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{read_error, url_join};
use crate::error::ServiceClientError;
use crate::events::{PaymentTransactionCompleted, PaymentTransactionCreated};

/// Publishes payment transaction events to downstream consumers.
///
/// Delivery is fire-and-forget from the saga's point of view: failures are
/// reported back but never undo the state change that produced the event.
#[async_trait]
pub trait CompletionEventPublisher: Send + Sync {
    async fn publish_created(
        &self,
        event: &PaymentTransactionCreated,
    ) -> Result<(), ServiceClientError>;

    async fn publish_completed(
        &self,
        event: &PaymentTransactionCompleted,
    ) -> Result<(), ServiceClientError>;
}

#[derive(Debug, Default)]
struct InMemoryPublisherState {
    created: Vec<PaymentTransactionCreated>,
    completed: Vec<PaymentTransactionCompleted>,
    fail_requests: bool,
}

/// Publisher that records events in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventPublisher {
    state: Arc<RwLock<InMemoryPublisherState>>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_events(&self) -> Vec<PaymentTransactionCreated> {
        self.read().created.clone()
    }

    pub fn completed_events(&self) -> Vec<PaymentTransactionCompleted> {
        self.read().completed.clone()
    }

    /// Makes every publish fail without recording the event.
    pub fn set_fail_requests(&self, fail: bool) {
        self.write().fail_requests = fail;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryPublisherState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryPublisherState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CompletionEventPublisher for InMemoryEventPublisher {
    async fn publish_created(
        &self,
        event: &PaymentTransactionCreated,
    ) -> Result<(), ServiceClientError> {
        let mut state = self.write();
        if state.fail_requests {
            return Err(ServiceClientError::Unavailable("event bus".to_string()));
        }
        state.created.push(event.clone());
        Ok(())
    }

    async fn publish_completed(
        &self,
        event: &PaymentTransactionCompleted,
    ) -> Result<(), ServiceClientError> {
        let mut state = self.write();
        if state.fail_requests {
            return Err(ServiceClientError::Unavailable("event bus".to_string()));
        }
        state.completed.push(event.clone());
        Ok(())
    }
}

/// Publisher that POSTs events as JSON to
/// `{base}/payment-transactions/created` and `{base}/payment-transactions/completed`.
#[derive(Debug, Clone)]
pub struct HttpEventPublisher {
    client: Client,
    base_url: String,
}

impl HttpEventPublisher {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<(), ServiceClientError> {
        let response = self
            .client
            .post(url_join(&self.base_url, path))
            .json(body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(read_error(response).await)
        }
    }
}

#[async_trait]
impl CompletionEventPublisher for HttpEventPublisher {
    #[tracing::instrument(skip(self, event), fields(booking_id = %event.booking_id))]
    async fn publish_created(
        &self,
        event: &PaymentTransactionCreated,
    ) -> Result<(), ServiceClientError> {
        self.post("payment-transactions/created", event).await
    }

    #[tracing::instrument(skip(self, event), fields(booking_id = %event.booking_id, status = %event.status))]
    async fn publish_completed(
        &self,
        event: &PaymentTransactionCompleted,
    ) -> Result<(), ServiceClientError> {
        self.post("payment-transactions/completed", event).await
    }
}

#[cfg(test)]
mod tests {
    use common::{BookingId, PaymentTransactionId};
    use transaction_store::PaymentTransactionStatus;

    use super::*;

    #[tokio::test]
    async fn test_records_events() {
        let publisher = InMemoryEventPublisher::new();
        let event = PaymentTransactionCompleted::new(
            BookingId::new(42),
            PaymentTransactionId::new(1),
            PaymentTransactionStatus::Success,
        );

        publisher.publish_completed(&event).await.unwrap();

        assert_eq!(publisher.completed_events(), vec![event]);
        assert!(publisher.created_events().is_empty());
    }

    #[tokio::test]
    async fn test_failing_publisher_records_nothing() {
        let publisher = InMemoryEventPublisher::new();
        publisher.set_fail_requests(true);

        let event = PaymentTransactionCreated::new(BookingId::new(42), PaymentTransactionId::new(1));
        assert!(publisher.publish_created(&event).await.is_err());
        assert!(publisher.created_events().is_empty());
    }
}
