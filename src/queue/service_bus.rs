//! Azure Service Bus queue over its REST surface.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::{Delivery, OutboundMessage, QueueConsumer, QueueError, QueueTransport};
use crate::config::QueueSettings;
use crate::http::{encode_segment, format_endpoint, normalize_base_url};

const BROKER_PROPERTIES_HEADER: &str = "BrokerProperties";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct OutboundProperties<'a> {
    message_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceivedProperties {
    message_id: String,
    lock_token: String,
    #[serde(default)]
    delivery_count: u32,
}

/// HTTP client for a single Service Bus queue using peek-lock receives.
pub struct ServiceBusQueue {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) queue_name: String,
    pub(crate) sas_token: Option<String>,
    pub(crate) receive_timeout_secs: u64,
}

impl ServiceBusQueue {
    /// Construct a client from queue settings.
    pub fn new(settings: &QueueSettings) -> Result<Self, QueueError> {
        let namespace = settings
            .namespace_url
            .as_deref()
            .ok_or_else(|| QueueError::InvalidUrl("service bus namespace is not configured".into()))?;
        let client = Client::builder().user_agent("jobdesk/0.1").build()?;
        let base_url = normalize_base_url(namespace).map_err(QueueError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            queue = %settings.queue_name,
            has_sas_token = settings.sas_token.is_some(),
            "Initialized service bus HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            queue_name: settings.queue_name.clone(),
            sas_token: settings.sas_token.clone(),
            receive_timeout_secs: settings.receive_timeout.as_secs().max(1),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(
            &self.base_url,
            &format!("{}/{}", self.queue_name, path.trim_start_matches('/')),
        );
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.sas_token
            && !token.is_empty()
        {
            req = req.header(reqwest::header::AUTHORIZATION, token);
        }
        req
    }

    fn lock_path(delivery: &Delivery) -> String {
        format!(
            "messages/{}/{}",
            encode_segment(&delivery.message_id),
            encode_segment(&delivery.lock_token)
        )
    }

    async fn settle_lock(&self, method: Method, delivery: &Delivery) -> Result<(), QueueError> {
        let response = self
            .request(method, &Self::lock_path(delivery))
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                Err(QueueError::LockLost(delivery.message_id.clone()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(QueueError::UnexpectedStatus { status, body })
            }
        }
    }
}

#[async_trait]
impl QueueTransport for ServiceBusQueue {
    async fn send(&self, message: OutboundMessage) -> Result<(), QueueError> {
        let properties = serde_json::to_string(&OutboundProperties {
            message_id: &message.message_id,
        })?;
        let response = self
            .request(Method::POST, "messages")
            .header(reqwest::header::CONTENT_TYPE, message.content_type)
            .header(BROKER_PROPERTIES_HEADER, properties)
            .body(message.body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(queue = %self.queue_name, message_id = %message.message_id, "Message enqueued");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            let error = QueueError::UnexpectedStatus { status, body };
            tracing::error!(queue = %self.queue_name, error = %error, "Send failed");
            Err(error)
        }
    }
}

#[async_trait]
impl QueueConsumer for ServiceBusQueue {
    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let response = self
            .request(Method::POST, "messages/head")
            .query(&[("timeout", self.receive_timeout_secs)])
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::CREATED | StatusCode::OK => {
                let header = response
                    .headers()
                    .get(BROKER_PROPERTIES_HEADER)
                    .ok_or_else(|| QueueError::BrokerProperties("header missing".into()))?;
                let properties: ReceivedProperties = serde_json::from_slice(header.as_bytes())
                    .map_err(|err| QueueError::BrokerProperties(err.to_string()))?;
                let body = response.bytes().await?.to_vec();
                Ok(Some(Delivery {
                    message_id: properties.message_id,
                    body,
                    delivery_count: properties.delivery_count,
                    lock_token: properties.lock_token,
                }))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QueueError::UnexpectedStatus { status, body };
                tracing::error!(queue = %self.queue_name, error = %error, "Receive failed");
                Err(error)
            }
        }
    }

    async fn complete(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.settle_lock(Method::DELETE, delivery).await
    }

    async fn abandon(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.settle_lock(Method::PUT, delivery).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::DELETE, Method::POST, Method::PUT, MockServer};

    fn queue(server: &MockServer) -> ServiceBusQueue {
        ServiceBusQueue {
            client: Client::builder()
                .user_agent("jobdesk-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            queue_name: "jobs".into(),
            sas_token: Some("SharedAccessSignature sr=x&sig=y".into()),
            receive_timeout_secs: 5,
        }
    }

    fn delivery() -> Delivery {
        Delivery {
            message_id: "m-1".into(),
            body: Vec::new(),
            delivery_count: 1,
            lock_token: "lock-1".into(),
        }
    }

    #[tokio::test]
    async fn send_sets_message_id_in_broker_properties() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/jobs/messages")
                    .header("authorization", "SharedAccessSignature sr=x&sig=y")
                    .header("content-type", "application/json")
                    .header("brokerproperties", "{\"MessageId\":\"m-1\"}")
                    .body("{}");
                then.status(201);
            })
            .await;

        queue(&server)
            .send(OutboundMessage {
                message_id: "m-1".into(),
                content_type: "application/json".into(),
                body: "{}".into(),
            })
            .await
            .expect("sent");
        mock.assert();
    }

    #[tokio::test]
    async fn send_surfaces_broker_rejections() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/jobs/messages");
                then.status(401).body("unauthorized");
            })
            .await;

        let error = queue(&server)
            .send(OutboundMessage {
                message_id: "m-1".into(),
                content_type: "application/json".into(),
                body: "{}".into(),
            })
            .await
            .expect_err("rejected");
        assert!(matches!(
            error,
            QueueError::UnexpectedStatus { status, .. } if status == StatusCode::UNAUTHORIZED
        ));
    }

    #[tokio::test]
    async fn receive_reads_lock_from_broker_properties() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/jobs/messages/head")
                    .query_param("timeout", "5");
                then.status(201)
                    .header(
                        "BrokerProperties",
                        "{\"MessageId\":\"m-1\",\"LockToken\":\"lock-1\",\"DeliveryCount\":3}",
                    )
                    .body("{\"id\":\"m-1\"}");
            })
            .await;

        let delivery = queue(&server)
            .receive()
            .await
            .expect("receive")
            .expect("message");
        assert_eq!(delivery.message_id, "m-1");
        assert_eq!(delivery.lock_token, "lock-1");
        assert_eq!(delivery.delivery_count, 3);
        assert_eq!(delivery.body, b"{\"id\":\"m-1\"}");
    }

    #[tokio::test]
    async fn receive_returns_none_when_queue_is_empty() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/jobs/messages/head");
                then.status(204);
            })
            .await;

        assert!(queue(&server).receive().await.expect("receive").is_none());
    }

    #[tokio::test]
    async fn complete_and_abandon_address_the_lock() {
        let server = MockServer::start_async().await;
        let complete = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/jobs/messages/m-1/lock-1");
                then.status(200);
            })
            .await;
        let abandon = server
            .mock_async(|when, then| {
                when.method(PUT).path("/jobs/messages/m-1/lock-1");
                then.status(200);
            })
            .await;

        let queue = queue(&server);
        queue.complete(&delivery()).await.expect("complete");
        queue.abandon(&delivery()).await.expect("abandon");
        complete.assert();
        abandon.assert();
    }

    #[tokio::test]
    async fn expired_locks_are_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/jobs/messages/m-1/lock-1");
                then.status(410);
            })
            .await;

        let error = queue(&server)
            .complete(&delivery())
            .await
            .expect_err("lock lost");
        assert!(matches!(error, QueueError::LockLost(id) if id == "m-1"));
    }
}
