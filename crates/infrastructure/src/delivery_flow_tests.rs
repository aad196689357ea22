use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use courier_application::{
    DeliveryOutcome, PayloadSigner, SecretEncryptor, WebhookDeliveryRepository,
    WebhookDeliveryService,
};
use courier_core::{AppResult, SecretId, SubscriptionId};
use courier_domain::{
    DeliveryAttempt, DeliveryStatus, NewDeliveryAttempt, WebhookSecret, WebhookSubscription,
    WebhookTriggerType,
};
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::{
    AesSecretEncryptor, HmacPayloadSigner, HttpWebhookSender, InMemoryWebhookDeliveryRepository,
    TracingDeliveryEventSink, WEBHOOK_SIGNATURE_HEADER,
};

const ENCRYPTION_KEY: [u8; 32] = [11; 32];

struct Flow {
    repository: Arc<InMemoryWebhookDeliveryRepository>,
    service: WebhookDeliveryService,
    attempt: DeliveryAttempt,
}

async fn flow(destination_url: String) -> AppResult<Flow> {
    let repository = Arc::new(InMemoryWebhookDeliveryRepository::new());
    let encryptor = AesSecretEncryptor::new(&ENCRYPTION_KEY);
    let subscription_id = SubscriptionId::new();

    repository
        .save_subscription(WebhookSubscription::new(
            subscription_id,
            destination_url.as_str(),
            true,
        )?)
        .await;
    repository
        .add_secret(WebhookSecret::new(
            SecretId::new(),
            subscription_id,
            encryptor.encrypt(b"s1")?,
            true,
            Utc::now(),
        ))
        .await?;

    let attempt = DeliveryAttempt::new(
        NewDeliveryAttempt {
            subscription_id,
            idempotency_key: "k1".to_owned(),
            bot_id: None,
            event_type: WebhookTriggerType::BotStateChange,
            payload: json!({"state": "joined"}),
        },
        Utc::now(),
    )?;
    repository.save_attempt(&attempt).await?;

    let service = WebhookDeliveryService::new(
        repository.clone(),
        Arc::new(HttpWebhookSender::with_timeout(Duration::from_secs(5))?),
        Arc::new(HmacPayloadSigner::new()),
        Arc::new(encryptor),
        Arc::new(TracingDeliveryEventSink::new()),
        5,
    );

    Ok(Flow {
        repository,
        service,
        attempt,
    })
}

#[tokio::test]
async fn delivered_body_is_canonical_and_signed() -> AppResult<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let flow = flow(server.uri()).await?;
    let report = flow
        .service
        .deliver(flow.attempt.id().to_string().as_str())
        .await?;

    assert_eq!(report.outcome, DeliveryOutcome::Delivered);

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(
        request.body.as_slice(),
        br#"{"bot_id":null,"data":{"state":"joined"},"idempotency_key":"k1","trigger":"bot.state_change"}"#
    );

    let signature = request
        .headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    assert_eq!(
        signature,
        Some(HmacPayloadSigner::new().sign(request.body.as_slice(), b"s1")?)
    );
    assert_eq!(
        signature.as_deref(),
        Some("mV6Tj/L4V64W0HM/JdwKdyFq0gM5ILX82GQqOSrIg3A=")
    );

    let stored = flow.repository.find_attempt(flow.attempt.id()).await?;
    assert!(matches!(
        stored,
        Some(attempt) if attempt.status() == DeliveryStatus::Success
            && attempt.response_body_list() == ["ok".to_owned()]
            && attempt.succeeded_at().is_some()
    ));
    Ok(())
}

#[tokio::test]
async fn retries_keep_the_same_idempotency_key() -> AppResult<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let flow = flow(server.uri()).await?;
    let first = flow.service.deliver_attempt(flow.attempt.id()).await?;
    let second = flow.service.deliver_attempt(flow.attempt.id()).await?;

    assert_eq!(first.outcome, DeliveryOutcome::Failed);
    assert_eq!(second.outcome, DeliveryOutcome::Delivered);
    assert_eq!(second.attempt_count, 2);

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body, requests[1].body);

    let stored = flow.repository.find_attempt(flow.attempt.id()).await?;
    assert!(matches!(
        stored,
        Some(attempt) if attempt.response_body_list() == ["busy".to_owned(), String::new()]
            && attempt.response_status_code() == Some(204)
    ));
    Ok(())
}
