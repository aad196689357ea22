use chrono::{DateTime, Utc};
use courier_core::{AppError, AppResult, SecretId, SubscriptionId};
use url::Url;

/// Subscriber-registered webhook destination.
///
/// The URL is kept as stored; [`WebhookSubscription::destination_url`] checks
/// it at delivery time so a bad stored value fails the attempt instead of the
/// load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSubscription {
    id: SubscriptionId,
    url: String,
    is_active: bool,
}

impl WebhookSubscription {
    /// Creates a subscription, validating the destination URL.
    pub fn new(id: SubscriptionId, url: &str, is_active: bool) -> AppResult<Self> {
        let url = parse_destination_url(url)?;
        Ok(Self {
            id,
            url: url.into(),
            is_active,
        })
    }

    /// Rehydrates a subscription from storage without validating the URL.
    #[must_use]
    pub fn restore(id: SubscriptionId, url: String, is_active: bool) -> Self {
        Self { id, url, is_active }
    }

    /// Returns the subscription identifier.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the destination URL as stored.
    #[must_use]
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Parses the destination URL, requiring http or https.
    pub fn destination_url(&self) -> AppResult<Url> {
        parse_destination_url(self.url.as_str())
    }

    /// Returns whether deliveries to this subscription are allowed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }
}

fn parse_destination_url(url: &str) -> AppResult<Url> {
    let parsed = Url::parse(url.trim()).map_err(|error| {
        AppError::Validation(format!("invalid webhook subscription url '{url}': {error}"))
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::Validation(format!(
            "webhook subscription url must use http or https, got '{}'",
            parsed.scheme()
        )));
    }

    Ok(parsed)
}

/// One signing secret attached to a subscription.
///
/// The secret material is kept in its encrypted at-rest form; callers decrypt
/// it only for the duration of one signing operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSecret {
    id: SecretId,
    subscription_id: SubscriptionId,
    encrypted_secret: Vec<u8>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl WebhookSecret {
    /// Creates a secret from stored values.
    #[must_use]
    pub fn new(
        id: SecretId,
        subscription_id: SubscriptionId,
        encrypted_secret: Vec<u8>,
        is_active: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            subscription_id,
            encrypted_secret,
            is_active,
            created_at,
        }
    }

    /// Returns the secret identifier.
    #[must_use]
    pub fn id(&self) -> SecretId {
        self.id
    }

    /// Returns the owning subscription.
    #[must_use]
    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Returns the encrypted secret bytes.
    #[must_use]
    pub fn encrypted_secret(&self) -> &[u8] {
        self.encrypted_secret.as_slice()
    }

    /// Returns whether this secret may be used for signing.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Selects the most recently created active secret.
    #[must_use]
    pub fn current<'a>(secrets: impl IntoIterator<Item = &'a Self>) -> Option<&'a Self> {
        secrets
            .into_iter()
            .filter(|secret| secret.is_active)
            .max_by_key(|secret| secret.created_at)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use courier_core::{SecretId, SubscriptionId};

    use super::{WebhookSecret, WebhookSubscription};

    #[test]
    fn subscription_rejects_non_http_scheme() {
        let result = WebhookSubscription::new(SubscriptionId::new(), "ftp://example.com", true);
        assert!(result.is_err());
    }

    #[test]
    fn subscription_rejects_malformed_url() {
        let result = WebhookSubscription::new(SubscriptionId::new(), "not a url", true);
        assert!(result.is_err());
    }

    #[test]
    fn restored_subscription_defers_url_validation() {
        let subscription =
            WebhookSubscription::restore(SubscriptionId::new(), "ftp://example.com".to_owned(), true);

        assert_eq!(subscription.url(), "ftp://example.com");
        assert!(subscription.destination_url().is_err());
    }

    #[test]
    fn valid_destination_url_parses() {
        let subscription =
            WebhookSubscription::new(SubscriptionId::new(), "https://hooks.example.com/in", true)
                .unwrap_or_else(|error| panic!("subscription: {error}"));

        assert!(
            subscription
                .destination_url()
                .is_ok_and(|url| url.host_str() == Some("hooks.example.com"))
        );
    }

    #[test]
    fn current_secret_is_newest_active() {
        let subscription_id = SubscriptionId::new();
        let now = Utc::now();
        let older = WebhookSecret::new(
            SecretId::new(),
            subscription_id,
            b"older".to_vec(),
            true,
            now - Duration::days(2),
        );
        let newer = WebhookSecret::new(
            SecretId::new(),
            subscription_id,
            b"newer".to_vec(),
            true,
            now - Duration::days(1),
        );
        let newest_inactive = WebhookSecret::new(
            SecretId::new(),
            subscription_id,
            b"revoked".to_vec(),
            false,
            now,
        );

        let secrets = [older, newer.clone(), newest_inactive];
        let selected = WebhookSecret::current(&secrets);
        assert_eq!(selected.map(WebhookSecret::id), Some(newer.id()));
    }

    #[test]
    fn current_secret_is_none_without_active_secrets() {
        let secret = WebhookSecret::new(
            SecretId::new(),
            SubscriptionId::new(),
            b"revoked".to_vec(),
            false,
            Utc::now(),
        );
        assert!(WebhookSecret::current([&secret]).is_none());
    }
}
