mod events;
mod queue;
mod repository;
mod secrets;
mod sender;

pub use events::{DeliveryEvent, DeliveryEventSink};
pub use queue::{ClaimedDeliveryJob, DeliveryJobQueue};
pub use repository::WebhookDeliveryRepository;
pub use secrets::{PayloadSigner, SecretEncryptor};
pub use sender::{WebhookSendRequest, WebhookSender};
