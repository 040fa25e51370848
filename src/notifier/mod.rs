pub mod mock;
pub mod noop;
pub mod publisher;
pub mod variant;
pub mod webhook;

pub use mock::MockNotifier;
pub use noop::NoopNotifier;
pub use publisher::NotificationPublisher;
pub use variant::NotifierVariant;
pub use webhook::WebhookNotifier;
