pub mod attachment;
pub mod domain;
pub mod email;
pub mod id;
pub mod mailbox;
pub mod session;
pub mod setting;
pub mod tag;
pub mod user;
pub mod webhook;

pub use attachment::{Attachment, NewAttachment};
pub use domain::{Domain, DnsRecord};
pub use email::{Email, NewEmail};
pub use id::Id;
pub use mailbox::{Mailbox, MailboxDefaults};
pub use session::Session;
pub use setting::Setting;
pub use tag::Tag;
pub use user::User;
pub use webhook::{DeliveryStatus, PayloadType, RuleField, RuleOperator, Webhook, WebhookDelivery, WebhookRule};
