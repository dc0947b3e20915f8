pub mod adapters;
pub mod error;
pub mod templates;

pub use adapters::{
    EmailMessage, EmailRelayAdapter, NotificationAdapter, Outbound, SendResult, WebhookAdapter,
};
pub use error::NotificationError;
pub use templates::{
    EmailDefaults, EmailSpec, TemplateContext, cell_display_string, compose_email, linkify_urls,
    split_recipients, strip_html,
};
