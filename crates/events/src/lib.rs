//! Live progress fan-out for media jobs.
//!
//! [`NotificationHub`] keeps one subscriber group per fingerprint and
//! multicasts [`ProgressEvent`](mediaflow_core::job_events::ProgressEvent)s
//! to it. It is designed to be shared via `Arc<NotificationHub>`.

pub mod hub;

pub use hub::{HubMessage, NotificationHub, SubscriberHandle, Subscription};
