//! Push notification logic: the eligibility filter, message composition,
//! Web Push delivery and the two periodic jobs that drive them.

pub mod compose;
pub mod eligibility;
pub mod encryption;
pub mod push;
pub mod scheduler;
pub mod templates;

pub use compose::{Composed, Decision};
pub use eligibility::Rejection;
pub use encryption::EncryptionError;
pub use push::{PushError, PushSender, VapidConfig, WebPushSender, deliver};
