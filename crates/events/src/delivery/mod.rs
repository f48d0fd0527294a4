//! Outbound delivery of notifications.
//!
//! [`payload`] builds the JSON message shared by every transport and
//! [`webhook`] posts it to an external chat webhook.

pub mod payload;
pub mod webhook;
