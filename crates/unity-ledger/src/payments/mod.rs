// Payment flows: session creation and webhook reconciliation.

pub mod sessions;
pub mod webhook;
