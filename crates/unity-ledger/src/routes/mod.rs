// Framework-agnostic route handlers.
//
// Each handler takes the shared context plus a typed request and returns a
// typed response or an `ApiError`. The HTTP layer (unity-ledger-axum, or
// your own) does transport only: extract the body, identify the caller,
// call the handler, serialize the result.

pub mod balance;
pub mod ok;
pub mod payments;
pub mod transfer;
pub mod webhook;
