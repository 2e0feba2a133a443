//! HTTP header names of the toll protocol.

/// Client → server payment proof header, carrying `Toll <txRef>`.
pub const PAYMENT_HEADER: &str = "X-Payment";

/// Server → client correlation id, stamped on every gated response.
///
/// The value keys the decision trail at `GET /ledger/entries/{id}`.
pub const CORRELATION_HEADER: &str = "Toll-Correlation-Id";

/// Server → client protocol version, advertised on 402 responses.
pub const PROTOCOL_HEADER: &str = "Toll-Protocol";
