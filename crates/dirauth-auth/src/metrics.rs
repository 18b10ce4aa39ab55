//! Metrics emitted by the directory client
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding application installs a recorder.

use metrics::counter;

/// Metric names
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "dirauth_connections_total";
    pub const ENDPOINT_FAILURES_TOTAL: &str = "dirauth_endpoint_failures_total";
    pub const AUTHENTICATIONS_TOTAL: &str = "dirauth_authentications_total";
}

pub(crate) fn record_connection(endpoint: &str) {
    counter!(names::CONNECTIONS_TOTAL, "endpoint" => endpoint.to_string()).increment(1);
}

pub(crate) fn record_endpoint_failure(endpoint: &str) {
    counter!(names::ENDPOINT_FAILURES_TOTAL, "endpoint" => endpoint.to_string()).increment(1);
}

/// `outcome` is `success` or an error code
pub(crate) fn record_authentication(outcome: &'static str) {
    counter!(names::AUTHENTICATIONS_TOTAL, "outcome" => outcome).increment(1);
}
