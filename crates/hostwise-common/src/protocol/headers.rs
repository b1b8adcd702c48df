//! Header names understood by the database service.

use http::HeaderName;

/// Carries the leader endpoint on a 503 response from a follower.
pub const LEADER_ENDPOINT: HeaderName = HeaderName::from_static("x-arango-endpoint");

/// Marks a request as tolerant of stale reads.
pub const ALLOW_DIRTY_READ: HeaderName = HeaderName::from_static("x-arango-allow-dirty-read");

/// Binds a request to a running stream transaction.
pub const TRANSACTION_ID: HeaderName = HeaderName::from_static("x-arango-trx-id");

/// Protocol version tag sent with every request.
pub const PROTOCOL_VERSION: HeaderName = HeaderName::from_static("x-arango-version");

/// On responses: seconds the request spent queued on the server.
/// On requests: the maximum queue time the client accepts.
pub const QUEUE_TIME_SECONDS: HeaderName = HeaderName::from_static("x-arango-queue-time-seconds");
