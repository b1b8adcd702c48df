use bytes::Bytes;
use hostwise_common::{HeaderMap, HostwiseError, Method, RequestOptions, Response, Result};
use std::time::Duration;
use tokio::sync::oneshot;

/// A submitted request and the state the dispatcher tracks for it.
///
/// The body and headers are encoded once at submission, so a task can be
/// re-sent after a retry or redirect without touching the caller's options.
pub(crate) struct Task {
    /// Pinned registry index; set by the caller or by a leader redirect
    pub host: Option<usize>,
    pub allow_dirty_read: bool,
    /// Connection refusals absorbed so far
    pub retries: u32,
    pub conflict_retries_left: u32,
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub timeout: Option<Duration>,
    pub expect_binary: bool,
    reply: oneshot::Sender<Result<Response>>,
}

impl Task {
    /// Builds a task from caller options.
    ///
    /// `default_conflict_retries` applies when the options do not set their
    /// own conflict retry count.
    pub fn from_options(
        options: RequestOptions,
        default_conflict_retries: u32,
        reply: oneshot::Sender<Result<Response>>,
    ) -> Result<Self> {
        let (body, content_type) = options.encode_body()?;
        let headers = options.header_map(content_type)?;

        Ok(Self {
            host: options.host,
            allow_dirty_read: options.allow_dirty_read,
            retries: 0,
            conflict_retries_left: options.retry_on_conflict.unwrap_or(default_conflict_retries),
            path_and_query: options.path_and_query(),
            method: options.method,
            headers,
            body,
            timeout: options.timeout,
            expect_binary: options.expect_binary,
            reply,
        })
    }

    pub fn resolve(self, response: Response) {
        // The caller may have stopped waiting
        let _ = self.reply.send(Ok(response));
    }

    pub fn reject(self, error: HostwiseError) {
        let _ = self.reply.send(Err(error));
    }
}
