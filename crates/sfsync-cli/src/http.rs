//! Blocking HTTP plumbing shared by the Secureframe and GitHub clients.

use std::time::Duration;

use anyhow::anyhow;
use sfsync_core::config::HttpConfig;
use sfsync_core::render::truncate;
use tracing::warn;

/// Longest response excerpt quoted in an error message.
const ERROR_BODY_LIMIT: usize = 300;

/// Agent with the configured per-request deadline.
pub fn agent(config: &HttpConfig) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(concat!("sfsync/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Issue a request, repeating it once after `retry_delay` on a 5xx status.
///
/// `send` builds and sends a fresh request on every call. A second 5xx, or
/// any other error, is returned as is.
pub fn send_with_retry(
    retry_delay: Duration,
    mut send: impl FnMut() -> Result<ureq::Response, ureq::Error>,
) -> Result<ureq::Response, ureq::Error> {
    match send() {
        Err(ureq::Error::Status(status, _)) if status >= 500 => {
            warn!(status, ?retry_delay, "server error, retrying once");
            std::thread::sleep(retry_delay);
            send()
        }
        other => other,
    }
}

/// Turn a failed request into an error quoting status and response excerpt.
pub fn describe(err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            let body = body.trim();
            if body.is_empty() {
                anyhow!("unexpected status code {status}")
            } else {
                anyhow!(
                    "unexpected status code {status}: {}",
                    truncate(body, ERROR_BODY_LIMIT)
                )
            }
        }
        ureq::Error::Transport(transport) => anyhow::Error::new(transport),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn status(code: u16, body: &str) -> Result<ureq::Response, ureq::Error> {
        let response = ureq::Response::new(code, "status", body).expect("synthetic response");
        if code >= 400 {
            Err(ureq::Error::Status(code, response))
        } else {
            Ok(response)
        }
    }

    #[test]
    fn server_error_is_retried_once() {
        let calls = Cell::new(0);
        let response = send_with_retry(Duration::ZERO, || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                status(502, "bad gateway")
            } else {
                status(200, "{}")
            }
        })
        .expect("retry succeeds");

        assert_eq!(response.status(), 200);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn second_server_error_is_returned() {
        let calls = Cell::new(0);
        let err = send_with_retry(Duration::ZERO, || {
            calls.set(calls.get() + 1);
            status(503, "unavailable")
        })
        .expect_err("both attempts fail");

        assert_eq!(calls.get(), 2);
        assert!(describe(err).to_string().contains("503"));
    }

    #[test]
    fn client_errors_are_not_retried() {
        let calls = Cell::new(0);
        let err = send_with_retry(Duration::ZERO, || {
            calls.set(calls.get() + 1);
            status(401, "{\"message\":\"Bad credentials\"}")
        })
        .expect_err("401 is final");

        assert_eq!(calls.get(), 1);
        let message = describe(err).to_string();
        assert!(message.contains("401"));
        assert!(message.contains("Bad credentials"));
    }
}
