//! HTTP client with retry, backoff and error classification.
//!
//! Every response is classified into a [`FetchOutcome`] first; the retry
//! loop only ever looks at the outcome.

use std::thread;
use std::time::Duration;

use log::warn;

use crate::exit_codes;
use crate::CliError;

pub(super) const MAX_RETRIES: u32 = 3;
pub(super) const USER_AGENT: &str = concat!("ordercheck/", env!("CARGO_PKG_VERSION"));

#[derive(Debug)]
pub(super) enum FetchOutcome {
    Ok(serde_json::Value),
    /// Worth another attempt after `wait` (or the client's backoff).
    Retryable {
        status: Option<u16>,
        wait: Option<Duration>,
        message: String,
    },
    Fatal(CliError),
}

pub(super) struct FetchClient {
    pub(super) http: reqwest::blocking::Client,
    source_name: String,
    initial_backoff: Duration,
}

impl FetchClient {
    pub(super) fn new(source_name: &str) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            source_name: source_name.to_string(),
            initial_backoff: Duration::from_secs(1),
        }
    }

    #[cfg(test)]
    pub(super) fn with_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Send a request built by `build_request` until it succeeds, fails
    /// fatally or runs out of retries.
    pub(super) fn send_with_retry(
        &self,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<serde_json::Value, CliError> {
        let mut backoff = self.initial_backoff;

        for attempt in 0..=MAX_RETRIES {
            match self.classify(build_request(&self.http).send()) {
                FetchOutcome::Ok(body) => return Ok(body),
                FetchOutcome::Fatal(err) => return Err(err),
                FetchOutcome::Retryable { status, wait, message } => {
                    if attempt == MAX_RETRIES {
                        let (code, what) = match status {
                            Some(429) => (exit_codes::EXIT_FETCH_RATE_LIMIT, "rate limited"),
                            _ => (exit_codes::EXIT_FETCH_UPSTREAM, "upstream error"),
                        };
                        return Err(CliError::new(
                            code,
                            format!(
                                "{} {what} after {MAX_RETRIES} retries: {message}",
                                self.source_name
                            ),
                        ));
                    }

                    let wait = wait.unwrap_or(backoff);
                    warn!(
                        "retry {}/{MAX_RETRIES} in {}ms ({message})",
                        attempt + 1,
                        wait.as_millis()
                    );
                    thread::sleep(wait);
                    backoff *= 2;
                }
            }
        }

        unreachable!("retry loop always returns")
    }

    pub(super) fn classify(
        &self,
        result: Result<reqwest::blocking::Response, reqwest::Error>,
    ) -> FetchOutcome {
        let resp = match result {
            Ok(resp) => resp,
            // Network/timeout errors: retry
            Err(e) => {
                return FetchOutcome::Retryable {
                    status: None,
                    wait: None,
                    message: e.to_string(),
                }
            }
        };

        let status = resp.status().as_u16();

        if status == 429 || status >= 500 {
            let wait = if status == 429 {
                resp.headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .map(Duration::from_secs_f64)
            } else {
                None
            };
            return FetchOutcome::Retryable {
                status: Some(status),
                wait,
                message: format!("HTTP {status}"),
            };
        }

        let text = match resp.text() {
            Ok(text) => text,
            Err(e) => {
                return FetchOutcome::Retryable {
                    status: Some(status),
                    wait: None,
                    message: format!("cannot read response body: {e}"),
                }
            }
        };
        let body: serde_json::Value = serde_json::from_str(text.trim_start_matches('\u{feff}'))
            .unwrap_or(serde_json::Value::Null);

        if status == 401 || status == 403 {
            return FetchOutcome::Fatal(CliError::new(
                exit_codes::EXIT_FETCH_AUTH,
                format!("{} auth failed ({status}): {}", self.source_name, error_text(&body, &text)),
            ));
        }
        if status >= 400 {
            return FetchOutcome::Fatal(CliError::new(
                exit_codes::EXIT_FETCH_VALIDATION,
                format!(
                    "{} request rejected ({status}): {}",
                    self.source_name,
                    error_text(&body, &text)
                ),
            ));
        }
        if body.is_null() {
            return FetchOutcome::Fatal(CliError::new(
                exit_codes::EXIT_FETCH_UPSTREAM,
                format!(
                    "{} returned invalid JSON (body: {})",
                    self.source_name,
                    text.chars().take(200).collect::<String>()
                ),
            ));
        }

        FetchOutcome::Ok(body)
    }
}

/// Best-effort error message from a Shopify error body.
pub(super) fn error_text(body: &serde_json::Value, raw: &str) -> String {
    if let Some(s) = body["errors"].as_str() {
        return s.to_string();
    }
    if let Some(errors) = body["errors"].as_array() {
        let msgs: Vec<&str> = errors.iter().filter_map(|e| e["message"].as_str()).collect();
        if !msgs.is_empty() {
            return msgs.join("; ");
        }
    }
    if let Some(s) = body["error_description"].as_str().or(body["error"].as_str()) {
        return s.to_string();
    }
    raw.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client() -> FetchClient {
        FetchClient::new("Shopify").with_backoff(Duration::from_millis(1))
    }

    #[test]
    fn error_text_shapes() {
        let body = serde_json::json!({"errors": [{"message": "Throttled"}, {"message": "again"}]});
        assert_eq!(error_text(&body, ""), "Throttled; again");
        let body = serde_json::json!({"errors": "[API] Invalid API key"});
        assert_eq!(error_text(&body, ""), "[API] Invalid API key");
        assert_eq!(error_text(&serde_json::Value::Null, "plain"), "plain");
    }

    #[test]
    fn retries_server_errors_then_gives_up() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503);
        });

        let err = client()
            .send_with_retry(|http| http.get(server.url("/flaky")))
            .unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_FETCH_UPSTREAM);
        assert!(err.message.contains("upstream error"), "message: {}", err.message);
        mock.assert_calls(4);
    }

    #[test]
    fn rate_limit_honours_retry_after() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/throttled");
            then.status(429).header("retry-after", "0");
        });

        let err = client()
            .send_with_retry(|http| http.get(server.url("/throttled")))
            .unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_FETCH_RATE_LIMIT);
        mock.assert_calls(4);
    }

    #[test]
    fn client_errors_are_fatal() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/denied");
            then.status(401)
                .json_body(serde_json::json!({"errors": "[API] Invalid API key or access token"}));
        });

        let err = client()
            .send_with_retry(|http| http.get(server.url("/denied")))
            .unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_FETCH_AUTH);
        assert!(err.message.contains("Invalid API key"));
        mock.assert_calls(1);
    }

    #[test]
    fn non_json_body_is_truncated_on_char_boundary() {
        let server = MockServer::start();
        // 'é' is two bytes; byte 200 falls inside one.
        let body = format!("a{}", "é".repeat(150));
        server.mock(|when, then| {
            when.method(GET).path("/html");
            then.status(200).body(&body);
        });

        let err = client()
            .send_with_retry(|http| http.get(server.url("/html")))
            .unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_FETCH_UPSTREAM);
        let shown = err.message.split("(body: ").nth(1).unwrap();
        assert_eq!(shown.trim_end_matches(')').chars().count(), 200);
    }

    #[test]
    fn success_returns_json() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/ok");
            then.status(200).json_body(serde_json::json!({"data": {"n": 1}}));
        });

        let body = client().send_with_retry(|http| http.get(server.url("/ok"))).unwrap();
        assert_eq!(body["data"]["n"], 1);
    }
}
