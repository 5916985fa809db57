//! Synchronous single-batch POST to the ingest endpoint, classifying
//! failures as retryable, non-retryable, or transient transport errors.

use std::time::Duration;

use crate::error::SendOutcome;
use crate::event::Event;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const ERROR_EXCERPT_MAX_BYTES: usize = 1024;

pub struct HttpSender {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    sdk_header_value: String,
}

impl HttpSender {
    pub fn new(endpoint: String, api_key: String, sdk_lang: &str, sdk_version: &str) -> HttpSender {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(REQUEST_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("build HTTP client");
        HttpSender {
            client,
            endpoint,
            api_key,
            sdk_header_value: format!("{sdk_lang}/{sdk_version}"),
        }
    }

    /// Sends one batch as a JSON array and classifies the result.
    pub fn send(&self, batch: &[Event], sdk_header_name: &str) -> SendOutcome {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header(sdk_header_name, &self.sdk_header_value)
            .json(batch)
            .send();

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                return SendOutcome::RetryableTransport { reason: e.to_string() };
            }
        };

        let status = response.status();
        if status.is_success() {
            return SendOutcome::Success;
        }

        let code = status.as_u16();
        let body = response.text().unwrap_or_default();
        let excerpt = truncate_excerpt(&body);

        if matches!(code, 429 | 500 | 502 | 503 | 504) {
            SendOutcome::RetryableServer { status: code, excerpt }
        } else {
            SendOutcome::NonRetryableServer { status: code, excerpt }
        }
    }
}

fn truncate_excerpt(body: &str) -> String {
    if body.len() <= ERROR_EXCERPT_MAX_BYTES {
        return body.to_string();
    }
    let mut end = ERROR_EXCERPT_MAX_BYTES;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event() -> Event {
        match json!({"method": "GET"}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn success_on_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sender = HttpSender::new(format!("{}/ingest", server.uri()), "key".into(), "rust", "0.1.0");
        let outcome = sender.send(&[event()], "x-peekapi-sdk");
        assert!(matches!(outcome, SendOutcome::Success));
    }

    #[tokio::test]
    async fn retryable_on_500() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let sender = HttpSender::new(format!("{}/ingest", server.uri()), "key".into(), "rust", "0.1.0");
        let outcome = sender.send(&[event()], "x-peekapi-sdk");
        assert!(outcome.is_retryable());
    }

    #[tokio::test]
    async fn non_retryable_on_400() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let sender = HttpSender::new(format!("{}/ingest", server.uri()), "key".into(), "rust", "0.1.0");
        let outcome = sender.send(&[event()], "x-peekapi-sdk");
        assert!(!outcome.is_retryable());
        assert!(matches!(outcome, SendOutcome::NonRetryableServer { status: 400, .. }));
    }
}
