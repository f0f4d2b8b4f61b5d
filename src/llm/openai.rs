//! OpenAI chat-completions client.
//!
//! Plain completions go through `complete`; `stream` sets `"stream": true`
//! and decodes the server-sent events into text deltas.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{ChatMessage, LanguageModel, LlmError, LlmResult, TokenStream};
use crate::embedding::openai::OPENAI_API_BASE;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest silence tolerated between two reads of a response.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the OpenAI `/v1/chat/completions` endpoint.
///
/// There is no limit on the total request time, so a long streamed answer is
/// never cut off while tokens keep arriving. A stalled connection still fails
/// after the read timeout.
#[derive(Debug, Clone)]
pub struct OpenAIChat {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

fn build_client(read_timeout: Duration) -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(read_timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

impl OpenAIChat {
    /// Create a client for `model` sampling at `temperature`.
    pub fn new(api_key: String, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client: build_client(DEFAULT_READ_TIMEOUT),
            api_key,
            base_url: OPENAI_API_BASE.to_string(),
            model: model.into(),
            temperature,
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.client = build_client(read_timeout);
        self
    }

    /// Point the client at a different OpenAI-compatible base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> LlmResult<reqwest::Response> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream,
        };

        debug!(model = %self.model, messages = messages.len(), stream, "Sending chat completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!("HTTP {}: {}", status, body)));
        }

        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for OpenAIChat {
    async fn complete(&self, messages: &[ChatMessage]) -> LlmResult<String> {
        let response: ChatCompletionResponse = self
            .send(messages, false)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".to_string()))
    }

    async fn stream(&self, messages: &[ChatMessage]) -> LlmResult<TokenStream> {
        let response = self.send(messages, true).await?;

        struct State {
            response: Option<reqwest::Response>,
            decoder: SseDecoder,
            pending: VecDeque<String>,
        }

        let state = State {
            response: Some(response),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
        };

        let deltas = stream::unfold(state, |mut st| async move {
            loop {
                if let Some(delta) = st.pending.pop_front() {
                    return Some((Ok(delta), st));
                }
                if st.decoder.is_done() {
                    return None;
                }
                let response = st.response.as_mut()?;
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        let parsed = st.decoder.feed(&bytes);
                        st.pending.extend(parsed);
                    }
                    Ok(None) => return None,
                    Err(e) => {
                        st.response = None;
                        return Some((Err(LlmError::StreamError(e.to_string())), st));
                    }
                }
            }
        });

        Ok(Box::pin(deltas))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Incremental decoder for the chat-completions event stream.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence, so
/// lines are assembled from raw bytes before decoding.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    /// Feed raw bytes and return the content deltas completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut deltas = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.done {
                continue;
            }
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                self.done = true;
                continue;
            }

            if let Ok(event) = serde_json::from_str::<Value>(data) {
                if let Some(delta) = event
                    .get("choices")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("delta"))
                    .and_then(|d| d.get("content"))
                    .and_then(|c| c.as_str())
                {
                    if !delta.is_empty() {
                        deltas.push(delta.to_string());
                    }
                }
            }
        }

        deltas
    }

    /// Whether the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HttpFixture, Reply};
    use futures_util::StreamExt;

    fn event(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n\n",
            serde_json::to_string(content).unwrap()
        )
    }

    #[test]
    fn test_decoder_extracts_deltas_and_done() {
        let mut decoder = SseDecoder::default();
        let payload = format!("{}{}data: [DONE]\n\n", event("Hello"), event(", world"));

        let deltas = decoder.feed(payload.as_bytes());

        assert_eq!(deltas, vec!["Hello".to_string(), ", world".to_string()]);
        assert!(decoder.is_done());
    }

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::default();
        let payload = event("Graph neural networks");
        let (head, tail) = payload.as_bytes().split_at(17);

        assert!(decoder.feed(head).is_empty());
        assert_eq!(decoder.feed(tail), vec!["Graph neural networks".to_string()]);
        assert!(!decoder.is_done());
    }

    #[test]
    fn test_decoder_handles_split_utf8() {
        let mut decoder = SseDecoder::default();
        let payload = event("café");
        let bytes = payload.as_bytes();
        let split = payload.find('é').unwrap() + 1;

        assert!(decoder.feed(&bytes[..split]).is_empty());
        assert_eq!(decoder.feed(&bytes[split..]), vec!["café".to_string()]);
    }

    #[test]
    fn test_decoder_skips_role_only_and_comment_lines() {
        let mut decoder = SseDecoder::default();
        let payload = ": keep-alive\n\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n";
        assert!(decoder.feed(payload.as_bytes()).is_empty());
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })
    }

    fn client(server: &HttpFixture) -> OpenAIChat {
        OpenAIChat::new("sk-test".to_string(), "gpt-3.5-turbo", 0.0).with_base_url(format!("{}/v1/", server.url()))
    }

    #[tokio::test]
    async fn test_complete_posts_messages_and_reads_first_choice() {
        let server = HttpFixture::start().await;
        server.push(Reply::json(200, &completion("Message passing aggregates neighbours [1].")));

        let answer = client(&server)
            .complete(&[ChatMessage::system("cite sources"), ChatMessage::user("how?")])
            .await
            .unwrap();

        assert_eq!(answer, "Message passing aggregates neighbours [1].");
        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].target, "/v1/chat/completions");
        assert_eq!(requests[0].header("authorization"), Some("Bearer sk-test"));

        let body: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "how?");
        assert!(body.get("stream").is_none());
    }

    #[tokio::test]
    async fn test_stream_yields_deltas_as_they_arrive() {
        let server = HttpFixture::start().await;
        server.push(Reply::event_stream(
            vec![event("Graph "), event("networks "), event("[1]"), "data: [DONE]\n\n".to_string()],
            Duration::from_millis(20),
        ));

        let deltas: Vec<String> = client(&server)
            .stream(&[ChatMessage::user("what are GNNs?")])
            .await
            .unwrap()
            .map(|d| d.unwrap())
            .collect()
            .await;

        assert_eq!(deltas, vec!["Graph ", "networks ", "[1]"]);
        let body: Value = serde_json::from_str(&server.requests()[0].body).unwrap();
        assert_eq!(body["stream"], true);
    }

    #[tokio::test]
    async fn test_stream_outlives_read_timeout_while_tokens_flow() {
        let server = HttpFixture::start().await;
        let parts: Vec<String> = (0..6).map(|i| event(&format!("t{} ", i))).collect();
        server.push(Reply::event_stream(parts, Duration::from_millis(100)));

        // 600ms in total, never more than 100ms between reads
        let text: String = client(&server)
            .with_read_timeout(Duration::from_millis(400))
            .stream(&[ChatMessage::user("long answer")])
            .await
            .unwrap()
            .map(|d| d.unwrap())
            .collect::<Vec<_>>()
            .await
            .concat();

        assert_eq!(text, "t0 t1 t2 t3 t4 t5 ");
    }

    #[tokio::test]
    async fn test_stalled_stream_fails_after_read_timeout() {
        let server = HttpFixture::start().await;
        server.push(Reply::event_stream(vec![event("late")], Duration::from_millis(800)));

        let mut deltas = client(&server)
            .with_read_timeout(Duration::from_millis(200))
            .stream(&[ChatMessage::user("hello")])
            .await
            .unwrap();

        assert!(matches!(deltas.next().await, Some(Err(LlmError::StreamError(_)))));
    }

    #[tokio::test]
    async fn test_http_error_is_api_error() {
        let server = HttpFixture::start().await;
        server.push(Reply::bytes(500, "text/plain", b"upstream overloaded".to_vec()));

        let result = client(&server).complete(&[ChatMessage::user("hello")]).await;

        match result {
            Err(LlmError::ApiError(message)) => assert!(message.contains("upstream overloaded")),
            other => panic!("expected ApiError, got {:?}", other),
        }
    }

    #[test]
    fn test_request_omits_stream_flag_when_false() {
        let messages = vec![ChatMessage::user("hi")];
        let request = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            temperature: 0.0,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("stream").is_none());
        assert_eq!(json["temperature"], 0.0);
    }
}
