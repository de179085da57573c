//! Chat translators: upstream record stream to OpenAI chat completions.

use std::pin::pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use super::{FrameResult, StreamState, TranslateOptions, TranslatorContext};
use crate::error::AdapterError;
use crate::protocol::openai::ChatCompletion;
use crate::protocol::upstream::{UpstreamEnvelope, UpstreamRecord};
use crate::stream::line::decode_record_line;
use crate::stream::{with_idle_timeout, LineParser};
use crate::util::next_completion_id;

async fn record_frames(
    state: &mut StreamState,
    ctx: &TranslatorContext,
    options: &TranslateOptions,
    line: &str,
) -> Vec<String> {
    let Some(envelope) = decode_record_line::<UpstreamEnvelope>(line) else {
        return Vec::new();
    };
    let (meta, record) = envelope.into_record();
    state.absorb_meta(&meta);

    let mut frames = Vec::new();
    if let Some(role) = state.role_frame() {
        frames.push(role);
    }

    match record {
        UpstreamRecord::ImageProgress(progress) => {
            if state.show_thinking() {
                if let Some(frame) = state.open_think() {
                    frames.push(frame);
                }
                let index = progress.image_index.unwrap_or(0) + 1;
                let percent = progress
                    .progress
                    .as_ref()
                    .and_then(|p| p.as_percent())
                    .unwrap_or(0.0);
                frames.push(
                    state.content_frame(format!("Generating image {index}, progress {percent}%\n")),
                );
            }
        }
        UpstreamRecord::ModelResponse(model_response) => {
            frames.extend(state.flush_think(model_response.message.as_deref()));
            for url in &model_response.generated_image_urls {
                let markdown = ctx.image_markdown(url, options.image_format).await;
                frames.push(state.content_frame(markdown));
            }
            if let Some(hash) = model_response.metadata_model_hash() {
                state.set_fingerprint(hash);
            }
        }
        UpstreamRecord::Token { text, thinking } => {
            frames.extend(state.token_frames(&text, thinking));
        }
        UpstreamRecord::VideoProgress { .. } | UpstreamRecord::Unrecognized => {}
    }
    frames
}

/// Translate a streaming chat response into OpenAI SSE frames.
///
/// Emits the role announcement on the first record, balanced reasoning
/// markers, rewritten image markdown, and always terminates with a finish
/// chunk and the `[DONE]` sentinel. An idle upstream surfaces
/// [`AdapterError::IdleTimeout`] after the stream is closed out.
pub fn chat_stream<S>(
    input: S,
    options: TranslateOptions,
    ctx: TranslatorContext,
    idle_timeout: Duration,
) -> impl Stream<Item = FrameResult>
where
    S: Stream<Item = Result<Bytes, AdapterError>>,
{
    async_stream::stream! {
        let mut state = StreamState::new(&options);
        let mut parser = LineParser::new();
        let mut failure: Option<AdapterError> = None;

        {
            let mut input = pin!(with_idle_timeout(input, idle_timeout));
            'read: while let Some(item) = input.next().await {
                match item {
                    Ok(chunk) => {
                        parser.feed(&chunk);
                        while let Some(line) = parser.next_line() {
                            for frame in record_frames(&mut state, &ctx, &options, &line).await {
                                yield Ok(frame);
                            }
                        }
                    }
                    Err(err) => {
                        failure = Some(err);
                        break 'read;
                    }
                }
            }
        }

        if failure.is_none() {
            if let Some(line) = parser.finish() {
                for frame in record_frames(&mut state, &ctx, &options, &line).await {
                    yield Ok(frame);
                }
            }
        }

        match failure {
            None => {
                for frame in state.finish_frames() {
                    yield Ok(frame);
                }
            }
            Some(err) if state.role_announced() => {
                tracing::warn!(error = %err, "chat stream failed mid-response; closing out");
                for frame in state.finish_frames() {
                    yield Ok(frame);
                }
                yield Err(err);
            }
            Some(err) => {
                tracing::error!(error = %err, "chat stream failed");
                yield Err(err);
            }
        }
    }
}

/// Collect a full chat response. Upstream failures are logged and the
/// best-effort partial accumulation is returned.
pub async fn chat_collect<S>(
    input: S,
    options: TranslateOptions,
    ctx: TranslatorContext,
    idle_timeout: Duration,
) -> ChatCompletion
where
    S: Stream<Item = Result<Bytes, AdapterError>>,
{
    let mut state = StreamState::new(&options);
    let mut parser = LineParser::new();
    let mut response_id: Option<String> = None;
    let mut content = String::new();

    let mut handle_line = |line: String| -> Option<Vec<String>> {
        decode_record_line::<UpstreamEnvelope>(&line).map(|envelope| {
            let (meta, record) = envelope.into_record();
            state.absorb_meta(&meta);
            match record {
                UpstreamRecord::ModelResponse(model_response) => {
                    if let Some(id) = &model_response.response_id {
                        response_id = Some(id.clone());
                    }
                    if let Some(message) = &model_response.message {
                        content = message.clone();
                    }
                    if let Some(hash) = model_response.metadata_model_hash() {
                        state.set_fingerprint(hash);
                    }
                    model_response.generated_image_urls
                }
                _ => Vec::new(),
            }
        })
    };

    let mut image_urls: Vec<String> = Vec::new();
    {
        let mut input = pin!(with_idle_timeout(input, idle_timeout));
        while let Some(item) = input.next().await {
            match item {
                Ok(chunk) => {
                    parser.feed(&chunk);
                    while let Some(line) = parser.next_line() {
                        if let Some(urls) = handle_line(line) {
                            image_urls.extend(urls);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "chat collect interrupted; returning partial result");
                    break;
                }
            }
        }
        if let Some(line) = parser.finish() {
            if let Some(urls) = handle_line(line) {
                image_urls.extend(urls);
            }
        }
    }

    if !image_urls.is_empty() {
        content.push('\n');
        for url in &image_urls {
            content.push_str(&ctx.image_markdown(url, options.image_format).await);
        }
    }

    let id = response_id.unwrap_or_else(next_completion_id);
    ChatCompletion::single(
        &id,
        state.created(),
        &options.model,
        state.fingerprint(),
        content,
        None,
        "stop",
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{AppConfig, ImageFormat};
    use crate::ledger::{ImageOriginLedger, MemoryStore};
    use crate::media::{MediaFetcher, MediaKind};
    use async_trait::async_trait;
    use futures_util::stream;

    struct StubMedia;

    #[async_trait]
    impl MediaFetcher for StubMedia {
        async fn resolve_url(&self, path_or_url: &str, kind: MediaKind, _credential: &str) -> String {
            format!(
                "https://app.example/v1/files/{}{}",
                kind.path_segment(),
                crate::media::asset_path(path_or_url)
            )
        }

        async fn to_base64(
            &self,
            _path_or_url: &str,
            _kind: MediaKind,
            _credential: &str,
        ) -> Option<String> {
            Some("data:image/jpeg;base64,QUJD".to_string())
        }

        async fn upscale_video_url(&self, video_url: &str, _credential: &str) -> String {
            video_url.to_string()
        }
    }

    fn test_ctx() -> TranslatorContext {
        TranslatorContext::new(
            &AppConfig::default(),
            Arc::new(StubMedia),
            ImageOriginLedger::new(Arc::new(MemoryStore::new())),
            "sso-token",
        )
    }

    fn options() -> TranslateOptions {
        TranslateOptions {
            model: "grok-3".to_string(),
            show_thinking: true,
            image_format: ImageFormat::Url,
            filter_tags: Vec::new(),
            client_type: None,
        }
    }

    fn byte_stream(
        lines: &[&str],
    ) -> impl Stream<Item = Result<Bytes, AdapterError>> {
        let chunks: Vec<Result<Bytes, AdapterError>> = lines
            .iter()
            .map(|l| Ok(Bytes::from(format!("{l}\n"))))
            .collect();
        stream::iter(chunks)
    }

    fn contents(frames: &[String]) -> String {
        frames
            .iter()
            .filter(|f| f.starts_with("data: {"))
            .map(|f| {
                let json: serde_json::Value =
                    serde_json::from_str(f.trim_start_matches("data: ").trim()).unwrap();
                json["choices"][0]["delta"]["content"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn full_stream_scenario() {
        let input = byte_stream(&[
            r#"{"result":{"response":{"token":"reasoning","isThinking":true,"responseId":"r1","llmInfo":{"modelHash":"fp"}}}}"#,
            r#"{"result":{"response":{"token":"answer","isThinking":false}}}"#,
        ]);
        let frames: Vec<String> = chat_stream(input, options(), test_ctx(), Duration::from_secs(5))
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(contents(&frames), "<think>\nreasoning</think>\nanswer");
        assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");

        let first: serde_json::Value =
            serde_json::from_str(frames[0].trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(first["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(first["id"], "r1");
        assert_eq!(first["system_fingerprint"], "fp");
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let input = byte_stream(&[
            "not json",
            "",
            r#"{"result":{"response":{"token":"ok"}}}"#,
        ]);
        let frames: Vec<String> = chat_stream(input, options(), test_ctx(), Duration::from_secs(5))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(contents(&frames), "ok");
    }

    #[tokio::test]
    async fn generated_images_become_markdown() {
        let input = byte_stream(&[
            r#"{"result":{"response":{"modelResponse":{"message":"here","generatedImageUrls":["users/u/abc/generated-1/image.jpg"]}}}}"#,
        ]);
        let frames: Vec<String> = chat_stream(input, options(), test_ctx(), Duration::from_secs(5))
            .map(|r| r.unwrap())
            .collect()
            .await;
        let text = contents(&frames);
        assert!(
            text.contains(
                "![generated-1](https://app.example/v1/files/image/users/u/abc/generated-1/image.jpg)\n"
            ),
            "unexpected content: {text}"
        );
    }

    #[tokio::test]
    async fn idle_timeout_closes_stream_then_errors() {
        let input = byte_stream(&[r#"{"result":{"response":{"token":"partial"}}}"#])
            .chain(stream::pending());
        let results: Vec<FrameResult> =
            chat_stream(input, options(), test_ctx(), Duration::from_millis(30))
                .collect()
                .await;

        let frames: Vec<String> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().cloned())
            .collect();
        assert!(frames.iter().any(|f| f == "data: [DONE]\n\n"));
        assert!(matches!(
            results.last(),
            Some(Err(AdapterError::IdleTimeout { .. }))
        ));
    }

    #[tokio::test]
    async fn transport_failure_closes_stream_then_errors() {
        let chunks: Vec<Result<Bytes, AdapterError>> = vec![
            Ok(Bytes::from("{\"result\":{\"response\":{\"token\":\"hello\"}}}\n")),
            Err(AdapterError::Transport("connection reset".to_string())),
        ];
        let results: Vec<FrameResult> = chat_stream(
            stream::iter(chunks),
            options(),
            test_ctx(),
            Duration::from_secs(5),
        )
        .collect()
        .await;

        let frames: Vec<String> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().cloned())
            .collect();
        assert!(frames
            .iter()
            .any(|f| f.contains("\"finish_reason\":\"stop\"")));
        assert!(frames.iter().any(|f| f == "data: [DONE]\n\n"));
        assert!(matches!(
            results.last(),
            Some(Err(AdapterError::Transport(_)))
        ));
    }

    #[tokio::test]
    async fn collect_accumulates_message_and_images() {
        let input = byte_stream(&[
            r#"{"result":{"response":{"token":"ignored","isThinking":true}}}"#,
            r#"{"result":{"response":{"modelResponse":{"responseId":"r9","message":"done","generatedImageUrls":["users/u/abc/gen/image.jpg"]}}}}"#,
        ]);
        let completion =
            chat_collect(input, options(), test_ctx(), Duration::from_secs(5)).await;
        assert_eq!(completion.id, "r9");
        assert!(completion.choices[0].message.content.starts_with("done\n!["));
        assert_eq!(completion.choices[0].finish_reason, "stop");
        assert_eq!(completion.usage.total_tokens, 0);
    }

    #[tokio::test]
    async fn collect_survives_midstream_error() {
        let chunks: Vec<Result<Bytes, AdapterError>> = vec![
            Ok(Bytes::from(
                "{\"result\":{\"response\":{\"modelResponse\":{\"message\":\"partial\"}}}}\n",
            )),
            Err(AdapterError::Transport("connection reset".to_string())),
        ];
        let completion = chat_collect(
            stream::iter(chunks),
            options(),
            test_ctx(),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(completion.choices[0].message.content, "partial");
    }
}
