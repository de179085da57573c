//! Image generation translators: upstream record stream to named
//! `image_generation.*` SSE events, or a collected base64 list.

use std::pin::pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use super::{FrameResult, TranslatorContext};
use crate::error::AdapterError;
use crate::media::MediaKind;
use crate::protocol::openai::{
    image_event_frame, ImageCompletedEvent, ImagePartialEvent, IMAGE_COMPLETED_EVENT,
    IMAGE_PARTIAL_EVENT,
};
use crate::protocol::upstream::{UpstreamEnvelope, UpstreamRecord};
use crate::stream::line::decode_record_line;
use crate::stream::{with_idle_timeout, LineParser};

/// Strip a data-URI prefix from a base64 payload.
fn bare_base64(data: &str) -> &str {
    data.split_once(',').map_or(data, |(_, rest)| rest)
}

async fn fetch_final_images(ctx: &TranslatorContext, urls: &[String]) -> Vec<String> {
    let mut images = Vec::with_capacity(urls.len());
    for url in urls {
        match ctx
            .media
            .to_base64(url, MediaKind::Image, &ctx.credential)
            .await
        {
            Some(data) => images.push(bare_base64(&data).to_string()),
            None => tracing::warn!(url = %url, "final image fetch failed; skipping"),
        }
    }
    images
}

/// Translate an image generation stream into named SSE events.
///
/// Upstream renders two candidate images for a single-image request; a
/// target index is pre-chosen at random and only its updates surface,
/// remapped to output index 0. Completed events carry the full base64
/// payloads fetched from the final asset URLs.
pub fn image_stream<S>(
    input: S,
    ctx: TranslatorContext,
    count: usize,
    idle_timeout: Duration,
) -> impl Stream<Item = FrameResult>
where
    S: Stream<Item = Result<Bytes, AdapterError>>,
{
    let target_index = if count == 1 {
        Some(fastrand::usize(0..=1))
    } else {
        None
    };

    async_stream::stream! {
        let mut parser = LineParser::new();
        let mut final_urls: Vec<String> = Vec::new();
        let mut failure: Option<AdapterError> = None;

        let mut handle_line = |line: &str| -> Option<String> {
            let envelope = decode_record_line::<UpstreamEnvelope>(line)?;
            let (_, record) = envelope.into_record();
            match record {
                UpstreamRecord::ImageProgress(progress) => {
                    let index = progress.image_index.unwrap_or(0);
                    if let Some(target) = target_index {
                        if index != target {
                            return None;
                        }
                    }
                    let out_index = if target_index.is_some() { 0 } else { index };
                    let percent = progress
                        .progress
                        .as_ref()
                        .and_then(|p| p.as_percent())
                        .unwrap_or(0.0);
                    Some(image_event_frame(
                        IMAGE_PARTIAL_EVENT,
                        &ImagePartialEvent::new(out_index, percent),
                    ))
                }
                UpstreamRecord::ModelResponse(model_response) => {
                    final_urls.extend(model_response.generated_image_urls);
                    None
                }
                _ => None,
            }
        };

        {
            let mut input = pin!(with_idle_timeout(input, idle_timeout));
            'read: while let Some(item) = input.next().await {
                match item {
                    Ok(chunk) => {
                        parser.feed(&chunk);
                        while let Some(line) = parser.next_line() {
                            if let Some(frame) = handle_line(&line) {
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
            if failure.is_none() {
                if let Some(line) = parser.finish() {
                    if let Some(frame) = handle_line(&line) {
                        yield Ok(frame);
                    }
                }
            }
        }

        if let Some(err) = failure {
            tracing::error!(error = %err, "image stream failed");
            yield Err(err);
            return;
        }

        let images = fetch_final_images(&ctx, &final_urls).await;
        for (index, b64) in images.into_iter().enumerate() {
            let out_index = match target_index {
                Some(target) => {
                    if index != target {
                        continue;
                    }
                    0
                }
                None => index,
            };
            yield Ok(image_event_frame(
                IMAGE_COMPLETED_EVENT,
                &ImageCompletedEvent::new(b64, out_index),
            ));
        }
    }
}

/// Collect all generated images as bare base64 payloads. Failures are
/// logged and whatever was gathered is returned.
pub async fn image_collect<S>(
    input: S,
    ctx: TranslatorContext,
    idle_timeout: Duration,
) -> Vec<String>
where
    S: Stream<Item = Result<Bytes, AdapterError>>,
{
    let mut parser = LineParser::new();
    let mut final_urls: Vec<String> = Vec::new();

    let mut handle_line = |line: &str| {
        if let Some(envelope) = decode_record_line::<UpstreamEnvelope>(line) {
            if let (_, UpstreamRecord::ModelResponse(model_response)) = envelope.into_record() {
                final_urls.extend(model_response.generated_image_urls);
            }
        }
    };

    {
        let mut input = pin!(with_idle_timeout(input, idle_timeout));
        while let Some(item) = input.next().await {
            match item {
                Ok(chunk) => {
                    parser.feed(&chunk);
                    while let Some(line) = parser.next_line() {
                        handle_line(&line);
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "image collect interrupted; returning partial result");
                    break;
                }
            }
        }
        if let Some(line) = parser.finish() {
            handle_line(&line);
        }
    }

    fetch_final_images(&ctx, &final_urls).await
}
