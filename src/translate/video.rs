//! Video generation translators.
//!
//! Progress updates narrate inside the reasoning block; the terminal
//! update resolves the playable URL (with an optional best-effort HD
//! upscale), rewrites it through the media proxy, and renders client
//! markup. Moderated generations surface a fixed fallback message and a
//! `content_filter` finish reason.

use std::pin::pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use super::{FrameResult, StreamState, TranslateOptions, TranslatorContext};
use crate::error::AdapterError;
use crate::protocol::openai::ChatCompletion;
use crate::protocol::upstream::{ModelResponse, UpstreamEnvelope, UpstreamRecord, VideoProgress};
use crate::stream::line::decode_record_line;
use crate::stream::{with_idle_timeout, LineParser};
use crate::util::next_completion_id;

const MODERATED_FALLBACK: &str = "Content Moderated. Try a different idea.";
const NO_URL_FALLBACK: &str =
    "Video generation completed but no playable URL was returned. Please try again later.";
const CHERRY_STUDIO_CLIENT: &str = "Cherry Studio";

fn render_video_output(
    client_type: Option<&str>,
    video_url: &str,
    thumbnail_url: Option<&str>,
) -> String {
    if client_type == Some(CHERRY_STUDIO_CLIENT) {
        return format!("[Play video]({video_url})");
    }
    let poster = thumbnail_url
        .filter(|t| !t.is_empty())
        .map(|t| format!(" poster=\"{t}\""))
        .unwrap_or_default();
    format!(
        "<video id=\"video\" controls=\"\" preload=\"none\"{poster}>\n  <source id=\"mp4\" src=\"{video_url}\" type=\"video/mp4\">\n</video>"
    )
}

/// What the terminal video update resolved to.
enum VideoOutcome {
    Moderated,
    Playable { content: String },
    NoUrl { message: String },
}

async fn resolve_outcome(
    ctx: &TranslatorContext,
    client_type: Option<&str>,
    progress: &VideoProgress,
    model_response: Option<&ModelResponse>,
) -> VideoOutcome {
    if progress.moderated {
        tracing::warn!(
            video_id = progress.video_id.as_deref().unwrap_or(""),
            video_post_id = progress.video_post_id.as_deref().unwrap_or(""),
            "video generation moderated by upstream"
        );
        return VideoOutcome::Moderated;
    }

    let video_url = progress
        .video_url_candidate()
        .or_else(|| model_response.and_then(ModelResponse::video_url_candidate));
    let Some(video_url) = video_url else {
        tracing::warn!(
            video_id = progress.video_id.as_deref().unwrap_or(""),
            "video progress reached 100 but no video URL found"
        );
        let message = model_response
            .and_then(|mr| mr.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| NO_URL_FALLBACK.to_string());
        return VideoOutcome::NoUrl { message };
    };

    let upscaled = ctx
        .media
        .upscale_video_url(video_url, &ctx.credential)
        .await;
    let final_video_url = ctx.resolve_video_url(&upscaled).await;

    let thumbnail = progress
        .thumbnail_candidate()
        .or_else(|| model_response.and_then(ModelResponse::thumbnail_candidate));
    let final_thumbnail = match thumbnail {
        Some(thumb) => Some(ctx.resolve_image_url(thumb).await),
        None => None,
    };

    tracing::info!(url = %video_url, "video generated");
    VideoOutcome::Playable {
        content: render_video_output(client_type, &final_video_url, final_thumbnail.as_deref()),
    }
}

/// Translate a video generation stream into OpenAI SSE frames.
pub fn video_stream<S>(
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
        let mut done_handled = false;

        {
            let mut input = pin!(with_idle_timeout(input, idle_timeout));
            'read: while let Some(item) = input.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        failure = Some(err);
                        break 'read;
                    }
                };
                parser.feed(&chunk);
                while let Some(line) = parser.next_line() {
                    let Some(envelope) = decode_record_line::<UpstreamEnvelope>(&line) else {
                        continue;
                    };
                    let (meta, record) = envelope.into_record();
                    state.absorb_meta(&meta);
                    if let Some(role) = state.role_frame() {
                        yield Ok(role);
                    }
                    match record {
                        UpstreamRecord::VideoProgress { progress, model_response } => {
                            if state.show_thinking() {
                                if let Some(frame) = state.open_think() {
                                    yield Ok(frame);
                                }
                                let percent = progress.percent();
                                yield Ok(state.content_frame(
                                    format!("Generating video, progress {percent}%\n"),
                                ));
                            }
                            if progress.is_done() && !done_handled {
                                done_handled = true;
                                for frame in state.flush_think(None) {
                                    yield Ok(frame);
                                }
                                match resolve_outcome(
                                    &ctx,
                                    options.client_type.as_deref(),
                                    &progress,
                                    model_response.as_ref(),
                                )
                                .await
                                {
                                    VideoOutcome::Moderated => {
                                        state.content_filtered = true;
                                        yield Ok(state.content_frame(
                                            format!("{MODERATED_FALLBACK}\n"),
                                        ));
                                    }
                                    VideoOutcome::Playable { content, .. } => {
                                        yield Ok(state.content_frame(content));
                                    }
                                    VideoOutcome::NoUrl { message } => {
                                        yield Ok(state.content_frame(format!("{message}\n")));
                                    }
                                }
                            }
                        }
                        UpstreamRecord::Token { text, thinking } => {
                            for frame in state.token_frames(&text, thinking) {
                                yield Ok(frame);
                            }
                        }
                        _ => {}
                    }
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
                tracing::warn!(error = %err, "video stream failed mid-response; closing out");
                for frame in state.finish_frames() {
                    yield Ok(frame);
                }
                yield Err(err);
            }
            Some(err) => {
                tracing::error!(error = %err, "video stream failed");
                yield Err(err);
            }
        }
    }
}

/// Collect a video generation into a single chat completion. Moderated
/// generations set `refusal` and finish with `content_filter`.
pub async fn video_collect<S>(
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
    let mut refusal: Option<String> = None;
    let mut terminal: Option<(VideoProgress, Option<ModelResponse>)> = None;

    {
        let mut input = pin!(with_idle_timeout(input, idle_timeout));
        'read: while let Some(item) = input.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(err) => {
                    tracing::warn!(error = %err, "video collect interrupted; returning partial result");
                    break 'read;
                }
            };
            parser.feed(&chunk);
            while let Some(line) = parser.next_line() {
                let Some(envelope) = decode_record_line::<UpstreamEnvelope>(&line) else {
                    continue;
                };
                let (meta, record) = envelope.into_record();
                if let Some(id) = &meta.response_id {
                    response_id = Some(id.clone());
                }
                state.absorb_meta(&meta);
                if let UpstreamRecord::VideoProgress {
                    progress,
                    model_response,
                } = record
                {
                    if progress.is_done() && terminal.is_none() {
                        terminal = Some((progress, model_response));
                    }
                }
            }
        }
    }

    if let Some((progress, model_response)) = terminal {
        match resolve_outcome(
            &ctx,
            options.client_type.as_deref(),
            &progress,
            model_response.as_ref(),
        )
        .await
        {
            VideoOutcome::Moderated => {
                content = MODERATED_FALLBACK.to_string();
                refusal = Some(MODERATED_FALLBACK.to_string());
            }
            VideoOutcome::Playable { content: markup, .. } => content = markup,
            VideoOutcome::NoUrl { message } => content = message,
        }
    }

    let finish_reason = if refusal.is_some() {
        "content_filter"
    } else {
        "stop"
    };
    let id = response_id.unwrap_or_else(next_completion_id);
    ChatCompletion::single(
        &id,
        state.created(),
        &options.model,
        state.fingerprint(),
        content,
        refusal,
        finish_reason,
    )
}
