//! Streaming facade over a generation session.
//!
//! The session runs in a spawned task so progress frames keep flowing
//! while the consumer is slow; dropping the stream aborts the task and
//! closes the upstream socket.

use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::{mpsc, oneshot};

use super::progress::ProgressUpdate;
use super::session::{ImagineClient, ImagineOutcome, ImagineRequest};
use crate::error::AdapterError;

const PROGRESS_BUFFER: usize = 32;

/// Items yielded by [`generate_stream`]. `Done` is always the last item.
#[derive(Debug)]
pub enum FrameUpdate {
    Progress(ProgressUpdate),
    Done(Result<ImagineOutcome, AdapterError>),
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run a generation in the background and stream its progress.
pub fn generate_stream(
    client: Arc<ImagineClient>,
    request: ImagineRequest,
    pinned_token: Option<String>,
) -> impl Stream<Item = FrameUpdate> {
    let (progress_tx, mut progress_rx) = mpsc::channel::<ProgressUpdate>(PROGRESS_BUFFER);
    let (done_tx, done_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        let result = client
            .generate_with_updates(&request, pinned_token.as_deref(), Some(progress_tx))
            .await;
        let _ = done_tx.send(result);
    });
    let guard = AbortOnDrop(handle);

    async_stream::stream! {
        let _guard = guard;
        while let Some(update) = progress_rx.recv().await {
            yield FrameUpdate::Progress(update);
        }
        let result = done_rx.await.unwrap_or_else(|_| {
            Err(AdapterError::Internal("generation task ended unexpectedly".into()))
        });
        yield FrameUpdate::Done(result);
    }
}
