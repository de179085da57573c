use std::time::Duration;

use futures_util::{Stream, StreamExt};

use crate::error::AdapterError;

/// Wrap a fallible stream with an idle timeout: if no item arrives within
/// `idle` the stream yields [`AdapterError::IdleTimeout`] and terminates.
///
/// The timer is per-read. A slow but steadily producing upstream never
/// trips it; a stalled one does, so consumers are never left on an open
/// stream with no data.
pub fn with_idle_timeout<S, T>(
    inner: S,
    idle: Duration,
) -> impl Stream<Item = Result<T, AdapterError>>
where
    S: Stream<Item = Result<T, AdapterError>>,
{
    async_stream::stream! {
        let mut inner = std::pin::pin!(inner);
        loop {
            match tokio::time::timeout(idle, inner.next()).await {
                Ok(Some(item)) => yield item,
                Ok(None) => break,
                Err(_) => {
                    yield Err(AdapterError::IdleTimeout {
                        idle_secs: idle.as_secs(),
                    });
                    break;
                }
            }
        }
    }
}
