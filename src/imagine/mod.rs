//! Progressive image generation over the imagine WebSocket endpoint.
//!
//! A session sends one `conversation.item.create` request, watches the
//! server stream preview and final renderings, optionally scrolls for
//! more batches, and collects the final base64 payloads. The client
//! wraps sessions in a credential rotation loop.

pub mod progress;
pub mod session;
pub mod stream;
pub mod wire;

pub use progress::{scroll_budget, GenerationProgress, ImageFrame, ImageStage, ProgressUpdate};
pub use session::{ImagineClient, ImagineOutcome, ImagineRequest};
pub use stream::{generate_stream, FrameUpdate};
