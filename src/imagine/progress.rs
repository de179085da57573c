//! Per-session image progress tracking.
//!
//! The server streams the same image several times at increasing
//! quality; only the full-resolution frame (`percentage_complete` 100)
//! counts as done, and a done frame is never replaced by a later
//! preview.

use std::collections::HashMap;

/// Images arrive in batches of roughly this size; scroll requests pull
/// additional batches.
const BATCH_SIZE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStage {
    Preview,
    Final,
}

impl ImageStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ImageStage::Preview => "preview",
            ImageStage::Final => "final",
        }
    }
}

/// One rendering of one image.
#[derive(Debug, Clone)]
pub struct ImageFrame {
    pub image_id: String,
    pub stage: ImageStage,
    /// Base64 payload as received.
    pub payload: String,
    pub payload_size: usize,
    pub source_url: String,
}

impl ImageFrame {
    #[must_use]
    pub fn new(image_id: String, stage: ImageStage, payload: String, source_url: String) -> Self {
        let payload_size = payload.len();
        Self {
            image_id,
            stage,
            payload,
            payload_size,
            source_url,
        }
    }

    #[must_use]
    pub fn is_final(&self) -> bool {
        self.stage == ImageStage::Final
    }
}

/// Progress update forwarded to streaming consumers. The payload is
/// only included for final frames to keep preview traffic small.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub image_id: String,
    pub stage: ImageStage,
    pub payload: String,
    pub payload_size: usize,
    pub is_final: bool,
    pub completed: usize,
    pub total: usize,
}

/// All frames seen so far for one generation session, keyed by image id.
#[derive(Debug)]
pub struct GenerationProgress {
    pub total: usize,
    images: HashMap<String, ImageFrame>,
    completed: usize,
}

impl GenerationProgress {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            images: HashMap::new(),
            completed: 0,
        }
    }

    /// Record a frame. Returns `false` when the frame is discarded
    /// because a final rendering of the same image already exists.
    pub fn record(&mut self, frame: ImageFrame) -> bool {
        if let Some(existing) = self.images.get(&frame.image_id) {
            if existing.is_final() {
                return false;
            }
        }
        self.images.insert(frame.image_id.clone(), frame);
        self.completed = self.images.values().filter(|f| f.is_final()).count();
        true
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed
    }

    #[must_use]
    pub fn update_for(&self, frame: &ImageFrame) -> ProgressUpdate {
        ProgressUpdate {
            image_id: frame.image_id.clone(),
            stage: frame.stage,
            payload: if frame.is_final() {
                frame.payload.clone()
            } else {
                String::new()
            },
            payload_size: frame.payload_size,
            is_final: frame.is_final(),
            completed: self.completed,
            total: self.total,
        }
    }

    /// Base64 payloads of the final frames, largest first, capped at
    /// `limit`.
    #[must_use]
    pub fn collect_final_images(&self, limit: usize) -> Vec<String> {
        let mut finals: Vec<&ImageFrame> = self.images.values().filter(|f| f.is_final()).collect();
        finals.sort_by(|a, b| b.payload_size.cmp(&a.payload_size));
        finals
            .into_iter()
            .take(limit)
            .map(|f| f.payload.clone())
            .collect()
    }
}

/// How many scroll requests a session may send for `count` images. The
/// initial request already yields one batch.
#[must_use]
pub fn scroll_budget(count: usize) -> usize {
    count.saturating_sub(1).div_ceil(BATCH_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: &str, stage: ImageStage, payload: &str) -> ImageFrame {
        ImageFrame::new(
            id.to_string(),
            stage,
            payload.to_string(),
            format!("https://assets.example/images/{id}.png"),
        )
    }

    #[test]
    fn final_frames_are_sticky() {
        let mut progress = GenerationProgress::new(2);
        assert!(progress.record(frame("a", ImageStage::Preview, "p1")));
        assert!(progress.record(frame("a", ImageStage::Final, "full-image")));
        assert_eq!(progress.completed(), 1);

        // Late preview of the same image must not regress it.
        assert!(!progress.record(frame("a", ImageStage::Preview, "p2")));
        assert_eq!(progress.completed(), 1);
        assert_eq!(progress.collect_final_images(2), vec!["full-image"]);
    }

    #[test]
    fn previews_upgrade_in_place() {
        let mut progress = GenerationProgress::new(4);
        progress.record(frame("a", ImageStage::Preview, "tiny"));
        progress.record(frame("a", ImageStage::Preview, "bigger-preview"));
        assert_eq!(progress.completed(), 0);
        progress.record(frame("a", ImageStage::Final, "done"));
        assert_eq!(progress.completed(), 1);
    }

    #[test]
    fn collection_sorts_by_size_and_caps() {
        let mut progress = GenerationProgress::new(2);
        progress.record(frame("a", ImageStage::Final, "xx"));
        progress.record(frame("b", ImageStage::Final, "xxxxxx"));
        progress.record(frame("c", ImageStage::Final, "xxxx"));
        progress.record(frame("d", ImageStage::Preview, "xxxxxxxxxx"));

        let images = progress.collect_final_images(2);
        assert_eq!(images, vec!["xxxxxx", "xxxx"]);
    }

    #[test]
    fn scroll_budget_rounds_up_per_batch() {
        assert_eq!(scroll_budget(1), 0);
        assert_eq!(scroll_budget(4), 1);
        assert_eq!(scroll_budget(7), 1);
        assert_eq!(scroll_budget(8), 2);
        assert_eq!(scroll_budget(13), 2);
    }

    #[test]
    fn updates_carry_payload_only_when_final() {
        let mut progress = GenerationProgress::new(1);
        let preview = frame("a", ImageStage::Preview, "preview-bytes");
        progress.record(preview.clone());
        let update = progress.update_for(&preview);
        assert!(update.payload.is_empty());
        assert_eq!(update.payload_size, "preview-bytes".len());

        let done = frame("a", ImageStage::Final, "final-bytes");
        progress.record(done.clone());
        let update = progress.update_for(&done);
        assert_eq!(update.payload, "final-bytes");
        assert!(update.is_final);
        assert_eq!(update.completed, 1);
    }
}
