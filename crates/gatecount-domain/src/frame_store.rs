use crate::clock::Clock;
use crate::error::{DomainError, DomainResult};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Single debug frame: 8-bit grayscale, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Bytes) -> DomainResult<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(DomainError::MalformedFrame(format!(
                "payload is {} bytes, {}x{} needs {}",
                data.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }
}

struct FrameEntry {
    captured_at: DateTime<Utc>,
    frame: Frame,
}

/// Holds the most recent debug frame per device. One entry per device,
/// overwritten in place; removal happens when the streamer goes stale.
pub struct FrameStore {
    frames: RwLock<HashMap<String, FrameEntry>>,
    clock: Arc<dyn Clock>,
}

impl FrameStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            frames: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub async fn put(&self, device_id: &str, frame: Frame) {
        let entry = FrameEntry {
            captured_at: self.clock.now(),
            frame,
        };
        self.frames.write().await.insert(device_id.to_string(), entry);
    }

    pub async fn get(&self, device_id: &str) -> Option<Frame> {
        self.frames
            .read()
            .await
            .get(device_id)
            .map(|entry| entry.frame.clone())
    }

    /// The stored frame, but only when it differs byte-for-byte from
    /// `previous`. `None` signals "no new frame yet" to a polling consumer;
    /// stall detection on repeated `None` is the caller's policy, built on
    /// [`FrameStore::last_update`].
    pub async fn get_if_changed(&self, device_id: &str, previous: &Frame) -> Option<Frame> {
        let frames = self.frames.read().await;
        let entry = frames.get(device_id)?;
        if entry.frame == *previous {
            None
        } else {
            Some(entry.frame.clone())
        }
    }

    pub async fn last_update(&self, device_id: &str) -> Option<DateTime<Utc>> {
        self.frames
            .read()
            .await
            .get(device_id)
            .map(|entry| entry.captured_at)
    }

    /// Currently streaming device ids, sorted.
    pub async fn devices(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.frames.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn remove(&self, device_id: &str) -> Option<Frame> {
        self.frames
            .write()
            .await
            .remove(device_id)
            .map(|entry| entry.frame)
    }

    /// Tiles every current frame into a row-major grid with `columns`
    /// columns, in sorted-device order; the final incomplete row is padded
    /// by repeating its last frame. Frames whose dimensions differ from the
    /// first are skipped. `None` when no device has ever reported.
    pub async fn composite_grid(&self, columns: usize) -> Option<Frame> {
        let columns = columns.max(1);
        let frames = self.frames.read().await;
        if frames.is_empty() {
            return None;
        }

        let mut ids: Vec<&String> = frames.keys().collect();
        ids.sort();

        let first = &frames[ids[0]].frame;
        let (tile_w, tile_h) = (first.width, first.height);
        let mut tiles: Vec<&Frame> = Vec::with_capacity(ids.len());
        for id in &ids {
            let frame = &frames[*id].frame;
            if frame.width != tile_w || frame.height != tile_h {
                warn!(
                    device = %id,
                    width = frame.width,
                    height = frame.height,
                    "skipping frame with mismatched dimensions in grid"
                );
                continue;
            }
            tiles.push(frame);
        }

        let rows: Vec<Vec<&Frame>> = tiles
            .chunks(columns)
            .map(|chunk| {
                let mut row = chunk.to_vec();
                let last = *row.last().expect("chunks are never empty");
                while row.len() < columns {
                    row.push(last);
                }
                row
            })
            .collect();

        let out_w = tile_w * columns as u32;
        let out_h = tile_h * rows.len() as u32;
        let mut data = Vec::with_capacity(out_w as usize * out_h as usize);
        for row in &rows {
            for y in 0..tile_h as usize {
                let line = y * tile_w as usize;
                for frame in row {
                    data.extend_from_slice(&frame.data[line..line + tile_w as usize]);
                }
            }
        }

        Some(Frame {
            width: out_w,
            height: out_h,
            data: Bytes::from(data),
        })
    }
}
