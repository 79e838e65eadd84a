//! Completion inbox for tile requests.
//!
//! Tile sources never touch render surfaces. They post a [`TileCompletion`]
//! tagged with the request id, and the scene applies it on its own thread
//! at the start of the next frame, dropping anything that was superseded.

use crate::rendering::surface::SurfaceSlot;
use crate::tiles::source::{RequestId, TileRequest};
use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbaImage;

/// Result of one tile request
#[derive(Debug, Clone)]
pub struct TileCompletion {
    pub request_id: RequestId,
    pub surface: SurfaceSlot,
    /// Composed tile window at nominal size; `None` leaves the surface blank
    pub pixels: Option<RgbaImage>,
}

/// Cloneable sending half handed to tile sources
#[derive(Debug, Clone)]
pub struct TileReply {
    sender: Sender<TileCompletion>,
}

impl TileReply {
    /// Posts a completion; returns false if the scene is gone
    pub fn send(&self, completion: TileCompletion) -> bool {
        self.sender.send(completion).is_ok()
    }

    pub fn complete(&self, request: &TileRequest, pixels: RgbaImage) -> bool {
        self.send(TileCompletion {
            request_id: request.request_id,
            surface: request.surface,
            pixels: Some(pixels),
        })
    }

    pub fn complete_empty(&self, request: &TileRequest) -> bool {
        self.send(TileCompletion {
            request_id: request.request_id,
            surface: request.surface,
            pixels: None,
        })
    }
}

/// Receiving half owned by the scene
#[derive(Debug)]
pub struct TileInbox {
    sender: Sender<TileCompletion>,
    receiver: Receiver<TileCompletion>,
}

impl TileInbox {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn reply(&self) -> TileReply {
        TileReply {
            sender: self.sender.clone(),
        }
    }

    /// Takes every completion received so far, in arrival order
    pub fn drain(&self) -> Vec<TileCompletion> {
        self.receiver.try_iter().collect()
    }

    /// Drops queued completions without applying them
    pub fn discard_pending(&self) -> usize {
        self.receiver.try_iter().count()
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl Default for TileInbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order() {
        let inbox = TileInbox::new();
        let reply = inbox.reply();
        for id in 1..=3 {
            assert!(reply.send(TileCompletion {
                request_id: RequestId(id),
                surface: SurfaceSlot::BaseA,
                pixels: None,
            }));
        }
        assert_eq!(inbox.pending(), 3);
        let ids: Vec<_> = inbox.drain().iter().map(|c| c.request_id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(inbox.pending(), 0);
    }

    #[test]
    fn test_discard_pending() {
        let inbox = TileInbox::new();
        let reply = inbox.reply();
        reply.send(TileCompletion {
            request_id: RequestId(9),
            surface: SurfaceSlot::Scratch,
            pixels: None,
        });
        assert_eq!(inbox.discard_pending(), 1);
        assert!(inbox.drain().is_empty());
    }
}
