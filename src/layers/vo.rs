//! Visual objects and the scene-owned arena that holds them.
//!
//! The scene never hands out references into the arena across calls; code
//! that needs to remember an object keeps its [`VoId`]. A removed slot bumps
//! its generation, so ids held past removal simply stop resolving.

use crate::core::geo::LonLat;
use crate::input::events::{EventKind, SceneEvent};
use crate::rendering::context::{HitContext, RenderContext};
use crate::spatial::clustering::VoClusters;
use image::RgbaImage;

/// Generational handle of a visual object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoId {
    index: u32,
    generation: u32,
}

impl VoId {
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl std::fmt::Display for VoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vo#{}.{}", self.index, self.generation)
    }
}

/// Capability contract between the scene and an overlay object.
///
/// Instance indices are positions in the object's current instance set:
/// the cluster instances when the object is clustered, its own instances
/// otherwise.
pub trait VisualObject {
    /// Label used to order overlapping candidates
    fn label(&self) -> &str;

    /// Geographic anchors of the object's instances
    fn positions(&self) -> &[LonLat] {
        &[]
    }

    /// Whether the object takes part in clustering
    fn clusterable(&self) -> bool {
        false
    }

    /// Draws onto the overlay surface and returns how many instances were drawn
    fn render(
        &mut self,
        surface: &mut RgbaImage,
        context: &RenderContext,
        clusters: Option<&VoClusters>,
        hot: Option<usize>,
    ) -> usize;

    fn render_labels(&mut self, _surface: &mut RgbaImage, _context: &RenderContext, _clusters: Option<&VoClusters>) {}

    /// Draws the cluster halo onto the shadow surface
    fn render_shadow(&mut self, _surface: &mut RgbaImage, _context: &RenderContext, _clusters: Option<&VoClusters>) {}

    /// Instance indices under the pointer
    fn hit_candidates(&self, _hit: &HitContext, _context: &RenderContext, _clusters: Option<&VoClusters>) -> Vec<usize> {
        Vec::new()
    }

    /// Handles an event routed to this object; returns true if handled
    fn on_hit_test(&mut self, event: &SceneEvent, hit: &HitContext, target: Option<usize>) -> bool;

    fn is_selectable(&self) -> bool {
        false
    }

    fn is_subscribed(&self, _kind: EventKind) -> bool {
        false
    }
}

/// Per-object participation flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoFlags {
    pub render: bool,
    pub cluster: bool,
}

impl Default for VoFlags {
    fn default() -> Self {
        Self {
            render: true,
            cluster: true,
        }
    }
}

struct VoEntry {
    object: Box<dyn VisualObject>,
    flags: VoFlags,
}

struct Slot {
    generation: u32,
    entry: Option<VoEntry>,
}

/// Scene-owned storage of visual objects in draw order (bottom first)
#[derive(Default)]
pub struct VoArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    order: Vec<VoId>,
}

impl std::fmt::Debug for VoArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoArena").field("order", &self.order).finish()
    }
}

impl VoArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object on top of the draw order
    pub fn insert(&mut self, object: Box<dyn VisualObject>) -> VoId {
        let entry = Some(VoEntry {
            object,
            flags: VoFlags::default(),
        });
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = entry;
                VoId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry,
                });
                VoId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        self.order.push(id);
        id
    }

    pub fn remove(&mut self, id: VoId) -> Option<Box<dyn VisualObject>> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.order.retain(|other| *other != id);
        Some(entry.object)
    }

    fn entry(&self, id: VoId) -> Option<&VoEntry> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, id: VoId) -> Option<&mut VoEntry> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    pub fn contains(&self, id: VoId) -> bool {
        self.entry(id).is_some()
    }

    pub fn get(&self, id: VoId) -> Option<&dyn VisualObject> {
        self.entry(id).map(|entry| entry.object.as_ref())
    }

    pub fn get_mut(&mut self, id: VoId) -> Option<&mut (dyn VisualObject + 'static)> {
        self.entry_mut(id).map(|entry| entry.object.as_mut())
    }

    pub fn flags(&self, id: VoId) -> Option<VoFlags> {
        self.entry(id).map(|entry| entry.flags)
    }

    pub fn set_flags(&mut self, id: VoId, flags: VoFlags) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.flags = flags;
                true
            }
            None => false,
        }
    }

    /// Ids in draw order, bottom first
    pub fn order(&self) -> &[VoId] {
        &self.order
    }

    /// Ids from topmost (last added) to bottom
    pub fn top_down(&self) -> impl Iterator<Item = VoId> + '_ {
        self.order.iter().rev().copied()
    }

    /// Objects that currently participate in clustering
    pub fn clusterable(&self) -> impl Iterator<Item = (VoId, &dyn VisualObject)> + '_ {
        self.order.iter().filter_map(move |id| {
            let entry = self.entry(*id)?;
            (entry.flags.cluster && entry.object.clusterable()).then(|| (*id, entry.object.as_ref()))
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        for id in std::mem::take(&mut self.order) {
            self.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl VisualObject for Named {
        fn label(&self) -> &str {
            self.0
        }

        fn render(&mut self, _: &mut RgbaImage, _: &RenderContext, _: Option<&VoClusters>, _: Option<usize>) -> usize {
            0
        }

        fn on_hit_test(&mut self, _: &SceneEvent, _: &HitContext, _: Option<usize>) -> bool {
            false
        }
    }

    #[test]
    fn test_stale_handle_after_remove() {
        let mut arena = VoArena::new();
        let a = arena.insert(Box::new(Named("a")));
        let b = arena.insert(Box::new(Named("b")));
        assert_eq!(arena.order(), &[a, b]);
        assert!(arena.remove(a).is_some());
        assert!(arena.get(a).is_none());

        let c = arena.insert(Box::new(Named("c")));
        assert_eq!(c.index(), a.index());
        assert_ne!(c, a);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(c).map(|vo| vo.label()), Some("c"));
        assert_eq!(arena.top_down().collect::<Vec<_>>(), vec![c, b]);
    }

    #[test]
    fn test_flags() {
        let mut arena = VoArena::new();
        let a = arena.insert(Box::new(Named("a")));
        assert!(arena.flags(a).unwrap().render);
        assert!(arena.set_flags(a, VoFlags { render: false, cluster: false }));
        assert!(!arena.flags(a).unwrap().render);
        arena.clear();
        assert!(arena.is_empty());
        assert!(!arena.set_flags(a, VoFlags::default()));
    }
}
