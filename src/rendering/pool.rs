//! Fixed set of same-sized render surfaces with double-buffered base tiles.
//!
//! Two base surfaces alternate as foreground: one shows the current tile
//! set while the other receives the next one. The scratch surface holds
//! speculative pan requests and only becomes visible by being swapped into
//! the inactive base slot once its request has completed.

use crate::core::config::SurfaceBudget;
use crate::rendering::surface::{RenderSurface, SurfaceSlot};
use crate::tiles::inbox::TileCompletion;
use crate::tiles::source::RequestId;
use crate::tiles::window::ViewState;

/// What applying a tile completion did to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The request was superseded or abandoned; nothing changed
    Stale,
    /// A base surface became the new foreground
    Toggled { foreground: SurfaceSlot },
    /// The scratch surface was swapped into the base pair and promoted
    Promoted { foreground: SurfaceSlot },
}

#[derive(Debug)]
pub struct SurfacePool {
    bases: [RenderSurface; 2],
    active: usize,
    overlay: RenderSurface,
    label: RenderSurface,
    shadow: Option<RenderSurface>,
    scratch: RenderSurface,
    /// Back-to-front compositing order
    z_order: Vec<SurfaceSlot>,
    budget: SurfaceBudget,
    fade_frames: u32,
    tile_size: u32,
    viewport: (u32, u32),
}

impl SurfacePool {
    pub fn new(
        viewport: (u32, u32),
        tiles: (u32, u32),
        tile_size: u32,
        budget: SurfaceBudget,
        fade_frames: u32,
    ) -> Self {
        let base_reduction = budget.reduction_for(tiles.0 * tile_size, tiles.1 * tile_size);
        let view_reduction = budget.reduction_for(viewport.0, viewport.1);
        let make_base = |slot| RenderSurface::for_tiles(slot, tiles.0, tiles.1, tile_size, base_reduction);
        Self {
            bases: [make_base(SurfaceSlot::BaseA), make_base(SurfaceSlot::BaseB)],
            active: 0,
            overlay: RenderSurface::new(SurfaceSlot::Overlay, viewport.0, viewport.1, view_reduction),
            label: RenderSurface::new(SurfaceSlot::Label, viewport.0, viewport.1, view_reduction),
            shadow: None,
            scratch: make_base(SurfaceSlot::Scratch),
            z_order: vec![
                SurfaceSlot::BaseB,
                SurfaceSlot::BaseA,
                SurfaceSlot::Overlay,
                SurfaceSlot::Label,
            ],
            budget,
            fade_frames,
            tile_size,
            viewport,
        }
    }

    pub fn budget(&self) -> &SurfaceBudget {
        &self.budget
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn active_slot(&self) -> SurfaceSlot {
        SurfaceSlot::base(self.active)
    }

    pub fn inactive_slot(&self) -> SurfaceSlot {
        SurfaceSlot::base(1 - self.active)
    }

    pub fn active(&self) -> &RenderSurface {
        &self.bases[self.active]
    }

    pub fn inactive(&self) -> &RenderSurface {
        &self.bases[1 - self.active]
    }

    pub fn scratch(&self) -> &RenderSurface {
        &self.scratch
    }

    pub fn overlay(&self) -> &RenderSurface {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut RenderSurface {
        &mut self.overlay
    }

    pub fn label(&self) -> &RenderSurface {
        &self.label
    }

    pub fn label_mut(&mut self) -> &mut RenderSurface {
        &mut self.label
    }

    pub fn shadow(&self) -> Option<&RenderSurface> {
        self.shadow.as_ref()
    }

    pub fn shadow_mut(&mut self) -> Option<&mut RenderSurface> {
        self.shadow.as_mut()
    }

    /// Back-to-front order the host should composite in
    pub fn z_order(&self) -> &[SurfaceSlot] {
        &self.z_order
    }

    pub fn surface(&self, slot: SurfaceSlot) -> Option<&RenderSurface> {
        match slot {
            SurfaceSlot::BaseA => Some(&self.bases[0]),
            SurfaceSlot::BaseB => Some(&self.bases[1]),
            SurfaceSlot::Overlay => Some(&self.overlay),
            SurfaceSlot::Label => Some(&self.label),
            SurfaceSlot::Shadow => self.shadow.as_ref(),
            SurfaceSlot::Scratch => Some(&self.scratch),
        }
    }

    pub(crate) fn surface_mut(&mut self, slot: SurfaceSlot) -> Option<&mut RenderSurface> {
        match slot {
            SurfaceSlot::BaseA => Some(&mut self.bases[0]),
            SurfaceSlot::BaseB => Some(&mut self.bases[1]),
            SurfaceSlot::Overlay => Some(&mut self.overlay),
            SurfaceSlot::Label => Some(&mut self.label),
            SurfaceSlot::Shadow => self.shadow.as_mut(),
            SurfaceSlot::Scratch => Some(&mut self.scratch),
        }
    }

    /// Exchanges the roles of the two base surfaces.
    ///
    /// The new foreground is re-parented above the old one and starts a
    /// fade-in; the old one is retained behind it for `fade_frames` frames.
    /// Geometry is untouched, so toggling twice restores the original state.
    pub fn toggle(&mut self) {
        let old = self.active;
        self.active = 1 - self.active;
        let fade = self.fade_frames;

        let foreground = &mut self.bases[self.active];
        foreground.retain_frames_left = None;
        foreground.fade_frames_left = fade;
        foreground.opacity = if fade == 0 { 1.0 } else { 0.0 };

        let background = &mut self.bases[old];
        background.fade_frames_left = 0;
        background.opacity = 1.0;
        background.retain_frames_left = if background.valid { Some(fade) } else { None };

        self.z_order.retain(|slot| !slot.is_base());
        self.z_order.insert(0, SurfaceSlot::base(self.active));
        self.z_order.insert(0, SurfaceSlot::base(old));

        log::debug!(
            "toggled base surfaces: foreground {}",
            SurfaceSlot::base(self.active)
        );
    }

    /// Advances fade-in/retention by one frame; returns true while a
    /// transition is still running.
    pub fn tick_transition(&mut self) -> bool {
        let fade = self.fade_frames.max(1) as f32;
        let mut running = false;

        let foreground = &mut self.bases[self.active];
        if foreground.fade_frames_left > 0 {
            foreground.fade_frames_left -= 1;
            foreground.opacity = 1.0 - foreground.fade_frames_left as f32 / fade;
            running |= foreground.fade_frames_left > 0;
        }

        let background = &mut self.bases[1 - self.active];
        match background.retain_frames_left {
            Some(0) => {
                if background.pending.is_none() {
                    background.invalidate();
                } else {
                    background.retain_frames_left = None;
                }
            }
            Some(n) => {
                background.retain_frames_left = Some(n - 1);
                running = true;
            }
            None => {}
        }
        running
    }

    /// Applies a completion if it matches the slot's latest request
    pub fn complete(&mut self, completion: TileCompletion) -> CompletionOutcome {
        let Some(surface) = self.surface_mut(completion.surface) else {
            return CompletionOutcome::Stale;
        };
        if surface.pending != Some(completion.request_id) {
            log::debug!(
                "dropping stale tile completion {:?} for {}",
                completion.request_id,
                completion.surface
            );
            return CompletionOutcome::Stale;
        }
        surface.fill(completion.pixels);

        match completion.surface {
            SurfaceSlot::Scratch => {
                self.promote_scratch();
                CompletionOutcome::Promoted {
                    foreground: self.active_slot(),
                }
            }
            slot if slot == self.inactive_slot() => {
                self.toggle();
                CompletionOutcome::Toggled {
                    foreground: self.active_slot(),
                }
            }
            _ => CompletionOutcome::Toggled {
                foreground: self.active_slot(),
            },
        }
    }

    /// Swaps the completed scratch buffer into the inactive base slot and
    /// brings it to the front.
    fn promote_scratch(&mut self) {
        let inactive = 1 - self.active;
        std::mem::swap(&mut self.scratch, &mut self.bases[inactive]);
        self.bases[inactive].slot = SurfaceSlot::base(inactive);
        self.scratch.slot = SurfaceSlot::Scratch;
        self.scratch.pending = None;
        self.scratch.invalidate();
        self.toggle();
    }

    /// Forgets the outstanding request of a slot; a later completion for it
    /// is then stale.
    pub fn abandon(&mut self, slot: SurfaceSlot) -> Option<RequestId> {
        let surface = self.surface_mut(slot)?;
        let abandoned = surface.pending.take();
        if abandoned.is_some() {
            log::debug!("abandoned request {:?} on {}", abandoned, slot);
        }
        abandoned
    }

    /// Re-derives the placement of every surface from the view.
    ///
    /// A non-foreground base surface still showing an older tile set is
    /// stretched with the view; once its display size would exceed the
    /// bitmap budget it is discarded.
    pub fn place_all(&mut self, view: &ViewState) {
        let limit = self.budget.max_bitmap_dimension as f64;
        for (index, surface) in self.bases.iter_mut().enumerate() {
            surface.place(view, self.tile_size);
            let oversized = surface.pixel_width > limit || surface.pixel_height > limit;
            if index != self.active && surface.valid && oversized {
                log::debug!("discarding over-stretched {}", surface.slot);
                surface.invalidate();
            }
        }
        self.scratch.place(view, self.tile_size);
        self.overlay.place_fixed(view.exact_lod);
        self.label.place_fixed(view.exact_lod);
        if let Some(shadow) = self.shadow.as_mut() {
            shadow.place_fixed(view.exact_lod);
        }
    }

    /// Allocates the transient halo surface if it does not exist yet
    pub fn ensure_shadow(&mut self) -> &mut RenderSurface {
        self.show_shadow();
        let (w, h) = self.viewport;
        let reduction = self.overlay.reduction;
        self.shadow
            .get_or_insert_with(|| RenderSurface::new(SurfaceSlot::Shadow, w, h, reduction))
    }

    pub fn release_shadow(&mut self) -> bool {
        let released = self.shadow.take().is_some();
        if released {
            self.z_order.retain(|slot| *slot != SurfaceSlot::Shadow);
        }
        released
    }

    fn show_shadow(&mut self) {
        if !self.z_order.contains(&SurfaceSlot::Shadow) {
            let at = self
                .z_order
                .iter()
                .position(|slot| *slot == SurfaceSlot::Overlay)
                .unwrap_or(self.z_order.len());
            self.z_order.insert(at, SurfaceSlot::Shadow);
        }
    }

    /// Drops every surface's content and outstanding request
    pub fn release_all(&mut self) {
        for surface in self.bases.iter_mut() {
            surface.pending = None;
            surface.invalidate();
        }
        self.scratch.pending = None;
        self.scratch.invalidate();
        self.overlay.clear();
        self.label.clear();
        self.release_shadow();
    }
}
