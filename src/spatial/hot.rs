//! Single-slot tracking of the emphasized (hovered or focused) element.
//!
//! For clustered objects the hot index points into a snapshot's instance
//! list, which reclustering rebuilds. Before a new snapshot is computed the
//! tracker turns the index into a [`HotReference`]; afterwards it resolves
//! the reference against the new snapshot or drops the hot item.

use crate::layers::vo::VoId;
use crate::prelude::HashMap;
use crate::spatial::clustering::{ClusterRef, ClusterSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub struct HotItem {
    pub vo: Option<VoId>,
    /// Instance index within the object's current instance set
    pub index: usize,
    pub is_design_handle: bool,
    /// Object-specific sub-part (vertex, segment) under the pointer
    pub hit_detail: u32,
}

impl HotItem {
    pub fn new(vo: VoId, index: usize) -> Self {
        Self {
            vo: Some(vo),
            index,
            is_design_handle: false,
            hit_detail: 0,
        }
    }

    pub fn design_handle(vo: VoId, index: usize, hit_detail: u32) -> Self {
        Self {
            vo: Some(vo),
            index,
            is_design_handle: true,
            hit_detail,
        }
    }
}

/// Recluster-stable form of a hot clustered instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotReference {
    pub vo: VoId,
    pub element: ClusterRef,
    pub recalc_counter: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotResolution {
    /// Nothing hot, or nothing to resolve
    Unchanged,
    Kept,
    Remapped { from: usize, to: usize },
    Cleared,
}

#[derive(Debug, Default)]
pub struct HotItemTracker {
    current: Option<HotItem>,
    reference: Option<HotReference>,
    /// Whether `current.index` points into a cluster snapshot
    clustered: bool,
    /// Snapshot generation the clustered index was last verified against
    verified_generation: Option<u64>,
}

impl HotItemTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&HotItem> {
        self.current.as_ref()
    }

    pub fn reference(&self) -> Option<&HotReference> {
        self.reference.as_ref()
    }

    pub fn is_hot(&self, vo: VoId) -> bool {
        self.current.as_ref().and_then(|item| item.vo) == Some(vo)
    }

    /// Hot instance index of `vo`, if it is the hot object
    pub fn index_for(&self, vo: VoId) -> Option<usize> {
        self.current
            .as_ref()
            .filter(|item| item.vo == Some(vo) && !item.is_design_handle)
            .map(|item| item.index)
    }

    /// Makes `item` hot; returns true if that changed anything
    pub fn set(&mut self, item: HotItem, snapshot: Option<&ClusterSnapshot>) -> bool {
        let clustered = match (item.vo, snapshot) {
            (Some(vo), Some(snapshot)) => !item.is_design_handle && snapshot.contains(vo),
            _ => false,
        };
        let changed = self.current.as_ref() != Some(&item);
        self.current = Some(item);
        self.reference = None;
        self.clustered = clustered;
        self.verified_generation = if clustered {
            snapshot.map(|s| s.generation)
        } else {
            None
        };
        changed
    }

    /// Un-hots the current item; returns true if something was hot
    pub fn clear(&mut self) -> bool {
        self.reference = None;
        self.clustered = false;
        self.verified_generation = None;
        self.current.take().is_some()
    }

    /// Records the hot clustered instance as a stable reference before a
    /// reclustering pass
    pub fn capture_reference(&mut self, snapshot: Option<&ClusterSnapshot>) -> Option<HotReference> {
        if !self.clustered {
            return None;
        }
        let (Some(item), Some(snapshot)) = (self.current.as_ref(), snapshot) else {
            return None;
        };
        let vo = item.vo?;
        match snapshot.element(vo, item.index) {
            Some(element) => {
                let reference = HotReference {
                    vo,
                    element,
                    recalc_counter: snapshot.recalc_counter,
                };
                self.reference = Some(reference);
                Some(reference)
            }
            None => {
                log::debug!("hot index {} of {} not in snapshot, clearing", item.index, vo);
                self.clear();
                None
            }
        }
    }

    /// Re-derives the hot index from a new snapshot
    pub fn resolve(&mut self, snapshot: &ClusterSnapshot) -> HotResolution {
        let Some((vo, index)) = self
            .current
            .as_ref()
            .filter(|item| !item.is_design_handle)
            .and_then(|item| item.vo.map(|vo| (vo, item.index)))
        else {
            return HotResolution::Unchanged;
        };

        match self.reference.take() {
            Some(reference) if reference.recalc_counter != snapshot.recalc_counter => {
                log::debug!(
                    "recalc counter moved {} -> {}, clearing hot item",
                    reference.recalc_counter,
                    snapshot.recalc_counter
                );
                self.clear();
                HotResolution::Cleared
            }
            Some(reference) => match snapshot.resolve(vo, &reference.element) {
                Some(to) => {
                    if let Some(item) = self.current.as_mut() {
                        item.index = to;
                    }
                    self.clustered = true;
                    self.verified_generation = Some(snapshot.generation);
                    if to == index {
                        HotResolution::Kept
                    } else {
                        HotResolution::Remapped { from: index, to }
                    }
                }
                None => {
                    self.clear();
                    HotResolution::Cleared
                }
            },
            None if self.clustered && self.verified_generation == Some(snapshot.generation) => {
                HotResolution::Unchanged
            }
            None if self.clustered || snapshot.contains(vo) => {
                self.clear();
                HotResolution::Cleared
            }
            None => HotResolution::Unchanged,
        }
    }

    /// Forces un-hot when a clustered hot index was never verified against
    /// the snapshot about to be drawn; returns true if it cleared
    pub fn ensure_verified(&mut self, generation: Option<u64>) -> bool {
        if self.current.is_some() && self.clustered && self.verified_generation != generation {
            log::debug!("hot item never re-verified against generation {:?}", generation);
            self.clear();
            return true;
        }
        false
    }

    /// Checks an unclustered hot index against the instance counts of the
    /// last render; returns true if it cleared
    pub fn validate_unclustered(&mut self, counts: &HashMap<VoId, usize>) -> bool {
        let Some(item) = self.current.as_ref() else {
            return false;
        };
        if self.clustered || item.is_design_handle {
            return false;
        }
        let valid = match item.vo {
            Some(vo) => counts.get(&vo).is_some_and(|count| item.index < *count),
            None => true,
        };
        if !valid {
            self.clear();
        }
        !valid
    }
}
