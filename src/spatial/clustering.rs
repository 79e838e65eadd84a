//! Cluster snapshots, the clustering-engine seam and the bundled grid clusterer.
//!
//! A snapshot is only valid for the `(lod, tile window, data version)` it
//! was computed for. The cache enforces that: lookups and inserts with an
//! outdated data version are refused, and a version bump empties it.

use crate::core::bounds::Bounds;
use crate::core::geo::{LonLat, Point};
use crate::core::projection::{world_size, Projection};
use crate::layers::vo::VoId;
use crate::prelude::HashMap;
use crate::spatial::hot::HotReference;
use crate::spatial::index::{SpatialIndex, SpatialItem};
use crate::tiles::window::TileWindow;
use lru::LruCache;
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::rc::Rc;

/// Stable identity of a multi-member cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterId(pub u64);

/// Recluster-stable reference to one instance of a clustered object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterRef {
    Cluster(ClusterId),
    /// An unmerged instance, by its index in the object's positions
    Base(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterKey {
    pub lod: i32,
    pub tile_x: i64,
    pub tile_y: i64,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub data_version: u64,
}

impl ClusterKey {
    pub fn new(window: &TileWindow, data_version: u64) -> Self {
        Self {
            lod: window.lod,
            tile_x: window.tile_x,
            tile_y: window.tile_y,
            tiles_x: window.tiles_x,
            tiles_y: window.tiles_y,
            data_version,
        }
    }

    /// Window rectangle in UCS pixels of `lod`
    pub fn window_bounds(&self, tile_size: u32) -> Bounds {
        let t = tile_size as f64;
        Bounds::from_coords(
            self.tile_x as f64 * t,
            self.tile_y as f64 * t,
            (self.tile_x + self.tiles_x as i64) as f64 * t,
            (self.tile_y + self.tiles_y as i64) as f64 * t,
        )
    }
}

/// One drawable instance after clustering
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterInstance {
    pub id: ClusterRef,
    pub position: LonLat,
    /// Indices into the object's positions, ascending
    pub members: Vec<usize>,
}

impl ClusterInstance {
    pub fn is_cluster(&self) -> bool {
        self.members.len() > 1
    }
}

/// Clustered instance set of one visual object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoClusters {
    pub instances: Vec<ClusterInstance>,
}

impl VoClusters {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ClusterInstance> {
        self.instances.get(index)
    }

    /// Instance index currently carrying `element`
    pub fn find(&self, element: &ClusterRef) -> Option<usize> {
        self.instances.iter().position(|instance| instance.id == *element)
    }

    /// Instance index that contains the base position `base`
    pub fn instance_of_base(&self, base: usize) -> Option<usize> {
        self.instances
            .iter()
            .position(|instance| instance.members.binary_search(&base).is_ok())
    }
}

#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    pub key: ClusterKey,
    /// Advances whenever cluster identities may have changed meaning
    pub recalc_counter: u64,
    /// Assigned by the cache, increasing per stored snapshot
    pub generation: u64,
    /// Some cluster wants a halo drawn on the shadow surface
    pub needs_halo: bool,
    per_vo: HashMap<VoId, VoClusters>,
}

impl ClusterSnapshot {
    pub fn new(key: ClusterKey, recalc_counter: u64) -> Self {
        Self {
            key,
            recalc_counter,
            generation: 0,
            needs_halo: false,
            per_vo: HashMap::default(),
        }
    }

    pub fn insert(&mut self, vo: VoId, clusters: VoClusters) {
        self.needs_halo |= clusters.instances.iter().any(ClusterInstance::is_cluster);
        self.per_vo.insert(vo, clusters);
    }

    pub fn for_vo(&self, vo: VoId) -> Option<&VoClusters> {
        self.per_vo.get(&vo)
    }

    pub fn contains(&self, vo: VoId) -> bool {
        self.per_vo.contains_key(&vo)
    }

    /// Recluster-stable reference of an instance
    pub fn element(&self, vo: VoId, index: usize) -> Option<ClusterRef> {
        self.for_vo(vo)?.get(index).map(|instance| instance.id)
    }

    pub fn resolve(&self, vo: VoId, element: &ClusterRef) -> Option<usize> {
        self.for_vo(vo)?.find(element)
    }

    pub fn instance_count(&self) -> usize {
        self.per_vo.values().map(VoClusters::len).sum()
    }
}

/// Objects handed to a clustering pass
pub struct ClusterInput<'a> {
    pub vos: Vec<(VoId, &'a [LonLat])>,
    pub projection: &'a dyn Projection,
    pub tile_size: u32,
}

/// External collaborator that buckets point instances.
pub trait ClusteringEngine {
    fn compute_clusters(
        &mut self,
        input: &ClusterInput<'_>,
        key: ClusterKey,
        hot: Option<&HotReference>,
    ) -> ClusterSnapshot;

    /// Picks up a changed `cluster_grid_size`; engines without a grid
    /// ignore it
    fn set_grid_size(&mut self, _grid_size: f64) {}
}

/// Configuration for the bundled grid clusterer
#[derive(Debug, Clone)]
pub struct GridClusterConfig {
    /// Grid size for clustering (in pixels)
    pub grid_size: f64,
    /// LOD from which every instance is drawn on its own
    pub disable_at_lod: Option<i32>,
    /// Maximum number of items in a single cluster
    pub max_cluster_size: usize,
}

impl Default for GridClusterConfig {
    fn default() -> Self {
        Self {
            grid_size: crate::core::constants::DEFAULT_CLUSTER_GRID_SIZE,
            disable_at_lod: Some(15),
            max_cluster_size: 100,
        }
    }
}

/// Grid-based clustering in UCS pixels of the window LOD.
///
/// Cells are anchored to the world, not to the window, so shifting the
/// window at the same LOD keeps cluster ids and the recalculation counter.
#[derive(Debug, Default)]
pub struct GridClusterer {
    config: GridClusterConfig,
    recalc_counter: u64,
    last_pass: Option<(u64, i32)>,
}

impl GridClusterer {
    pub fn new(config: GridClusterConfig) -> Self {
        Self {
            config,
            recalc_counter: 0,
            last_pass: None,
        }
    }

    pub fn with_grid_size(grid_size: f64) -> Self {
        Self::new(GridClusterConfig {
            grid_size,
            ..GridClusterConfig::default()
        })
    }

    pub fn config(&self) -> &GridClusterConfig {
        &self.config
    }

    fn cluster_id(cell: (i64, i64), chunk: usize) -> ClusterId {
        ClusterId(fxhash::hash64(&(cell.0, cell.1, chunk)))
    }

    /// Members of `positions` whose projection falls inside the window,
    /// across every world copy the window overlaps
    fn members_in_window(
        index: &SpatialIndex<usize>,
        window: &Bounds,
        world: f64,
    ) -> BTreeSet<usize> {
        let first = (window.min.x / world).floor() as i64;
        let last = (window.max.x / world).floor() as i64;
        let mut members = BTreeSet::new();
        for copy in first..=last {
            let shift = copy as f64 * world;
            let shifted = Bounds::from_coords(
                window.min.x - shift,
                window.min.y,
                window.max.x - shift,
                window.max.y,
            );
            members.extend(index.query(&shifted).map(|item| item.data));
        }
        members
    }
}

impl ClusteringEngine for GridClusterer {
    fn set_grid_size(&mut self, grid_size: f64) {
        if self.config.grid_size != grid_size {
            log::debug!("cluster grid size {} -> {}", self.config.grid_size, grid_size);
            self.config.grid_size = grid_size;
            self.last_pass = None;
        }
    }

    fn compute_clusters(
        &mut self,
        input: &ClusterInput<'_>,
        key: ClusterKey,
        _hot: Option<&HotReference>,
    ) -> ClusterSnapshot {
        if self.last_pass != Some((key.data_version, key.lod)) {
            self.recalc_counter += 1;
            self.last_pass = Some((key.data_version, key.lod));
            log::debug!(
                "recluster pass {} (lod {}, data version {})",
                self.recalc_counter,
                key.lod,
                key.data_version
            );
        }

        let lod = key.lod as f64;
        let world = world_size(lod, input.tile_size);
        let window = key.window_bounds(input.tile_size);
        let grid = self.config.grid_size.max(1.0);
        let disabled = self.config.disable_at_lod.is_some_and(|at| key.lod >= at);
        let mut snapshot = ClusterSnapshot::new(key, self.recalc_counter);

        for (vo, positions) in &input.vos {
            let projected: Vec<Point> = positions
                .iter()
                .map(|geo| input.projection.to_map_space(*geo, lod, input.tile_size))
                .collect();
            let index = SpatialIndex::bulk_load(
                projected
                    .iter()
                    .enumerate()
                    .map(|(i, p)| SpatialItem::new(*p, i))
                    .collect(),
            );
            let members = Self::members_in_window(&index, &window, world);

            let mut cells: BTreeMap<(i64, i64), Vec<usize>> = BTreeMap::new();
            for member in members {
                let p = projected[member];
                let cell = if disabled {
                    (member as i64, i64::MIN)
                } else {
                    ((p.x / grid).floor() as i64, (p.y / grid).floor() as i64)
                };
                cells.entry(cell).or_default().push(member);
            }

            let mut clusters = VoClusters::default();
            for (cell, cell_members) in cells {
                for (chunk, group) in cell_members.chunks(self.config.max_cluster_size.max(1)).enumerate() {
                    let id = if group.len() == 1 {
                        ClusterRef::Base(group[0])
                    } else {
                        ClusterRef::Cluster(Self::cluster_id(cell, chunk))
                    };
                    let sum = group
                        .iter()
                        .fold(Point::new(0.0, 0.0), |acc, m| acc.add(&projected[*m]));
                    let mean = sum.multiply(1.0 / group.len() as f64);
                    clusters.instances.push(ClusterInstance {
                        id,
                        position: input.projection.to_geo(mean, lod, input.tile_size),
                        members: group.to_vec(),
                    });
                }
            }
            snapshot.insert(*vo, clusters);
        }
        snapshot
    }
}

/// LRU cache of snapshots for the current data version
pub struct ClusterCache {
    entries: LruCache<ClusterKey, Rc<ClusterSnapshot>>,
    data_version: u64,
    next_generation: u64,
}

impl ClusterCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            data_version: 0,
            next_generation: 1,
        }
    }

    pub fn data_version(&self) -> u64 {
        self.data_version
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        self.entries.resize(capacity);
    }

    /// Invalidates every snapshot; returns the new data version
    pub fn bump_version(&mut self) -> u64 {
        self.data_version += 1;
        self.entries.clear();
        self.data_version
    }

    pub fn get(&mut self, key: &ClusterKey) -> Option<Rc<ClusterSnapshot>> {
        if key.data_version != self.data_version {
            return None;
        }
        self.entries.get(key).cloned()
    }

    /// Stores a freshly computed snapshot, stamping its generation.
    ///
    /// Snapshots computed for an older data version are dropped.
    pub fn insert(&mut self, mut snapshot: ClusterSnapshot) -> Option<Rc<ClusterSnapshot>> {
        if snapshot.key.data_version != self.data_version {
            log::debug!(
                "dropping stale cluster snapshot (version {} < {})",
                snapshot.key.data_version,
                self.data_version
            );
            return None;
        }
        snapshot.generation = self.next_generation;
        self.next_generation += 1;
        let snapshot = Rc::new(snapshot);
        self.entries.put(snapshot.key, Rc::clone(&snapshot));
        Some(snapshot)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::projection::ProjectionKind;
    use crate::layers::vo::VoArena;

    fn vo_id() -> VoId {
        struct Dot;
        impl crate::layers::vo::VisualObject for Dot {
            fn label(&self) -> &str {
                "dot"
            }
            fn render(
                &mut self,
                _: &mut image::RgbaImage,
                _: &crate::rendering::context::RenderContext,
                _: Option<&VoClusters>,
                _: Option<usize>,
            ) -> usize {
                0
            }
            fn on_hit_test(
                &mut self,
                _: &crate::input::events::SceneEvent,
                _: &crate::rendering::context::HitContext,
                _: Option<usize>,
            ) -> bool {
                false
            }
        }
        VoArena::new().insert(Box::new(Dot))
    }

    fn key(lod: i32, tile_x: i64, data_version: u64) -> ClusterKey {
        ClusterKey {
            lod,
            tile_x,
            tile_y: 0,
            tiles_x: 1 << lod,
            tiles_y: 1 << lod,
            data_version,
        }
    }

    fn positions() -> Vec<LonLat> {
        vec![
            LonLat::from_degrees(10.0, 10.0),
            LonLat::from_degrees(10.5, 10.2),
            LonLat::from_degrees(10.2, 9.9),
            LonLat::from_degrees(-120.0, -40.0),
        ]
    }

    #[test]
    fn test_grid_clusters_nearby_points() {
        let projection = ProjectionKind::Mercator.build();
        let vo = vo_id();
        let points = positions();
        let input = ClusterInput {
            vos: vec![(vo, points.as_slice())],
            projection: projection.as_ref(),
            tile_size: 256,
        };
        let mut engine = GridClusterer::default();
        let snapshot = engine.compute_clusters(&input, key(2, 0, 0), None);
        let clusters = snapshot.for_vo(vo).unwrap();

        assert_eq!(clusters.len(), 2);
        assert!(snapshot.needs_halo);
        let merged = clusters.instance_of_base(1).unwrap();
        assert_eq!(clusters.get(merged).unwrap().members, vec![0, 1, 2]);
        assert_eq!(
            clusters.get(clusters.instance_of_base(3).unwrap()).unwrap().id,
            ClusterRef::Base(3)
        );
        assert_eq!(snapshot.instance_count(), 2);
    }

    #[test]
    fn test_disabled_at_high_lod() {
        let projection = ProjectionKind::Mercator.build();
        let vo = vo_id();
        let points = positions();
        let input = ClusterInput {
            vos: vec![(vo, points.as_slice())],
            projection: projection.as_ref(),
            tile_size: 256,
        };
        let mut engine = GridClusterer::new(GridClusterConfig {
            disable_at_lod: Some(2),
            ..GridClusterConfig::default()
        });
        let snapshot = engine.compute_clusters(&input, key(2, 0, 0), None);
        assert_eq!(snapshot.for_vo(vo).unwrap().len(), 4);
        assert!(!snapshot.needs_halo);
    }

    #[test]
    fn test_recalc_counter_rules() {
        let projection = ProjectionKind::Mercator.build();
        let vo = vo_id();
        let points = positions();
        let input = ClusterInput {
            vos: vec![(vo, points.as_slice())],
            projection: projection.as_ref(),
            tile_size: 256,
        };
        let mut engine = GridClusterer::default();
        let first = engine.compute_clusters(&input, key(3, 0, 0), None);
        let shifted = engine.compute_clusters(&input, key(3, 2, 0), None);
        assert_eq!(first.recalc_counter, shifted.recalc_counter);
        assert_eq!(
            first.element(vo, first.for_vo(vo).unwrap().instance_of_base(0).unwrap()),
            shifted.element(vo, shifted.for_vo(vo).unwrap().instance_of_base(0).unwrap())
        );

        let bumped = engine.compute_clusters(&input, key(3, 2, 1), None);
        assert!(bumped.recalc_counter > shifted.recalc_counter);
        let zoomed = engine.compute_clusters(&input, key(4, 0, 1), None);
        assert!(zoomed.recalc_counter > bumped.recalc_counter);
    }

    #[test]
    fn test_grid_size_change_reclusters() {
        let projection = ProjectionKind::Mercator.build();
        let vo = vo_id();
        let points = positions();
        let input = ClusterInput {
            vos: vec![(vo, points.as_slice())],
            projection: projection.as_ref(),
            tile_size: 256,
        };
        let mut engine = GridClusterer::default();
        let coarse = engine.compute_clusters(&input, key(2, 0, 0), None);
        assert_eq!(coarse.for_vo(vo).unwrap().len(), 2);

        engine.set_grid_size(4096.0);
        assert_eq!(engine.config().grid_size, 4096.0);
        let wide = engine.compute_clusters(&input, key(2, 0, 0), None);
        assert_eq!(wide.for_vo(vo).unwrap().len(), 1);
        assert!(wide.recalc_counter > coarse.recalc_counter);
    }

    #[test]
    fn test_cache_versioning() {
        let mut cache = ClusterCache::new(2);
        let stored = cache.insert(ClusterSnapshot::new(key(1, 0, 0), 1)).unwrap();
        assert_eq!(stored.generation, 1);
        assert!(cache.get(&key(1, 0, 0)).is_some());

        assert_eq!(cache.bump_version(), 1);
        assert!(cache.is_empty());
        assert!(cache.get(&key(1, 0, 0)).is_none());
        assert!(cache.insert(ClusterSnapshot::new(key(1, 0, 0), 1)).is_none());

        let fresh = cache.insert(ClusterSnapshot::new(key(1, 0, 1), 2)).unwrap();
        assert_eq!(fresh.generation, 2);
        cache.insert(ClusterSnapshot::new(key(2, 0, 1), 2));
        cache.insert(ClusterSnapshot::new(key(3, 0, 1), 2));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(1, 0, 1)).is_none());
    }
}
