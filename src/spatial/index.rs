use crate::core::{bounds::Bounds, geo::Point};

use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// A positioned item that can be indexed via an R-tree
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialItem<T> {
    pub position: Point,
    pub data: T,
}

impl<T> SpatialItem<T> {
    pub fn new(position: Point, data: T) -> Self {
        Self { position, data }
    }
}

// --- rstar integration -------------------------------------------------------------------------

impl<T> RTreeObject for SpatialItem<T> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.position.x, self.position.y])
    }
}

impl<T> PointDistance for SpatialItem<T> {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.position.x - point[0];
        let dy = self.position.y - point[1];
        dx * dx + dy * dy
    }
}

/// R-tree over points in UCS pixels
pub struct SpatialIndex<T> {
    rtree: RTree<SpatialItem<T>>,
}

impl<T> SpatialIndex<T> {
    pub fn new() -> Self {
        Self { rtree: RTree::new() }
    }

    /// Builds a balanced tree in one pass
    pub fn bulk_load(items: Vec<SpatialItem<T>>) -> Self {
        Self {
            rtree: RTree::bulk_load(items),
        }
    }

    pub fn insert(&mut self, item: SpatialItem<T>) {
        self.rtree.insert(item);
    }

    pub fn query(&self, bounds: &Bounds) -> impl Iterator<Item = &SpatialItem<T>> {
        let envelope = AABB::from_corners([bounds.min.x, bounds.min.y], [bounds.max.x, bounds.max.y]);
        self.rtree.locate_in_envelope(&envelope)
    }

    pub fn query_radius(&self, center: &Point, radius: f64) -> impl Iterator<Item = &SpatialItem<T>> {
        self.rtree.locate_within_distance([center.x, center.y], radius * radius)
    }

    pub fn bounds(&self) -> Option<Bounds> {
        if self.is_empty() {
            return None;
        }
        let env = self.rtree.root().envelope();
        Some(Bounds::from_coords(
            env.lower()[0],
            env.lower()[1],
            env.upper()[0],
            env.upper()[1],
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.rtree.size() == 0
    }

    pub fn len(&self) -> usize {
        self.rtree.size()
    }

    pub fn clear(&mut self) {
        self.rtree = RTree::new();
    }
}

impl<T> Default for SpatialIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}
