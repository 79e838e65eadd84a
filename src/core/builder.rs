//! Scene builder for fluent API configuration
//!
//! Assembles a [`SceneDescription`] from profile, projection, border and
//! start-position settings, then creates the [`Scene`] from it.

use crate::{
    core::{
        config::{NavigationDisablement, RendererProfile},
        description::{GeoPosition, SceneDescription},
        geo::GeoBorder,
        kind::SceneKind,
        projection::ProjectionKind,
        scene::Scene,
    },
    spatial::clustering::ClusteringEngine,
    tiles::source::{BlankTileSource, TileSource},
    Result,
};

/// Builder for creating and configuring Scene instances
pub struct SceneBuilder {
    name: String,
    kind: SceneKind,
    profile: RendererProfile,
    projection: Option<ProjectionKind>,
    viewport: (u32, u32),
    /// Longitude/latitude in degrees
    start: Option<(f64, f64)>,
    zoom: Option<f64>,
    border: Option<GeoBorder>,
    navigation: NavigationDisablement,
    layer_stack: String,
    tile_source: Option<Box<dyn TileSource>>,
    clustering: Option<Box<dyn ClusteringEngine>>,
}

impl SceneBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SceneKind::default(),
            profile: RendererProfile::default(),
            projection: None,
            viewport: (800, 600),
            start: None,
            zoom: None,
            border: None,
            navigation: NavigationDisablement::default(),
            layer_stack: String::new(),
            tile_source: None,
            clustering: None,
        }
    }

    pub fn with_kind(mut self, kind: SceneKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the renderer profile
    pub fn with_profile(mut self, profile: RendererProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_projection(mut self, projection: ProjectionKind) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = (width, height);
        self
    }

    /// Set the initial center (degrees) and exact LOD
    pub fn with_center_and_zoom(mut self, lon: f64, lat: f64, zoom: f64) -> Self {
        self.start = Some((lon, lat));
        self.zoom = Some(zoom);
        self
    }

    pub fn with_visual_border(mut self, border: GeoBorder) -> Self {
        self.border = Some(border);
        self
    }

    pub fn with_navigation_disabled(mut self, navigation: NavigationDisablement) -> Self {
        self.navigation = navigation;
        self
    }

    pub fn with_layer_stack(mut self, layer_stack: impl Into<String>) -> Self {
        self.layer_stack = layer_stack.into();
        self
    }

    pub fn with_tile_source(mut self, source: Box<dyn TileSource>) -> Self {
        self.tile_source = Some(source);
        self
    }

    pub fn with_clustering_engine(mut self, engine: Box<dyn ClusteringEngine>) -> Self {
        self.clustering = Some(engine);
        self
    }

    /// The description this builder would create the scene from
    pub fn description(&self) -> SceneDescription {
        let mut description = SceneDescription::new(self.name.clone());
        description.kind = self.kind;
        description.config = self.profile.resolve();
        description.visual_frame = self.border;
        description.initial_start_position = self.start.map(|(lon, lat)| GeoPosition { lon, lat });
        description.initial_zoom = self.zoom;
        description.ref_map_layer_stack = self.layer_stack.clone();
        description.navigation_disablement = self.navigation;
        description.projection = self.projection.map(|kind| provider_id(kind).to_string());
        description
    }

    /// Build the scene with the configured options
    pub fn build(self) -> Result<Scene> {
        let description = self.description();
        let source = self
            .tile_source
            .unwrap_or_else(|| Box::new(BlankTileSource));
        let scene = Scene::from_description(description, self.viewport, source)?;
        Ok(match self.clustering {
            Some(engine) => scene.with_clustering_engine(engine),
            None => scene,
        })
    }
}

fn provider_id(kind: ProjectionKind) -> &'static str {
    match kind {
        ProjectionKind::Mercator => "mercator",
        ProjectionKind::Linear => "linear",
        ProjectionKind::EllipticalMercator => "ellipticalmercator",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::LonLat;

    #[test]
    fn test_builder_description() {
        let builder = SceneBuilder::new("port")
            .with_profile(RendererProfile::LowMemory)
            .with_projection(ProjectionKind::EllipticalMercator)
            .with_center_and_zoom(10.0, 53.5, 8.0)
            .with_layer_stack("streets");
        let description = builder.description();
        assert_eq!(description.projection_kind().unwrap(), ProjectionKind::EllipticalMercator);
        assert!(description.config.surfaces.force_reduced);
        assert_eq!(description.ref_map_layer_stack, "streets");
    }

    #[test]
    fn test_builder_builds_centered_scene() {
        let scene = SceneBuilder::new("port")
            .with_viewport(640, 480)
            .with_center_and_zoom(10.0, 53.5, 8.0)
            .build()
            .unwrap();
        assert_eq!(scene.view().exact_lod, 8.0);
        let center = scene.controller().center_geo();
        let expected = LonLat::from_degrees(10.0, 53.5);
        assert!((center.lon - expected.lon).abs() < 1e-6);
        assert!((center.lat - expected.lat).abs() < 1e-6);
    }
}
