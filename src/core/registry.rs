//! Name-keyed set of live scenes, owned by the host application.

use crate::core::description::SceneDescription;
use crate::core::scene::Scene;
use crate::tiles::source::TileSource;
use crate::{Error, Result};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct SceneRegistry {
    scenes: BTreeMap<String, Scene>,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scene: Scene) -> Result<()> {
        let name = scene.name().to_string();
        if self.scenes.contains_key(&name) {
            return Err(Error::DuplicateScene(name));
        }
        log::debug!("registered scene '{}'", name);
        self.scenes.insert(name, scene);
        Ok(())
    }

    /// Creates the described scene, or merges the description into the
    /// live scene of the same name. `source` is only used on creation.
    pub fn load(
        &mut self,
        description: SceneDescription,
        viewport: (u32, u32),
        source: Box<dyn TileSource>,
    ) -> Result<&mut Scene> {
        let name = description.name.clone();
        if let Some(scene) = self.scenes.get_mut(&name) {
            scene.merge(description)?;
        } else {
            let scene = Scene::from_description(description, viewport, source)?;
            self.scenes.insert(name.clone(), scene);
        }
        self.get_mut(&name)
    }

    pub fn get(&self, name: &str) -> Result<&Scene> {
        self.scenes
            .get(name)
            .ok_or_else(|| Error::SceneNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Scene> {
        self.scenes
            .get_mut(name)
            .ok_or_else(|| Error::SceneNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scenes.contains_key(name)
    }

    /// Tears the scene down and hands it back
    pub fn remove(&mut self, name: &str) -> Result<Scene> {
        let mut scene = self
            .scenes
            .remove(name)
            .ok_or_else(|| Error::SceneNotFound(name.to_string()))?;
        scene.teardown();
        Ok(scene)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.scenes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn clear(&mut self) {
        for (_, mut scene) in std::mem::take(&mut self.scenes) {
            scene.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::source::BlankTileSource;

    fn scene(name: &str) -> Scene {
        Scene::from_description(SceneDescription::new(name), (512, 512), Box::new(BlankTileSource)).unwrap()
    }

    #[test]
    fn test_insert_get_remove() {
        let mut registry = SceneRegistry::new();
        registry.insert(scene("a")).unwrap();
        registry.insert(scene("b")).unwrap();
        assert!(matches!(registry.insert(scene("a")), Err(Error::DuplicateScene(name)) if name == "a"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a", "b"]);

        let removed = registry.remove("a").unwrap();
        assert!(removed.is_torn_down());
        assert!(matches!(registry.get("a"), Err(Error::SceneNotFound(_))));
        assert!(matches!(registry.remove("a"), Err(Error::SceneNotFound(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_load_merges_existing() {
        let mut registry = SceneRegistry::new();
        let mut description = SceneDescription::new("harbour");
        registry
            .load(description.clone(), (512, 512), Box::new(BlankTileSource))
            .unwrap();

        description.ref_map_layer_stack = "satellite".into();
        let scene = registry
            .load(description, (512, 512), Box::new(BlankTileSource))
            .unwrap();
        assert_eq!(scene.controller().layer_stack(), "satellite");
        assert_eq!(registry.len(), 1);
    }
}
