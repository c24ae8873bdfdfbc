//! Object type registry.
//!
//! Index files refer to object types by their numeric [`TypeId`]. The
//! [`TypeConfig`] maps ids to names and capabilities and is stored next to the
//! indexes as `types.json`.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{MapscoutError, Result};

/// Stable numeric index of an object type.
pub type TypeId = u16;

/// Description of one object type, e.g. `highway_primary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeInfo {
    pub id: TypeId,
    pub name: String,
    #[serde(default)]
    pub can_be_node: bool,
    #[serde(default)]
    pub can_be_way: bool,
    #[serde(default)]
    pub can_be_area: bool,
}

impl TypeInfo {
    pub fn new(id: TypeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            can_be_node: false,
            can_be_way: false,
            can_be_area: false,
        }
    }

    pub fn with_node(mut self) -> Self {
        self.can_be_node = true;
        self
    }

    pub fn with_way(mut self) -> Self {
        self.can_be_way = true;
        self
    }

    pub fn with_area(mut self) -> Self {
        self.can_be_area = true;
        self
    }
}

/// Ordered registry of all object types of a database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeConfig {
    types: Vec<TypeInfo>,
}

impl TypeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type. Ids must be unique.
    pub fn register(&mut self, info: TypeInfo) -> Result<()> {
        if self.get(info.id).is_some() {
            return Err(MapscoutError::InvalidInput(format!(
                "Type id {} registered twice",
                info.id
            )));
        }
        let pos = self.types.partition_point(|t| t.id < info.id);
        self.types.insert(pos, info);
        Ok(())
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeInfo> {
        self.types
            .binary_search_by_key(&id, |t| t.id)
            .ok()
            .map(|pos| &self.types[pos])
    }

    pub fn by_name(&self, name: &str) -> Option<&TypeInfo> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn types(&self) -> &[TypeInfo] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn node_types(&self) -> TypeInfoSet {
        self.types.iter().filter(|t| t.can_be_node).map(|t| t.id).collect()
    }

    pub fn way_types(&self) -> TypeInfoSet {
        self.types.iter().filter(|t| t.can_be_way).map(|t| t.id).collect()
    }

    pub fn area_types(&self) -> TypeInfoSet {
        self.types.iter().filter(|t| t.can_be_area).map(|t| t.id).collect()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: TypeConfig = serde_json::from_str(&json)?;
        config.check_unique()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn check_unique(&self) -> Result<()> {
        if self.types.windows(2).any(|w| w[0].id >= w[1].id) {
            return Err(MapscoutError::InvalidInput(
                "Type ids must be unique and sorted".to_string(),
            ));
        }
        Ok(())
    }
}

/// A set of type ids, iterated in id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfoSet {
    ids: BTreeSet<TypeId>,
}

impl TypeInfoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: TypeId) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: TypeId) -> bool {
        self.ids.remove(&id)
    }

    /// Remove every id contained in `other`.
    pub fn remove_all(&mut self, other: &TypeInfoSet) {
        for id in &other.ids {
            self.ids.remove(id);
        }
    }

    pub fn extend_from(&mut self, other: &TypeInfoSet) {
        self.ids.extend(other.ids.iter().copied());
    }

    /// Keep only ids also contained in `other`.
    pub fn retain_common(&mut self, other: &TypeInfoSet) {
        self.ids.retain(|id| other.ids.contains(id));
    }

    pub fn intersects(&self, other: &TypeInfoSet) -> bool {
        self.ids.iter().any(|id| other.ids.contains(id))
    }

    pub fn contains(&self, id: TypeId) -> bool {
        self.ids.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.ids.iter().copied()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

impl FromIterator<TypeId> for TypeInfoSet {
    fn from_iter<I: IntoIterator<Item = TypeId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_config() -> TypeConfig {
        let mut config = TypeConfig::new();
        config
            .register(TypeInfo::new(3, "building").with_area())
            .unwrap();
        config
            .register(TypeInfo::new(1, "highway_primary").with_way())
            .unwrap();
        config
            .register(TypeInfo::new(2, "amenity_cafe").with_node().with_area())
            .unwrap();
        config
    }

    #[test]
    fn test_register_keeps_id_order() {
        let config = sample_config();
        let ids: Vec<_> = config.types().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(config.get(2).unwrap().name, "amenity_cafe");
        assert_eq!(config.by_name("building").unwrap().id, 3);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut config = sample_config();
        assert!(config.register(TypeInfo::new(1, "again")).is_err());
    }

    #[test]
    fn test_capability_sets() {
        let config = sample_config();
        assert_eq!(config.area_types().iter().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(config.node_types().iter().collect::<Vec<_>>(), vec![2]);
        assert_eq!(config.way_types().iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_type_set_remove_all() {
        let mut a: TypeInfoSet = [1, 2, 3, 4].into_iter().collect();
        let b: TypeInfoSet = [2, 4].into_iter().collect();
        a.remove_all(&b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_save_and_load() {
        let temp = NamedTempFile::new().unwrap();
        let config = sample_config();
        config.save(temp.path()).unwrap();

        let loaded = TypeConfig::load(temp.path()).unwrap();
        assert_eq!(loaded, config);
    }
}
