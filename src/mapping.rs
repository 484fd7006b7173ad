//! Geometry identifier mapping.
//!
//! The mapper walks the locked volume tree from the world template down,
//! composes every daughter placement into a world-frame placement, runs each
//! daughter's mapping rule through the category registry to synthesize its
//! [`GeomId`], and publishes the result as an immutable dictionary from
//! identifier to placed-volume record. The walk is depth-first in
//! declaration order, so the dictionary is reproducible between runs.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use log::{debug, trace};
use serde::Deserialize;

use crate::category::{CategoryRegistry, MappingRule};
use crate::error::{Error, Result};
use crate::geom_id::{GeomId, WORLD_TYPE};
use crate::model::{LogicalVolume, ModelFactory};
use crate::placement::Placement;
use crate::replication::Replication;
use crate::shape::Shape;

/// How a daughter picks the mother identifier its own addresses inherit
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    /// The daughter inherits from its direct mapped mother only.
    #[default]
    StrictMothership,
    /// The daughter may inherit from any mapped ancestor; the nearest
    /// ancestor whose category accepts the rule wins.
    LazyMothership,
}

impl FromStr for BuildMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "strict" | "strict_mothership" => Ok(BuildMode::StrictMothership),
            "lazy" | "lazy_mothership" => Ok(BuildMode::LazyMothership),
            other => Err(Error::InvalidDefinition(format!(
                "unknown build mode '{other}'"
            ))),
        }
    }
}

/// Which synthesized identifiers are inserted into the dictionary.
///
/// Filtering never prunes the traversal: excluded volumes are still walked
/// and their identifiers still feed address inheritance, they just do not
/// land in the published dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    None,
    Only(BTreeSet<String>),
    Excluded(BTreeSet<String>),
}

impl CategoryFilter {
    pub fn admits(&self, category: &str) -> bool {
        match self {
            CategoryFilter::None => true,
            CategoryFilter::Only(set) => set.contains(category),
            CategoryFilter::Excluded(set) => !set.contains(category),
        }
    }
}

/// Mapping build policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingConfig {
    /// Deepest daughter level to map; 0 means unlimited.
    pub max_depth: usize,
    pub build_mode: BuildMode,
    pub filter: CategoryFilter,
    /// Whether the world volume itself gets a dictionary entry.
    pub map_world: bool,
}

impl MappingConfig {
    pub fn new() -> Self {
        Self {
            max_depth: 0,
            build_mode: BuildMode::StrictMothership,
            filter: CategoryFilter::None,
            map_world: true,
        }
    }
}

/// Lifecycle of a mapping instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildState {
    #[default]
    Idle,
    Building,
    Built,
    Failed,
}

/// One placed-volume record of the dictionary.
#[derive(Debug, Clone)]
pub struct GeomInfo {
    pub id: GeomId,
    pub world_placement: Placement,
    pub shape: Shape,
    pub material: String,
    /// Arena index of the volume template this instance was stamped from.
    pub logical: usize,
}

/// The immutable product of a mapping build: identifier to record, plus a
/// per-type index for category-wide queries.
#[derive(Debug, Clone, Default)]
pub struct MappingDict {
    infos: BTreeMap<GeomId, GeomInfo>,
    by_type: BTreeMap<u32, Vec<GeomId>>,
}

impl MappingDict {
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn has(&self, id: &GeomId) -> bool {
        self.infos.contains_key(id)
    }

    pub fn get(&self, id: &GeomId) -> Option<&GeomInfo> {
        self.infos.get(id)
    }

    /// All records in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&GeomId, &GeomInfo)> {
        self.infos.iter()
    }

    /// Identifiers of one category type, in insertion-independent order.
    pub fn ids_with_type(&self, type_id: u32) -> &[GeomId] {
        self.by_type.get(&type_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn infos_with_type(&self, type_id: u32) -> impl Iterator<Item = &GeomInfo> {
        self.ids_with_type(type_id)
            .iter()
            .filter_map(|id| self.infos.get(id))
    }

    fn insert(&mut self, info: GeomInfo, path: &str) -> Result<()> {
        let id = info.id.clone();
        if self.infos.contains_key(&id) {
            return Err(Error::DuplicateIdentifier {
                id,
                path: path.to_string(),
            });
        }
        self.by_type.entry(id.type_id()).or_default().push(id.clone());
        self.infos.insert(id, info);
        Ok(())
    }
}

/// Builds and owns a geometry identifier dictionary.
#[derive(Debug, Default)]
pub struct Mapping {
    config: MappingConfig,
    state: BuildState,
    dict: MappingDict,
}

impl Mapping {
    pub fn new(config: MappingConfig) -> Self {
        Self {
            config,
            state: BuildState::Idle,
            dict: MappingDict::default(),
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    /// The published dictionary. Empty unless the state is `Built`.
    pub fn dictionary(&self) -> &MappingDict {
        &self.dict
    }

    /// Runs the build against a locked model registry and a category
    /// schema registry.
    ///
    /// The dictionary is assembled locally and only published on success;
    /// after a failure the mapping reports `Failed` and stays empty. A
    /// successful build marks the factory consumed so the volume arena the
    /// dictionary indexes into cannot be unlocked away.
    pub fn build_from(
        &mut self,
        factory: &ModelFactory,
        registry: &CategoryRegistry,
    ) -> Result<()> {
        match self.state {
            BuildState::Idle => {}
            _ => return Err(Error::AlreadyBuilt),
        }
        self.state = BuildState::Building;
        match self.run_build(factory, registry) {
            Ok(dict) => {
                debug!("mapping built: {} entry(ies)", dict.len());
                factory.mark_consumed();
                self.dict = dict;
                self.state = BuildState::Built;
                Ok(())
            }
            Err(e) => {
                self.state = BuildState::Failed;
                Err(e)
            }
        }
    }

    fn run_build(
        &self,
        factory: &ModelFactory,
        registry: &CategoryRegistry,
    ) -> Result<MappingDict> {
        let volumes = factory.volumes()?;
        let world_idx = factory.index_of(factory.world_label())?;
        let world_volume = &volumes[world_idx];

        // The world is address zero at every field of the world category.
        // Its schema must exist before anything inherits from it.
        let world_info = registry.info_by_type(WORLD_TYPE)?;
        let world_id = GeomId::new(WORLD_TYPE, vec![0; world_info.depth()]);
        debug!(
            "mapping world '{}' as {}",
            world_volume.name, world_id
        );

        let mut walker = Walker {
            volumes,
            registry,
            config: &self.config,
            dict: MappingDict::default(),
        };

        if self.config.map_world && self.config.filter.admits(&world_info.category) {
            walker.dict.insert(
                GeomInfo {
                    id: world_id.clone(),
                    world_placement: Placement::identity(),
                    shape: world_volume.shape.clone(),
                    material: world_volume.material.clone(),
                    logical: world_idx,
                },
                world_volume.name.as_str(),
            )?;
        }

        walker.descend(
            world_idx,
            &Placement::identity(),
            &[world_id],
            &world_volume.name,
            1,
        )?;
        Ok(walker.dict)
    }
}

struct Walker<'a> {
    volumes: &'a [LogicalVolume],
    registry: &'a CategoryRegistry,
    config: &'a MappingConfig,
    dict: MappingDict,
}

impl Walker<'_> {
    /// Maps the daughters of one placed volume. `mothers` is the mother
    /// identifier candidate list, nearest mapped ancestor first; strict
    /// mode only ever consults the head.
    fn descend(
        &mut self,
        logical: usize,
        world_placement: &Placement,
        mothers: &[GeomId],
        path: &str,
        depth: usize,
    ) -> Result<()> {
        for phys in &self.volumes[logical].physicals {
            for item in 0..phys.placement.number_of_items() {
                let local = phys.placement.placement_at(item);
                let world = world_placement.compose(&local);
                let item_path = format!("{path}/{}[{item}]", phys.label);

                let mapped = match &phys.mapping {
                    Some(rule) => {
                        let indices = phys.placement.index_map(item);
                        let id = self.synthesize(rule, &indices, mothers, &item_path)?;
                        trace!("mapped {item_path} as {id}");
                        if self.config.filter.admits(&rule.category) {
                            self.dict.insert(
                                GeomInfo {
                                    id: id.clone(),
                                    world_placement: world.clone(),
                                    shape: self.volumes[phys.logical].shape.clone(),
                                    material: self.volumes[phys.logical].material.clone(),
                                    logical: phys.logical,
                                },
                                &item_path,
                            )?;
                        }
                        Some(id)
                    }
                    None => None,
                };

                if self.config.max_depth == 0 || depth < self.config.max_depth {
                    // Unmapped daughters pass the mother candidates through
                    // unchanged so their children still inherit addresses.
                    let next: Vec<GeomId> = match (&mapped, self.config.build_mode) {
                        (Some(id), BuildMode::StrictMothership) => vec![id.clone()],
                        (Some(id), BuildMode::LazyMothership) => {
                            let mut list = Vec::with_capacity(mothers.len() + 1);
                            list.push(id.clone());
                            list.extend_from_slice(mothers);
                            list
                        }
                        (None, _) => mothers.to_vec(),
                    };
                    self.descend(phys.logical, &world, &next, &item_path, depth + 1)?;
                }
            }
        }
        Ok(())
    }

    fn synthesize(
        &self,
        rule: &MappingRule,
        indices: &[u32],
        mothers: &[GeomId],
        path: &str,
    ) -> Result<GeomId> {
        match self.config.build_mode {
            BuildMode::StrictMothership => {
                self.registry.fill_id(mothers.first(), rule, indices)
            }
            BuildMode::LazyMothership => {
                for candidate in mothers {
                    if let Ok(id) = self.registry.fill_id(Some(candidate), rule, indices) {
                        return Ok(id);
                    }
                }
                Err(Error::NoMothership {
                    path: path.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::category::CategoryDef;
    use crate::model::{DaughterDef, ModelDef, ModelSetup, PlacementDef};
    use crate::replication::GridPlane;
    use crate::shape::Axis;

    fn demo_registry() -> CategoryRegistry {
        let mut reg = CategoryRegistry::new();
        reg.declare(CategoryDef {
            category: "world".into(),
            type_id: 0,
            addresses: vec!["universe".into()],
            inherits: None,
            extends: None,
            by: vec![],
        })
        .unwrap();
        reg.declare(CategoryDef {
            category: "module".into(),
            type_id: 1000,
            addresses: vec![],
            inherits: None,
            extends: Some("world".into()),
            by: vec!["column".into(), "row".into()],
        })
        .unwrap();
        reg.declare(CategoryDef {
            category: "plate".into(),
            type_id: 2000,
            addresses: vec![],
            inherits: None,
            extends: Some("module".into()),
            by: vec!["plate".into()],
        })
        .unwrap();
        reg
    }

    fn demo_factory() -> ModelFactory {
        let mut factory = ModelFactory::new();
        factory
            .load(ModelSetup {
                world: None,
                models: vec![
                    ModelDef {
                        name: "plate".into(),
                        shape: Shape::Box {
                            x: 8.0,
                            y: 8.0,
                            z: 2.0,
                        },
                        material: "iron".into(),
                        daughters: vec![],
                    },
                    ModelDef {
                        name: "module".into(),
                        shape: Shape::Box {
                            x: 9.0,
                            y: 9.0,
                            z: 9.0,
                        },
                        material: "air".into(),
                        daughters: vec![DaughterDef {
                            label: "plates".into(),
                            model: "plate".into(),
                            mapping: Some("plate:plate+0".into()),
                            placement: PlacementDef::Stack {
                                axis: Axis::Z,
                                count: 3,
                                play: 0.5,
                            },
                        }],
                    },
                    ModelDef {
                        name: "world".into(),
                        shape: Shape::Box {
                            x: 100.0,
                            y: 100.0,
                            z: 100.0,
                        },
                        material: "vacuum".into(),
                        daughters: vec![DaughterDef {
                            label: "modules".into(),
                            model: "module".into(),
                            mapping: Some("module:column+0,row+0".into()),
                            placement: PlacementDef::Grid {
                                plane: GridPlane::XY,
                                columns: 2,
                                rows: 3,
                                pitch: Some([10.0, 10.0]),
                                centered: true,
                                x: 0.0,
                                y: 0.0,
                                z: 0.0,
                            },
                        }],
                    },
                ],
            })
            .unwrap();
        factory.lock().unwrap();
        factory
    }

    fn built_mapping(config: MappingConfig) -> Mapping {
        let factory = demo_factory();
        let registry = demo_registry();
        let mut mapping = Mapping::new(config);
        mapping.build_from(&factory, &registry).unwrap();
        mapping
    }

    #[test]
    fn builds_full_dictionary() {
        let mapping = built_mapping(MappingConfig::new());
        assert_eq!(mapping.state(), BuildState::Built);
        let dict = mapping.dictionary();
        // world + 6 modules + 18 plates
        assert_eq!(dict.len(), 25);
        assert_eq!(dict.ids_with_type(1000).len(), 6);
        assert_eq!(dict.ids_with_type(2000).len(), 18);
        assert!(dict.has(&GeomId::new(0, vec![0])));
        assert!(dict.has(&GeomId::new(1000, vec![0, 1, 2])));
        assert!(dict.has(&GeomId::new(2000, vec![0, 0, 0, 2])));
    }

    #[test]
    fn world_placements_compose() {
        let mapping = built_mapping(MappingConfig::new());
        let dict = mapping.dictionary();

        // Module (1,2) sits at x=+5, y=+10 in the centered 2x3 grid.
        let module = dict.get(&GeomId::new(1000, vec![0, 1, 2])).unwrap();
        let t = module.world_placement.translation();
        assert!((t.x - 5.0).abs() < 1e-12);
        assert!((t.y - 10.0).abs() < 1e-12);

        // Its middle plate stays centered, the top one sits 2.5 above.
        let mid = dict.get(&GeomId::new(2000, vec![0, 1, 2, 1])).unwrap();
        let top = dict.get(&GeomId::new(2000, vec![0, 1, 2, 2])).unwrap();
        assert!((mid.world_placement.translation().z - 0.0).abs() < 1e-12);
        assert!((top.world_placement.translation().z - 2.5).abs() < 1e-12);
        assert_eq!(top.material, "iron");
    }

    #[test]
    fn depth_limit_stops_recursion() {
        let mut config = MappingConfig::new();
        config.max_depth = 1;
        let dict_len = built_mapping(config).dictionary().len();
        // world + 6 modules, no plates
        assert_eq!(dict_len, 7);
    }

    #[test]
    fn only_filter_limits_insertion_not_traversal() {
        let mut config = MappingConfig::new();
        config.filter = CategoryFilter::Only(BTreeSet::from(["plate".to_string()]));
        let mapping = built_mapping(config);
        let dict = mapping.dictionary();
        assert_eq!(dict.len(), 18);
        // Plate addresses still inherit the skipped module addresses.
        assert!(dict.has(&GeomId::new(2000, vec![0, 1, 2, 0])));
    }

    #[test]
    fn excluded_filter() {
        let mut config = MappingConfig::new();
        config.filter = CategoryFilter::Excluded(BTreeSet::from(["plate".to_string()]));
        let dict_len = built_mapping(config).dictionary().len();
        assert_eq!(dict_len, 7);
    }

    #[test]
    fn lazy_matches_strict_for_single_inheritance() {
        let strict = built_mapping(MappingConfig::new());
        let mut config = MappingConfig::new();
        config.build_mode = BuildMode::LazyMothership;
        let lazy = built_mapping(config);

        let strict_ids: Vec<&GeomId> = strict.dictionary().iter().map(|(id, _)| id).collect();
        let lazy_ids: Vec<&GeomId> = lazy.dictionary().iter().map(|(id, _)| id).collect();
        assert_eq!(strict_ids, lazy_ids);
    }

    #[test]
    fn missing_world_category_fails_the_build() {
        let mut registry = CategoryRegistry::new();
        registry
            .declare(CategoryDef {
                category: "module".into(),
                type_id: 1000,
                addresses: vec!["column".into(), "row".into()],
                inherits: None,
                extends: None,
                by: vec![],
            })
            .unwrap();

        let factory = demo_factory();
        let mut mapping = Mapping::new(MappingConfig::new());
        let err = mapping.build_from(&factory, &registry).unwrap_err();
        assert!(matches!(err, Error::UnknownType(t) if t == WORLD_TYPE));
        assert_eq!(mapping.state(), BuildState::Failed);
        assert!(mapping.dictionary().is_empty());
    }

    #[test]
    fn rebuild_is_refused() {
        let factory = demo_factory();
        let registry = demo_registry();
        let mut mapping = Mapping::new(MappingConfig::new());
        mapping.build_from(&factory, &registry).unwrap();
        assert!(matches!(
            mapping.build_from(&factory, &registry),
            Err(Error::AlreadyBuilt)
        ));
    }

    #[test]
    fn duplicate_identifier_fails_the_build() {
        let mut factory = ModelFactory::new();
        factory
            .load(ModelSetup {
                world: None,
                models: vec![
                    ModelDef {
                        name: "module".into(),
                        shape: Shape::Box {
                            x: 1.0,
                            y: 1.0,
                            z: 1.0,
                        },
                        material: "air".into(),
                        daughters: vec![],
                    },
                    ModelDef {
                        name: "world".into(),
                        shape: Shape::Box {
                            x: 10.0,
                            y: 10.0,
                            z: 10.0,
                        },
                        material: "vacuum".into(),
                        daughters: vec![
                            DaughterDef {
                                label: "a".into(),
                                model: "module".into(),
                                mapping: Some("module:column=0,row=0".into()),
                                placement: PlacementDef::Single {
                                    x: -2.0,
                                    y: 0.0,
                                    z: 0.0,
                                    euler_deg: None,
                                },
                            },
                            DaughterDef {
                                label: "b".into(),
                                model: "module".into(),
                                mapping: Some("module:column=0,row=0".into()),
                                placement: PlacementDef::Single {
                                    x: 2.0,
                                    y: 0.0,
                                    z: 0.0,
                                    euler_deg: None,
                                },
                            },
                        ],
                    },
                ],
            })
            .unwrap();
        factory.lock().unwrap();

        let registry = demo_registry();
        let mut mapping = Mapping::new(MappingConfig::new());
        let err = mapping.build_from(&factory, &registry).unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentifier { .. }));
        assert_eq!(mapping.state(), BuildState::Failed);
        assert!(mapping.dictionary().is_empty());
    }

    #[test]
    fn consumed_factory_cannot_unlock() {
        let mut factory = demo_factory();
        let registry = demo_registry();
        let mut mapping = Mapping::new(MappingConfig::new());
        mapping.build_from(&factory, &registry).unwrap();
        assert!(matches!(factory.unlock(), Err(Error::RegistryConsumed)));
    }
}
