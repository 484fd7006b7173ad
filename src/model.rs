//! Logical volume templates and the model registry/factory.
//!
//! A model is a reusable, named description of a shape, a material and an
//! ordered list of daughter placements. The factory accumulates declarative
//! model definitions, then `lock()` resolves every inter-model reference,
//! rejects duplicates and cycles, and freezes the result into an arena of
//! [`LogicalVolume`]s addressed by index. After locking nothing mutates;
//! the mapper walks the arena read-only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use serde::Deserialize;

use crate::category::MappingRule;
use crate::error::{Error, Result};
use crate::placement::Placement;
use crate::replication::{GridPlacement, GridPlane, PlacementSource, SinglePlacement, StackPlacement};
use crate::shape::{Axis, Shape};

/// Conventional name of the root model.
pub const DEFAULT_WORLD_LABEL: &str = "world";

/// Declarative placement of a daughter inside its mother.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlacementDef {
    /// One explicit placement: a translation plus optional ZYZ Euler angles
    /// in degrees.
    Single {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default)]
        z: f64,
        #[serde(default)]
        euler_deg: Option<[f64; 3]>,
    },
    /// A linear stack of `count` replicas along `axis`, separated by `play`.
    /// Item extents default to the daughter shape's stackable width.
    Stack {
        axis: Axis,
        count: usize,
        #[serde(default)]
        play: f64,
    },
    /// A regular 2-D grid. Pitches default to the daughter shape's widths
    /// along the plane axes; `centered` defaults to true.
    Grid {
        plane: GridPlane,
        columns: usize,
        rows: usize,
        #[serde(default)]
        pitch: Option<[f64; 2]>,
        #[serde(default = "default_centered")]
        centered: bool,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default)]
        z: f64,
    },
}

fn default_centered() -> bool {
    true
}

/// Declarative daughter entry of a model definition.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DaughterDef {
    pub label: String,
    pub model: String,
    /// Identifier-synthesis rule, e.g. `"module:column+0,row+0"`.
    /// Daughters without a rule are traversed but not mapped.
    #[serde(default)]
    pub mapping: Option<String>,
    pub placement: PlacementDef,
}

/// Declarative form of one model.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelDef {
    pub name: String,
    pub shape: Shape,
    pub material: String,
    #[serde(default)]
    pub daughters: Vec<DaughterDef>,
}

/// Top-level structure of a model setup file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelSetup {
    /// Overrides the name of the root model (default `"world"`).
    #[serde(default)]
    pub world: Option<String>,
    pub models: Vec<ModelDef>,
}

/// A resolved daughter placement inside a logical volume.
#[derive(Debug, Clone)]
pub struct PhysicalVolume {
    pub label: String,
    pub logical: usize, // arena index of the daughter volume
    pub placement: PlacementSource,
    pub mapping: Option<MappingRule>,
}

/// A resolved, immutable volume template.
#[derive(Debug, Clone)]
pub struct LogicalVolume {
    pub name: String,
    pub shape: Shape,
    pub material: String,
    pub physicals: Vec<PhysicalVolume>,
}

/// Accumulates model definitions, then locks them into an immutable arena.
///
/// Instances are independent; there is no process-wide registration. The
/// locked arena may be shared across threads freely since nothing mutates
/// it afterwards.
#[derive(Debug, Default)]
pub struct ModelFactory {
    defs: Vec<ModelDef>,
    world_label: Option<String>,
    volumes: Vec<LogicalVolume>,
    index: HashMap<String, usize>,
    locked: bool,
    consumed: AtomicBool,
}

impl ModelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Accumulates one setup. May be called repeatedly before locking.
    pub fn load(&mut self, setup: ModelSetup) -> Result<()> {
        if self.locked {
            return Err(Error::AlreadyLocked);
        }
        if let Some(world) = setup.world {
            self.world_label = Some(world);
        }
        self.defs.extend(setup.models);
        Ok(())
    }

    /// Parses a TOML setup and accumulates it.
    pub fn load_toml(&mut self, text: &str) -> Result<()> {
        let setup: ModelSetup = toml::from_str(text)?;
        self.load(setup)
    }

    /// The name of the designated root model.
    pub fn world_label(&self) -> &str {
        self.world_label.as_deref().unwrap_or(DEFAULT_WORLD_LABEL)
    }

    /// Resolves all accumulated definitions and freezes the registry.
    ///
    /// Detects duplicate names, unresolved daughter references and cyclic
    /// references eagerly; on any error the factory stays unlocked and
    /// unchanged.
    pub fn lock(&mut self) -> Result<()> {
        if self.locked {
            return Err(Error::AlreadyLocked);
        }

        let mut def_index: HashMap<&str, usize> = HashMap::new();
        for (i, def) in self.defs.iter().enumerate() {
            if def_index.insert(def.name.as_str(), i).is_some() {
                return Err(Error::DuplicateName(def.name.clone()));
            }
        }

        // Post-order resolution: daughters are constructed before their
        // mothers so stack and grid defaults can read daughter extents.
        let mut volumes: Vec<LogicalVolume> = Vec::with_capacity(self.defs.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut on_stack: Vec<&str> = Vec::new();
        for def in &self.defs {
            Self::resolve(
                def,
                &self.defs,
                &def_index,
                &mut volumes,
                &mut index,
                &mut on_stack,
            )?;
        }

        self.volumes = volumes;
        self.index = index;
        self.locked = true;
        debug!(
            "model registry locked: {} volume template(s), world='{}'",
            self.volumes.len(),
            self.world_label()
        );
        Ok(())
    }

    fn resolve<'a>(
        def: &'a ModelDef,
        defs: &'a [ModelDef],
        def_index: &HashMap<&'a str, usize>,
        volumes: &mut Vec<LogicalVolume>,
        index: &mut HashMap<String, usize>,
        on_stack: &mut Vec<&'a str>,
    ) -> Result<usize> {
        if let Some(&done) = index.get(def.name.as_str()) {
            return Ok(done);
        }
        if on_stack.iter().any(|&n| n == def.name) {
            let mut path: Vec<&str> = on_stack.clone();
            path.push(&def.name);
            return Err(Error::CyclicReference {
                path: path.join(" -> "),
            });
        }
        // Allocation happens in post-order below; track the path for cycles.
        on_stack.push(def.name.as_str());

        let mut physicals = Vec::with_capacity(def.daughters.len());
        for daughter in &def.daughters {
            let &target = def_index.get(daughter.model.as_str()).ok_or_else(|| {
                Error::UnresolvedReference {
                    model: def.name.clone(),
                    daughter: daughter.label.clone(),
                    target: daughter.model.clone(),
                }
            })?;
            let logical = Self::resolve(&defs[target], defs, def_index, volumes, index, on_stack)?;
            let daughter_shape = &volumes[logical].shape;
            let placement = build_placement(&daughter.placement, daughter_shape);
            let mapping = match &daughter.mapping {
                Some(text) => Some(text.parse::<MappingRule>()?),
                None => None,
            };
            physicals.push(PhysicalVolume {
                label: daughter.label.clone(),
                logical,
                placement,
                mapping,
            });
        }

        on_stack.pop();
        let idx = volumes.len();
        volumes.push(LogicalVolume {
            name: def.name.clone(),
            shape: def.shape.clone(),
            material: def.material.clone(),
            physicals,
        });
        index.insert(def.name.clone(), idx);
        Ok(idx)
    }

    /// Returns to the accumulating state. Refused once a mapping has
    /// consumed the locked registry, since published dictionaries keep
    /// index references into the arena.
    pub fn unlock(&mut self) -> Result<()> {
        if !self.locked {
            return Err(Error::NotLocked);
        }
        if self.consumed.load(Ordering::Acquire) {
            return Err(Error::RegistryConsumed);
        }
        self.volumes.clear();
        self.index.clear();
        self.locked = false;
        Ok(())
    }

    /// The resolved volume arena. Only available once locked.
    pub fn volumes(&self) -> Result<&[LogicalVolume]> {
        if !self.locked {
            return Err(Error::NotLocked);
        }
        Ok(&self.volumes)
    }

    /// Arena index of a model by name.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        if !self.locked {
            return Err(Error::NotLocked);
        }
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    pub fn volume(&self, name: &str) -> Result<&LogicalVolume> {
        let idx = self.index_of(name)?;
        Ok(&self.volumes[idx])
    }

    /// Marks the locked registry as consumed by a mapping run.
    pub(crate) fn mark_consumed(&self) {
        self.consumed.store(true, Ordering::Release);
    }
}

fn build_placement(def: &PlacementDef, daughter_shape: &Shape) -> PlacementSource {
    match def {
        PlacementDef::Single {
            x,
            y,
            z,
            euler_deg,
        } => {
            let placement = match euler_deg {
                Some([phi, theta, delta]) => {
                    Placement::from_euler_deg(*x, *y, *z, *phi, *theta, *delta)
                }
                None => Placement::from_translation(*x, *y, *z),
            };
            PlacementSource::Single(SinglePlacement::new(placement))
        }
        PlacementDef::Stack { axis, count, play } => {
            let extent = daughter_shape.width(*axis);
            PlacementSource::Stack(StackPlacement::new(*axis, vec![extent; *count], *play))
        }
        PlacementDef::Grid {
            plane,
            columns,
            rows,
            pitch,
            centered,
            x,
            y,
            z,
        } => {
            let pitch = match pitch {
                Some([u, v]) => (*u, *v),
                None => {
                    let (a, b) = plane_axes(*plane);
                    (daughter_shape.width(a), daughter_shape.width(b))
                }
            };
            PlacementSource::Grid(GridPlacement::new(
                Placement::from_translation(*x, *y, *z),
                *plane,
                *columns,
                *rows,
                pitch,
                *centered,
            ))
        }
    }
}

fn plane_axes(plane: GridPlane) -> (Axis, Axis) {
    match plane {
        GridPlane::XY => (Axis::X, Axis::Y),
        GridPlane::XZ => (Axis::X, Axis::Z),
        GridPlane::YZ => (Axis::Y, Axis::Z),
    }
}
