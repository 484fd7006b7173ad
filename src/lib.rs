//! Detector geometry identifier mapping.
//!
//! detmap expands a declarative hierarchy of volume models into the full
//! tree of placed volume instances, stamps every mapped instance with a
//! structured geometry identifier derived from a category schema, and
//! publishes the result as a queryable dictionary with reverse
//! point-location support.

pub mod category;
pub mod error;
pub mod geom_id;
pub mod locator;
pub mod mapping;
pub mod model;
pub mod placement;
pub mod replication;
pub mod settings;
pub mod shape;

pub use category::{CategoryRegistry, MappingRule};
pub use error::{Error, Result};
pub use geom_id::GeomId;
pub use locator::Locator;
pub use mapping::{Mapping, MappingConfig, MappingDict};
pub use model::ModelFactory;
pub use placement::Placement;
pub use shape::Shape;
