use thiserror::Error;

use crate::geom_id::GeomId;

/// Result type for geometry description and mapping operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building model registries, category schemas and
/// geometry ID mappings.
///
/// Configuration errors (unresolved references, duplicate names, schema
/// mismatches) are detected at registry lock or mapping start and abort the
/// build. Structural errors (`DuplicateIdentifier`) abort the mapping run.
/// Query misses are not errors and are reported as `Option::None` by the
/// lookup APIs.
#[derive(Error, Debug)]
pub enum Error {
    #[error("daughter '{daughter}' of model '{model}' references unknown model '{target}'")]
    UnresolvedReference {
        model: String,
        daughter: String,
        target: String,
    },

    #[error("duplicate model name '{0}'")]
    DuplicateName(String),

    #[error("cyclic model reference: {path}")]
    CyclicReference { path: String },

    #[error("model registry is not locked")]
    NotLocked,

    #[error("model registry is already locked")]
    AlreadyLocked,

    #[error("model registry has been consumed by a mapping and cannot be unlocked")]
    RegistryConsumed,

    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("unknown geometry category '{0}'")]
    UnknownCategory(String),

    #[error("unknown geometry type {0}")]
    UnknownType(u32),

    #[error("geometry category '{0}' is already declared")]
    DuplicateCategory(String),

    #[error("geometry type {type_id} is already used by category '{category}'")]
    DuplicateType { type_id: u32, category: String },

    #[error("category '{category}' expects {expected} address field(s) here, got {got}")]
    ArityMismatch {
        category: String,
        expected: usize,
        got: usize,
    },

    #[error("address field '{label}' does not match schema field '{expected}' of category '{category}'")]
    FieldLabelMismatch {
        category: String,
        label: String,
        expected: String,
    },

    #[error("address rule '{label}-{value}' yields a negative sub-address for replica {item}")]
    NegativeAddress { label: String, value: u32, item: u32 },

    #[error("address rule '{label}+{value}' overflows for replica {item}")]
    AddressOverflow { label: String, value: u32, item: u32 },

    #[error("address field '{label}' of category '{category}' needs a replica index but none is available")]
    MissingReplicaIndex { category: String, label: String },

    #[error("invalid mapping rule '{0}'")]
    InvalidMappingRule(String),

    #[error("invalid geometry identifier text '{0}'")]
    InvalidIdText(String),

    #[error("identifier {id} inherits from a deeper identifier {parent}")]
    IncompatibleDepth { id: GeomId, parent: GeomId },

    #[error("duplicate geometry identifier {id} at {path}")]
    DuplicateIdentifier { id: GeomId, path: String },

    #[error("no mothership candidate accepts daughter '{path}'")]
    NoMothership { path: String },

    #[error("mapping has already been built")]
    AlreadyBuilt,

    #[error("invalid model definition: {0}")]
    InvalidDefinition(String),

    #[error("setup parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
