//! Geometry category schemas.
//!
//! A category gives meaning to a geometry identifier's type tag: it fixes
//! the number, order and labels of the sub-address fields. Categories are
//! declared in order; a category may `inherits` another (same address list,
//! new type) or `extends` one `by` extra fields (the mother's addresses plus
//! its own). The accumulated ancestor chain drives address inheritance
//! during mapping: a daughter whose category descends from its mother's
//! copies the mother's sub-addresses into its leading fields.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::geom_id::{GeomId, INVALID_ADDRESS};

/// Declarative form of one category, as parsed from a schema file.
///
/// Exactly one of `addresses`, `inherits` or `extends`+`by` is expected.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CategoryDef {
    pub category: String,
    #[serde(rename = "type")]
    pub type_id: u32,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub inherits: Option<String>,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub by: Vec<String>,
}

/// Top-level schema file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct CategorySet {
    pub categories: Vec<CategoryDef>,
}

/// Resolved information about one geometry category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryInfo {
    pub category: String,
    pub type_id: u32,
    pub addresses: Vec<String>, // field labels, schema order
    pub ancestors: Vec<String>, // categories whose addresses prefix ours
    pub inherits: Option<String>,
    pub extends: Option<String>,
    pub extends_by: Vec<String>,
}

impl CategoryInfo {
    pub fn depth(&self) -> usize {
        self.addresses.len()
    }

    pub fn has_ancestor(&self, category: &str) -> bool {
        self.ancestors.iter().any(|a| a == category)
    }

    pub fn subaddress_index(&self, label: &str) -> Option<usize> {
        self.addresses.iter().position(|a| a == label)
    }

    /// An identifier skeleton of this category, all sub-addresses unset.
    pub fn make_id(&self) -> GeomId {
        GeomId::with_depth(self.type_id, self.depth())
    }
}

/// How one address field of a mapping rule produces its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Set,     // label=N : constant N
    AddItem, // label+N : N plus the replica index
    SubItem, // label-N : N minus the replica index
}

/// One field of a mapping rule, e.g. `column+0` or `wall=2`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub label: String,
    pub op: FieldOp,
    pub value: u32,
}

/// The identifier-synthesis rule attached to a daughter volume:
/// a target category plus one rule per non-inherited schema field.
///
/// Text form: `category` or `category:field0+0,field1=3`.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingRule {
    pub category: String,
    pub fields: Vec<FieldRule>,
}

impl FromStr for MappingRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::InvalidMappingRule(s.to_string());
        let s = s.trim();
        if s.is_empty() {
            return Err(bad());
        }
        let (category, fields_part) = match s.split_once(':') {
            Some((c, f)) => (c.trim(), Some(f.trim())),
            None => (s, None),
        };
        if category.is_empty() {
            return Err(bad());
        }
        let mut fields = Vec::new();
        if let Some(part) = fields_part {
            for token in part.split(',') {
                let token = token.trim();
                let (op_pos, op) = token
                    .char_indices()
                    .find_map(|(i, c)| match c {
                        '=' => Some((i, FieldOp::Set)),
                        '+' => Some((i, FieldOp::AddItem)),
                        '-' => Some((i, FieldOp::SubItem)),
                        _ => None,
                    })
                    .ok_or_else(bad)?;
                let label = token[..op_pos].trim();
                let value: u32 = token[op_pos + 1..].trim().parse().map_err(|_| bad())?;
                if label.is_empty() {
                    return Err(bad());
                }
                fields.push(FieldRule {
                    label: label.to_string(),
                    op,
                    value,
                });
            }
        }
        Ok(MappingRule {
            category: category.to_string(),
            fields,
        })
    }
}

/// Registry of category schemas, indexed by name and by type tag.
#[derive(Debug, Clone, Default)]
pub struct CategoryRegistry {
    infos: Vec<CategoryInfo>,
    by_name: BTreeMap<String, usize>,
    by_type: BTreeMap<u32, usize>,
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and declares a whole schema file in declaration order.
    pub fn from_toml(text: &str) -> Result<Self> {
        let set: CategorySet = toml::from_str(text)?;
        let mut registry = Self::new();
        registry.declare_all(set.categories)?;
        Ok(registry)
    }

    pub fn declare_all(&mut self, defs: Vec<CategoryDef>) -> Result<()> {
        for def in defs {
            self.declare(def)?;
        }
        Ok(())
    }

    /// Declares one category. `inherits`/`extends` targets must already be
    /// declared, so files are processed top-down.
    pub fn declare(&mut self, def: CategoryDef) -> Result<()> {
        if self.by_name.contains_key(&def.category) {
            return Err(Error::DuplicateCategory(def.category));
        }
        if let Some(&idx) = self.by_type.get(&def.type_id) {
            return Err(Error::DuplicateType {
                type_id: def.type_id,
                category: self.infos[idx].category.clone(),
            });
        }

        let mut info = CategoryInfo {
            category: def.category.clone(),
            type_id: def.type_id,
            addresses: def.addresses,
            ancestors: Vec::new(),
            inherits: None,
            extends: None,
            extends_by: Vec::new(),
        };

        if info.addresses.is_empty() {
            if let Some(parent) = def.inherits {
                let parent_info = self.info_by_name(&parent)?;
                info.addresses = parent_info.addresses.clone();
                info.ancestors = parent_info.ancestors.clone();
                push_unique(&mut info.ancestors, &parent);
                info.inherits = Some(parent);
            } else if let Some(parent) = def.extends {
                if def.by.is_empty() {
                    return Err(Error::InvalidDefinition(format!(
                        "category '{}' extends '{}' but lists no 'by' fields",
                        info.category, parent
                    )));
                }
                let parent_info = self.info_by_name(&parent)?;
                info.addresses = parent_info.addresses.clone();
                info.ancestors = parent_info.ancestors.clone();
                push_unique(&mut info.ancestors, &parent);
                info.extends = Some(parent);
                for label in def.by {
                    info.addresses.push(label.clone());
                    info.extends_by.push(label);
                }
            } else {
                return Err(Error::InvalidDefinition(format!(
                    "category '{}' declares no addresses, inherits or extends",
                    info.category
                )));
            }
        }

        let idx = self.infos.len();
        self.by_name.insert(info.category.clone(), idx);
        self.by_type.insert(info.type_id, idx);
        self.infos.push(info);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn has_type(&self, type_id: u32) -> bool {
        self.by_type.contains_key(&type_id)
    }

    pub fn info_by_name(&self, name: &str) -> Result<&CategoryInfo> {
        self.by_name
            .get(name)
            .map(|&i| &self.infos[i])
            .ok_or_else(|| Error::UnknownCategory(name.to_string()))
    }

    pub fn info_by_type(&self, type_id: u32) -> Result<&CategoryInfo> {
        self.by_type
            .get(&type_id)
            .map(|&i| &self.infos[i])
            .ok_or(Error::UnknownType(type_id))
    }

    pub fn type_of(&self, name: &str) -> Result<u32> {
        Ok(self.info_by_name(name)?.type_id)
    }

    /// An identifier skeleton for the named category.
    pub fn make_id(&self, category: &str) -> Result<GeomId> {
        Ok(self.info_by_name(category)?.make_id())
    }

    /// Checks that a stored identifier is well-formed against its schema:
    /// known type, matching arity, every field set and no wildcard.
    pub fn validate(&self, id: &GeomId) -> bool {
        match self.info_by_type(id.type_id()) {
            Ok(info) => id.depth() == info.depth() && id.is_complete(),
            Err(_) => false,
        }
    }

    /// Field-wise pattern match between a query pattern and an identifier;
    /// wildcard fields in the pattern always match.
    pub fn matches(&self, pattern: &GeomId, id: &GeomId) -> bool {
        pattern.matches(id)
    }

    /// True if the category of `id` descends from the category of
    /// `mother_id`, i.e. the mother's sub-addresses prefix the daughter's.
    pub fn check_inheritance(&self, mother_id: &GeomId, id: &GeomId) -> Result<bool> {
        let info = self.info_by_type(id.type_id())?;
        let mother_info = self.info_by_type(mother_id.type_id())?;
        Ok(info.has_ancestor(&mother_info.category))
    }

    /// Synthesizes a daughter identifier from its mapping rule.
    ///
    /// Leading fields come from the mother identifier when the daughter's
    /// category descends from the mother's; the remaining fields are filled
    /// from the rule, consuming the generator-provided replica indices
    /// positionally for `+`/`-` rules. The rule must cover exactly the
    /// non-inherited fields, with labels matching the schema order.
    pub fn fill_id(
        &self,
        mother: Option<&GeomId>,
        rule: &MappingRule,
        item_indices: &[u32],
    ) -> Result<GeomId> {
        let info = self.info_by_name(&rule.category)?;
        let mut id = info.make_id();

        let mut current = 0;
        if let Some(mother_id) = mother {
            if mother_id.is_valid() {
                let mother_info = self.info_by_type(mother_id.type_id())?;
                if info.has_ancestor(&mother_info.category) {
                    id.inherits_from(mother_id)?;
                    current = mother_id.depth();
                }
            }
        }

        let remaining = info.depth() - current;
        if rule.fields.len() != remaining {
            return Err(Error::ArityMismatch {
                category: info.category.clone(),
                expected: remaining,
                got: rule.fields.len(),
            });
        }

        for (i, field) in rule.fields.iter().enumerate() {
            let expected = &info.addresses[current + i];
            if &field.label != expected {
                return Err(Error::FieldLabelMismatch {
                    category: info.category.clone(),
                    label: field.label.clone(),
                    expected: expected.clone(),
                });
            }
            let value = match field.op {
                FieldOp::Set => field.value,
                FieldOp::AddItem => {
                    let item = *item_indices.get(i).ok_or_else(|| Error::MissingReplicaIndex {
                        category: info.category.clone(),
                        label: field.label.clone(),
                    })?;
                    field.value.checked_add(item).ok_or(Error::AddressOverflow {
                        label: field.label.clone(),
                        value: field.value,
                        item,
                    })?
                }
                FieldOp::SubItem => {
                    let item = *item_indices.get(i).ok_or_else(|| Error::MissingReplicaIndex {
                        category: info.category.clone(),
                        label: field.label.clone(),
                    })?;
                    field.value.checked_sub(item).ok_or(Error::NegativeAddress {
                        label: field.label.clone(),
                        value: field.value,
                        item,
                    })?
                }
            };
            id.set(current + i, value);
        }

        Ok(id)
    }

    /// Renders an identifier with its schema labels, e.g.
    /// ``category=`module' : wall=1 column=0 row=4``.
    pub fn human_readable(&self, id: &GeomId) -> String {
        use std::fmt::Write as _;
        let mut out = String::new();
        match self.info_by_type(id.type_id()) {
            Ok(info) => {
                let _ = write!(out, "category=`{}' :", info.category);
                for (i, label) in info.addresses.iter().enumerate() {
                    if i < id.depth() && id.get(i) != INVALID_ADDRESS {
                        let _ = write!(out, " {}={}", label, id.get(i));
                    } else {
                        let _ = write!(out, " {}=?", label);
                    }
                }
            }
            Err(_) => {
                let _ = write!(out, "category=`?' : {id}");
            }
        }
        out
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}
