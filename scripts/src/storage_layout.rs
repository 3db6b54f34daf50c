//! Storage layout compatibility checks for proxy upgrades
//!
//! Layouts use the `storageLayout` format emitted by solc. An upgrade is accepted when
//! every variable of the old layout survives at the same slot and offset, under the same
//! name, with a type that occupies storage identically. Variables may be appended, and
//! `__gap` reservations may shrink to make room for them as long as they still end at the
//! same slot.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::{self, Display, Formatter},
};

use alloy::json_abi::JsonAbi;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{NUM_BYTES_STORAGE_SLOT, STORAGE_GAP_PREFIX, UPGRADE_FUNCTION},
    errors::ScriptError,
};

/// The storage layout of a compiled contract
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    /// The contract's state variables, in declaration order
    pub storage: Vec<StorageItem>,
    /// Descriptions of every type referenced by `storage`
    #[serde(default, deserialize_with = "nullable_types")]
    pub types: BTreeMap<String, StorageType>,
}

/// A single state variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageItem {
    /// The contract declaring the variable
    #[serde(default)]
    pub contract: String,
    /// The variable name
    pub label: String,
    /// The byte offset within the slot
    pub offset: u64,
    /// The slot, as a decimal string
    pub slot: String,
    /// The type identifier, a key into [`StorageLayout::types`]
    #[serde(rename = "type")]
    pub ty: String,
}

/// A type referenced from a storage layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageType {
    /// One of `inplace`, `mapping`, `dynamic_array` or `bytes`
    pub encoding: String,
    /// The human readable type name
    pub label: String,
    /// The number of bytes used, as a decimal string
    pub number_of_bytes: String,
    /// The element type of an array
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// The key type of a mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// The value type of a mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// The members of a struct
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<StorageItem>>,
}

/// solc emits `"types": null` for contracts without state
fn nullable_types<'de, D>(deserializer: D) -> Result<BTreeMap<String, StorageType>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

impl StorageItem {
    /// The slot as a number; malformed slots sort as zero and surface as mismatches
    fn slot_number(&self) -> U256 {
        U256::from_str_radix(&self.slot, 10).unwrap_or_default()
    }

    /// Whether this item reserves space for future variables
    fn is_gap(&self) -> bool {
        self.label.starts_with(STORAGE_GAP_PREFIX)
    }
}

/// A reason an upgrade is rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutIssue {
    /// A variable no longer exists at its slot
    Deleted {
        /// The variable name
        label: String,
        /// The slot it occupied
        slot: String,
    },
    /// A different variable now occupies the slot
    Renamed {
        /// The old variable name
        old: String,
        /// The new variable name
        new: String,
        /// The shared slot
        slot: String,
    },
    /// A variable's type changed in a way that reinterprets its storage
    TypeChanged {
        /// The variable name
        label: String,
        /// The old type label
        old: String,
        /// The new type label
        new: String,
    },
    /// A storage gap no longer ends where it used to
    GapResized {
        /// The gap name
        label: String,
        /// The slot after the old gap
        old_end: U256,
        /// The slot after the new gap
        new_end: U256,
    },
    /// The new implementation cannot be upgraded again
    MissingUpgradeFunction,
}

impl Display for LayoutIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LayoutIssue::Deleted { label, slot } => {
                write!(f, "deleted `{}` (slot {})", label, slot)
            }
            LayoutIssue::Renamed { old, new, slot } => {
                write!(f, "replaced `{}` with `{}` (slot {})", old, new, slot)
            }
            LayoutIssue::TypeChanged { label, old, new } => {
                write!(f, "changed type of `{}` from {} to {}", label, old, new)
            }
            LayoutIssue::GapResized {
                label,
                old_end,
                new_end,
            } => write!(
                f,
                "storage gap `{}` ends at slot {} instead of {}",
                label, new_end, old_end
            ),
            LayoutIssue::MissingUpgradeFunction => {
                write!(f, "missing `{}` function", UPGRADE_FUNCTION)
            }
        }
    }
}

/// Validate that `new_layout` and `new_abi` can replace `old_layout` behind a UUPS proxy
pub fn validate_upgrade(
    contract: &str,
    old_layout: &StorageLayout,
    new_layout: &StorageLayout,
    new_abi: &JsonAbi,
) -> Result<(), ScriptError> {
    let mut issues = Vec::new();
    if new_abi.function(UPGRADE_FUNCTION).is_none() {
        issues.push(LayoutIssue::MissingUpgradeFunction);
    }
    issues.extend(compare_layouts(old_layout, new_layout));

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ScriptError::UpgradeIncompatible {
            contract: contract.to_string(),
            issues,
        })
    }
}

/// Collect every incompatibility between two layouts
pub fn compare_layouts(old: &StorageLayout, new: &StorageLayout) -> Vec<LayoutIssue> {
    let by_position: HashMap<(U256, u64), &StorageItem> = new
        .storage
        .iter()
        .map(|item| ((item.slot_number(), item.offset), item))
        .collect();

    let mut issues = Vec::new();
    for old_item in &old.storage {
        if old_item.is_gap() {
            check_gap(old, old_item, new, &mut issues);
            continue;
        }

        let Some(new_item) = by_position.get(&(old_item.slot_number(), old_item.offset)) else {
            issues.push(LayoutIssue::Deleted {
                label: old_item.label.clone(),
                slot: old_item.slot.clone(),
            });
            continue;
        };

        if new_item.label != old_item.label {
            issues.push(LayoutIssue::Renamed {
                old: old_item.label.clone(),
                new: new_item.label.clone(),
                slot: old_item.slot.clone(),
            });
            continue;
        }

        if !types_compatible(old, &old_item.ty, new, &new_item.ty) {
            issues.push(LayoutIssue::TypeChanged {
                label: old_item.label.clone(),
                old: type_label(old, &old_item.ty),
                new: type_label(new, &new_item.ty),
            });
        }
    }

    issues
}

/// A gap may shrink or move, but must keep ending at the same slot
fn check_gap(
    old: &StorageLayout,
    old_gap: &StorageItem,
    new: &StorageLayout,
    issues: &mut Vec<LayoutIssue>,
) {
    let new_gap = new
        .storage
        .iter()
        .find(|item| item.label == old_gap.label && item.contract == old_gap.contract)
        .or_else(|| {
            new.storage
                .iter()
                .find(|item| item.label == old_gap.label)
        });

    let Some(new_gap) = new_gap else {
        issues.push(LayoutIssue::Deleted {
            label: old_gap.label.clone(),
            slot: old_gap.slot.clone(),
        });
        return;
    };

    let old_end = item_end(old, old_gap);
    let new_end = item_end(new, new_gap);
    if old_end != new_end {
        issues.push(LayoutIssue::GapResized {
            label: old_gap.label.clone(),
            old_end,
            new_end,
        });
    }
}

/// The first slot after `item`
fn item_end(layout: &StorageLayout, item: &StorageItem) -> U256 {
    let num_bytes = layout
        .types
        .get(&item.ty)
        .map(|ty| parse_num_bytes(&ty.number_of_bytes))
        .unwrap_or(NUM_BYTES_STORAGE_SLOT as u64);
    let num_slots = num_bytes.div_ceil(NUM_BYTES_STORAGE_SLOT as u64);

    item.slot_number() + U256::from(num_slots)
}

/// Parse solc's decimal `numberOfBytes`
fn parse_num_bytes(num_bytes: &str) -> u64 {
    num_bytes.parse().unwrap_or_default()
}

/// The human-readable label of a type id, or the id itself if unknown
fn type_label(layout: &StorageLayout, ty: &str) -> String {
    layout
        .types
        .get(ty)
        .map(|t| t.label.clone())
        .unwrap_or_else(|| ty.to_string())
}

/// Addresses and contract references share a representation in storage
fn normalized_label(label: &str) -> &str {
    if label == "address payable" || label.starts_with("contract ") {
        "address"
    } else {
        label
    }
}

/// Whether a variable of type `old_ty` can be read as `new_ty` without corruption
fn types_compatible(old: &StorageLayout, old_ty: &str, new: &StorageLayout, new_ty: &str) -> bool {
    let (Some(old_type), Some(new_type)) = (old.types.get(old_ty), new.types.get(new_ty)) else {
        return old_ty == new_ty;
    };

    if old_type.encoding != new_type.encoding
        || parse_num_bytes(&old_type.number_of_bytes) != parse_num_bytes(&new_type.number_of_bytes)
    {
        return false;
    }

    match old_type.encoding.as_str() {
        "mapping" => {
            optional_types_compatible(old, &old_type.key, new, &new_type.key)
                && optional_types_compatible(old, &old_type.value, new, &new_type.value)
        }
        "dynamic_array" => optional_types_compatible(old, &old_type.base, new, &new_type.base),
        _ => match (&old_type.members, &new_type.members) {
            (Some(old_members), Some(new_members)) => {
                old_members.len() == new_members.len()
                    && old_members.iter().zip(new_members).all(|(o, n)| {
                        o.label == n.label
                            && o.slot == n.slot
                            && o.offset == n.offset
                            && types_compatible(old, &o.ty, new, &n.ty)
                    })
            }
            (None, None) if old_type.base.is_some() => {
                optional_types_compatible(old, &old_type.base, new, &new_type.base)
            }
            // Enum values may be appended while the width is unchanged
            (None, None) if old_type.label.starts_with("enum ") => {
                new_type.label.starts_with("enum ")
            }
            (None, None) => {
                normalized_label(&old_type.label) == normalized_label(&new_type.label)
            }
            _ => false,
        },
    }
}

/// Compare two optional type ids, such as mapping keys or array bases
fn optional_types_compatible(
    old: &StorageLayout,
    old_ty: &Option<String>,
    new: &StorageLayout,
    new_ty: &Option<String>,
) -> bool {
    match (old_ty, new_ty) {
        (Some(o), Some(n)) => types_compatible(old, o, new, n),
        (None, None) => true,
        _ => false,
    }
}
