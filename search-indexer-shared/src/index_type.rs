//! Logical index identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identity of one maintained search index.
///
/// The set is closed: every per-type table in the pipeline is built once for
/// all of [`IndexType::ALL`] at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    Product,
    Category,
    Sku,
    Customer,
    CmUser,
    Promotion,
    ShippingServiceLevel,
}

impl IndexType {
    /// Every known index type.
    pub const ALL: [IndexType; 7] = [
        IndexType::Product,
        IndexType::Category,
        IndexType::Sku,
        IndexType::Customer,
        IndexType::CmUser,
        IndexType::Promotion,
        IndexType::ShippingServiceLevel,
    ];

    /// Stable name of the index, used for engine index naming, on-disk
    /// directories and configuration keys.
    pub fn index_name(&self) -> &'static str {
        match self {
            IndexType::Product => "product",
            IndexType::Category => "category",
            IndexType::Sku => "sku",
            IndexType::Customer => "customer",
            IndexType::CmUser => "cmuser",
            IndexType::Promotion => "promotion",
            IndexType::ShippingServiceLevel => "shippingservicelevel",
        }
    }

    /// Look up an index type by its index name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, UnknownIndexType> {
        let wanted = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.index_name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownIndexType(name.to_string()))
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.index_name())
    }
}

impl FromStr for IndexType {
    type Err = UnknownIndexType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// Returned when a name does not match any [`IndexType`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown index type: {0}")]
pub struct UnknownIndexType(pub String);
