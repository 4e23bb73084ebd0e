//! Import source types and their credit costs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::BillingResult;
use super::error::BillingError;

/// The medium a recipe import originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Text,
    Url,
    Image,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [Self::Text, Self::Url, Self::Image];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Url => "url",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "url" => Ok(Self::Url),
            "image" => Ok(Self::Image),
            other => Err(BillingError::UnknownSourceType {
                value: other.chars().take(32).collect(),
            }),
        }
    }
}

/// Credit cost per import source type.
///
/// Costs are fixed configuration. `validate()` runs at startup so a missing or
/// zero entry never reaches a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceCostTable {
    costs: BTreeMap<SourceType, u32>,
}

impl SourceCostTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            costs: BTreeMap::new(),
        }
    }

    /// Set the cost for a source type.
    #[must_use]
    pub fn with_cost(mut self, source_type: SourceType, credits: u32) -> Self {
        self.costs.insert(source_type, credits);
        self
    }

    /// Credits required to import from `source_type`.
    pub fn cost_of(&self, source_type: SourceType) -> BillingResult<u32> {
        match self.costs.get(&source_type) {
            Some(0) => Err(BillingError::NonPositiveSourceCost {
                source_type: source_type.to_string(),
            }),
            Some(cost) => Ok(*cost),
            None => Err(BillingError::MissingSourceCost {
                source_type: source_type.to_string(),
            }),
        }
    }

    /// Check that every source type has a positive cost.
    pub fn validate(&self) -> BillingResult<()> {
        for source_type in SourceType::ALL {
            self.cost_of(source_type)?;
        }
        Ok(())
    }
}

impl Default for SourceCostTable {
    fn default() -> Self {
        Self::new()
            .with_cost(SourceType::Text, 1)
            .with_cost(SourceType::Url, 1)
            .with_cost(SourceType::Image, 2)
    }
}
