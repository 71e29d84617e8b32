use std::fmt;

use serde::{Deserialize, Serialize};

/// Routing label assigned to every query. `Fallback` is the catch-all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Billing,
    Network,
    Service,
    Knowledge,
    Fallback,
}

impl Category {
    /// Every category, in tie-break priority order.
    pub const ALL: [Category; 5] =
        [Self::Billing, Self::Network, Self::Service, Self::Knowledge, Self::Fallback];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Billing => "billing",
            Self::Network => "network",
            Self::Service => "service",
            Self::Knowledge => "knowledge",
            Self::Fallback => "fallback",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Billing => "BILLING",
            Self::Network => "NETWORK",
            Self::Service => "SERVICE",
            Self::Knowledge => "KNOWLEDGE",
            Self::Fallback => "FALLBACK",
        }
    }

    /// Normalizes a free-form label (for example a model reply such as
    /// `"Category: billing."`) into a category. Anything unrecognized is
    /// `Fallback`.
    pub fn from_label(raw: &str) -> Self {
        let upper = raw.to_ascii_uppercase();
        [Self::Billing, Self::Network, Self::Service, Self::Knowledge]
            .into_iter()
            .find(|category| upper.contains(category.label()))
            .unwrap_or(Self::Fallback)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
