use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// A resource quantity, stored as milli-units (k8s `Quantity`'s own internal
/// scale) in a signed 128-bit integer so that admission arithmetic (which
/// needs negative deltas, see [`FlavorQuota::diff`]) never overflows and
/// never loses precision to floating point.
///
/// Parsing understands the binary (`Ki`, `Mi`, `Gi`, `Ti`, `Pi`, `Ei`) and
/// decimal (`k`, `M`, `G`, `T`, `P`, `E`) SI suffixes plus the milli (`m`)
/// suffix, matching the orchestrator's own `resource.Quantity` grammar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i128);

const MILLI: i128 = 1_000;

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_milli(milli: i128) -> Self {
        Amount(milli)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_non_positive(&self) -> bool {
        self.0 <= 0
    }

    pub fn parse(s: &str) -> Result<Self, QuantityParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(QuantityParseError(s.to_owned()));
        }
        let (digits, suffix) = split_suffix(s);
        let scale: i128 = match suffix {
            "" => MILLI,
            "m" => 1,
            "k" | "K" => MILLI * 1_000,
            "M" => MILLI * 1_000_000,
            "G" => MILLI * 1_000_000_000,
            "T" => MILLI * 1_000_000_000_000,
            "P" => MILLI * 1_000_000_000_000_000,
            "E" => MILLI * 1_000_000_000_000_000_000,
            "Ki" => MILLI * 1_024,
            "Mi" => MILLI * 1_024 * 1_024,
            "Gi" => MILLI * 1_024 * 1_024 * 1_024,
            "Ti" => MILLI * 1_024 * 1_024 * 1_024 * 1_024,
            "Pi" => MILLI * 1_024 * 1_024 * 1_024 * 1_024 * 1_024,
            "Ei" => MILLI * 1_024 * 1_024 * 1_024 * 1_024 * 1_024 * 1_024,
            _ => return Err(QuantityParseError(s.to_owned())),
        };
        let value: f64 = digits
            .parse()
            .map_err(|_| QuantityParseError(s.to_owned()))?;
        Ok(Amount(((value * scale as f64).round()) as i128))
    }
}

fn split_suffix(s: &str) -> (&str, &str) {
    let split_at = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(s.len());
    s.split_at(split_at)
}

#[derive(Debug, thiserror::Error)]
#[error("invalid resource quantity: {0}")]
pub struct QuantityParseError(String);

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Amount;
    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl Neg for Amount {
    type Output = Amount;
    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / MILLI;
        let rem = (self.0 % MILLI).abs();
        if rem == 0 {
            write!(f, "{whole}")
        } else {
            write!(f, "{}m", self.0)
        }
    }
}

/// `flavor -> resource -> quantity`, the core value type threaded through
/// [`crate::capacity::ClusterCapacityReservation`] admission (spec.md §3, §4.2).
///
/// `BTreeMap` keys are kept so that iteration is always lexicographic,
/// satisfying I2/P2 (stable rendering) without an extra sort step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlavorQuota(pub BTreeMap<String, BTreeMap<String, Amount>>);

impl FlavorQuota {
    pub fn new() -> Self {
        FlavorQuota(BTreeMap::new())
    }

    pub fn get(&self, flavor: &str, resource: &str) -> Option<Amount> {
        self.0.get(flavor).and_then(|r| r.get(resource)).copied()
    }

    pub fn set(&mut self, flavor: &str, resource: &str, qty: Amount) {
        self.0
            .entry(flavor.to_owned())
            .or_default()
            .insert(resource.to_owned(), qty);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Componentwise `self - other` (native-unit arithmetic). Flavor/resource
    /// keys present in either side appear in the result; a key missing from
    /// one side is treated as zero (I1's "change map" construction).
    pub fn diff(&self, other: &FlavorQuota) -> FlavorQuota {
        let mut out = FlavorQuota::new();
        let mut flavors: Vec<&String> = self.0.keys().chain(other.0.keys()).collect();
        flavors.sort();
        flavors.dedup();
        for flavor in flavors {
            let mut resources: Vec<&String> = self
                .0
                .get(flavor)
                .map(|r| r.keys().collect())
                .unwrap_or_default();
            resources.extend(other.0.get(flavor).map(|r| r.keys().collect::<Vec<_>>()).unwrap_or_default());
            resources.sort();
            resources.dedup();
            for resource in resources {
                let a = self.get(flavor, resource).unwrap_or(Amount::ZERO);
                let b = other.get(flavor, resource).unwrap_or(Amount::ZERO);
                out.set(flavor, resource, a - b);
            }
        }
        out
    }

    /// True iff every entry in the map is `<= 0` (I1's admission shortcut).
    pub fn all_non_positive(&self) -> bool {
        self.0
            .values()
            .all(|resources| resources.values().all(|q| q.is_non_positive()))
    }

    /// Renders to the wire `FlavorUsage` list form, flavors and resources
    /// both in lexicographic order (I2/P2). `BTreeMap` iteration already
    /// guarantees the order; this just materializes it.
    pub fn to_flavor_usage(&self) -> Vec<FlavorUsage> {
        self.0
            .iter()
            .map(|(flavor, resources)| FlavorUsage {
                name: flavor.clone(),
                resources: resources
                    .iter()
                    .map(|(name, qty)| ResourceUsage {
                        name: name.clone(),
                        quantity: qty.to_string(),
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Wire form of one flavor's resource usages, used for `status.capacity[]`
/// and `status.allocatable[]` (spec.md §3, §6).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct FlavorUsage {
    pub name: String,
    pub resources: Vec<ResourceUsage>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ResourceUsage {
    pub name: String,
    pub quantity: String,
}

impl FlavorUsage {
    pub fn list_to_quota(list: &[FlavorUsage]) -> Result<FlavorQuota, QuantityParseError> {
        let mut out = FlavorQuota::new();
        for flavor in list {
            for resource in &flavor.resources {
                out.set(&flavor.name, &resource.name, Amount::parse(&resource.quantity)?);
            }
        }
        Ok(out)
    }
}
