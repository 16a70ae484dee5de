//! Closed identifier sets for wool tiers and building types.
//!
//! Both enums are dense (`0..COUNT`) so per-key data lives in fixed-size
//! arrays ([`TierMap`], [`BuildingMap`]) instead of string-keyed maps.
//! Unknown keys are rejected at the typed boundary; the integrity engine is
//! responsible for quarantining them in raw documents before that point.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wool tiers, ordered from common to rare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceTier {
    /// Plain llama wool, the starter currency.
    Basic,
    /// Silver wool.
    Silver,
    /// Golden wool.
    Golden,
    /// Rainbow wool.
    Rainbow,
    /// Cosmic wool.
    Cosmic,
    /// Ethereal wool.
    Ethereal,
    /// Temporal wool.
    Temporal,
    /// Dimensional wool.
    Dimensional,
    /// Celestial wool.
    Celestial,
    /// Quantum wool.
    Quantum,
}

impl ResourceTier {
    /// Number of tiers.
    pub const COUNT: usize = 10;

    /// All tiers in unlock order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Basic,
        Self::Silver,
        Self::Golden,
        Self::Rainbow,
        Self::Cosmic,
        Self::Ethereal,
        Self::Temporal,
        Self::Dimensional,
        Self::Celestial,
        Self::Quantum,
    ];

    /// Dense index of this tier.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stable string key used in saves and catalogs.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Silver => "silver",
            Self::Golden => "golden",
            Self::Rainbow => "rainbow",
            Self::Cosmic => "cosmic",
            Self::Ethereal => "ethereal",
            Self::Temporal => "temporal",
            Self::Dimensional => "dimensional",
            Self::Celestial => "celestial",
            Self::Quantum => "quantum",
        }
    }

    /// Look up a tier by its stable key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tier| tier.key() == key)
    }
}

impl fmt::Display for ResourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Purchasable, levelable wool producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingType {
    /// Starter barn.
    Barn,
    /// Shearing shed.
    ShearingShed,
    /// Spinning mill.
    SpinningMill,
    /// Dye works.
    DyeWorks,
    /// Star-gazing observatory.
    Observatory,
    /// Time loom.
    TimeLoom,
    /// Portal gate.
    PortalGate,
    /// Quantum forge.
    QuantumForge,
}

impl BuildingType {
    /// Number of building types.
    pub const COUNT: usize = 8;

    /// All building types in catalog order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Barn,
        Self::ShearingShed,
        Self::SpinningMill,
        Self::DyeWorks,
        Self::Observatory,
        Self::TimeLoom,
        Self::PortalGate,
        Self::QuantumForge,
    ];

    /// Dense index of this building type.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stable string key used in saves and catalogs.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Barn => "barn",
            Self::ShearingShed => "shearing_shed",
            Self::SpinningMill => "spinning_mill",
            Self::DyeWorks => "dye_works",
            Self::Observatory => "observatory",
            Self::TimeLoom => "time_loom",
            Self::PortalGate => "portal_gate",
            Self::QuantumForge => "quantum_forge",
        }
    }

    /// Look up a building type by its stable key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }
}

impl fmt::Display for BuildingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Generates a fixed-size map keyed by one of the dense enums above.
///
/// Serializes as a JSON/RON map from stable key to value. Deserialization
/// rejects unknown keys and fills absent keys with `T::default()`.
macro_rules! dense_map {
    ($(#[$meta:meta])* $name:ident, $key:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name<T>([T; <$key>::COUNT]);

        impl<T> $name<T> {
            /// Build a map by evaluating `f` for every key.
            pub fn from_fn(mut f: impl FnMut($key) -> T) -> Self {
                Self(<$key>::ALL.map(|key| f(key)))
            }

            /// Entry for `key`.
            #[must_use]
            pub fn get(&self, key: $key) -> &T {
                &self.0[key.index()]
            }

            /// Mutable entry for `key`.
            pub fn get_mut(&mut self, key: $key) -> &mut T {
                &mut self.0[key.index()]
            }

            /// Iterate `(key, value)` pairs in key order.
            pub fn iter(&self) -> impl Iterator<Item = ($key, &T)> {
                <$key>::ALL.into_iter().zip(self.0.iter())
            }

            /// Iterate values in key order.
            pub fn values(&self) -> impl Iterator<Item = &T> {
                self.0.iter()
            }

            /// Map every value through `f`.
            pub fn map<U>(&self, mut f: impl FnMut($key, &T) -> U) -> $name<U> {
                $name::from_fn(|key| f(key, self.get(key)))
            }
        }

        impl<T: Default> Default for $name<T> {
            fn default() -> Self {
                Self::from_fn(|_| T::default())
            }
        }

        impl<T> Index<$key> for $name<T> {
            type Output = T;

            fn index(&self, key: $key) -> &T {
                self.get(key)
            }
        }

        impl<T> IndexMut<$key> for $name<T> {
            fn index_mut(&mut self, key: $key) -> &mut T {
                self.get_mut(key)
            }
        }

        impl<T: Serialize> Serialize for $name<T> {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                let mut map = serializer.serialize_map(Some(<$key>::COUNT))?;
                for (key, value) in self.iter() {
                    map.serialize_entry(key.key(), value)?;
                }
                map.end()
            }
        }

        impl<'de, T: Deserialize<'de> + Default> Deserialize<'de> for $name<T> {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let raw = BTreeMap::<String, T>::deserialize(deserializer)?;
                let mut result = Self::default();
                for (key, value) in raw {
                    let parsed = <$key>::from_key(&key)
                        .ok_or_else(|| {
                            <D::Error as serde::de::Error>::custom(format!("unknown key '{key}'"))
                        })?;
                    result[parsed] = value;
                }
                Ok(result)
            }
        }
    };
}

dense_map!(
    /// Per-tier values, one slot for each [`ResourceTier`].
    TierMap,
    ResourceTier
);

dense_map!(
    /// Per-building values, one slot for each [`BuildingType`].
    BuildingMap,
    BuildingType
);
