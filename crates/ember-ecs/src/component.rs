//! Component kinds, kind masks, and the [`Component`] sum type.
//!
//! The set of component kinds is closed: every record the runtime knows about
//! is one variant of [`Component`]. Dispatch over kinds is a `match`, never a
//! runtime type inspection, and each kind maps to a dense index used by the
//! per-entity [`KindMask`] and the component pools.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::components::{Ai, Collision, Health, Input, Lifetime, Render, Transform, Velocity, Weapon};
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentKind
// ---------------------------------------------------------------------------

/// Identifier of one of the nine component kinds.
///
/// The declaration order is significant: it is the dense index used by
/// [`KindMask`] and the order in which independent components are attached
/// during template construction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Transform,
    Velocity,
    Render,
    Health,
    Collision,
    Lifetime,
    Input,
    Ai,
    Weapon,
}

impl ComponentKind {
    /// Number of component kinds.
    pub const COUNT: usize = 9;

    /// Every kind, in index order.
    pub const ALL: [ComponentKind; Self::COUNT] = [
        ComponentKind::Transform,
        ComponentKind::Velocity,
        ComponentKind::Render,
        ComponentKind::Health,
        ComponentKind::Collision,
        ComponentKind::Lifetime,
        ComponentKind::Input,
        ComponentKind::Ai,
        ComponentKind::Weapon,
    ];

    /// Dense index in `0..COUNT`.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The kind's string label, as used in templates and spawn configs.
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Transform => "transform",
            ComponentKind::Velocity => "velocity",
            ComponentKind::Render => "render",
            ComponentKind::Health => "health",
            ComponentKind::Collision => "collision",
            ComponentKind::Lifetime => "lifetime",
            ComponentKind::Input => "input",
            ComponentKind::Ai => "ai",
            ComponentKind::Weapon => "weapon",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = EcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComponentKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| EcsError::UnknownComponentKind(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// KindMask
// ---------------------------------------------------------------------------

/// A bitset over [`ComponentKind`]s.
///
/// Each entity caches the mask of kinds it carries so that signature matching
/// in queries is a single `&` and compare.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KindMask(u16);

impl KindMask {
    /// The empty mask.
    pub const EMPTY: KindMask = KindMask(0);

    /// Build a mask from a list of kinds.
    pub fn of(kinds: &[ComponentKind]) -> Self {
        let mut mask = Self::EMPTY;
        for &kind in kinds {
            mask.insert(kind);
        }
        mask
    }

    #[inline]
    pub fn insert(&mut self, kind: ComponentKind) {
        self.0 |= 1 << kind.index();
    }

    #[inline]
    pub fn remove(&mut self, kind: ComponentKind) {
        self.0 &= !(1 << kind.index());
    }

    #[inline]
    pub fn contains(self, kind: ComponentKind) -> bool {
        self.0 & (1 << kind.index()) != 0
    }

    /// Whether every kind in `other` is also in `self`.
    #[inline]
    pub fn is_superset_of(self, other: KindMask) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of kinds in the mask.
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate the kinds in the mask in index order.
    pub fn iter(self) -> impl Iterator<Item = ComponentKind> {
        ComponentKind::ALL
            .into_iter()
            .filter(move |k| self.contains(*k))
    }
}

impl fmt::Debug for KindMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<ComponentKind> for KindMask {
    fn from_iter<I: IntoIterator<Item = ComponentKind>>(iter: I) -> Self {
        let mut mask = KindMask::EMPTY;
        for kind in iter {
            mask.insert(kind);
        }
        mask
    }
}

// ---------------------------------------------------------------------------
// ComponentData
// ---------------------------------------------------------------------------

/// Behavior shared by every component record.
///
/// Records are plain data. The trait ties a record type to its
/// [`ComponentKind`] and supplies the pooling hooks: `reset` returns the record
/// to its canonical default in place, `validate` is the optional per-kind
/// validation hook run after template construction.
pub trait ComponentData:
    Clone + Default + Serialize + for<'de> Deserialize<'de> + Into<Component> + 'static
{
    /// The kind this record is stored under.
    const KIND: ComponentKind;

    /// Restore the canonical default state.
    fn reset(&mut self) {
        *self = Self::default();
    }

    /// Check internal consistency. The error string names the violated field.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Borrow this record out of a [`Component`] of the matching variant.
    fn from_component(component: &Component) -> Option<&Self>;

    /// Mutably borrow this record out of a [`Component`] of the matching variant.
    fn from_component_mut(component: &mut Component) -> Option<&mut Self>;
}

macro_rules! component_variants {
    ($($variant:ident),* $(,)?) => {
        /// One component instance: a tagged variant over every known kind.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "kind", content = "data", rename_all = "snake_case")]
        pub enum Component {
            $($variant($variant),)*
        }

        impl Component {
            /// The kind tag of this component.
            pub fn kind(&self) -> ComponentKind {
                match self {
                    $(Component::$variant(_) => ComponentKind::$variant,)*
                }
            }

            /// A freshly allocated component of `kind` in its default state.
            pub fn default_for(kind: ComponentKind) -> Self {
                match kind {
                    $(ComponentKind::$variant => Component::$variant($variant::default()),)*
                }
            }

            /// Reset to the canonical default state without changing the kind.
            pub fn reset(&mut self) {
                match self {
                    $(Component::$variant(c) => ComponentData::reset(c),)*
                }
            }

            /// Run the kind's validation hook.
            pub fn validate(&self) -> Result<(), String> {
                match self {
                    $(Component::$variant(c) => ComponentData::validate(c),)*
                }
            }

            /// Overwrite this component with a record deserialized from
            /// `params`. Fields missing from `params` take their defaults.
            ///
            /// On error the component is left untouched.
            pub fn configure(&mut self, params: &serde_json::Value) -> Result<(), EcsError> {
                let kind = self.kind();
                let invalid = |e: serde_json::Error| EcsError::InvalidComponentParams {
                    kind,
                    details: e.to_string(),
                };
                match self {
                    $(Component::$variant(c) => {
                        *c = serde_json::from_value(params.clone()).map_err(invalid)?;
                    })*
                }
                Ok(())
            }
        }

        $(
            impl From<$variant> for Component {
                fn from(value: $variant) -> Self {
                    Component::$variant(value)
                }
            }
        )*
    };
}

component_variants!(Transform, Velocity, Render, Health, Collision, Lifetime, Input, Ai, Weapon);

macro_rules! component_data_access {
    ($variant:ident) => {
        fn from_component(component: &Component) -> Option<&Self> {
            match component {
                Component::$variant(c) => Some(c),
                _ => None,
            }
        }

        fn from_component_mut(component: &mut Component) -> Option<&mut Self> {
            match component {
                Component::$variant(c) => Some(c),
                _ => None,
            }
        }
    };
}

pub(crate) use component_data_access;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
