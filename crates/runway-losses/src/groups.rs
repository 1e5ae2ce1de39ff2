use crate::error::{LossError, LossResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Unmapped classes listed in an error before the rest are elided.
const MAX_REPORTED_GAPS: usize = 16;

/// One of the two coarse groups a class collapses into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum GroupLabel {
    Zero,
    One,
}

impl GroupLabel {
    /// The label as a binary target value.
    #[must_use]
    pub fn as_f32(self) -> f32 {
        match self {
            Self::Zero => 0.0,
            Self::One => 1.0,
        }
    }
}

impl TryFrom<u8> for GroupLabel {
    type Error = LossError;

    fn try_from(value: u8) -> LossResult<Self> {
        match value {
            0 => Ok(Self::Zero),
            1 => Ok(Self::One),
            other => Err(LossError::InvalidGroupMap(format!("group must be 0 or 1, got {other}"))),
        }
    }
}

impl From<GroupLabel> for u8 {
    fn from(label: GroupLabel) -> Self {
        match label {
            GroupLabel::Zero => 0,
            GroupLabel::One => 1,
        }
    }
}

impl std::fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        u8::from(*self).fmt(f)
    }
}

/// Total mapping from every class index in `0..num_classes` to a group.
///
/// Totality is checked when the map is built, so lookups of an in-range class
/// never fail; an out-of-range class is an error rather than a default group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassGroupMap {
    groups: Vec<GroupLabel>,
}

impl ClassGroupMap {
    pub fn new<I>(entries: I, num_classes: usize) -> LossResult<Self>
    where
        I: IntoIterator<Item = (usize, GroupLabel)>,
    {
        if num_classes == 0 {
            return Err(LossError::InvalidGroupMap("num_classes must be >= 1".to_string()));
        }

        // Fewer entries than classes can never be total; reject before sizing the table.
        let entries: Vec<(usize, GroupLabel)> = entries.into_iter().collect();
        if entries.len() < num_classes {
            let mapped: HashSet<usize> = entries.iter().map(|&(class, _)| class).collect();
            let mut missing: Vec<String> = (0..num_classes)
                .filter(|class| !mapped.contains(class))
                .take(MAX_REPORTED_GAPS + 1)
                .map(|class| class.to_string())
                .collect();
            if missing.len() > MAX_REPORTED_GAPS {
                missing.truncate(MAX_REPORTED_GAPS);
                missing.push("...".to_string());
            }
            return Err(LossError::InvalidGroupMap(format!("classes without a group: {}", missing.join(", "))));
        }

        let mut slots: Vec<Option<GroupLabel>> = vec![None; num_classes];
        for (class, group) in entries {
            let slot = slots.get_mut(class).ok_or_else(|| {
                LossError::InvalidGroupMap(format!("class {class} is outside 0..{num_classes}"))
            })?;
            if slot.replace(group).is_some() {
                return Err(LossError::InvalidGroupMap(format!("class {class} is mapped more than once")));
            }
        }

        let missing: Vec<String> =
            slots.iter().enumerate().filter(|(_, g)| g.is_none()).map(|(class, _)| class.to_string()).collect();
        if !missing.is_empty() {
            return Err(LossError::InvalidGroupMap(format!("classes without a group: {}", missing.join(", "))));
        }

        Ok(Self { groups: slots.into_iter().flatten().collect() })
    }

    /// The ten-class table: 0, 1, 8 and 9 form group 0, classes 2 through 7 group 1.
    #[must_use]
    pub fn binary_digits() -> Self {
        use GroupLabel::{One, Zero};
        Self { groups: vec![Zero, Zero, One, One, One, One, One, One, Zero, Zero] }
    }

    /// Parse a YAML mapping of `class: group`.
    ///
    /// Without `num_classes` the class count is taken as one past the largest class,
    /// so gaps are still rejected.
    pub fn from_yaml_str(text: &str, num_classes: Option<usize>) -> LossResult<Self> {
        let raw: BTreeMap<usize, GroupLabel> = serde_yaml::from_str(text)?;
        let inferred = match raw.keys().next_back() {
            Some(&max) => max
                .checked_add(1)
                .ok_or_else(|| LossError::InvalidGroupMap(format!("class {max} is too large")))?,
            None => 0,
        };
        Self::new(raw, num_classes.unwrap_or(inferred))
    }

    pub fn load(path: &Path, num_classes: Option<usize>) -> LossResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let map = Self::from_yaml_str(&text, num_classes)?;
        tracing::debug!(path = %path.display(), num_classes = map.num_classes(), "loaded class group map");
        Ok(map)
    }

    pub fn to_yaml_string(&self) -> LossResult<String> {
        let raw: BTreeMap<usize, GroupLabel> = self.iter().collect();
        Ok(serde_yaml::to_string(&raw)?)
    }

    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.groups.len()
    }

    pub fn group_of(&self, class: usize) -> LossResult<GroupLabel> {
        self.groups.get(class).copied().ok_or(LossError::UnmappedClass(class))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, GroupLabel)> + '_ {
        self.groups.iter().copied().enumerate()
    }
}
