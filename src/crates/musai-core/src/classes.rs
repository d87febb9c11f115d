//! Instrument class sets and the allowed/required filter applied to every MIDI file

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::instruments::{InstrumentClass, NUM_CLASSES, SOUND_EFFECTS};

/// A set of instrument classes, stored as a bit mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct ClassSet(u32);

impl ClassSet {
    pub fn empty() -> Self {
        ClassSet(0)
    }

    /// Every class, Sound Effects included
    pub fn all() -> Self {
        ClassSet((1 << NUM_CLASSES) - 1)
    }

    /// Parse a comma-separated list such as `"0,3,4,16"`
    ///
    /// Whitespace around items is ignored and an empty string yields an empty set.
    pub fn parse_list(list: &str) -> Result<Self> {
        let mut set = ClassSet::empty();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let class = item
                .parse::<u8>()
                .ok()
                .and_then(InstrumentClass::new)
                .ok_or_else(|| CoreError::InvalidClass(item.to_string()))?;
            set.insert(class);
        }
        Ok(set)
    }

    pub fn insert(&mut self, class: InstrumentClass) {
        self.0 |= 1 << class.index();
    }

    pub fn remove(&mut self, class: InstrumentClass) {
        self.0 &= !(1 << class.index());
    }

    pub fn contains(&self, class: InstrumentClass) -> bool {
        self.0 & (1 << class.index()) != 0
    }

    pub fn is_superset(&self, other: &ClassSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Classes in ascending index order
    pub fn iter(&self) -> impl Iterator<Item = InstrumentClass> + '_ {
        InstrumentClass::all().filter(move |c| self.contains(*c))
    }

    /// Classes of `other` missing from this set
    pub fn missing_from(&self, other: &ClassSet) -> ClassSet {
        ClassSet(other.0 & !self.0)
    }
}

impl FromIterator<InstrumentClass> for ClassSet {
    fn from_iter<I: IntoIterator<Item = InstrumentClass>>(iter: I) -> Self {
        let mut set = ClassSet::empty();
        for class in iter {
            set.insert(class);
        }
        set
    }
}

impl FromStr for ClassSet {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        ClassSet::parse_list(s)
    }
}

impl TryFrom<Vec<u8>> for ClassSet {
    type Error = CoreError;

    fn try_from(indices: Vec<u8>) -> Result<Self> {
        indices
            .into_iter()
            .map(|i| InstrumentClass::new(i).ok_or_else(|| CoreError::InvalidClass(i.to_string())))
            .collect()
    }
}

impl From<ClassSet> for Vec<u8> {
    fn from(set: ClassSet) -> Self {
        set.iter().map(InstrumentClass::index).collect()
    }
}

impl fmt::Display for ClassSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self.iter().map(|c| c.index().to_string()).collect();
        write!(f, "{}", items.join(","))
    }
}

/// Allowed and required instrument classes for a corpus
///
/// Sound Effects (class 15) are always stripped from the allowed set, whatever the
/// caller asked for. A file passes the filter when, after dropping the tracks of
/// classes that are not allowed, it still has every required class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFilter {
    allowed: ClassSet,
    required: ClassSet,
}

impl ClassFilter {
    pub fn new(mut allowed: ClassSet, required: ClassSet) -> Result<Self> {
        if required.contains(SOUND_EFFECTS) {
            return Err(CoreError::RequiredSoundEffects(SOUND_EFFECTS.index()));
        }
        if allowed.contains(SOUND_EFFECTS) {
            log::debug!("Dropping class {} from the allowed classes", SOUND_EFFECTS);
            allowed.remove(SOUND_EFFECTS);
        }
        if let Some(class) = allowed.missing_from(&required).iter().next() {
            return Err(CoreError::RequiredNotAllowed(class.index()));
        }

        Ok(ClassFilter { allowed, required })
    }

    pub fn allowed(&self) -> ClassSet {
        self.allowed
    }

    pub fn required(&self) -> ClassSet {
        self.required
    }

    /// Whether tracks of this class are kept
    pub fn allows(&self, class: InstrumentClass) -> bool {
        self.allowed.contains(class)
    }

    /// Whether a file whose kept tracks cover `present` satisfies the required classes
    pub fn accepts(&self, present: &ClassSet) -> bool {
        present.is_superset(&self.required)
    }
}

impl Default for ClassFilter {
    fn default() -> Self {
        let mut allowed = ClassSet::all();
        allowed.remove(SOUND_EFFECTS);
        ClassFilter {
            allowed,
            required: ClassSet::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn class(i: u8) -> InstrumentClass {
        InstrumentClass::new(i).unwrap()
    }

    #[test]
    fn test_parse_list() {
        let set = ClassSet::parse_list("0, 3,4,16").unwrap();
        assert_eq!(set.len(), 4);
        assert!(set.contains(class(16)));
        assert_eq!(set.to_string(), "0,3,4,16");
        assert!(ClassSet::parse_list("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_list_rejects_out_of_range() {
        assert!(matches!(ClassSet::parse_list("1,17"), Err(CoreError::InvalidClass(_))));
        assert!(matches!(ClassSet::parse_list("piano"), Err(CoreError::InvalidClass(_))));
    }

    #[test]
    fn test_filter_always_drops_sound_effects() {
        let filter = ClassFilter::new(ClassSet::all(), ClassSet::empty()).unwrap();
        assert!(!filter.allows(SOUND_EFFECTS));
        assert!(filter.allows(class(14)));
        assert!(!ClassFilter::default().allows(SOUND_EFFECTS));
    }

    #[test]
    fn test_filter_rejects_bad_requirements() {
        let allowed = ClassSet::parse_list("0,1").unwrap();
        assert!(matches!(
            ClassFilter::new(allowed, ClassSet::parse_list("15").unwrap()),
            Err(CoreError::RequiredSoundEffects(15))
        ));
        assert!(matches!(
            ClassFilter::new(allowed, ClassSet::parse_list("2").unwrap()),
            Err(CoreError::RequiredNotAllowed(2))
        ));
    }

    #[test]
    fn test_filter_accepts_supersets_only() {
        let filter = ClassFilter::new(
            ClassSet::parse_list("0,4,16").unwrap(),
            ClassSet::parse_list("4,16").unwrap(),
        )
        .unwrap();
        assert!(filter.accepts(&ClassSet::parse_list("0,4,16").unwrap()));
        assert!(filter.accepts(&ClassSet::parse_list("4,16").unwrap()));
        assert!(!filter.accepts(&ClassSet::parse_list("0,16").unwrap()));
    }

    #[test]
    fn test_index_list_conversion() {
        let set = ClassSet::parse_list("2,16").unwrap();
        let indices: Vec<u8> = set.into();
        assert_eq!(indices, vec![2, 16]);
        assert_eq!(ClassSet::try_from(indices).unwrap(), set);
        assert!(ClassSet::try_from(vec![40]).is_err());
    }

    proptest! {
        #[test]
        fn superset_matches_bitwise_definition(a in 0u32..(1 << 17), b in 0u32..(1 << 17)) {
            let sa = ClassSet(a);
            let sb = ClassSet(b);
            let expected = sb.iter().all(|c| sa.contains(c));
            prop_assert_eq!(sa.is_superset(&sb), expected);
        }
    }
}
