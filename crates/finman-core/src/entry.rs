//! Candidate expense entries and the fields the clarification flow reasons about.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed spending category. Free text never survives normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Food,
    Entertainment,
    Travel,
    Others,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Food,
        Category::Entertainment,
        Category::Travel,
        Category::Others,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "Food",
            Self::Entertainment => "Entertainment",
            Self::Travel => "Travel",
            Self::Others => "Others",
        }
    }

    /// Exact match against the canonical spelling.
    pub fn from_canonical(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the three confidence-scored fields of an [`Entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Name,
    Category,
    Price,
}

impl Field {
    /// Fixed reporting order: name, category, price.
    pub const ORDER: [Field; 3] = [Field::Name, Field::Category, Field::Price];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Category => "category",
            Self::Price => "price",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "category" => Some(Self::Category),
            "price" => Some(Self::Price),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Name => 0b001,
            Self::Category => 0b010,
            Self::Price => 0b100,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of [`Field`]s. Iteration always yields name, category, price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldSet(u8);

impl FieldSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, field: Field) {
        self.0 |= field.bit();
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0 & field.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Field> + '_ {
        Field::ORDER.into_iter().filter(|f| self.contains(*f))
    }

    /// Field names in fixed order, e.g. `["category", "price"]`.
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|f| f.as_str()).collect()
    }
}

impl FromIterator<Field> for FieldSet {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        let mut set = Self::empty();
        for field in iter {
            set.insert(field);
        }
        set
    }
}

/// Per-field extractor confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Confidences {
    pub name: f32,
    pub category: f32,
    pub price: f32,
}

impl Confidences {
    pub fn new(name: f32, category: f32, price: f32) -> Self {
        Self {
            name: clamp_unit(name),
            category: clamp_unit(category),
            price: clamp_unit(price),
        }
    }

    /// Every field fully trusted, used for values the user typed in directly.
    pub fn certain() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }

    pub fn get(&self, field: Field) -> f32 {
        match field {
            Field::Name => self.name,
            Field::Category => self.category,
            Field::Price => self.price,
        }
    }

    pub fn set(&mut self, field: Field, value: f32) {
        let value = clamp_unit(value);
        match field {
            Field::Name => self.name = value,
            Field::Category => self.category = value,
            Field::Price => self.price = value,
        }
    }
}

pub(crate) fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// A candidate expense or income entry produced by extraction + normalization.
///
/// `category` is always set: normalization maps anything unrecognised, or
/// missing, to [`Category::Others`]. `name` and `price` may stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub name: Option<String>,
    pub category: Category,
    pub price: Option<f64>,
    pub is_income: bool,
    pub confidences: Confidences,
}

impl Entry {
    /// An entry carrying no information, every field at zero confidence.
    pub fn unknown() -> Self {
        Self {
            name: None,
            category: Category::Others,
            price: None,
            is_income: false,
            confidences: Confidences::default(),
        }
    }

    /// Confidence the policy should act on.
    ///
    /// A missing name or price can never be trusted, whatever the extractor
    /// reported for it.
    pub fn effective_confidence(&self, field: Field) -> f32 {
        match field {
            Field::Name if self.name.is_none() => 0.0,
            Field::Price if self.price.is_none() => 0.0,
            _ => self.confidences.get(field),
        }
    }

    /// Name to display or persist; `Unknown` when the entry has none.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_set_iterates_in_fixed_order() {
        let set: FieldSet = [Field::Price, Field::Name].into_iter().collect();
        assert_eq!(set.names(), vec!["name", "price"]);
        assert_eq!(set.len(), 2);
        assert!(!set.contains(Field::Category));
    }

    #[test]
    fn empty_field_set() {
        let set = FieldSet::empty();
        assert!(set.is_empty());
        assert_eq!(set.iter().count(), 0);
    }

    #[test]
    fn confidences_are_clamped() {
        let c = Confidences::new(1.7, -0.2, f32::NAN);
        assert_eq!(c.name, 1.0);
        assert_eq!(c.category, 0.0);
        assert_eq!(c.price, 0.0);
    }

    #[test]
    fn missing_price_has_no_effective_confidence() {
        let entry = Entry {
            name: Some("Tea".into()),
            category: Category::Food,
            price: None,
            is_income: false,
            confidences: Confidences::new(0.9, 0.9, 0.95),
        };
        assert_eq!(entry.effective_confidence(Field::Price), 0.0);
        assert!((entry.effective_confidence(Field::Name) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn field_parse_is_case_insensitive() {
        assert_eq!(Field::parse("  Price "), Some(Field::Price));
        assert_eq!(Field::parse("all"), None);
    }
}
