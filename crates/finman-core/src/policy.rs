//! Clarification policy: decide whether an entry can be saved as-is, and
//! which single question to ask when it cannot.

use serde::{Deserialize, Serialize};

use crate::entry::{Entry, Field, FieldSet};

/// Default acceptance threshold for per-field confidence.
pub const DEFAULT_THRESHOLD: f32 = 0.70;

/// How per-field confidences combine into an accept/ask decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClarificationRule {
    /// A confidently extracted price accepts the entry on its own; weak
    /// name or category never blocks saving.
    #[default]
    PriceOverride,
    /// Every field must clear the threshold.
    Symmetric,
}

impl ClarificationRule {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "price-override" | "price_override" | "price" => Some(Self::PriceOverride),
            "symmetric" => Some(Self::Symmetric),
            _ => None,
        }
    }
}

/// Outcome of [`needs_clarification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clarification {
    pub ask: bool,
    /// Fields below threshold, in name → category → price order.
    pub issues: FieldSet,
}

impl Clarification {
    pub fn resolved() -> Self {
        Self {
            ask: false,
            issues: FieldSet::empty(),
        }
    }
}

/// Threshold plus combination rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub threshold: f32,
    pub rule: ClarificationRule,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            rule: ClarificationRule::default(),
        }
    }
}

impl Policy {
    pub fn new(threshold: f32, rule: ClarificationRule) -> Self {
        Self { threshold, rule }
    }

    pub fn evaluate(&self, entry: &Entry) -> Clarification {
        match self.rule {
            ClarificationRule::PriceOverride => needs_clarification(entry, self.threshold),
            ClarificationRule::Symmetric => needs_clarification_symmetric(entry, self.threshold),
        }
    }

    /// True when every field is below threshold, which is when a second,
    /// force-guess extraction is worth attempting.
    pub fn universally_low(&self, entry: &Entry) -> bool {
        low_fields(entry, self.threshold).len() == Field::ORDER.len()
    }
}

/// Price-override rule.
///
/// `price_confidence >= threshold` accepts the entry. Otherwise every field
/// below threshold is an issue, so `price` is always among them.
pub fn needs_clarification(entry: &Entry, threshold: f32) -> Clarification {
    if entry.effective_confidence(Field::Price) >= threshold {
        return Clarification::resolved();
    }
    let issues = low_fields(entry, threshold);
    Clarification {
        ask: true,
        issues,
    }
}

/// Symmetric rule: ask whenever any field is below threshold.
pub fn needs_clarification_symmetric(entry: &Entry, threshold: f32) -> Clarification {
    let issues = low_fields(entry, threshold);
    Clarification {
        ask: !issues.is_empty(),
        issues,
    }
}

fn low_fields(entry: &Entry, threshold: f32) -> FieldSet {
    Field::ORDER
        .into_iter()
        .filter(|f| entry.effective_confidence(*f) < threshold)
        .collect()
}

/// The one question to send for a set of outstanding fields.
///
/// Total over all eight subsets: single fields get a tailored question, an
/// empty set asks for a yes/no confirmation, and larger sets list every
/// outstanding field.
pub fn question_for(issues: FieldSet) -> String {
    let fields: Vec<Field> = issues.iter().collect();
    match fields.as_slice() {
        [] => "Does this look right? Reply *yes* to save it, or *no* to change something."
            .to_string(),
        [Field::Name] => "What did you buy? Please tell me the *item name*.".to_string(),
        [Field::Category] => {
            "Which *category* is this: Food, Entertainment, Travel, or Others?".to_string()
        }
        [Field::Price] => "How much was it? Please send the *amount*.".to_string(),
        many => {
            let listed: Vec<String> = many.iter().map(|f| format!("*{}*", f.as_str())).collect();
            format!(
                "I need a bit more detail. Please tell me the {}.",
                join_human(&listed)
            )
        }
    }
}

fn join_human(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}
