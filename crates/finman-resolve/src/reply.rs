//! User-facing replies. Rendered as plain text with `*emphasis*` markup.

use std::fmt;

use finman_core::{Entry, Field, FieldSet, RecordId, question_for};

use crate::state::CorrectionTarget;

/// What the resolver tells the user after a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Saved { record_id: RecordId, entry: Entry },
    /// Clarifying question for the outstanding fields.
    Ask { issues: FieldSet },
    /// Show the candidate and ask for yes or no.
    Confirm { entry: Entry },
    ChooseField,
    AskCorrection { target: CorrectionTarget },
    /// The correction could not be applied; ask for it again.
    InvalidCorrection { target: CorrectionTarget },
    ExtractionFailed,
    /// The entry is kept; the next message retries the save.
    SaveFailed,
    NotAuthenticated,
    Cancelled,
    NothingToCancel,
    /// An empty message with no image.
    NeedInput,
    Internal,
}

impl Reply {
    pub fn render(&self) -> String {
        match self {
            Self::Saved { record_id, entry } => {
                let kind = if entry.is_income { "Income" } else { "Expense" };
                format!("*{kind} saved!* ID: {record_id}\n{}", summary(entry))
            }
            Self::Ask { issues } => question_for(*issues),
            Self::Confirm { entry } => {
                format!("Here's what I got:\n{}\n\n{}", summary(entry), question_for(FieldSet::empty()))
            }
            Self::ChooseField => {
                "What would you like to change? Reply with *name*, *category*, *price*, or *all*."
                    .to_string()
            }
            Self::AskCorrection { target } => correction_prompt(*target).to_string(),
            Self::InvalidCorrection { target } => format!(
                "That doesn't look like a valid {}. {}",
                target.as_str(),
                correction_prompt(*target)
            ),
            Self::ExtractionFailed => {
                "I couldn't process that just now. Please send it again.".to_string()
            }
            Self::SaveFailed => "*Couldn't save your entry.* Send any message to try again, \
                                 or /cancel to discard it."
                .to_string(),
            Self::NotAuthenticated => {
                "*Please authenticate first.* Share your phone number to get started.".to_string()
            }
            Self::Cancelled => "Cancelled. Nothing was saved.".to_string(),
            Self::NothingToCancel => "There's nothing to cancel.".to_string(),
            Self::NeedInput => {
                "Send me an expense like \"Coffee 50\" or a photo of a receipt.".to_string()
            }
            Self::Internal => "Something went wrong on our side. Please try again.".to_string(),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn correction_prompt(target: CorrectionTarget) -> &'static str {
    match target {
        CorrectionTarget::Field(Field::Name) => "Send the correct *name*.",
        CorrectionTarget::Field(Field::Category) => {
            "Send the correct *category*: Food, Entertainment, Travel, or Others."
        }
        CorrectionTarget::Field(Field::Price) => "Send the correct *amount*, e.g. 120.",
        CorrectionTarget::All => {
            "Send the whole entry as JSON, e.g. {\"name\": \"Lunch\", \"category\": \"Food\", \"price\": 120}"
        }
    }
}

fn summary(entry: &Entry) -> String {
    let amount = entry
        .price
        .map(format_amount)
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "Item: *{}*\nCategory: {}\nAmount: {amount}",
        entry.display_name(),
        entry.category
    )
}

fn format_amount(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("₹{price:.0}")
    } else {
        format!("₹{price:.2}")
    }
}
