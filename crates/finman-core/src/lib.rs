pub mod entry;
pub mod normalize;
pub mod phone;
pub mod policy;
pub mod record;

pub use entry::{Category, Confidences, Entry, Field, FieldSet};
pub use normalize::{coerce_category, coerce_price, normalize, normalize_value, parse_category};
pub use phone::normalize_phone;
pub use policy::{Clarification, ClarificationRule, Policy, question_for};
pub use record::{IdentityKey, NewRecord, RecordId, StoredRecord};
