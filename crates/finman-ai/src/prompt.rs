//! Prompt templates for entry extraction.

const BASE_PROMPT: &str = "\
Extract the expense or income described by the user and return EXACTLY one valid JSON object ONLY.

The JSON must have exactly these keys:
- Name: string or null (the item bought or the source of income)
- category: one of \"Food\", \"Entertainment\", \"Travel\", \"Others\"
- price: string or null (preserve the currency marker if present, e.g. \"10rs\")
- isIncome: true if the user received money, false if they spent it
- confidence: object with keys name, category, price, each a number from 0 to 1 \
saying how sure you are of that field

Rules:
1) Respond with ONLY the JSON object and nothing else (no explanation, no code fences).
2) If you cannot infer a category, use \"Others\".
3) If a field is missing, set it to null and its confidence to 0.

Examples:
{\"Name\": \"Lays\", \"category\": \"Food\", \"price\": \"10rs\", \"isIncome\": false, \"confidence\": {\"name\": 0.95, \"category\": 0.9, \"price\": 0.95}}
{\"Name\": \"Salary\", \"category\": \"Others\", \"price\": \"50000\", \"isIncome\": true, \"confidence\": {\"name\": 0.9, \"category\": 0.6, \"price\": 0.95}}";

const FORCE_GUESS: &str = "\
The previous attempt was too uncertain. Commit to your single best guess for EVERY field \
even if you are unsure; do not leave fields null unless there is truly no hint at all.";

const IMAGE_HINT: &str = "\
An image (usually a receipt or bill) is attached. Use the grand total as the price.";

/// Build the extraction prompt for one attempt.
pub fn build_prompt(user_text: &str, has_image: bool, force_guess: bool) -> String {
    let mut prompt = String::from(BASE_PROMPT);
    if has_image {
        prompt.push_str("\n\n");
        prompt.push_str(IMAGE_HINT);
    }
    if force_guess {
        prompt.push_str("\n\n");
        prompt.push_str(FORCE_GUESS);
    }
    let user_text = user_text.trim();
    if !user_text.is_empty() {
        prompt.push_str(&format!("\n\nUser message: \"{}\"", user_text.replace('"', "'")));
    }
    prompt.push_str("\n\nReturn ONLY the single JSON object.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_user_message() {
        let p = build_prompt("Lunch 120 Food", false, false);
        assert!(p.contains("User message: \"Lunch 120 Food\""));
        assert!(!p.contains("best guess"));
        assert!(!p.contains("receipt"));
    }

    #[test]
    fn force_guess_adds_instruction() {
        let p = build_prompt("something", false, true);
        assert!(p.contains("best guess"));
    }

    #[test]
    fn image_without_caption() {
        let p = build_prompt("  ", true, false);
        assert!(p.contains("receipt"));
        assert!(!p.contains("User message"));
    }

    #[test]
    fn quotes_in_user_text_are_neutralised() {
        let p = build_prompt(r#"the "good" coffee 80"#, false, false);
        assert!(p.contains("the 'good' coffee 80"));
    }
}
