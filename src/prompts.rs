//! System prompt for turning extracted document text into categorized JSON.
//!
//! The prompt is the only place the expense taxonomy is spelled out; the
//! pipeline itself treats the model's JSON as opaque. Callers can override it
//! via [`crate::config::ExtractionConfig::system_prompt`].

/// Expense categories, in the order they are presented to the model.
pub const EXPENSE_CATEGORIES: [&str; 8] = [
    "Stationary",
    "Travel",
    "Accommodation",
    "Electronics",
    "Entertainment",
    "Pantry expenses",
    "Utilities",
    "Tech invoices",
];

/// Category for items that fit none of [`EXPENSE_CATEGORIES`].
pub const FALLBACK_CATEGORY: &str = "Miscellaneous";

/// Default system prompt for document structuring and expense categorization.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You convert the text of a business document (invoice, receipt, bill or expense report) into a single JSON object.

OUTPUT
- Respond with strictly valid JSON and nothing else: no prose, no comments, no Markdown fences.

STRUCTURE
- Identify the logical sections of the document (header, parties, line items, totals, payment details, notes, ...) and give each its own key.
- Nest sub-headings under their parent section.
- Use null for a section that is expected but absent from the document.
- For each table or image mentioned in the text, add a brief description that includes its page number and position on the page.
- When a value is unclear, give your best estimate, but never invent content that the text does not support.

EXPENSE CATEGORIZATION
- Examine every expense line item using its name, description, vendor and HSN/SAC code when present.
- Decide the category from what the item actually is in the real world, not from keyword matches alone. For example:
  * wooden stirrers, cups, plates, tissues -> "Pantry expenses"
  * cloud subscriptions, SaaS tools, software licenses -> "Tech invoices"
  * hotel stays, guest houses -> "Accommodation"
  * laptops, monitors -> "Electronics"
  * team dinners, birthday cakes -> "Entertainment"
- Assign each item to exactly one of: {categories}. If none applies, use "{fallback}".
- Finish with a summary object giving the total amount per category."#;

/// The default prompt with the category list filled in.
pub fn system_prompt() -> String {
    let categories = EXPENSE_CATEGORIES
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");
    DEFAULT_SYSTEM_PROMPT
        .replace("{categories}", &categories)
        .replace("{fallback}", FALLBACK_CATEGORY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_every_category() {
        let prompt = system_prompt();
        for category in EXPENSE_CATEGORIES {
            assert!(prompt.contains(&format!("\"{category}\"")), "missing {category}");
        }
        assert!(prompt.contains("\"Miscellaneous\""));
        assert!(!prompt.contains("{categories}"));
    }

    #[test]
    fn prompt_demands_json_only() {
        let prompt = system_prompt();
        assert!(prompt.contains("strictly valid JSON"));
        assert!(prompt.contains("total amount per category"));
    }
}
