

pub const CLASSIFY_SYSTEM_PROMPT: &str = r#"You are a shopping query analyzer for an online store.
Identify the shopper's intent and the product entities mentioned (product types, brands, attributes, sizes, colors).
Always respond with valid JSON only."#;

pub const EXPAND_SYSTEM_PROMPT: &str = r#"You are a query expansion engine for a product catalog search.
Produce short synonyms, specification terms and closely related attributes that a matching product listing would contain.
Never invent prices or brands that were not implied. Always respond with valid JSON only."#;


pub fn build_classify_prompt(query: &str) -> String {
    format!(
        r#"Classify this shopping query.

Query: "{query}"

Return a JSON object:
{{
  "intent": one of "product_search", "comparison", "accessory", "support", "navigation",
  "entities": array of the product entities found in the query
}}"#
    )
}


pub fn build_expand_prompt(query: &str, max_terms: usize) -> String {
    format!(
        r#"Expand this shopping query with at most {max_terms} additional search terms.

Query: "{query}"

Return a JSON object:
{{
  "terms": [{{"term": "...", "confidence": 0.0-1.0}}]
}}
Order terms by confidence, highest first. Do not repeat words already in the query."#
    )
}


/// Cuts the outermost JSON object out of a model reply that may carry prose
/// or code fences around it.
pub fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}
