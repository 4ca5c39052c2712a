//! Receipt classification prompt
//!
//! One text prompt carries everything: the taxonomy with definitions, the
//! JSON-only output contract, and the image itself as an inline data URI.

use std::collections::HashMap;

use base64::Engine;

use crate::models::Category;

const CLASSIFY_RECEIPT_TEMPLATE: &str = r#"Classify all items in this receipt into exactly one of these categories:

{{taxonomy}}

Use "Other" for anything that does not fit the categories above.
Also sum up the expenses in each category.

Respond with ONLY a JSON object, no explanation or markdown, matching this schema:
{"items": {"<Category>": [{"description": "<item name>", "amount": <number>}]}, "totals": {"<Category>": <number>}}

Each total must equal the sum of the item amounts in that category.

Here is the image: <img src="{{image}}" />"#;

/// Base64-encode an image
pub fn encode_image(image: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(image)
}

/// Guess the image MIME type from its magic bytes (PNG unless it looks like JPEG)
pub fn sniff_mime(image: &[u8]) -> &'static str {
    if image.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else {
        "image/png"
    }
}

/// `data:` URI for an already-encoded image
pub fn data_uri(mime: &str, encoded: &str) -> String {
    format!("data:{};base64,{}", mime, encoded)
}

/// Taxonomy lines: `Name: definition`
pub fn render_taxonomy(taxonomy: &[Category]) -> String {
    taxonomy
        .iter()
        .map(|c| format!("{}: {}", c.display_name(), c.definition()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the full prompt around an image data URI
pub fn build_classification_prompt(taxonomy: &[Category], image_uri: &str) -> String {
    let taxonomy = render_taxonomy(taxonomy);
    let mut vars = HashMap::new();
    vars.insert("taxonomy", taxonomy.as_str());
    vars.insert("image", image_uri);
    render(CLASSIFY_RECEIPT_TEMPLATE, &vars)
}

/// Mustache-style `{{var}}` replacement
fn render(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let pattern = format!("{{{{{}}}}}", key);
        result = result.replace(&pattern, value);
    }
    result
}
