//! Prompt assembly for the generation vendors.

use crate::item::{DEFAULT_BACKGROUND_TYPE, DEFAULT_MODEL_TYPE};

/// Base instruction sent with every request. Vendors tend to answer with
/// captions or multi-panel collages unless told not to.
const BASE_INSTRUCTION: &str = "\
Generate a photorealistic image of a person wearing this clothing item. I'd like to see how it would look on a real model.

Important:
- Return ONLY an image of a human model wearing this clothing item
- The output must be a standalone jpg/png image
- Do not include any text descriptions or explanations in your response
- Generate a new image with a real person wearing exactly this item of clothing
- Make the final image clear, high-quality, and in a standard fashion catalog style
";

/// Build the instruction string for one item. Deterministic; no escaping or
/// length cap is applied, the result goes to the vendor verbatim.
pub fn build_prompt(
    prompt_text: Option<&str>,
    model_type: &str,
    background_type: &str,
) -> String {
    let mut prompt = BASE_INSTRUCTION.to_string();

    if let Some(text) = prompt_text.filter(|t| !t.trim().is_empty()) {
        prompt.push_str(&format!("\nCustom instructions: {}\n", text));
    }

    if !model_type.is_empty() && model_type != DEFAULT_MODEL_TYPE {
        prompt.push_str(&format!("\nModel type: {}", model_type));
    }

    if !background_type.is_empty() && background_type != DEFAULT_BACKGROUND_TYPE {
        prompt.push_str(&format!("\nBackground setting: {}", background_type));
    }

    prompt
}
