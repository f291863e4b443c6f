//! Classification prompt

/// Build the user prompt for one recipe.
///
/// Recipes over `max_recipe_bytes` keep their head, cut at a char boundary,
/// followed by a marker saying how much was dropped.
pub fn build_prompt(package_name: &str, recipe_text: &str, max_recipe_bytes: usize) -> String {
    let recipe = truncate_recipe(recipe_text, max_recipe_bytes);

    format!(
        r#"Review the following PKGBUILD for malicious intent.

Many legitimate packages download sources or run upstream build scripts.
Normal packaging steps (./configure, make, cmake, meson, cargo, patching
sources, installing into "$pkgdir") are NOT malicious.

Only set "malicious_intent" to true when the recipe does something clearly
unnecessary or harmful for building the software, for example:
- installing backdoors, miners or persistence
- sending data off the machine
- modifying system files outside "$pkgdir" or "$srcdir"
- contacting domains unrelated to the upstream project
- executing downloaded scripts that bypass the checksummed source array
- setting permissions that open a privilege escalation path

Package name: {package_name}

PKGBUILD:
{recipe}

Reply with a single JSON object and nothing else:
{{
  "malicious_intent": true or false,
  "confidence": number between 0.0 and 1.0 (how sure you are about malicious_intent),
  "suspicious_patterns": ["short description", ...],
  "recommendations": ["step to verify or mitigate", ...],
  "analysis": "explanation, including why legitimate steps were not flagged"
}}"#
    )
}

fn truncate_recipe(recipe_text: &str, max_bytes: usize) -> String {
    if recipe_text.len() <= max_bytes {
        return recipe_text.to_string();
    }

    let mut cut = max_bytes;
    while !recipe_text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}\n[... {} bytes omitted ...]",
        &recipe_text[..cut],
        recipe_text.len() - cut
    )
}
