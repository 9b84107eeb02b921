//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptDefinition};
use handlebars::Handlebars;
use kbase_core::{AppError, AppResult};
use std::collections::HashMap;

/// Build a prompt from a definition and input variables.
///
/// Both the system template (when present) and the user template are
/// rendered with the same variables. An empty string is falsy for
/// `{{#if}}` blocks, so optional sections are toggled by passing `""`.
///
/// # Example
/// ```no_run
/// use kbase_prompt::{build_prompt, load_prompt};
/// use std::collections::HashMap;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = load_prompt(Path::new("."), "kb.answer")?;
/// let mut vars = HashMap::new();
/// vars.insert("question".to_string(), "How do I create a project?".to_string());
///
/// let built = build_prompt(&def, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(template, &variables))
        .transpose()?
        .map(|rendered| rendered.trim().to_string())
        .filter(|rendered| !rendered.is_empty());

    let user = render_template(&definition.template, &variables)?
        .trim()
        .to_string();

    Ok(BuiltPrompt::new(definition, system, user, variables))
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
