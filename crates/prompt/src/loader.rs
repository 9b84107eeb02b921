//! Prompt loader for YAML prompt definitions.

use crate::builtin::builtin_source;
use crate::types::PromptDefinition;
use kbase_core::config::STATE_DIR;
use kbase_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(STATE_DIR).join("prompts")
}

/// Load a prompt definition by ID.
///
/// A file named `<id>.yml` in `.kbase/prompts/` takes precedence over the
/// built-in definition with the same ID.
///
/// # Example
/// ```no_run
/// use kbase_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "kb.answer")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    if prompt_file.exists() {
        tracing::debug!("Loading prompt override from: {:?}", prompt_file);

        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;

        let definition = parse_prompt(&contents)
            .map_err(|e| AppError::Prompt(format!("{:?}: {}", prompt_file, e)))?;

        if definition.id != prompt_id {
            return Err(AppError::Prompt(format!(
                "Prompt file {:?} declares id '{}'",
                prompt_file, definition.id
            )));
        }

        tracing::info!("Loaded prompt override: {} ({})", definition.id, definition.title);
        return Ok(definition);
    }

    let source = builtin_source(prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))?;

    parse_prompt(source)
}

/// Parse and validate a prompt definition from YAML text.
pub fn parse_prompt(contents: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents)
        .map_err(|e| AppError::Prompt(format!("Failed to parse prompt YAML: {}", e)))?;

    validate_prompt(&definition)?;

    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}
