//! Built-in prompt definitions.
//!
//! These are used whenever the workspace does not provide an override in
//! `.kbase/prompts/<id>.yml`.

/// Grounded answer prompt.
pub const ANSWER_PROMPT_ID: &str = "kb.answer";

/// Category and tag suggestion prompt.
pub const CATEGORIZE_PROMPT_ID: &str = "kb.categorize";

const ANSWER_PROMPT: &str = r#"
id: kb.answer
title: Knowledge base answer
apiVersion: "1.0"
createdBy: kbase
temperature: 0.2
system: |
  You are the help assistant of a project management application.
  Answer using only the knowledge base articles provided by the user message.
  If the articles do not contain the answer, say that the knowledge base does not cover it.
  Keep answers short and practical.
  {{#if lowConfidence}}
  The retrieved articles are only loosely related to the question. Be cautious and say which parts you are unsure about.
  {{/if}}
template: |
  {{#if context}}
  Knowledge base articles:

  {{context}}

  {{else}}
  No knowledge base articles matched this question.

  {{/if}}
  Question: {{question}}
output:
  format: text
"#;

const CATEGORIZE_PROMPT: &str = r#"
id: kb.categorize
title: Article categorisation
apiVersion: "1.0"
createdBy: kbase
temperature: 0.0
system: |
  You file knowledge base articles. Reply with a single JSON object of the form
  {"category": "<one of the allowed categories>", "tags": ["<tag>", "..."]}
  and nothing else. Use at most 5 short lowercase tags.
template: |
  Allowed categories: {{categories}}

  Title: {{title}}

  Content:
  {{content}}
output:
  format: json
"#;

/// Raw YAML of a built-in prompt.
pub fn builtin_source(prompt_id: &str) -> Option<&'static str> {
    match prompt_id {
        ANSWER_PROMPT_ID => Some(ANSWER_PROMPT),
        CATEGORIZE_PROMPT_ID => Some(CATEGORIZE_PROMPT),
        _ => None,
    }
}
