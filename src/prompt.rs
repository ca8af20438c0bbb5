use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::dataset::DatasetRecord;

/// Template used when the caller supplies none.
pub const DEFAULT_USER_TEMPLATE: &str = "{{input}}";

/// Source of the prompt sent alongside each record.
pub trait PromptAdapter: Send + Sync {
    fn system_prompt(&self) -> Option<&str>;

    /// User prompt template with `{{field}}` placeholders.
    fn user_template(&self) -> &str;

    /// Renders the user prompt for one record.
    ///
    /// Placeholders naming unknown fields are left as written.
    fn render(&self, record: &DatasetRecord) -> String {
        render_template(self.user_template(), record)
    }
}

/// Plain prompt held in memory.
#[derive(Debug, Clone)]
pub struct TemplatePrompt {
    system: Option<String>,
    template: String,
}

impl TemplatePrompt {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            system: None,
            template: template.into(),
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

impl Default for TemplatePrompt {
    fn default() -> Self {
        Self::new(DEFAULT_USER_TEMPLATE)
    }
}

impl PromptAdapter for TemplatePrompt {
    fn system_prompt(&self) -> Option<&str> {
        self.system.as_deref()
    }

    fn user_template(&self) -> &str {
        &self.template
    }
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
    })
}

pub fn render_template(template: &str, record: &DatasetRecord) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures<'_>| {
            record
                .field(&caps[1])
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_input_and_extra_fields() {
        let record = DatasetRecord::new("What is 2+2?", "4").with_field("style", json!("terse"));
        let prompt = TemplatePrompt::new("Answer {{ style }}: {{input}}");
        assert_eq!(prompt.render(&record), "Answer terse: What is 2+2?");
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        let record = DatasetRecord::new("hi", "hello");
        assert_eq!(render_template("{{input}} {{missing}}", &record), "hi {{missing}}");
    }

    #[test]
    fn default_prompt_is_the_raw_input() {
        let record = DatasetRecord::new("raw", "x");
        let prompt = TemplatePrompt::default();
        assert_eq!(prompt.render(&record), "raw");
        assert!(prompt.system_prompt().is_none());
    }
}
