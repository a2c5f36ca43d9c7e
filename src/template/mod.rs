//! Template engine module for friend-circle.
//!
//! A small Handlebars-style engine used to render notification mails.
//!
//! # Features
//!
//! - Variable expansion: `{{variable}}` (HTML-escaped)
//! - Raw expansion: `{{{variable}}}` (not escaped)
//! - Conditionals: `{{#if name}}...{{else}}...{{/if}}` and `{{#unless name}}...{{/unless}}`
//! - Escaping: `\{{` to output literal `{{`
//!
//! Every variable is a string; a condition holds when its variable is set
//! and non-empty.
//!
//! # Example
//!
//! ```
//! use friend_circle::template::{Template, TemplateContext};
//!
//! let template = Template::parse("Hello, {{name}}!").unwrap();
//!
//! let mut context = TemplateContext::new();
//! context.set("name", "<World>");
//!
//! assert_eq!(template.render(&context), "Hello, &lt;World&gt;!");
//! ```

mod parser;
mod renderer;

use std::collections::HashMap;

use thiserror::Error;

pub use parser::{Node, Parser};
pub use renderer::Renderer;

/// Template-related errors.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Parse error.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Variables available to a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    variables: HashMap<String, String>,
}

impl TemplateContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable in the context.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Get a variable from the context.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Whether `name` is set to a non-empty value.
    pub fn is_truthy(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.is_empty())
    }
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Parse template source.
    pub fn parse(content: &str) -> Result<Self> {
        let nodes = Parser::new(content).parse()?;
        Ok(Self { nodes })
    }

    /// Render with the given context. Missing variables render as empty.
    pub fn render(&self, context: &TemplateContext) -> String {
        Renderer::new(context).render(&self.nodes)
    }
}

/// Escape text for inclusion in HTML.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
