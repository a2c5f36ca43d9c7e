//! Template renderer module.
//!
//! Renders parsed template nodes with the given context.

use super::parser::Node;
use super::{escape_html, TemplateContext};

/// Template renderer.
pub struct Renderer<'a> {
    context: &'a TemplateContext,
}

impl<'a> Renderer<'a> {
    /// Create a new renderer with the given context.
    pub fn new(context: &'a TemplateContext) -> Self {
        Self { context }
    }

    /// Render a list of nodes to a string.
    pub fn render(&self, nodes: &[Node]) -> String {
        let mut output = String::new();
        for node in nodes {
            self.render_node(node, &mut output);
        }
        output
    }

    fn render_node(&self, node: &Node, output: &mut String) {
        match node {
            Node::Text(text) => output.push_str(text),
            Node::Variable(name) => output.push_str(&escape_html(self.lookup(name))),
            Node::RawVariable(name) => output.push_str(self.lookup(name)),
            Node::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let branch = if self.context.is_truthy(condition) {
                    then_branch
                } else {
                    else_branch
                };
                for node in branch {
                    self.render_node(node, output);
                }
            }
            Node::Unless { condition, body } => {
                if !self.context.is_truthy(condition) {
                    for node in body {
                        self.render_node(node, output);
                    }
                }
            }
        }
    }

    /// Missing variables render as empty strings (like Handlebars).
    fn lookup(&self, name: &str) -> &'a str {
        self.context.get(name).unwrap_or_default()
    }
}
