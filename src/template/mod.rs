//! Preview template renderer
//!
//! A small Mustache subset used to preview gallery and component HTML.
//! Templates are parsed once into a tree of [`Node`]s and interpreted against
//! a JSON context.
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | `{{name}}` | HTML-escaped value |
//! | `{{{name}}}`, `{{& name}}` | Raw value |
//! | `{{#name}}...{{/name}}` | Section |
//! | `{{^name}}...{{/name}}` | Inverted section |
//! | `{{! text}}` | Comment |
//!
//! Names may be dotted (`image.alt`) and `.` refers to the current context.
//!
//! # Example
//!
//! ```
//! use cms_admin_core::template::Template;
//! use serde_json::json;
//!
//! let template = Template::parse("{{#images}}<img src=\"{{src}}\">{{/images}}").unwrap();
//! let html = template.render(&json!({"images": [{"src": "a.png"}, {"src": "b.png"}]}));
//! assert_eq!(html, "<img src=\"a.png\"><img src=\"b.png\">");
//! ```

use serde_json::Value;
use thiserror::Error;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const TRIPLE_CLOSE: &str = "}}}";

/// Template errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unclosed tag at offset {0}")]
    UnclosedTag(usize),

    #[error("Empty tag at offset {0}")]
    EmptyTag(usize),

    #[error("Section '{0}' is never closed")]
    UnclosedSection(String),

    #[error("Closing tag '{found}' does not match open section '{expected}'")]
    MismatchedClose { expected: String, found: String },

    #[error("Closing tag '{0}' without an open section")]
    UnexpectedClose(String),
}

/// Template tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Variable { name: String, escape: bool },
    Section { name: String, children: Vec<Node> },
    Inverted { name: String, children: Vec<Node> },
}

/// Parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

/// Section under construction while parsing
struct OpenSection {
    name: String,
    inverted: bool,
    children: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut stack: Vec<OpenSection> = Vec::new();
        let mut root: Vec<Node> = Vec::new();
        let mut pos = 0;

        fn push(stack: &mut [OpenSection], root: &mut Vec<Node>, node: Node) {
            match stack.last_mut() {
                Some(open) => open.children.push(node),
                None => root.push(node),
            }
        }

        while let Some(rel) = source[pos..].find(OPEN) {
            let start = pos + rel;
            if start > pos {
                push(&mut stack, &mut root, Node::Text(source[pos..start].to_string()));
            }

            let triple = source[start..].starts_with("{{{");
            let (inner_start, close) = if triple {
                (start + 3, TRIPLE_CLOSE)
            } else {
                (start + 2, CLOSE)
            };
            let inner_len = source[inner_start..]
                .find(close)
                .ok_or(TemplateError::UnclosedTag(start))?;
            let inner = source[inner_start..inner_start + inner_len].trim();
            pos = inner_start + inner_len + close.len();

            if triple {
                let name = tag_name(inner, start)?;
                push(&mut stack, &mut root, Node::Variable { name, escape: false });
                continue;
            }

            let mut chars = inner.chars();
            match chars.next() {
                Some('!') => {}
                Some(sigil @ ('#' | '^')) => {
                    stack.push(OpenSection {
                        name: tag_name(chars.as_str(), start)?,
                        inverted: sigil == '^',
                        children: Vec::new(),
                    });
                }
                Some('/') => {
                    let name = tag_name(chars.as_str(), start)?;
                    let open = stack
                        .pop()
                        .ok_or_else(|| TemplateError::UnexpectedClose(name.clone()))?;
                    if open.name != name {
                        return Err(TemplateError::MismatchedClose {
                            expected: open.name,
                            found: name,
                        });
                    }
                    let node = if open.inverted {
                        Node::Inverted {
                            name: open.name,
                            children: open.children,
                        }
                    } else {
                        Node::Section {
                            name: open.name,
                            children: open.children,
                        }
                    };
                    push(&mut stack, &mut root, node);
                }
                Some('&') => {
                    let name = tag_name(chars.as_str(), start)?;
                    push(&mut stack, &mut root, Node::Variable { name, escape: false });
                }
                _ => {
                    let name = tag_name(inner, start)?;
                    push(&mut stack, &mut root, Node::Variable { name, escape: true });
                }
            }
        }

        if pos < source.len() {
            push(&mut stack, &mut root, Node::Text(source[pos..].to_string()));
        }

        if let Some(open) = stack.pop() {
            return Err(TemplateError::UnclosedSection(open.name));
        }

        Ok(Self { nodes: root })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn render(&self, context: &Value) -> String {
        let mut out = String::new();
        let mut stack = vec![context];
        render_nodes(&self.nodes, &mut stack, &mut out);
        crate::metrics::record_template_render();
        out
    }
}

/// Parse and render in one step
pub fn render(source: &str, context: &Value) -> Result<String, TemplateError> {
    Ok(Template::parse(source)?.render(context))
}

fn tag_name(raw: &str, offset: usize) -> Result<String, TemplateError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(TemplateError::EmptyTag(offset));
    }
    Ok(name.to_string())
}

fn render_nodes<'a>(nodes: &'a [Node], stack: &mut Vec<&'a Value>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Variable { name, escape } => {
                if let Some(value) = lookup(stack, name) {
                    let text = stringify(value);
                    if *escape {
                        escape_html(&text, out);
                    } else {
                        out.push_str(&text);
                    }
                }
            }
            Node::Section { name, children } => match lookup(stack, name) {
                Some(Value::Array(items)) => {
                    for item in items {
                        stack.push(item);
                        render_nodes(children, stack, out);
                        stack.pop();
                    }
                }
                Some(value) if is_truthy(value) => {
                    stack.push(value);
                    render_nodes(children, stack, out);
                    stack.pop();
                }
                _ => {}
            },
            Node::Inverted { name, children } => {
                if !lookup(stack, name).is_some_and(is_truthy) {
                    render_nodes(children, stack, out);
                }
            }
        }
    }
}

/// Resolve a (possibly dotted) name against the context stack, innermost first
fn lookup<'a>(stack: &[&'a Value], name: &str) -> Option<&'a Value> {
    if name == "." {
        return stack.last().copied();
    }

    let mut parts = name.split('.');
    let head = parts.next()?;
    let mut value = stack
        .iter()
        .rev()
        .copied()
        .find_map(|ctx| ctx.as_object()?.get(head))?;
    for part in parts {
        value = match value {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Number(_) | Value::Object(_) => true,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_html(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}
