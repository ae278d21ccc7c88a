//! Flat CSS model shared by the style transforms.
//!
//! The SCSS compiler lowers into a [`Stylesheet`]; plain CSS goes through
//! the same path (it is valid SCSS), so prefixing and minification work on
//! one tree and re-print it.

mod compile;
mod parser;

use std::path::{Path, PathBuf};

use crate::error::PipelineError;

pub use compile::Compiler;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheet {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Rule(Rule),
    /// `@media ...`, `@keyframes ...`, `@font-face` and friends.
    AtBlock { prelude: String, items: Vec<Item> },
    /// `@import url(...)`, `@charset "..."` (no trailing `;`).
    AtStatement(String),
    Comment(String),
}

/// A style rule. Empty `selectors` means bare declarations inside an
/// at-block (`@font-face`, `@page`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub selectors: Vec<String>,
    pub decls: Vec<Decl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decl {
    pub property: String,
    pub value: String,
}

impl Decl {
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStyle {
    Expanded,
    Compressed,
}

impl Stylesheet {
    /// Parse plain CSS (or self-contained SCSS) from `path`.
    pub fn parse(text: &str, path: &Path, stage: &'static str) -> Result<Self, PipelineError> {
        Compiler::new(Vec::<PathBuf>::new(), stage).compile_str(text, path)
    }

    pub fn to_css(&self, style: OutputStyle) -> String {
        let mut out = String::new();
        match style {
            OutputStyle::Expanded => {
                for item in &self.items {
                    let before = out.len();
                    print_expanded(item, 0, &mut out);
                    if out.len() > before {
                        out.push('\n');
                    }
                }
                let trimmed = out.trim_end().len();
                out.truncate(trimmed);
                if !out.is_empty() {
                    out.push('\n');
                }
            }
            OutputStyle::Compressed => {
                for item in &self.items {
                    print_compressed(item, &mut out);
                }
            }
        }
        out
    }
}

fn is_empty(item: &Item) -> bool {
    match item {
        Item::Rule(rule) => rule.decls.is_empty(),
        Item::AtBlock { items, .. } => items.iter().all(is_empty),
        Item::AtStatement(_) | Item::Comment(_) => false,
    }
}

fn print_expanded(item: &Item, depth: usize, out: &mut String) {
    if is_empty(item) {
        return;
    }
    let indent = "  ".repeat(depth);
    match item {
        Item::Rule(rule) if rule.selectors.is_empty() => {
            for decl in &rule.decls {
                out.push_str(&format!("{indent}{}: {};\n", decl.property, decl.value));
            }
        }
        Item::Rule(rule) => {
            let sep = format!(",\n{indent}");
            out.push_str(&format!("{indent}{} {{\n", rule.selectors.join(&sep)));
            for decl in &rule.decls {
                out.push_str(&format!("{indent}  {}: {};\n", decl.property, decl.value));
            }
            out.push_str(&format!("{indent}}}\n"));
        }
        Item::AtBlock { prelude, items } => {
            out.push_str(&format!("{indent}{prelude} {{\n"));
            for child in items {
                print_expanded(child, depth + 1, out);
            }
            out.push_str(&format!("{indent}}}\n"));
        }
        Item::AtStatement(text) => out.push_str(&format!("{indent}{text};\n")),
        Item::Comment(text) => {
            out.push_str(&indent);
            out.push_str(text);
            out.push('\n');
        }
    }
}

fn print_compressed(item: &Item, out: &mut String) {
    if is_empty(item) {
        return;
    }
    match item {
        Item::Rule(rule) => {
            if !rule.selectors.is_empty() {
                let selectors: Vec<String> = rule.selectors.iter().map(|s| minify_selector(s)).collect();
                out.push_str(&selectors.join(","));
                out.push('{');
            }
            let decls: Vec<String> = rule
                .decls
                .iter()
                .map(|d| format!("{}:{}", d.property, minify_value(&d.value)))
                .collect();
            out.push_str(&decls.join(";"));
            if !rule.selectors.is_empty() {
                out.push('}');
            }
        }
        Item::AtBlock { prelude, items } => {
            out.push_str(&minify_prelude(prelude));
            out.push('{');
            let bare = items
                .iter()
                .filter(|i| !is_empty(i))
                .all(|i| matches!(i, Item::Rule(r) if r.selectors.is_empty()));
            if bare {
                let mut decls = Vec::new();
                for child in items {
                    if let Item::Rule(rule) = child {
                        decls.extend(
                            rule.decls
                                .iter()
                                .map(|d| format!("{}:{}", d.property, minify_value(&d.value))),
                        );
                    }
                }
                out.push_str(&decls.join(";"));
            } else {
                for child in items {
                    print_compressed(child, out);
                }
            }
            out.push('}');
        }
        Item::AtStatement(text) => {
            out.push_str(&minify_prelude(text));
            out.push(';');
        }
        // Only `/*! ... */` survives minification.
        Item::Comment(text) if text.starts_with("/*!") => out.push_str(text),
        Item::Comment(_) => {}
    }
}

/// Rewrite `text` outside quotes, tracking bracket depth.
fn squeeze(text: &str, tight: &[char]) -> String {
    let collapsed = parser::collapse_ws(text);
    let chars: Vec<char> = collapsed.chars().collect();
    let mut out = String::with_capacity(collapsed.len());
    let mut quote: Option<char> = None;
    for (i, &c) in chars.iter().enumerate() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if c == '"' || c == '\'' {
            quote = Some(c);
        }
        if c == ' ' {
            let prev = out.chars().last();
            let next = chars.get(i + 1).copied();
            if prev.is_some_and(|p| tight.contains(&p)) || next.is_some_and(|n| tight.contains(&n)) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// `a > b ,  c` -> `a>b,c`
pub fn minify_selector(selector: &str) -> String {
    squeeze(selector, &['>', '+', '~', ','])
}

/// `1px ,  2px  !important` -> `1px,2px!important`
pub fn minify_value(value: &str) -> String {
    squeeze(value, &[',', '!'])
}

/// `@media screen and ( min-width : 10px )` -> `@media screen and (min-width:10px)`
fn minify_prelude(prelude: &str) -> String {
    squeeze(prelude, &[',', ':', '(', ')'])
        .replace("and(", "and (")
        .replace("@media(", "@media (")
        .replace("@supports(", "@supports (")
}
