//! Markup transforms: tera rendering and whitespace minification.

use cadence_core::config::url_path;
use cadence_renderer::{MarkupSource, Renderer, TemplateContext};

use crate::error::PipelineError;
use crate::step::{map_text, Asset, Transform};

/// N:M — renders every page with the whole markup set loaded, so pages can
/// include and extend partials. Partials themselves produce no output.
#[derive(Debug, Clone)]
pub struct HtmlTemplate {
    pub context: TemplateContext,
}

impl HtmlTemplate {
    pub fn new(context: TemplateContext) -> Self {
        Self { context }
    }
}

impl Transform for HtmlTemplate {
    fn name(&self) -> &'static str {
        "html-template"
    }

    fn apply(&self, assets: Vec<Asset>) -> Result<Vec<Asset>, PipelineError> {
        let sources = assets
            .iter()
            .map(|asset| {
                let text = asset.text("html-template")?;
                Ok(MarkupSource::new(url_path(&asset.path), text))
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let renderer = Renderer::new(&sources)?;
        let pages = renderer.render_all(&self.context)?;
        Ok(pages
            .into_iter()
            .map(|(name, html)| {
                let origin = assets
                    .iter()
                    .find(|a| url_path(&a.path) == name)
                    .and_then(|a| a.origin.clone());
                Asset {
                    path: name.into(),
                    contents: html.into_bytes(),
                    origin,
                }
            })
            .collect())
    }
}

/// 1:1 — collapses whitespace between tags, strips comments, and sorts
/// attributes and class names so repeated tags compress alike.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlMinify;

impl Transform for HtmlMinify {
    fn name(&self) -> &'static str {
        "html-minify"
    }

    fn apply(&self, assets: Vec<Asset>) -> Result<Vec<Asset>, PipelineError> {
        map_text("html-minify", assets, |_, text| Ok(minify_html(text)))
    }
}

/// Bodies copied byte for byte.
const RAW_TEXT: &[&str] = &["pre", "textarea", "script", "style"];

/// Whitespace next to these tags never renders, so it is dropped.
const BLOCK: &[&str] = &[
    "!doctype", "address", "article", "aside", "base", "blockquote", "body", "br", "caption", "col",
    "colgroup", "dd", "details", "dialog", "div", "dl", "dt", "fieldset", "figcaption", "figure",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "head", "header", "hr", "html", "li",
    "link", "main", "meta", "nav", "noscript", "ol", "optgroup", "option", "p", "pre", "script",
    "section", "style", "summary", "table", "tbody", "td", "template", "tfoot", "th", "thead",
    "title", "tr", "ul",
];

fn is_tag_start(rest: &str) -> bool {
    let mut chars = rest.chars();
    chars.next() == Some('<')
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!')
}

/// Byte length of the tag at the start of `rest`, quotes respected.
fn tag_len(rest: &str) -> usize {
    let mut quote: Option<char> = None;
    for (i, c) in rest.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '>' => return i + 1,
            None => {}
        }
    }
    rest.len()
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('<')
        .trim_start_matches('/')
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '>' && *c != '/')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// `<a   href = "x"  >` -> `<a href="x">`
fn clean_tag(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    let mut quote: Option<char> = None;
    let mut space = false;
    for c in tag.chars() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() {
            space = true;
            continue;
        }
        if space && !matches!(c, '>' | '=') && !out.ends_with('=') {
            out.push(' ');
        }
        space = false;
        if c == '"' || c == '\'' {
            quote = Some(c);
        }
        out.push(c);
    }
    out
}

/// Split the inside of a tidied tag on spaces outside quotes.
fn split_attributes(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == ' ' => {
                if i > start {
                    parts.push(&inner[start..i]);
                }
                start = i + 1;
            }
            None => {}
        }
    }
    if start < inner.len() {
        parts.push(&inner[start..]);
    }
    parts
}

fn attribute_name(attr: &str) -> String {
    attr.split('=').next().unwrap_or(attr).to_ascii_lowercase()
}

/// `class="b a  b"` -> `class="a b b"`; unquoted values are single names.
fn sort_class_names(attr: &str) -> String {
    let Some((name, value)) = attr.split_once('=') else {
        return attr.to_string();
    };
    let Some(quote) = value.chars().next().filter(|q| *q == '"' || *q == '\'') else {
        return attr.to_string();
    };
    let inner = value.trim_start_matches(quote).trim_end_matches(quote);
    let mut classes: Vec<&str> = inner.split_whitespace().collect();
    classes.sort_unstable();
    format!("{name}={quote}{}{quote}", classes.join(" "))
}

/// `<a href="x" class="b a">` -> `<a class="a b" href="x">`. Expects a tag
/// already passed through [`clean_tag`]; closing tags and `<!...>` pass through.
fn sort_attributes(tag: &str) -> String {
    if tag.starts_with("</") || tag.starts_with("<!") || !tag.ends_with('>') {
        return tag.to_string();
    }
    let inner = &tag[1..tag.len() - 1];
    let (inner, closing) = match inner.strip_suffix('/') {
        Some(body) => (body.trim_end(), if body.ends_with(' ') { " />" } else { "/>" }),
        None => (inner, ">"),
    };
    let mut parts = split_attributes(inner);
    if parts.len() < 3 {
        return match parts.get(1) {
            Some(attr) if attribute_name(attr) == "class" => {
                format!("<{} {}{closing}", parts[0], sort_class_names(attr))
            }
            _ => tag.to_string(),
        };
    }
    let name = parts.remove(0);
    parts.sort_by_key(|attr| attribute_name(attr));
    let attrs: Vec<String> = parts
        .into_iter()
        .map(|attr| {
            if attribute_name(attr) == "class" {
                sort_class_names(attr)
            } else {
                attr.to_string()
            }
        })
        .collect();
    format!("<{name} {}{closing}", attrs.join(" "))
}

pub fn minify_html(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    let mut pending_space = false;
    // Start of document behaves like a block boundary.
    let mut after_block = true;

    while !rest.is_empty() {
        if rest.starts_with("<!--") {
            let end = rest.find("-->").map(|i| i + 3).unwrap_or(rest.len());
            let comment = &rest[..end];
            if comment.starts_with("<!--[if") || comment.starts_with("<!--!") {
                if pending_space && !after_block {
                    out.push(' ');
                }
                pending_space = false;
                out.push_str(comment);
            }
            rest = &rest[end..];
            continue;
        }

        if is_tag_start(rest) {
            let len = tag_len(rest);
            let tag = &rest[..len];
            let name = tag_name(tag);
            let block = BLOCK.contains(&name.as_str());
            if pending_space && !after_block && !block {
                out.push(' ');
            }
            pending_space = false;
            out.push_str(&sort_attributes(&clean_tag(tag)));
            rest = &rest[len..];
            after_block = block;

            let closing = tag.starts_with("</");
            if !closing && RAW_TEXT.contains(&name.as_str()) && !tag.ends_with("/>") {
                let close = rest
                    .to_ascii_lowercase()
                    .find(&format!("</{name}"))
                    .unwrap_or(rest.len());
                out.push_str(&rest[..close]);
                rest = &rest[close..];
                after_block = false;
            }
            continue;
        }

        let c = rest.chars().next().unwrap_or_default();
        if c.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space && !after_block {
                out.push(' ');
            }
            pending_space = false;
            after_block = false;
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}
