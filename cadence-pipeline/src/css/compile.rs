//! SCSS evaluation: lowers the raw block tree into a flat [`Stylesheet`].
//!
//! Supported: `@import` of partials, `$variables` with block scope,
//! `!default` and `!global`, nested rules with `&` and selector-list
//! expansion, `@media` bubbling (nested queries are joined with `and`),
//! `#{}` interpolation and argument-taking `@mixin` / `@include`.
//! Control flow, functions, `@use` and `@extend` are rejected.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::parser::{self, collapse_ws, Raw};
use super::{Decl, Item, Rule, Stylesheet};
use crate::error::{io_err, transform_err, PipelineError};

#[derive(Debug, Clone)]
struct Mixin {
    params: Vec<(String, Option<String>)>,
    body: Vec<Raw>,
    file: PathBuf,
}

/// Declarations and nested output gathered while walking one block.
#[derive(Default)]
struct Frame {
    decls: Vec<Decl>,
    nested: Vec<Item>,
}

pub struct Compiler {
    load_paths: Vec<PathBuf>,
    stage: &'static str,
    scopes: Vec<HashMap<String, String>>,
    mixins: HashMap<String, Mixin>,
    /// Files currently being compiled, outermost first.
    imports: Vec<PathBuf>,
    /// Mixins currently being expanded, outermost first.
    includes: Vec<String>,
    /// `@charset` and plain-CSS `@import`s, emitted before everything else.
    hoisted: Vec<Item>,
}

impl Compiler {
    pub fn new<I, P>(load_paths: I, stage: &'static str) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            load_paths: load_paths.into_iter().map(Into::into).collect(),
            stage,
            scopes: vec![HashMap::new()],
            mixins: HashMap::new(),
            imports: Vec::new(),
            includes: Vec::new(),
            hoisted: Vec::new(),
        }
    }

    pub fn compile_file(self, path: &Path) -> Result<Stylesheet, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        self.compile_str(&text, path)
    }

    /// Compile `text`; `path` names it in errors and anchors relative imports.
    pub fn compile_str(mut self, text: &str, path: &Path) -> Result<Stylesheet, PipelineError> {
        let tree = parser::parse(text, path, self.stage)?;
        self.imports.push(path.to_path_buf());
        let mut frame = Frame::default();
        self.walk(&tree, &[], path, &mut frame, false)?;

        let mut items = std::mem::take(&mut self.hoisted);
        items.extend(frame.nested);
        Ok(Stylesheet { items })
    }

    fn err(&self, file: &Path, line: usize, message: impl Into<String>) -> PipelineError {
        transform_err(self.stage, file, Some(line), message)
    }

    fn scoped<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        self.scopes.push(HashMap::new());
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn walk(
        &mut self,
        nodes: &[Raw],
        parents: &[String],
        file: &Path,
        frame: &mut Frame,
        bare: bool,
    ) -> Result<(), PipelineError> {
        for node in nodes {
            self.node(node, parents, file, frame, bare)?;
        }
        Ok(())
    }

    /// Walk `children` under `selectors`, returning the rule for its own
    /// declarations followed by everything nested in it.
    fn block(
        &mut self,
        children: &[Raw],
        selectors: &[String],
        file: &Path,
        bare: bool,
    ) -> Result<Vec<Item>, PipelineError> {
        let mut frame = Frame::default();
        self.walk(children, selectors, file, &mut frame, bare)?;
        let mut items = Vec::with_capacity(frame.nested.len() + 1);
        if !frame.decls.is_empty() {
            items.push(Item::Rule(Rule {
                selectors: selectors.to_vec(),
                decls: frame.decls,
            }));
        }
        items.extend(frame.nested);
        Ok(items)
    }

    fn node(
        &mut self,
        node: &Raw,
        parents: &[String],
        file: &Path,
        frame: &mut Frame,
        bare: bool,
    ) -> Result<(), PipelineError> {
        match node {
            Raw::Comment { text } => {
                if parents.is_empty() && !bare {
                    frame.nested.push(Item::Comment(text.clone()));
                }
            }
            Raw::Var {
                name,
                value,
                default,
                global,
                line,
            } => {
                let value = self.eval(value, file, *line)?;
                self.assign(name, value, *default, *global);
            }
            Raw::Decl {
                property,
                value,
                line,
            } => {
                if parents.is_empty() && !bare {
                    return Err(self.err(
                        file,
                        *line,
                        format!("declaration '{property}' outside of a style rule"),
                    ));
                }
                let property = self.eval(property, file, *line)?;
                let value = self.eval(value, file, *line)?;
                frame.decls.push(Decl::new(property, value));
            }
            Raw::Block {
                header,
                children,
                line,
            } => {
                if let Some(at) = header.strip_prefix('@') {
                    self.at_block(at, children, parents, file, *line, frame, bare)?;
                } else {
                    let selectors = self.resolve_selectors(parents, header, file, *line)?;
                    let items = self.scoped(|c| c.block(children, &selectors, file, false))?;
                    frame.nested.extend(items);
                }
            }
            Raw::Statement { text, line } => {
                self.statement(text, parents, file, *line, frame, bare)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn at_block(
        &mut self,
        at: &str,
        children: &[Raw],
        parents: &[String],
        file: &Path,
        line: usize,
        frame: &mut Frame,
        bare: bool,
    ) -> Result<(), PipelineError> {
        let (name, prelude) = split_at_keyword(at);
        match name {
            "mixin" => {
                let (mixin, params) = self.signature(prelude, file, line)?;
                self.mixins.insert(
                    normalize(&mixin),
                    Mixin {
                        params,
                        body: children.to_vec(),
                        file: file.to_path_buf(),
                    },
                );
            }
            "include" => {
                return Err(self.err(file, line, "@include with a content block is not supported"));
            }
            "if" | "else" | "each" | "for" | "while" | "function" => {
                return Err(self.err(file, line, format!("@{name} is not supported")));
            }
            "at-root" => {
                let items = self.scoped(|c| c.block(children, &[], file, false))?;
                frame.nested.extend(items);
            }
            _ if name.ends_with("keyframes") => {
                let prelude = self.eval(prelude, file, line)?;
                let items = self.scoped(|c| c.block(children, &[], file, false))?;
                frame.nested.push(Item::AtBlock {
                    prelude: format!("@{name} {prelude}"),
                    items,
                });
            }
            "font-face" | "page" | "property" | "counter-style" | "viewport" => {
                let prelude = self.eval(prelude, file, line)?;
                let items = self.scoped(|c| c.block(children, &[], file, true))?;
                frame.nested.push(Item::AtBlock {
                    prelude: join_prelude(name, &prelude),
                    items,
                });
            }
            _ => {
                let prelude = self.eval(prelude, file, line)?;
                let items = self.scoped(|c| c.block(children, parents, file, bare))?;
                if name == "media" {
                    let (own, lifted) = lift_media(&prelude, items);
                    frame.nested.push(Item::AtBlock {
                        prelude: join_prelude(name, &prelude),
                        items: own,
                    });
                    frame.nested.extend(lifted);
                } else {
                    frame.nested.push(Item::AtBlock {
                        prelude: join_prelude(name, &prelude),
                        items,
                    });
                }
            }
        }
        Ok(())
    }

    fn statement(
        &mut self,
        text: &str,
        parents: &[String],
        file: &Path,
        line: usize,
        frame: &mut Frame,
        bare: bool,
    ) -> Result<(), PipelineError> {
        let (name, prelude) = split_at_keyword(&text[1..]);
        match name {
            "import" => {
                for target in split_top_level(prelude, ',') {
                    self.import(target.trim(), parents, file, line, frame, bare)?;
                }
            }
            "include" => self.include(prelude, parents, file, line, frame, bare)?,
            "charset" => {
                let present = self
                    .hoisted
                    .iter()
                    .any(|i| matches!(i, Item::AtStatement(s) if s.starts_with("@charset")));
                if !present {
                    self.hoisted.insert(0, Item::AtStatement(text.to_string()));
                }
            }
            "debug" | "warn" => {
                let message = self.eval(prelude, file, line)?;
                tracing::warn!(file = %file.display(), line, "@{name}: {message}");
            }
            "error" => {
                let message = self.eval(prelude, file, line)?;
                return Err(self.err(file, line, unquote(&message).to_string()));
            }
            "use" | "forward" | "extend" | "content" | "return" => {
                return Err(self.err(file, line, format!("@{name} is not supported")));
            }
            _ => {
                let text = self.eval(text, file, line)?;
                frame.nested.push(Item::AtStatement(text));
            }
        }
        Ok(())
    }

    fn import(
        &mut self,
        target: &str,
        parents: &[String],
        file: &Path,
        line: usize,
        frame: &mut Frame,
        bare: bool,
    ) -> Result<(), PipelineError> {
        let name = unquote(target);
        if is_plain_css_import(target, name) {
            self.hoisted.push(Item::AtStatement(format!("@import {target}")));
            return Ok(());
        }
        let Some(resolved) = self.resolve_import(name, file) else {
            return Err(self.err(file, line, format!("can't find stylesheet to import: '{name}'")));
        };
        if self.imports.contains(&resolved) {
            return Err(self.err(
                file,
                line,
                format!("import cycle through '{}'", resolved.display()),
            ));
        }
        let text = std::fs::read_to_string(&resolved).map_err(|e| io_err(&resolved, e))?;
        let tree = parser::parse(&text, &resolved, self.stage)?;
        tracing::trace!(from = %file.display(), import = %resolved.display(), "scss import");

        self.imports.push(resolved.clone());
        let result = self.walk(&tree, parents, &resolved, frame, bare);
        self.imports.pop();
        result
    }

    fn resolve_import(&self, target: &str, from: &Path) -> Option<PathBuf> {
        let here = from.parent().map(Path::to_path_buf).unwrap_or_default();
        std::iter::once(here)
            .chain(self.load_paths.iter().cloned())
            .flat_map(|base| import_candidates(&base.join(target)))
            .find(|candidate| candidate.is_file())
    }

    fn include(
        &mut self,
        call: &str,
        parents: &[String],
        file: &Path,
        line: usize,
        frame: &mut Frame,
        bare: bool,
    ) -> Result<(), PipelineError> {
        let (name, args) = split_call(call);
        let Some(mixin) = self.mixins.get(&normalize(name)).cloned() else {
            return Err(self.err(file, line, format!("undefined mixin '{name}'")));
        };
        let key = normalize(name);
        if self.includes.contains(&key) {
            let chain = self
                .includes
                .iter()
                .chain(std::iter::once(&key))
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(self.err(file, line, format!("recursive mixin include: {chain}")));
        }

        let mut positional = Vec::new();
        let mut keyword = HashMap::new();
        for arg in args.map(|a| split_top_level(a, ',')).unwrap_or_default() {
            let arg = arg.trim();
            if arg.is_empty() {
                continue;
            }
            match keyword_arg(arg) {
                Some((key, value)) => {
                    keyword.insert(normalize(key), self.eval(value, file, line)?);
                }
                None => positional.push(self.eval(arg, file, line)?),
            }
        }
        if positional.len() > mixin.params.len() {
            return Err(self.err(
                file,
                line,
                format!(
                    "mixin '{name}' takes {} argument(s), {} given",
                    mixin.params.len(),
                    positional.len()
                ),
            ));
        }

        self.scoped(|c| {
            for (i, (param, default)) in mixin.params.iter().enumerate() {
                let value = match (positional.get(i), keyword.remove(&normalize(param))) {
                    (Some(value), _) => value.clone(),
                    (None, Some(value)) => value,
                    (None, None) => match default {
                        Some(default) => c.eval(default, &mixin.file, line)?,
                        None => {
                            return Err(c.err(file, line, format!("missing argument ${param} for mixin '{name}'")))
                        }
                    },
                };
                if let Some(scope) = c.scopes.last_mut() {
                    scope.insert(normalize(param), value);
                }
            }
            if let Some(extra) = keyword.keys().next() {
                return Err(c.err(file, line, format!("mixin '{name}' has no argument ${extra}")));
            }
            c.includes.push(key);
            let result = c.walk(&mixin.body, parents, &mixin.file, frame, bare);
            c.includes.pop();
            result
        })
    }

    /// `name($a, $b: 1px)` -> (`name`, [(`a`, None), (`b`, Some(`1px`))])
    fn signature(
        &self,
        prelude: &str,
        file: &Path,
        line: usize,
    ) -> Result<(String, Vec<(String, Option<String>)>), PipelineError> {
        let (name, params) = split_call(prelude);
        if name.is_empty() {
            return Err(self.err(file, line, "@mixin needs a name"));
        }
        let mut out = Vec::new();
        for param in params.map(|p| split_top_level(p, ',')).unwrap_or_default() {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let Some(rest) = param.strip_prefix('$') else {
                return Err(self.err(file, line, format!("invalid mixin parameter '{param}'")));
            };
            match rest.split_once(':') {
                Some((param, default)) => {
                    out.push((param.trim().to_string(), Some(default.trim().to_string())))
                }
                None => out.push((rest.trim().to_string(), None)),
            }
        }
        Ok((name.to_string(), out))
    }

    fn lookup(&self, name: &str) -> Option<&String> {
        let key = normalize(name);
        self.scopes.iter().rev().find_map(|scope| scope.get(&key))
    }

    fn assign(&mut self, name: &str, value: String, default: bool, global: bool) {
        let key = normalize(name);
        if default && self.lookup(&key).is_some_and(|v| v != "null") {
            return;
        }
        if global || self.scopes.len() == 1 {
            self.scopes[0].insert(key, value);
            return;
        }
        if let Some(scope) = self.scopes[1..].iter_mut().rev().find(|s| s.contains_key(&key)) {
            scope.insert(key, value);
        } else if let Some(scope) = self.scopes.last_mut() {
            scope.insert(key, value);
        }
    }

    /// Substitute `$variables` and `#{}` interpolation, collapsing whitespace.
    fn eval(&self, text: &str, file: &Path, line: usize) -> Result<String, PipelineError> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut quote: Option<char> = None;
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '#' && chars.get(i + 1) == Some(&'{') {
                let mut depth = 0usize;
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        None => return Err(self.err(file, line, "unterminated '#{'")),
                        Some('{') => depth += 1,
                        Some('}') => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        Some(_) => {}
                    }
                    j += 1;
                }
                let inner: String = chars[i + 2..j].iter().collect();
                let value = self.eval(&inner, file, line)?;
                out.push_str(unquote(value.trim()));
                i = j + 1;
                continue;
            }
            if let Some(q) = quote {
                out.push(c);
                if c == '\\' {
                    if let Some(&next) = chars.get(i + 1) {
                        out.push(next);
                        i += 1;
                    }
                } else if c == q {
                    quote = None;
                }
                i += 1;
                continue;
            }
            if c == '"' || c == '\'' {
                quote = Some(c);
                out.push(c);
                i += 1;
                continue;
            }
            if c == '$' && chars.get(i + 1).is_some_and(|&n| n.is_alphabetic() || n == '_' || n == '-') {
                let mut j = i + 1;
                while j < chars.len() && is_ident(chars[j]) {
                    j += 1;
                }
                let name: String = chars[i + 1..j].iter().collect();
                let Some(value) = self.lookup(&name) else {
                    return Err(self.err(file, line, format!("undefined variable ${name}")));
                };
                out.push_str(value);
                i = j;
                continue;
            }
            out.push(c);
            i += 1;
        }
        Ok(collapse_ws(&out))
    }

    fn resolve_selectors(
        &self,
        parents: &[String],
        header: &str,
        file: &Path,
        line: usize,
    ) -> Result<Vec<String>, PipelineError> {
        let header = self.eval(header, file, line)?;
        let children: Vec<String> = split_top_level(&header, ',')
            .into_iter()
            .map(|s| collapse_ws(s.trim()))
            .filter(|s| !s.is_empty())
            .collect();
        if children.is_empty() {
            return Err(self.err(file, line, "empty selector"));
        }
        if parents.is_empty() {
            if children.iter().any(|c| c.contains('&')) {
                return Err(self.err(file, line, "'&' used outside of a nested rule"));
            }
            return Ok(children);
        }
        let mut out = Vec::with_capacity(parents.len() * children.len());
        for parent in parents {
            for child in &children {
                out.push(if child.contains('&') {
                    child.replace('&', parent)
                } else {
                    format!("{parent} {child}")
                });
            }
        }
        Ok(out)
    }
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// Sass treats `_` and `-` in names as the same character.
fn normalize(name: &str) -> String {
    name.trim().trim_start_matches('$').replace('_', "-")
}

fn join_prelude(name: &str, prelude: &str) -> String {
    if prelude.is_empty() {
        format!("@{name}")
    } else {
        format!("@{name} {prelude}")
    }
}

/// `media screen and (x)` -> (`media`, `screen and (x)`)
fn split_at_keyword(body: &str) -> (&str, &str) {
    let end = body
        .find(|c: char| c.is_whitespace() || c == '(' || c == '"' || c == '\'')
        .unwrap_or(body.len());
    (&body[..end], body[end..].trim())
}

/// `name(a, b)` -> (`name`, Some(`a, b`)); `name` -> (`name`, None)
fn split_call(text: &str) -> (&str, Option<&str>) {
    match (text.find('('), text.rfind(')')) {
        (Some(open), Some(close)) if close > open => (text[..open].trim(), Some(&text[open + 1..close])),
        _ => (text.trim(), None),
    }
}

/// `$name: value` -> Some((`name`, `value`))
fn keyword_arg(arg: &str) -> Option<(&str, &str)> {
    let rest = arg.strip_prefix('$')?;
    let (name, value) = rest.split_once(':')?;
    name.chars().all(is_ident).then(|| (name.trim(), value.trim()))
}

/// Split on `sep` outside quotes, parentheses and brackets.
pub(crate) fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            _ if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn unquote(text: &str) -> &str {
    let t = text.trim();
    for q in ['"', '\''] {
        if t.len() >= 2 && t.starts_with(q) && t.ends_with(q) {
            return &t[1..t.len() - 1];
        }
    }
    t
}

/// Imports Sass leaves for the browser: `url(...)`, `.css` files, remote
/// URLs and anything followed by a media query.
fn is_plain_css_import(raw: &str, name: &str) -> bool {
    let media_query = match raw.chars().next() {
        Some(q @ ('"' | '\'')) => !raw.ends_with(q),
        _ => false,
    };
    raw.starts_with("url(")
        || media_query
        || name.ends_with(".css")
        || name.starts_with("http://")
        || name.starts_with("https://")
        || name.starts_with("//")
}

fn import_candidates(path: &Path) -> Vec<PathBuf> {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Vec::new();
    };
    if path.extension().is_some_and(|e| e == "scss") {
        return vec![dir.join(format!("_{name}")), dir.join(&name)];
    }
    vec![
        dir.join(format!("_{name}.scss")),
        dir.join(format!("{name}.scss")),
        dir.join(format!("{name}.css")),
        path.join("_index.scss"),
        path.join("index.scss"),
    ]
}

/// Split a compiled `@media` body into its own items and nested media
/// blocks, which become siblings with the queries joined by `and`.
fn lift_media(outer: &str, items: Vec<Item>) -> (Vec<Item>, Vec<Item>) {
    let mut own = Vec::new();
    let mut lifted = Vec::new();
    for item in items {
        match item {
            Item::AtBlock { prelude, items } if prelude.starts_with("@media ") => {
                let inner = &prelude["@media ".len()..];
                lifted.push(Item::AtBlock {
                    prelude: format!("@media {outer} and {inner}"),
                    items,
                });
            }
            other => own.push(other),
        }
    }
    (own, lifted)
}
