//! Style transforms: SCSS compile, vendor prefixing, minification.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::css::{Compiler, Decl, Item, OutputStyle, Stylesheet};
use crate::error::PipelineError;
use crate::step::{map_text, Asset, Transform};
use crate::targets::{Prefix, Targets, ANIMATION_NEEDS, FLEX_DISPLAY_NEEDS, STICKY_NEEDS};

/// 1:1 — compiles each entry to expanded CSS and renames it to `.css`.
///
/// Imports resolve against the entry's directory, then `load_paths`.
#[derive(Debug, Clone, Default)]
pub struct ScssCompile {
    pub load_paths: Vec<PathBuf>,
}

impl ScssCompile {
    pub fn new(load_paths: Vec<PathBuf>) -> Self {
        Self { load_paths }
    }
}

impl Transform for ScssCompile {
    fn name(&self) -> &'static str {
        "scss"
    }

    fn apply(&self, assets: Vec<Asset>) -> Result<Vec<Asset>, PipelineError> {
        let compiled = map_text("scss", assets, |asset, text| {
            let sheet = Compiler::new(self.load_paths.iter().cloned(), "scss")
                .compile_str(text, asset.display_path())?;
            Ok(sheet.to_css(OutputStyle::Expanded))
        })?;
        Ok(compiled.into_iter().map(|a| a.with_extension("css")).collect())
    }
}

/// 1:1 — adds vendor-prefixed copies of declarations the targets need.
#[derive(Debug, Clone)]
pub struct Autoprefix {
    targets: Targets,
}

impl Autoprefix {
    pub fn new(targets: Targets) -> Self {
        Self { targets }
    }
}

impl Transform for Autoprefix {
    fn name(&self) -> &'static str {
        "autoprefix"
    }

    fn apply(&self, assets: Vec<Asset>) -> Result<Vec<Asset>, PipelineError> {
        map_text("autoprefix", assets, |asset, text| {
            let sheet = Stylesheet::parse(text, asset.display_path(), "autoprefix")?;
            let prefixed = Stylesheet {
                items: prefix_items(sheet.items, &self.targets),
            };
            Ok(prefixed.to_css(OutputStyle::Expanded))
        })
    }
}

fn prefix_items(items: Vec<Item>, targets: &Targets) -> Vec<Item> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Item::Rule(mut rule) => {
                rule.decls = prefix_decls(rule.decls, targets);
                out.push(Item::Rule(rule));
            }
            Item::AtBlock { prelude, items } => {
                let items = prefix_items(items, targets);
                if let Some(name) = prelude.strip_prefix("@keyframes ") {
                    for prefix in targets.prefixes(ANIMATION_NEEDS) {
                        if prefix == Prefix::Ms {
                            continue;
                        }
                        out.push(Item::AtBlock {
                            prelude: format!("@{}keyframes {name}", prefix.as_str()),
                            items: items.clone(),
                        });
                    }
                }
                out.push(Item::AtBlock { prelude, items });
            }
            other => out.push(other),
        }
    }
    out
}

fn prefix_decls(decls: Vec<Decl>, targets: &Targets) -> Vec<Decl> {
    let present: HashSet<(String, String)> = decls
        .iter()
        .map(|d| (d.property.to_ascii_lowercase(), d.value.clone()))
        .collect();
    let properties: HashSet<&str> = present.iter().map(|(p, _)| p.as_str()).collect();

    let mut out = Vec::with_capacity(decls.len());
    for decl in &decls {
        let property = decl.property.to_ascii_lowercase();
        if !property.starts_with('-') {
            for prefix in targets.property_prefixes(&property) {
                let prefixed = format!("{}{property}", prefix.as_str());
                if !properties.contains(prefixed.as_str()) {
                    out.push(Decl::new(prefixed, decl.value.clone()));
                }
            }
            for value in prefixed_values(&property, &decl.value, targets) {
                if !present.contains(&(property.clone(), value.clone())) {
                    out.push(Decl::new(decl.property.clone(), value));
                }
            }
        }
        out.push(decl.clone());
    }
    out
}

fn prefixed_values(property: &str, value: &str, targets: &Targets) -> Vec<String> {
    match (property, value) {
        ("display", "flex" | "inline-flex") => targets
            .prefixes(FLEX_DISPLAY_NEEDS)
            .into_iter()
            .filter_map(|prefix| match (prefix, value) {
                (Prefix::Webkit, _) => Some(format!("-webkit-{value}")),
                (Prefix::Ms, "flex") => Some("-ms-flexbox".to_string()),
                (Prefix::Ms, _) => Some("-ms-inline-flexbox".to_string()),
                (Prefix::Moz, _) => None,
            })
            .collect(),
        ("position", "sticky") => targets
            .prefixes(STICKY_NEEDS)
            .into_iter()
            .map(|prefix| format!("{}sticky", prefix.as_str()))
            .collect(),
        _ => Vec::new(),
    }
}

/// 1:1 — strips comments (except `/*!`) and insignificant whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssMinify;

impl Transform for CssMinify {
    fn name(&self) -> &'static str {
        "css-minify"
    }

    fn apply(&self, assets: Vec<Asset>) -> Result<Vec<Asset>, PipelineError> {
        map_text("css-minify", assets, |asset, text| {
            Ok(Stylesheet::parse(text, asset.display_path(), "css-minify")?.to_css(OutputStyle::Compressed))
        })
    }
}
