use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{transform_err, PipelineError};
use crate::step::{Asset, Transform};

static SVG_ROOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<svg\b([^>]*)>(.*)</svg\s*>").expect("valid svg root regex"));

static VIEW_BOX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bviewBox\s*=\s*["']([^"']*)["']"#).expect("valid viewBox regex"));

static NOISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<\?xml.*?\?>|<!DOCTYPE[^>]*>|<!--.*?-->").expect("valid svg noise regex")
});

/// N:1 — wraps every icon in a `<symbol id="{id_prefix}{stem}">` inside
/// one hidden `<svg>`.
#[derive(Debug, Clone)]
pub struct SvgSprite {
    pub file_name: PathBuf,
    pub id_prefix: String,
}

impl SvgSprite {
    pub fn new(file_name: impl Into<PathBuf>, id_prefix: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            id_prefix: id_prefix.into(),
        }
    }
}

/// `arrow left.svg` -> `arrow-left`
fn symbol_id(asset: &Asset) -> String {
    asset
        .path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

impl Transform for SvgSprite {
    fn name(&self) -> &'static str {
        "svg-sprite"
    }

    fn apply(&self, assets: Vec<Asset>) -> Result<Vec<Asset>, PipelineError> {
        if assets.is_empty() {
            return Ok(Vec::new());
        }
        let mut ids = HashSet::new();
        let mut body = String::from(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" style=\"display:none\">",
        );
        for asset in &assets {
            let text = asset.text("svg-sprite")?;
            let cleaned = NOISE_RE.replace_all(text, "");
            let Some(root) = SVG_ROOT_RE.captures(&cleaned) else {
                return Err(transform_err("svg-sprite", asset.display_path(), None, "no <svg> root element"));
            };
            let id = format!("{}{}", self.id_prefix, symbol_id(asset));
            if !ids.insert(id.clone()) {
                return Err(transform_err(
                    "svg-sprite",
                    asset.display_path(),
                    None,
                    format!("duplicate symbol id '{id}'"),
                ));
            }
            body.push_str(&format!("<symbol id=\"{id}\""));
            if let Some(view_box) = VIEW_BOX_RE.captures(&root[1]) {
                body.push_str(&format!(" viewBox=\"{}\"", &view_box[1]));
            }
            body.push('>');
            body.push_str(root[2].trim());
            body.push_str("</symbol>");
        }
        body.push_str("</svg>");
        Ok(vec![Asset::new(self.file_name.clone(), body)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sprite(assets: Vec<Asset>) -> Result<String, PipelineError> {
        SvgSprite::new("images/sprite.svg", "icon-")
            .apply(assets)
            .map(|out| String::from_utf8(out[0].contents.clone()).unwrap())
    }

    #[test]
    fn builds_symbols_with_view_boxes() {
        let svg = sprite(vec![
            Asset::new(
                "arrow.svg",
                "<?xml version=\"1.0\"?>\n<!-- made by hand -->\n<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 24 24\">\n  <path d=\"M0 0h24\"/>\n</svg>\n",
            ),
            Asset::new("menu open.svg", "<svg><rect/></svg>"),
        ])
        .unwrap();
        assert_eq!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" style=\"display:none\">\
             <symbol id=\"icon-arrow\" viewBox=\"0 0 24 24\"><path d=\"M0 0h24\"/></symbol>\
             <symbol id=\"icon-menu-open\"><rect/></symbol></svg>"
        );
    }

    #[test]
    fn non_svg_input_is_rejected() {
        assert!(matches!(
            sprite(vec![Asset::new("x.svg", "<png/>")]),
            Err(PipelineError::Transform { stage: "svg-sprite", .. })
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let result = sprite(vec![
            Asset::new("a/star.svg", "<svg></svg>"),
            Asset::new("b/star.svg", "<svg></svg>"),
        ]);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("duplicate symbol id 'icon-star'"), "{err}");
    }

    #[test]
    fn no_icons_no_sprite() {
        let out = SvgSprite::new("s.svg", "i-").apply(Vec::new()).unwrap();
        assert!(out.is_empty());
    }
}
