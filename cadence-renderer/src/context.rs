//! Template context — serializable rendering payload built from [`Config`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cadence_core::Config;

use crate::error::RenderError;

/// Everything a markup template can see.
///
/// Asset URLs are relative to the page being rendered, so a page at
/// `blog/post.html` gets `../styles/style.css`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateContext {
    pub assets: AssetsCtx,
    pub page: PageCtx,
    pub meta: MetaCtx,
    /// `markup.vars` from `cadence.yaml`.
    pub vars: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsCtx {
    pub styles: Vec<String>,
    pub script: String,
    pub sprite: Option<String>,
    pub icon_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageCtx {
    /// Output-relative path, forward slashes.
    pub path: String,
    /// `""` at the output root, `"../"` one level down, and so on.
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaCtx {
    pub cadence_version: String,
    pub built_at: DateTime<Utc>,
    /// Set while serving with live reload.
    pub dev: bool,
}

impl TemplateContext {
    /// Build a root-level context from `config`.
    pub fn from_config(config: &Config) -> Result<Self, RenderError> {
        let vars = config
            .markup
            .vars
            .iter()
            .map(|(k, v)| Ok((k.clone(), serde_json::to_value(v)?)))
            .collect::<Result<BTreeMap<_, _>, serde_json::Error>>()?;

        Ok(TemplateContext {
            assets: AssetsCtx {
                styles: config.style_urls(),
                script: config.script_url(),
                sprite: config.sprite_url(),
                icon_prefix: config.sprite.id_prefix.clone(),
            },
            page: PageCtx {
                path: String::new(),
                root: String::new(),
            },
            meta: MetaCtx {
                cadence_version: env!("CARGO_PKG_VERSION").to_string(),
                built_at: Utc::now(),
                dev: false,
            },
            vars,
        })
    }

    /// Copy of this context for the page at output-relative `path`,
    /// with asset URLs rebased onto that page.
    pub fn for_page(&self, path: &str) -> Self {
        let depth = path.split('/').filter(|s| !s.is_empty()).count().saturating_sub(1);
        let root = "../".repeat(depth);
        let mut ctx = self.clone();
        ctx.page = PageCtx {
            path: path.to_string(),
            root: root.clone(),
        };
        ctx.assets.styles = self
            .assets
            .styles
            .iter()
            .map(|s| format!("{root}{s}"))
            .collect();
        ctx.assets.script = format!("{root}{}", self.assets.script);
        ctx.assets.sprite = self.assets.sprite.as_ref().map(|s| format!("{root}{s}"));
        ctx
    }

    /// Convert to a [`tera::Context`] for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}
