//! Built-in [`Transform`](crate::step::Transform)s.

mod concat;
mod html;
mod script;
mod sprite;
mod styles;

pub use concat::Concat;
pub use html::{minify_html, HtmlMinify, HtmlTemplate};
pub use script::{minify_script, ScriptMinify};
pub use sprite::SvgSprite;
pub use styles::{Autoprefix, CssMinify, ScssCompile};
