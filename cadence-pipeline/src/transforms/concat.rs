use std::path::PathBuf;

use crate::error::PipelineError;
use crate::step::{Asset, Transform};

/// N:1 — joins every input, in order, into `file_name`.
///
/// No inputs means no output file.
#[derive(Debug, Clone)]
pub struct Concat {
    pub file_name: PathBuf,
    pub separator: String,
}

impl Concat {
    pub fn new(file_name: impl Into<PathBuf>, separator: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            separator: separator.into(),
        }
    }
}

impl Transform for Concat {
    fn name(&self) -> &'static str {
        "concat"
    }

    fn apply(&self, assets: Vec<Asset>) -> Result<Vec<Asset>, PipelineError> {
        if assets.is_empty() {
            tracing::debug!(file = %self.file_name.display(), "nothing to concatenate");
            return Ok(Vec::new());
        }
        let total: usize = assets.iter().map(|a| a.contents.len() + self.separator.len()).sum();
        let mut contents = Vec::with_capacity(total);
        for (i, asset) in assets.iter().enumerate() {
            if i > 0 {
                contents.extend_from_slice(self.separator.as_bytes());
            }
            contents.extend_from_slice(&asset.contents);
        }
        Ok(vec![Asset::new(self.file_name.clone(), contents)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_in_input_order() {
        let out = Concat::new("main.js", "\n")
            .apply(vec![Asset::new("b.js", "B;"), Asset::new("a.js", "A;")])
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, PathBuf::from("main.js"));
        assert_eq!(out[0].contents, b"B;\nA;");
    }

    #[test]
    fn empty_input_produces_nothing() {
        assert!(Concat::new("main.js", "\n").apply(Vec::new()).unwrap().is_empty());
    }
}
