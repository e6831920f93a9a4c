//! Source loading.
//!
//! The engine never touches the network or the filesystem on its own; markup
//! reaches it through a [`SourceLoader`]. [`FsLoader`] covers the common case
//! of a directory of `.html` / `.tpl` files, and any
//! `Fn(&str) -> Result<String>` closure works as a loader too.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

pub trait SourceLoader {
    /// Raw markup (or companion logic) for `id`.
    fn load(&self, id: &str) -> Result<String>;
}

impl<F> SourceLoader for F
where
    F: Fn(&str) -> Result<String>,
{
    fn load(&self, id: &str) -> Result<String> {
        self(id)
    }
}

/// Reads ids as paths relative to a base directory.
#[derive(Debug, Clone)]
pub struct FsLoader {
    base: PathBuf,
}

impl FsLoader {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        FsLoader { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl SourceLoader for FsLoader {
    fn load(&self, id: &str) -> Result<String> {
        let path = self.base.join(id);
        std::fs::read_to_string(&path)
            .map_err(|e| Error::Load { id: id.to_string(), message: format!("{}: {e}", path.display()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Engine, Loaded};

    fn memory(id: &str) -> Result<String> {
        match id {
            "views/cards.html" => Ok("<template name=\"card\"><div>{{title}}</div></template>".to_string()),
            "views/cards.js" => Ok("console.log('ready');".to_string()),
            _ => Err(Error::Load { id: id.to_string(), message: "not found".to_string() }),
        }
    }

    #[test]
    fn dispatches_on_extension() {
        let mut engine = Engine::new();
        assert_eq!(engine.load(&memory, "views/cards.html").unwrap(), Loaded::Templates(vec!["card".to_string()]));
        assert_eq!(
            engine.load(&memory, "views/cards.js").unwrap(),
            Loaded::Companion("console.log('ready');".to_string())
        );
        assert_eq!(engine.load(&memory, "views/cards.css").unwrap(), Loaded::Skipped);
        assert!(engine.is_template("card"));
    }

    #[test]
    fn missing_source_is_a_load_error() {
        let mut engine = Engine::new();
        assert!(matches!(engine.load(&memory, "missing.tpl"), Err(Error::Load { .. })));
    }

    #[test]
    fn fs_loader_reads_relative_to_base() {
        let dir = std::env::temp_dir().join(format!("kandybars-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.kbml"), "<template name=\"a\">A</template>").unwrap();

        let loader = FsLoader::new(&dir);
        let mut engine = Engine::new();
        let loaded = engine.load_all(&loader, &["a.kbml", "b.txt"]).unwrap();
        assert_eq!(loaded, [Loaded::Templates(vec!["a".to_string()]), Loaded::Skipped]);
        assert!(matches!(loader.load("nope.html"), Err(Error::Load { .. })));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
