//! Named shader assets: WGSL source paired with its reflection metadata.

use crate::reflection::ShaderReflection;
use anyhow::{Context as _, Result as AnyResult, anyhow};
use log::{debug, warn};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Extension of shader source files.
pub const SOURCE_EXTENSION: &str = "wgsl";
/// Extension of reflection files.
pub const REFLECTION_EXTENSION: &str = "json";

#[derive(Debug)]
pub struct ShaderAsset {
    pub name: String,
    pub source: String,
    pub reflection: ShaderReflection,
}

/// Shader assets addressed by the name the module passes to pipeline creation.
#[derive(Debug, Default, Clone)]
pub struct ShaderLibrary {
    assets: HashMap<String, Arc<ShaderAsset>>,
}

impl ShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset from in-memory source and reflection JSON.
    ///
    /// # Errors
    /// Returns an error if the reflection JSON is malformed.
    pub fn insert(&mut self, name: &str, source: &str, reflection_json: &str) -> AnyResult<()> {
        let reflection = ShaderReflection::from_json(reflection_json)
            .with_context(|| format!("shader `{name}`"))?;
        self.assets.insert(
            name.to_owned(),
            Arc::new(ShaderAsset {
                name: name.to_owned(),
                source: source.to_owned(),
                reflection,
            }),
        );
        Ok(())
    }

    /// Load every `<name>.wgsl` in `dir` together with its `<name>.json`.
    ///
    /// Sources without a reflection file are skipped with a warning.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read or a reflection file
    /// is malformed.
    pub fn load_dir(dir: &Path) -> AnyResult<Self> {
        let mut library = Self::new();
        let entries =
            fs::read_dir(dir).with_context(|| format!("reading shader directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SOURCE_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let reflection_path = path.with_extension(REFLECTION_EXTENSION);
            if !reflection_path.is_file() {
                warn!(target: "wasm_bridge", "shader {} has no reflection file, skipping", path.display());
                continue;
            }
            let source = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let reflection = fs::read_to_string(&reflection_path)
                .with_context(|| format!("reading {}", reflection_path.display()))?;
            library.insert(name, &source, &reflection)?;
            debug!(target: "wasm_bridge", "loaded shader `{name}`");
        }
        Ok(library)
    }

    /// Look up an asset by name.
    ///
    /// # Errors
    /// Returns an error naming the shader if it is unknown.
    pub fn get(&self, name: &str) -> AnyResult<Arc<ShaderAsset>> {
        self.assets
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("unknown shader `{name}`"))
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Tests fail loudly on unexpected errors")]
mod tests {
    use super::*;

    const REFLECTION: &str = r#"{ "entryPoints": [ { "name": "vs_main", "stage": "vertex" } ] }"#;

    #[test]
    fn loads_paired_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("quad.wgsl"), "// quad").unwrap();
        fs::write(dir.path().join("quad.json"), REFLECTION).unwrap();
        fs::write(dir.path().join("orphan.wgsl"), "// no reflection").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let library = ShaderLibrary::load_dir(dir.path()).unwrap();
        assert_eq!(library.len(), 1);
        let quad = library.get("quad").unwrap();
        assert_eq!(quad.source, "// quad");
        assert_eq!(quad.reflection.vertex_entry().unwrap().name, "vs_main");
        assert!(library.get("orphan").is_err());
    }

    #[test]
    fn malformed_reflection_fails_at_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.wgsl"), "").unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let err = ShaderLibrary::load_dir(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("shader `broken`"));
    }

    #[test]
    fn unknown_name_is_reported() {
        let mut library = ShaderLibrary::new();
        library.insert("tri", "", REFLECTION).unwrap();
        let err = library.get("square").unwrap_err();
        assert_eq!(err.to_string(), "unknown shader `square`");
    }
}
