use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::scene::{Geometry, Material, Mesh, SceneObject};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to fetch {path}: {reason}")]
    Fetch { path: String, reason: String },
    #[error("No parser registered for {0}")]
    UnsupportedFormat(String),
    #[error("Failed to parse model: {0}")]
    Parse(String),
}

/// Turns raw model bytes into an object graph. FBX support plugs in here.
pub trait ModelParser: Send + Sync {
    /// Lowercase file extensions this parser accepts, without the dot.
    fn extensions(&self) -> &[&'static str];

    fn parse(&self, name: &str, data: &[u8]) -> Result<SceneObject, LoadError>;
}

/// Wavefront OBJ parser backed by `tobj`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjParser;

impl ModelParser for ObjParser {
    fn extensions(&self) -> &[&'static str] {
        &["obj"]
    }

    fn parse(&self, name: &str, data: &[u8]) -> Result<SceneObject, LoadError> {
        let mut reader = std::io::BufReader::new(data);
        let (models, _materials) = tobj::load_obj_buf(
            &mut reader,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
            // Materials are not needed for placement or stats
            |_| Ok(Default::default()),
        )
        .map_err(|e| LoadError::Parse(e.to_string()))?;

        let mut root = SceneObject::group(name);
        for (i, model) in models.into_iter().enumerate() {
            let mesh = model.mesh;
            let positions: Vec<[f32; 3]> = mesh
                .positions
                .chunks_exact(3)
                .map(|p| [p[0], p[1], p[2]])
                .collect();
            let indices = (!mesh.indices.is_empty()).then_some(mesh.indices);

            let child_name = if model.name.is_empty() {
                format!("mesh_{i}")
            } else {
                model.name
            };
            root.children.push(SceneObject::with_mesh(
                child_name,
                Mesh::new(Geometry::new(positions, indices), Material::default()),
            ));
        }

        if root.children.is_empty() {
            return Err(LoadError::Parse(format!("{name} contains no geometry")));
        }
        Ok(root)
    }
}

/// Parsers keyed by file extension.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn ModelParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in parser.
    pub fn with_builtin() -> Self {
        Self::new().register(ObjParser)
    }

    pub fn register(mut self, parser: impl ModelParser + 'static) -> Self {
        self.parsers.push(Arc::new(parser));
        self
    }

    /// Parser registered for the extension of `path`, ignoring any query string.
    pub fn for_path(&self, path: &str) -> Option<&dyn ModelParser> {
        let ext = extension(path)?;
        self.parsers
            .iter()
            .find(|p| p.extensions().contains(&ext.as_str()))
            .map(|p| p.as_ref())
    }

    /// Like [`ParserRegistry::for_path`], falling back to the first parser for
    /// opaque storage paths that carry no extension.
    pub fn for_path_or_default(&self, path: &str) -> Option<&dyn ModelParser> {
        self.for_path(path)
            .or_else(|| self.parsers.first().map(|p| p.as_ref()))
    }
}

fn extension(path: &str) -> Option<String> {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let file = path.rsplit('/').next()?;
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Fetches and parses a model referenced by a stored path.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, path: &str) -> Result<SceneObject, LoadError>;
}

/// Loads models over HTTP. Relative paths are resolved against `base_url`.
pub struct HttpModelLoader {
    client: reqwest::Client,
    base_url: Option<url::Url>,
    parsers: ParserRegistry,
}

impl HttpModelLoader {
    pub fn new(base_url: Option<url::Url>, parsers: ParserRegistry) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            parsers,
        }
    }

    fn resolve(&self, path: &str) -> Result<url::Url, LoadError> {
        let fetch_error = |reason: String| LoadError::Fetch {
            path: path.to_string(),
            reason,
        };
        match url::Url::parse(path) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base_url
                .as_ref()
                .ok_or_else(|| fetch_error("relative path without a base URL".to_string()))?
                .join(path)
                .map_err(|e| fetch_error(e.to_string())),
            Err(e) => Err(fetch_error(e.to_string())),
        }
    }
}

#[async_trait]
impl ModelLoader for HttpModelLoader {
    async fn load(&self, path: &str) -> Result<SceneObject, LoadError> {
        let parser = self
            .parsers
            .for_path_or_default(path)
            .ok_or_else(|| LoadError::UnsupportedFormat(path.to_string()))?;
        let url = self.resolve(path)?;

        tracing::debug!(%url, "Fetching model");
        let fetch_error = |e: reqwest::Error| LoadError::Fetch {
            path: path.to_string(),
            reason: e.to_string(),
        };
        let data = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_error)?
            .bytes()
            .await
            .map_err(fetch_error)?;

        let name = path.rsplit('/').next().unwrap_or(path);
        parser.parse(name, &data)
    }
}
