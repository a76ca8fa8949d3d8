//! Root "app of apps" Application descriptor.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{BootstrapError, Result};
use crate::host::Host;

const APPLICATION_KIND: &str = "Application";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    api_version: Option<String>,
    kind: Option<String>,
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    name: Option<String>,
    namespace: Option<String>,
}

/// A parsed root Application manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootApplication {
    pub name: String,
    /// Namespace from `metadata.namespace`, if set.
    pub namespace: Option<String>,
    pub path: PathBuf,
    pub content: String,
}

impl RootApplication {
    /// Read and validate the manifest through the host.
    ///
    /// # Errors
    ///
    /// - [`BootstrapError::MissingRequiredResource`] if the file is absent.
    /// - [`BootstrapError::Config`] if it is not an Argo CD `Application`
    ///   with a `metadata.name`.
    pub fn load(host: &dyn Host, path: &Path) -> Result<Self> {
        if !host.path_exists(path) {
            return Err(BootstrapError::MissingRequiredResource {
                resource: path.display().to_string(),
                detail: "root application manifest not found".into(),
            });
        }
        let content = host.read_to_string(path)?;
        Self::parse(path, content)
    }

    /// Validate manifest text.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Config`] if the text is not a named Application.
    pub fn parse(path: &Path, content: String) -> Result<Self> {
        let invalid = |detail: String| {
            BootstrapError::Config(format!("{}: {detail}", path.display()))
        };

        let raw: RawManifest =
            serde_yaml::from_str(&content).map_err(|e| invalid(format!("invalid YAML: {e}")))?;

        if raw.kind.as_deref() != Some(APPLICATION_KIND) {
            return Err(invalid(format!(
                "expected kind {APPLICATION_KIND}, found {}",
                raw.kind.as_deref().unwrap_or("<none>")
            )));
        }
        if !raw
            .api_version
            .as_deref()
            .is_some_and(|v| v.starts_with("argoproj.io/"))
        {
            return Err(invalid("apiVersion must be argoproj.io/*".into()));
        }

        let metadata = raw.metadata.ok_or_else(|| invalid("missing metadata".into()))?;
        let name = metadata
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| invalid("missing metadata.name".into()))?;

        Ok(Self {
            name,
            namespace: metadata.namespace,
            path: path.to_path_buf(),
            content,
        })
    }

    /// Namespace the Application lives in, defaulting to Argo CD's own.
    #[must_use]
    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default)
    }
}
