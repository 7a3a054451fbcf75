//! Engine configuration, loaded from TOML.
//!
//! ```toml
//! base_uri = "http://arp-greatteam.org/heritage-provenance/"
//!
//! [query]
//! timeout_ms = 5000
//!
//! [similarity]
//! max_century_gap = 2
//!
//! [[endpoints]]
//! name = "wikidata"
//! url = "https://query.wikidata.org/sparql"
//! timeout_ms = 10000
//! ```
//!
//! Every section is optional. Listing `[[endpoints]]` replaces the default
//! endpoint list rather than extending it.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::federation::DEFAULT_ENDPOINT_TIMEOUT_MS;
use crate::triple_store::is_valid_iri;
use crate::{ProvenanceError, Result};

pub const DEFAULT_BASE_URI: &str = "http://arp-greatteam.org/heritage-provenance/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Namespace for minted URIs. Must end with `/` or `#`.
    pub base_uri: String,
    pub query: QueryConfig,
    pub similarity: SimilarityConfig,
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_uri: DEFAULT_BASE_URI.to_string(),
            query: QueryConfig::default(),
            similarity: SimilarityConfig::default(),
            endpoints: EndpointConfig::defaults(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProvenanceError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| ProvenanceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let terminated = self.base_uri.ends_with('/') || self.base_uri.ends_with('#');
        if !is_valid_iri(&self.base_uri) || !terminated {
            return Err(ProvenanceError::Config(format!(
                "base_uri `{}` must be an absolute IRI ending in `/` or `#`",
                self.base_uri
            )));
        }
        if self.query.timeout_ms == 0 {
            return Err(ProvenanceError::Config("query.timeout_ms must be > 0".into()));
        }
        if self.query.max_rows == 0 {
            return Err(ProvenanceError::Config("query.max_rows must be > 0".into()));
        }
        if self.similarity.default_limit == 0 {
            return Err(ProvenanceError::Config("similarity.default_limit must be > 0".into()));
        }

        let mut names = BTreeSet::new();
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            if endpoint.name.trim().is_empty() {
                return Err(ProvenanceError::Config(format!("endpoints[{i}].name is empty")));
            }
            if !names.insert(endpoint.name.as_str()) {
                return Err(ProvenanceError::Config(format!(
                    "endpoint `{}` is configured twice",
                    endpoint.name
                )));
            }
            if !(endpoint.url.starts_with("http://") || endpoint.url.starts_with("https://")) {
                return Err(ProvenanceError::Config(format!(
                    "endpoints[{i}].url `{}` is not an http(s) URL",
                    endpoint.url
                )));
            }
            if endpoint.timeout_ms == 0 {
                return Err(ProvenanceError::Config(format!(
                    "endpoints[{i}].timeout_ms must be > 0"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Wall-clock budget for one query, federation included.
    pub timeout_ms: u64,
    /// Row cap for queries without a `limit`. Hitting it marks the result
    /// truncated.
    pub max_rows: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_rows: 10_000,
        }
    }
}

impl QueryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Centuries apart at which the period score reaches zero, exclusive.
    pub max_century_gap: u32,
    pub default_limit: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            max_century_gap: 2,
            default_limit: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_endpoint_timeout")]
    pub timeout_ms: u64,
}

fn default_endpoint_timeout() -> u64 {
    DEFAULT_ENDPOINT_TIMEOUT_MS
}

impl EndpointConfig {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            timeout_ms: DEFAULT_ENDPOINT_TIMEOUT_MS,
        }
    }

    /// Wikidata, Getty vocabularies and DBpedia.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("wikidata", "https://query.wikidata.org/sparql"),
            Self::new("getty", "http://vocab.getty.edu/sparql"),
            Self::new("dbpedia", "https://dbpedia.org/sparql"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.base_uri, DEFAULT_BASE_URI);
        assert_eq!(config.query.timeout(), Duration::from_secs(5));
        assert_eq!(config.similarity.max_century_gap, 2);
        let names: Vec<&str> = config.endpoints.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["wikidata", "getty", "dbpedia"]);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            base_uri = "https://museum.example/id/"

            [query]
            timeout_ms = 750

            [[endpoints]]
            name = "local"
            url = "http://localhost:3030/ds/sparql"
            "#,
        )
        .unwrap();
        assert_eq!(config.base_uri, "https://museum.example/id/");
        assert_eq!(config.query.timeout_ms, 750);
        assert_eq!(config.query.max_rows, QueryConfig::default().max_rows);
        assert_eq!(config.similarity, SimilarityConfig::default());
        assert_eq!(
            config.endpoints,
            vec![EndpointConfig::new("local", "http://localhost:3030/ds/sparql")]
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        for bad in [
            r#"base_uri = "not a uri""#,
            r#"base_uri = "http://example.org/no-slash""#,
            "[query]\ntimeout_ms = 0",
            "[similarity]\ndefault_limit = 0",
            "[[endpoints]]\nname = \"x\"\nurl = \"ftp://example.org\"",
            concat!(
                "[[endpoints]]\nname = \"x\"\nurl = \"http://a/\"\n",
                "[[endpoints]]\nname = \"x\"\nurl = \"http://b/\"",
            ),
            "query = 5",
        ] {
            assert!(
                matches!(EngineConfig::from_toml_str(bad), Err(ProvenanceError::Config(_))),
                "accepted: {bad}"
            );
        }
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[similarity]\nmax_century_gap = 1\ndefault_limit = 3").unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.similarity.max_century_gap, 1);
        assert_eq!(config.similarity.default_limit, 3);

        assert!(matches!(
            EngineConfig::from_file("/nonexistent/provenance.toml"),
            Err(ProvenanceError::Config(_))
        ));
    }
}
