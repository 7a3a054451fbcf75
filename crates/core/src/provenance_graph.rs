//! Provenance graph: an embedded linked-data store for artwork ownership
//! history.
//!
//! Artworks, agents, places and dated events are kept as RDF-style triples
//! under a fixed heritage ontology. On top of the store sit an entity
//! repository (records in, statements out), a graph-pattern query engine
//! that can federate with remote SPARQL endpoints, and a multi-criteria
//! similarity engine for recommendations.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use provenance_graph::{ArtworkRecord, EntityRef, EventRecord, ProvenanceGraph};
//!
//! let graph = ProvenanceGraph::open("heritage.redb").unwrap();
//!
//! let artwork = graph
//!     .upsert_artwork(ArtworkRecord {
//!         title: "Village Fair".into(),
//!         creation_date: Some("1885".into()),
//!         artwork_type: Some("painting".into()),
//!         creator: Some(EntityRef::Name("Nicolae Grigorescu".into())),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//! graph
//!     .append_event(
//!         &artwork.uri,
//!         EventRecord {
//!             event_type: Some("acquisition".into()),
//!             date: Some("1945-08-20".into()),
//!             ..Default::default()
//!         },
//!     )
//!     .unwrap();
//!
//! let chain = graph.provenance_chain(&artwork.uri).unwrap();
//! assert_eq!(chain.events.len(), 2);
//! ```

pub mod config;
pub mod dates;
pub mod federation;
mod materialize;
pub mod ontology;
pub mod provenance;
pub mod query;
pub mod query_parser;
pub mod records;
mod repository;
pub mod similarity;
pub mod triple_store;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tracing::info;

pub use config::{EndpointConfig, EngineConfig, QueryConfig, SimilarityConfig};
pub use dates::{parse_date, DateSpan, EventDate};
pub use federation::{FederationError, RemoteEndpoint, RemoteQuery};
#[cfg(feature = "federation")]
pub use federation::SparqlEndpoint;
pub use ontology::{AgentKind, Class, EventKind, Ontology, SchemaViolation};
pub use provenance::{ProvenanceChain, ProvenanceGap};
pub use query::{
    BindingRow, EndpointState, EndpointStatus, Filter, PatternGroup, PatternSet, PatternTerm,
    QueryMetadata, QueryRequest, QueryResult, TriplePattern,
};
pub use query_parser::{parse_query, TextQuery};
pub use records::{
    AgentRecord, AgentView, ArtworkRecord, ArtworkSummary, ArtworkView, Coordinates,
    CurrentLocation, DanglingReference, Dimensions, EntityRef, EventRecord, EventView,
    ExternalLink, LocalizedText, NamedRef, PlaceRecord, PlaceView, RetractionReport, Statistics,
    UpsertOutcome, Warning,
};
pub use similarity::{Criterion, RecommendRequest, Recommendation};
pub use triple_store::{ChangeSet, Datatype, Literal, Snapshot, Term, Triple, TripleStore};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProvenanceError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("schema violation: {0}")]
    SchemaViolation(#[from] SchemaViolation),
    #[error("federation error: {0}")]
    Federation(#[from] FederationError),
    #[error("store corruption: {0}")]
    StoreCorruption(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<redb::DatabaseError> for ProvenanceError {
    fn from(e: redb::DatabaseError) -> Self {
        ProvenanceError::Storage(e.to_string())
    }
}
impl From<redb::TransactionError> for ProvenanceError {
    fn from(e: redb::TransactionError) -> Self {
        ProvenanceError::Storage(e.to_string())
    }
}
impl From<redb::TableError> for ProvenanceError {
    fn from(e: redb::TableError) -> Self {
        ProvenanceError::Storage(e.to_string())
    }
}
impl From<redb::StorageError> for ProvenanceError {
    fn from(e: redb::StorageError) -> Self {
        ProvenanceError::Storage(e.to_string())
    }
}
impl From<redb::CommitError> for ProvenanceError {
    fn from(e: redb::CommitError) -> Self {
        ProvenanceError::Storage(e.to_string())
    }
}
impl From<ValidationErrors> for ProvenanceError {
    fn from(e: ValidationErrors) -> Self {
        ProvenanceError::Validation(e)
    }
}

pub type Result<T> = std::result::Result<T, ProvenanceError>;

/// What was wrong with a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    Missing,
    Malformed,
    OutOfRange,
    Unknown,
    Retired,
}

/// One field-level diagnostic. `path` uses dotted/indexed notation,
/// e.g. `creator.name` or `group.patterns[2].predicate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Every problem found in one input, not just the first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn single(
        path: impl Into<String>,
        kind: FieldErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            errors: vec![FieldError::new(path, kind, message)],
        }
    }

    pub fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ProvenanceError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", e.path, e.message)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ProvenanceGraph
// ---------------------------------------------------------------------------

/// An owned handle on one provenance graph.
///
/// Every operation goes through this handle; several graphs can coexist in
/// one process. The handle is `Send + Sync`: reads run against snapshots and
/// writes are serialised internally.
pub struct ProvenanceGraph {
    store: TripleStore,
    ontology: Ontology,
    config: EngineConfig,
    endpoints: RwLock<BTreeMap<String, Arc<dyn RemoteEndpoint>>>,
    /// Held across read-resolve-commit in the repository so two upserts
    /// cannot compute their replacements from the same stale snapshot.
    write_lock: Mutex<()>,
}

impl ProvenanceGraph {
    /// Open or create a graph file at `path` with the default configuration.
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with_config(path, EngineConfig::default())
    }

    pub fn open_with_config(path: &str, config: EngineConfig) -> Result<Self> {
        let store = TripleStore::open(path)?;
        Self::init(store, config)
    }

    /// A graph with no file backing. Data is lost on drop.
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_config(EngineConfig::default())
    }

    pub fn open_in_memory_with_config(config: EngineConfig) -> Result<Self> {
        let store = TripleStore::open_in_memory()?;
        Self::init(store, config)
    }

    fn init(store: TripleStore, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut endpoints: BTreeMap<String, Arc<dyn RemoteEndpoint>> = BTreeMap::new();
        #[cfg(feature = "federation")]
        for endpoint in &config.endpoints {
            let sparql = SparqlEndpoint::from_config(endpoint)?;
            endpoints.insert(endpoint.name.clone(), Arc::new(sparql));
        }
        info!(
            triples = store.snapshot()?.len(),
            endpoints = endpoints.len(),
            "provenance graph opened"
        );
        Ok(Self {
            store,
            ontology: Ontology::heritage(),
            config,
            endpoints: RwLock::new(endpoints),
            write_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    /// Direct access to the underlying triple store.
    pub fn store(&self) -> &TripleStore {
        &self.store
    }

    /// Register (or replace) a remote endpoint under its `name()`.
    pub fn register_endpoint(&self, endpoint: Arc<dyn RemoteEndpoint>) -> Result<()> {
        let mut guard = self
            .endpoints
            .write()
            .map_err(|_| ProvenanceError::Internal("endpoint registry lock poisoned".into()))?;
        guard.insert(endpoint.name().to_string(), endpoint);
        Ok(())
    }

    /// Names of the registered endpoints, sorted.
    pub fn endpoint_names(&self) -> Result<Vec<String>> {
        let guard = self
            .endpoints
            .read()
            .map_err(|_| ProvenanceError::Internal("endpoint registry lock poisoned".into()))?;
        Ok(guard.keys().cloned().collect())
    }

    pub(crate) fn endpoint(&self, name: &str) -> Result<Option<Arc<dyn RemoteEndpoint>>> {
        let guard = self
            .endpoints
            .read()
            .map_err(|_| ProvenanceError::Internal("endpoint registry lock poisoned".into()))?;
        Ok(guard.get(name).cloned())
    }

    /// Verify the store's indexes. See [`TripleStore::check_integrity`].
    pub fn check_integrity(&self) -> Result<()> {
        self.store.check_integrity()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn open_temp_graph() -> (ProvenanceGraph, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let graph = ProvenanceGraph::open(&path).unwrap();
        (graph, file)
    }

    fn village_fair() -> ArtworkRecord {
        ArtworkRecord {
            title: "Village Fair".into(),
            creation_date: Some("1885".into()),
            artwork_type: Some("painting".into()),
            creator: Some(EntityRef::Name("Nicolae Grigorescu".into())),
            ..Default::default()
        }
    }

    #[test]
    fn graph_survives_reopen() {
        let (graph, tmp) = open_temp_graph();
        let outcome = graph.upsert_artwork(village_fair()).unwrap();
        drop(graph);

        let reopened = ProvenanceGraph::open(tmp.path().to_str().unwrap()).unwrap();
        let view = reopened.artwork(&outcome.uri).unwrap();
        assert_eq!(view.title, "Village Fair");
        assert_eq!(view.provenance_chain.len(), 1);
        reopened.check_integrity().unwrap();
    }

    #[test]
    fn isolated_graphs_do_not_share_state() {
        let a = ProvenanceGraph::open_in_memory().unwrap();
        let b = ProvenanceGraph::open_in_memory().unwrap();
        a.upsert_artwork(village_fair()).unwrap();
        assert_eq!(a.statistics().unwrap().total_artworks, 1);
        assert_eq!(b.statistics().unwrap().total_artworks, 0);
    }

    #[test]
    fn default_endpoints_are_registered() {
        let graph = ProvenanceGraph::open_in_memory().unwrap();
        let names = graph.endpoint_names().unwrap();
        if cfg!(feature = "federation") {
            assert_eq!(names, vec!["dbpedia", "getty", "wikidata"]);
        } else {
            assert!(names.is_empty());
        }
    }

    #[test]
    fn validation_errors_display_every_field() {
        let mut errors =
            ValidationErrors::single("title", FieldErrorKind::Missing, "title is required");
        errors.push(FieldError::new(
            "dimensions.height",
            FieldErrorKind::OutOfRange,
            "must not be negative",
        ));
        assert_eq!(
            errors.to_string(),
            "title: title is required; dimensions.height: must not be negative"
        );
    }

    #[test]
    fn graph_handle_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProvenanceGraph>();
    }
}
