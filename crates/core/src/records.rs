//! Input records and materialized views.
//!
//! Records are what callers hand to the repository; views are what the read
//! side derives back out of the graph. Both are plain serde structures so an
//! outer layer can move them over any wire format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ontology::{AgentKind, EventKind};
use crate::provenance::ProvenanceGap;

/// A reference to another entity: by URI (must exist) or by name (resolved,
/// created when nothing matches).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRef {
    Uri(String),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub lang: String,
    pub text: String,
}

/// Dimensions in centimetres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dimensions {
    pub height: Option<f64>,
    pub width: Option<f64>,
    pub depth: Option<f64>,
}

impl Dimensions {
    pub fn is_empty(&self) -> bool {
        self.height.is_none() && self.width.is_none() && self.depth.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A same-as link to a record in another system (Wikidata, Getty, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalLink {
    pub source: String,
    pub uri: String,
}

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtworkRecord {
    /// Explicit URI. When absent one is minted from title, creator and
    /// creation date.
    pub uri: Option<String>,
    pub title: String,
    pub localized_title: Option<LocalizedText>,
    pub creation_date: Option<String>,
    pub artwork_type: Option<String>,
    pub medium: Option<String>,
    pub materials: Vec<String>,
    pub dimensions: Option<Dimensions>,
    pub description: Option<String>,
    pub creator: Option<EntityRef>,
    pub location: Option<EntityRef>,
    pub external_links: Vec<ExternalLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentRecord {
    pub uri: Option<String>,
    pub name: String,
    pub kind: AgentKind,
    pub birth_date: Option<String>,
    pub death_date: Option<String>,
    pub nationality: Option<String>,
    pub biography: Option<String>,
    pub external_links: Vec<ExternalLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceRecord {
    pub uri: Option<String>,
    pub name: String,
    pub country: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub external_links: Vec<ExternalLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventRecord {
    /// One of the [`EventKind`] names. Kept as text so an unknown value is
    /// reported as a field error rather than a decode failure.
    pub event_type: Option<String>,
    pub date: Option<String>,
    pub from_agent: Option<EntityRef>,
    pub to_agent: Option<EntityRef>,
    pub place: Option<EntityRef>,
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Write outcomes
// ---------------------------------------------------------------------------

/// Non-fatal observations made while writing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum Warning {
    /// A name matched several existing entities; a new one was created.
    AmbiguousMatch {
        field: String,
        name: String,
        candidates: Vec<String>,
        created: String,
    },
    /// The field identifies the entity and was not changed by this upsert.
    ImmutableFieldIgnored { field: String, kept: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertOutcome {
    pub uri: String,
    pub created: bool,
    pub warnings: Vec<Warning>,
}

/// A statement whose object is a retired URI.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DanglingReference {
    pub subject: String,
    pub predicate: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetractionReport {
    pub uri: String,
    pub retracted: usize,
    pub dangling: Vec<DanglingReference>,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// A URI with its display name, when the target still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedRef {
    pub uri: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentView {
    pub uri: String,
    pub name: String,
    pub kind: AgentKind,
    pub birth_date: Option<String>,
    pub death_date: Option<String>,
    pub nationality: Option<String>,
    pub biography: Option<String>,
    pub external_links: Vec<ExternalLink>,
    /// The shared placeholder for anonymous or unattributed works.
    pub unknown: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceView {
    pub uri: String,
    pub name: String,
    pub country: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub external_links: Vec<ExternalLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventView {
    pub uri: String,
    pub kind: EventKind,
    pub artwork: String,
    pub date: Option<String>,
    /// False when the date is missing or did not parse.
    pub ordered: bool,
    pub from_agent: Option<NamedRef>,
    pub to_agent: Option<NamedRef>,
    pub place: Option<NamedRef>,
    pub note: Option<String>,
    pub sequence: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CurrentLocation {
    Known(NamedRef),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtworkView {
    pub uri: String,
    pub title: String,
    pub localized_title: Option<LocalizedText>,
    pub creation_date: Option<String>,
    pub artwork_type: Option<String>,
    pub medium: Option<String>,
    pub materials: Vec<String>,
    pub dimensions: Option<Dimensions>,
    pub description: Option<String>,
    pub creator: Option<AgentView>,
    pub recorded_location: Option<NamedRef>,
    pub current_location: CurrentLocation,
    pub provenance_chain: Vec<EventView>,
    pub gaps: Vec<ProvenanceGap>,
    pub external_links: Vec<ExternalLink>,
}

/// The short form used in listings and recommendations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtworkSummary {
    pub uri: String,
    pub title: String,
    pub creator: Option<String>,
    pub artwork_type: Option<String>,
    pub creation_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub total_artworks: usize,
    pub total_agents: usize,
    pub total_places: usize,
    pub total_events: usize,
    pub total_triples: usize,
    pub artworks_by_type: BTreeMap<String, usize>,
    /// Keyed by e.g. `19th century`; undated works are not counted.
    pub artworks_by_century: BTreeMap<String, usize>,
    /// Country of the current location.
    pub artworks_by_country: BTreeMap<String, usize>,
    pub unknown_creator_count: usize,
    pub dangling_references: usize,
}
