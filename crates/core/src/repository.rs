//! Write side: turn records into statements.
//!
//! Every write runs under the graph's write lock: take a snapshot, resolve
//! references and compute replacements against it into a [`Draft`], check
//! each touched subject against the ontology, then commit the whole draft as
//! one change set.

use std::collections::BTreeSet;
use std::sync::MutexGuard;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::materialize::{agent_uris, class_of, events_of, iri, literal, subjects_of_class};
use crate::ontology::{hp, AgentKind, Class, EventKind, SchemaViolation, OWL_SAME_AS, RDF_TYPE};
use crate::records::{
    AgentRecord, ArtworkRecord, DanglingReference, EntityRef, EventRecord, ExternalLink,
    PlaceRecord, RetractionReport, UpsertOutcome, Warning,
};
use crate::triple_store::{
    is_valid_iri, is_valid_lang_tag, ChangeSet, Literal, Term, Triple, TripleIndex,
};
use crate::{FieldError, FieldErrorKind, ProvenanceError, ProvenanceGraph, Result, ValidationErrors};

const UNKNOWN_AGENT_NAME: &str = "Unknown";

/// Whether a minted URI may land on a subject that already exists.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Mint {
    /// Same identity, same entity: reuse a live URI (upsert).
    ReuseLive,
    /// Always a new subject: skip live URIs too.
    Fresh,
}

/// Pending changes computed against one snapshot.
struct Draft<'s> {
    snap: &'s TripleIndex,
    changes: ChangeSet,
    touched: BTreeSet<String>,
    /// Subjects created by this draft: `(class, uri, name, country)`.
    created: Vec<(Class, String, String, Option<String>)>,
    warnings: Vec<Warning>,
}

impl<'s> Draft<'s> {
    fn new(snap: &'s TripleIndex) -> Self {
        Self {
            snap,
            changes: ChangeSet::new(),
            touched: BTreeSet::new(),
            created: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn assert(&mut self, subject: &str, predicate: &str, object: impl Into<Term>) {
        self.touched.insert(subject.to_string());
        self.changes.assert(subject, predicate, object);
    }

    /// Make `values` the complete set of objects for `(subject, predicate)`.
    fn replace(&mut self, subject: &str, predicate: &str, values: Vec<Term>) {
        let current: Vec<Term> = self.snap.objects(subject, predicate).cloned().collect();
        for old in current.iter().filter(|old| !values.contains(old)) {
            self.changes
                .retract(Triple::new(subject, predicate, old.clone()));
        }
        for value in values {
            if !current.contains(&value) {
                self.changes.assert(subject, predicate, value);
            }
        }
        self.touched.insert(subject.to_string());
    }

    fn replace_literal(&mut self, subject: &str, predicate: &str, value: Option<&str>) {
        let values = non_empty(value).map(Term::string).into_iter().collect();
        self.replace(subject, predicate, values);
    }

    fn is_taken(&self, uri: &str) -> bool {
        self.snap.has_subject(uri) || self.created.iter().any(|(_, u, _, _)| u == uri)
    }
}

// ---------------------------------------------------------------------------
// Name normalisation
// ---------------------------------------------------------------------------

fn fold_char(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ă' | 'ā' | 'ą' => 'a',
        'ç' | 'ć' | 'č' => 'c',
        'ď' | 'đ' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'ī' => 'i',
        'ł' => 'l',
        'ñ' | 'ń' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ő' => 'o',
        'ř' => 'r',
        'ś' | 'š' | 'ș' | 'ş' => 's',
        'ț' | 'ţ' | 'ť' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ů' | 'ű' => 'u',
        'ý' | 'ÿ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        other => other,
    }
}

/// Lowercased, diacritic-free words.
fn folded_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(fold_char)
        .collect::<String>()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Case-insensitive comparison form with whitespace collapsed.
fn casefold(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Person-name key: given names reduced to initials, so
/// `N. Grigorescu` and `Nicolae Grigorescu` share `n grigorescu`.
pub(crate) fn person_key(name: &str) -> String {
    let tokens = folded_tokens(name);
    match tokens.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, given)) => {
            let mut key: String = given
                .iter()
                .filter_map(|t| t.chars().next())
                .flat_map(|c| [c, ' '])
                .collect();
            key.push_str(last);
            key
        }
    }
}

/// Title/place key: folded words joined by single spaces.
fn plain_key(text: &str) -> String {
    folded_tokens(text).join(" ")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Candidates whose name matches `wanted`: exact (case-insensitive) first,
/// normalized key second.
fn match_names<'a>(
    candidates: &'a [(String, String)],
    wanted: &str,
    key: fn(&str) -> String,
) -> Vec<&'a str> {
    let folded = casefold(wanted);
    let exact: Vec<&str> = candidates
        .iter()
        .filter(|(_, name)| casefold(name) == folded)
        .map(|(uri, _)| uri.as_str())
        .collect();
    if !exact.is_empty() {
        return exact;
    }
    let wanted_key = key(wanted);
    if wanted_key.is_empty() {
        return Vec::new();
    }
    candidates
        .iter()
        .filter(|(_, name)| key(name) == wanted_key)
        .map(|(uri, _)| uri.as_str())
        .collect()
}

// ---------------------------------------------------------------------------
// Record validation
// ---------------------------------------------------------------------------

fn check_uri(errors: &mut ValidationErrors, snap: &TripleIndex, uri: Option<&str>) {
    let Some(uri) = uri else { return };
    if !is_valid_iri(uri) {
        errors.push(FieldError::new(
            "uri",
            FieldErrorKind::Malformed,
            format!("`{uri}` is not an absolute IRI"),
        ));
    } else if snap.is_retired(uri) {
        errors.push(FieldError::new(
            "uri",
            FieldErrorKind::Retired,
            format!("<{uri}> was retracted and cannot be reused"),
        ));
    }
}

fn check_required(errors: &mut ValidationErrors, path: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(path, FieldErrorKind::Missing, format!("{path} is required")));
    }
}

fn check_ref(errors: &mut ValidationErrors, path: &str, reference: Option<&EntityRef>) {
    match reference {
        Some(EntityRef::Uri(uri)) if !is_valid_iri(uri) => errors.push(FieldError::new(
            format!("{path}.uri"),
            FieldErrorKind::Malformed,
            format!("`{uri}` is not an absolute IRI"),
        )),
        Some(EntityRef::Name(name)) if name.trim().is_empty() => errors.push(FieldError::new(
            format!("{path}.name"),
            FieldErrorKind::Missing,
            "name must not be empty",
        )),
        _ => {}
    }
}

fn check_links(errors: &mut ValidationErrors, links: &[ExternalLink]) {
    for (i, link) in links.iter().enumerate() {
        if !is_valid_iri(&link.uri) {
            errors.push(FieldError::new(
                format!("external_links[{i}].uri"),
                FieldErrorKind::Malformed,
                format!("`{}` is not an absolute IRI", link.uri),
            ));
        }
        check_required(errors, &format!("external_links[{i}].source"), &link.source);
    }
}

fn check_measure(
    errors: &mut ValidationErrors,
    path: &str,
    value: Option<f64>,
    range: std::ops::RangeInclusive<f64>,
) {
    if let Some(v) = value {
        if !v.is_finite() || !range.contains(&v) {
            errors.push(FieldError::new(
                path,
                FieldErrorKind::OutOfRange,
                format!("{v} is outside {}..={}", range.start(), range.end()),
            ));
        }
    }
}

fn validate_artwork(record: &ArtworkRecord, snap: &TripleIndex) -> Result<()> {
    let mut errors = ValidationErrors::default();
    check_uri(&mut errors, snap, record.uri.as_deref());
    check_required(&mut errors, "title", &record.title);
    if let Some(localized) = &record.localized_title {
        if !is_valid_lang_tag(&localized.lang) {
            errors.push(FieldError::new(
                "localized_title.lang",
                FieldErrorKind::Malformed,
                format!("`{}` is not a language tag", localized.lang),
            ));
        }
        check_required(&mut errors, "localized_title.text", &localized.text);
    }
    if let Some(dims) = &record.dimensions {
        check_measure(&mut errors, "dimensions.height", dims.height, 0.0..=f64::MAX);
        check_measure(&mut errors, "dimensions.width", dims.width, 0.0..=f64::MAX);
        check_measure(&mut errors, "dimensions.depth", dims.depth, 0.0..=f64::MAX);
    }
    check_ref(&mut errors, "creator", record.creator.as_ref());
    check_ref(&mut errors, "location", record.location.as_ref());
    check_links(&mut errors, &record.external_links);
    errors.into_result()
}

fn validate_agent(record: &AgentRecord, snap: &TripleIndex) -> Result<()> {
    let mut errors = ValidationErrors::default();
    check_uri(&mut errors, snap, record.uri.as_deref());
    check_required(&mut errors, "name", &record.name);
    check_links(&mut errors, &record.external_links);
    errors.into_result()
}

fn validate_place(record: &PlaceRecord, snap: &TripleIndex) -> Result<()> {
    let mut errors = ValidationErrors::default();
    check_uri(&mut errors, snap, record.uri.as_deref());
    check_required(&mut errors, "name", &record.name);
    if let Some(coords) = &record.coordinates {
        check_measure(&mut errors, "coordinates.latitude", Some(coords.latitude), -90.0..=90.0);
        check_measure(&mut errors, "coordinates.longitude", Some(coords.longitude), -180.0..=180.0);
    }
    check_links(&mut errors, &record.external_links);
    errors.into_result()
}

fn validate_event(record: &EventRecord) -> Result<EventKind> {
    let mut errors = ValidationErrors::default();
    let kind = match non_empty(record.event_type.as_deref()) {
        None => {
            errors.push(FieldError::new(
                "event_type",
                FieldErrorKind::Missing,
                "event_type is required",
            ));
            None
        }
        Some(text) => match text.parse::<EventKind>() {
            Ok(kind) => Some(kind),
            Err(message) => {
                errors.push(FieldError::new("event_type", FieldErrorKind::Unknown, message));
                None
            }
        },
    };
    check_ref(&mut errors, "from_agent", record.from_agent.as_ref());
    check_ref(&mut errors, "to_agent", record.to_agent.as_ref());
    check_ref(&mut errors, "place", record.place.as_ref());
    errors.into_result()?;
    kind.ok_or_else(|| ProvenanceError::Internal("event kind missing after validation".into()))
}

fn explicit_uri_conflict(snap: &TripleIndex, uri: &str, expected: &str) -> ProvenanceError {
    let actual = class_of(snap, uri)
        .map_or_else(|| "an untyped subject".to_string(), |c| format!("a {c}"));
    ValidationErrors::single(
        "uri",
        FieldErrorKind::Malformed,
        format!("<{uri}> already identifies {actual}, not {expected}"),
    )
    .into()
}

// ---------------------------------------------------------------------------
// Repository operations
// ---------------------------------------------------------------------------

impl ProvenanceGraph {
    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| ProvenanceError::Internal("repository write lock poisoned".into()))
    }

    /// `{base}{segment}/{first 16 hex of sha256(segment, identity...)}`,
    /// suffixed `-2`, `-3`, ... past retired (and, for [`Mint::Fresh`],
    /// taken) URIs.
    fn mint(&self, draft: &Draft<'_>, class: Class, identity: &[&str], policy: Mint) -> String {
        let segment = class.uri_segment();
        let mut hasher = Sha256::new();
        hasher.update(segment.as_bytes());
        for part in identity {
            hasher.update([0x1f]);
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();
        let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
        let base = format!("{}{segment}/{hex}", self.config.base_uri);

        let mut attempt = 1u32;
        loop {
            let candidate = if attempt == 1 {
                base.clone()
            } else {
                format!("{base}-{attempt}")
            };
            let blocked = draft.snap.is_retired(&candidate)
                || (policy == Mint::Fresh && draft.is_taken(&candidate));
            if !blocked {
                return candidate;
            }
            attempt += 1;
        }
    }

    fn commit_draft(&self, draft: Draft<'_>) -> Result<Vec<Warning>> {
        for subject in &draft.touched {
            let mut statements: BTreeSet<(String, Term)> = draft
                .snap
                .statements_for(subject)
                .map(|(p, o)| (p.to_string(), o.clone()))
                .collect();
            for t in draft.changes.retract.iter().filter(|t| &t.subject == subject) {
                statements.remove(&(t.predicate.clone(), t.object.clone()));
            }
            for t in draft.changes.assert.iter().filter(|t| &t.subject == subject) {
                statements.insert((t.predicate.clone(), t.object.clone()));
            }
            self.ontology
                .check_subject(subject, statements.iter().map(|(p, o)| (p.as_str(), o)))?;
        }
        self.store.commit(&draft.changes)?;
        Ok(draft.warnings)
    }

    // -- reference resolution ----------------------------------------------

    fn agent_candidates(
        &self,
        draft: &Draft<'_>,
        kind: Option<AgentKind>,
    ) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = agent_uris(draft.snap)
            .into_iter()
            .filter(|uri| kind.is_none_or(|k| class_of(draft.snap, uri) == Some(Class::Agent(k))))
            .filter_map(|uri| literal(draft.snap, &uri, hp::NAME).map(|name| (uri, name)))
            .collect();
        out.extend(
            draft
                .created
                .iter()
                .filter(|(class, ..)| match (class, kind) {
                    (Class::Agent(_), None) => true,
                    (Class::Agent(c), Some(k)) => *c == k,
                    _ => false,
                })
                .map(|(_, uri, name, _)| (uri.clone(), name.clone())),
        );
        out
    }

    fn place_candidates(&self, draft: &Draft<'_>, country: Option<&str>) -> Vec<(String, String)> {
        let same_country = |other: Option<&str>| match (country, other) {
            (Some(a), Some(b)) => casefold(a) == casefold(b),
            _ => true,
        };
        let mut out: Vec<(String, String)> = subjects_of_class(draft.snap, Class::Place)
            .into_iter()
            .filter(|uri| same_country(literal(draft.snap, uri, hp::COUNTRY).as_deref()))
            .filter_map(|uri| literal(draft.snap, &uri, hp::NAME).map(|name| (uri, name)))
            .collect();
        out.extend(
            draft
                .created
                .iter()
                .filter(|(class, _, _, c)| *class == Class::Place && same_country(c.as_deref()))
                .map(|(_, uri, name, _)| (uri.clone(), name.clone())),
        );
        out
    }

    /// Resolve an agent reference, creating the agent when no name matches.
    fn resolve_agent(
        &self,
        draft: &mut Draft<'_>,
        field: &str,
        reference: &EntityRef,
    ) -> Result<String> {
        match reference {
            EntityRef::Uri(uri) => {
                let known = matches!(class_of(draft.snap, uri), Some(Class::Agent(_)))
                    || draft
                        .created
                        .iter()
                        .any(|(c, u, ..)| matches!(c, Class::Agent(_)) && u == uri);
                if known {
                    Ok(uri.clone())
                } else {
                    Err(ProvenanceError::NotFound(format!("{field}: agent <{uri}>")))
                }
            }
            EntityRef::Name(name) => {
                let name = name.trim();
                let candidates = self.agent_candidates(draft, None);
                let matches = match_names(&candidates, name, person_key);
                match matches.as_slice() {
                    [single] => Ok(single.to_string()),
                    found => {
                        let ambiguous: Vec<String> = found.iter().map(|s| s.to_string()).collect();
                        let uri = self.create_agent(draft, name, AgentKind::Person);
                        if !ambiguous.is_empty() {
                            warn!(
                                field,
                                name,
                                candidates = ambiguous.len(),
                                "ambiguous agent name; created a new agent"
                            );
                            draft.warnings.push(Warning::AmbiguousMatch {
                                field: field.to_string(),
                                name: name.to_string(),
                                candidates: ambiguous,
                                created: uri.clone(),
                            });
                        }
                        Ok(uri)
                    }
                }
            }
        }
    }

    fn create_agent(&self, draft: &mut Draft<'_>, name: &str, kind: AgentKind) -> String {
        let uri = self.mint(draft, Class::Agent(kind), &[name], Mint::Fresh);
        draft.assert(&uri, RDF_TYPE, Term::iri(Class::Agent(kind).iri()));
        draft.assert(&uri, hp::NAME, Term::string(name));
        draft
            .created
            .push((Class::Agent(kind), uri.clone(), name.to_string(), None));
        info!(uri = %uri, name, "agent created");
        uri
    }

    fn resolve_place(
        &self,
        draft: &mut Draft<'_>,
        field: &str,
        reference: &EntityRef,
    ) -> Result<String> {
        match reference {
            EntityRef::Uri(uri) => {
                let known = class_of(draft.snap, uri) == Some(Class::Place)
                    || draft.created.iter().any(|(c, u, ..)| *c == Class::Place && u == uri);
                if known {
                    Ok(uri.clone())
                } else {
                    Err(ProvenanceError::NotFound(format!("{field}: place <{uri}>")))
                }
            }
            EntityRef::Name(name) => {
                let name = name.trim();
                let candidates = self.place_candidates(draft, None);
                let matches = match_names(&candidates, name, plain_key);
                match matches.as_slice() {
                    [single] => Ok(single.to_string()),
                    found => {
                        let ambiguous: Vec<String> = found.iter().map(|s| s.to_string()).collect();
                        let uri = self.create_place(draft, name, None);
                        if !ambiguous.is_empty() {
                            warn!(
                                field,
                                name,
                                candidates = ambiguous.len(),
                                "ambiguous place name; created a new place"
                            );
                            draft.warnings.push(Warning::AmbiguousMatch {
                                field: field.to_string(),
                                name: name.to_string(),
                                candidates: ambiguous,
                                created: uri.clone(),
                            });
                        }
                        Ok(uri)
                    }
                }
            }
        }
    }

    fn create_place(&self, draft: &mut Draft<'_>, name: &str, country: Option<&str>) -> String {
        let uri = self.mint(draft, Class::Place, &[name, country.unwrap_or_default()], Mint::Fresh);
        draft.assert(&uri, RDF_TYPE, Term::iri(hp::PLACE));
        draft.assert(&uri, hp::NAME, Term::string(name));
        if let Some(country) = country {
            draft.assert(&uri, hp::COUNTRY, Term::string(country));
        }
        draft.created.push((
            Class::Place,
            uri.clone(),
            name.to_string(),
            country.map(str::to_string),
        ));
        info!(uri = %uri, name, "place created");
        uri
    }

    /// The shared agent for unattributed works, created on first use.
    fn unknown_agent(&self, draft: &mut Draft<'_>) -> String {
        let uri = self.unknown_agent_uri();
        if !draft.is_taken(&uri) {
            draft.assert(&uri, RDF_TYPE, Term::iri(hp::PERSON));
            draft.assert(&uri, hp::NAME, Term::string(UNKNOWN_AGENT_NAME));
            draft.created.push((
                Class::Agent(AgentKind::Person),
                uri.clone(),
                UNKNOWN_AGENT_NAME.to_string(),
                None,
            ));
        }
        uri
    }

    /// Make `links` the complete link set of `subject`. A dropped target
    /// loses its `hp:linkSource` once no other subject links to it.
    fn replace_links(&self, draft: &mut Draft<'_>, subject: &str, links: &[ExternalLink]) {
        let targets: Vec<Term> = links.iter().map(|l| Term::iri(l.uri.trim())).collect();
        let dropped: Vec<Term> = draft
            .snap
            .objects(subject, OWL_SAME_AS)
            .filter(|old| !targets.contains(old))
            .cloned()
            .collect();
        draft.replace(subject, OWL_SAME_AS, targets);
        for old in &dropped {
            let Some(target) = old.as_iri() else { continue };
            let still_linked = draft.snap.subjects(OWL_SAME_AS, old).any(|other| other != subject);
            if !still_linked {
                draft.replace(target, hp::LINK_SOURCE, Vec::new());
            }
        }
        for link in links {
            draft.replace(
                link.uri.trim(),
                hp::LINK_SOURCE,
                vec![Term::string(link.source.trim())],
            );
        }
    }

    // -- upserts -------------------------------------------------------------

    /// Create or update an artwork.
    ///
    /// A new artwork gets its creation event in the same commit, with the
    /// creator as its `to_agent`. On update only mutable fields are replaced;
    /// a different creator or creation date is ignored with a
    /// [`Warning::ImmutableFieldIgnored`].
    pub fn upsert_artwork(&self, record: ArtworkRecord) -> Result<UpsertOutcome> {
        let _writes = self.lock_writes()?;
        let snap = self.store.snapshot()?;
        validate_artwork(&record, &snap)?;
        let mut draft = Draft::new(&snap);

        let creation_date = non_empty(record.creation_date.as_deref());
        let creator_key = self.creator_identity(&snap, record.creator.as_ref());
        let uri = match &record.uri {
            Some(uri) => uri.clone(),
            None => self.mint(
                &draft,
                Class::Artwork,
                &[
                    plain_key(&record.title).as_str(),
                    creator_key.as_str(),
                    creation_date.unwrap_or_default(),
                ],
                Mint::ReuseLive,
            ),
        };
        let created = match class_of(&snap, &uri) {
            Some(Class::Artwork) => false,
            None if !snap.has_subject(&uri) => true,
            _ => return Err(explicit_uri_conflict(&snap, &uri, "an Artwork")),
        };

        if created {
            let creator = match &record.creator {
                Some(reference) => self.resolve_agent(&mut draft, "creator", reference)?,
                None => self.unknown_agent(&mut draft),
            };
            draft.assert(&uri, RDF_TYPE, Term::iri(hp::ARTWORK));
            draft.assert(&uri, hp::CREATOR, Term::iri(&creator));
            if let Some(date) = creation_date {
                draft.assert(&uri, hp::CREATION_DATE, Term::string(date));
            }

            let event = self.mint(
                &draft,
                Class::Event,
                &[
                    uri.as_str(),
                    EventKind::Creation.as_str(),
                    creation_date.unwrap_or_default(),
                    "0",
                ],
                Mint::Fresh,
            );
            draft.assert(&event, RDF_TYPE, Term::iri(hp::EVENT));
            draft.assert(&event, hp::EVENT_TYPE, Term::string(EventKind::Creation.as_str()));
            if let Some(date) = creation_date {
                draft.assert(&event, hp::EVENT_DATE, Term::string(date));
            }
            draft.assert(&event, hp::TO_AGENT, Term::iri(&creator));
            draft.assert(&event, hp::CONCERNS_ARTWORK, Term::iri(&uri));
            draft.assert(&event, hp::SEQUENCE, Literal::integer(0));
        } else {
            self.check_immutable_artwork_fields(&mut draft, &uri, &record)?;
        }

        draft.replace_literal(&uri, hp::TITLE, Some(&record.title));
        let localized = record
            .localized_title
            .iter()
            .map(|l| Term::from(Literal::lang(l.text.trim(), l.lang.trim())))
            .collect();
        draft.replace(&uri, hp::LOCALIZED_TITLE, localized);
        draft.replace_literal(&uri, hp::ARTWORK_TYPE, record.artwork_type.as_deref());
        draft.replace_literal(&uri, hp::MEDIUM, record.medium.as_deref());
        draft.replace_literal(&uri, hp::DESCRIPTION, record.description.as_deref());

        let mut materials: Vec<Term> = Vec::new();
        for material in record.materials.iter().filter_map(|m| non_empty(Some(m.as_str()))) {
            let term = Term::string(material);
            if !materials.contains(&term) {
                materials.push(term);
            }
        }
        draft.replace(&uri, hp::MATERIAL, materials);

        let dims = record.dimensions.unwrap_or_default();
        let measures = [
            (hp::HEIGHT, dims.height),
            (hp::WIDTH, dims.width),
            (hp::DEPTH, dims.depth),
        ];
        for (predicate, value) in measures {
            let values = value.map(|v| Term::from(Literal::decimal(v))).into_iter().collect();
            draft.replace(&uri, predicate, values);
        }

        let location = match &record.location {
            Some(reference) => {
                vec![Term::iri(self.resolve_place(&mut draft, "location", reference)?)]
            }
            None => Vec::new(),
        };
        draft.replace(&uri, hp::LOCATION, location);
        self.replace_links(&mut draft, &uri, &record.external_links);

        let warnings = self.commit_draft(draft)?;
        info!(uri = %uri, created, "artwork upserted");
        Ok(UpsertOutcome {
            uri,
            created,
            warnings,
        })
    }

    /// The creator part of an artwork's identity. A URI reference is keyed
    /// by the agent's name so naming the same creator either way mints the
    /// same artwork URI; the Unknown agent keys like an absent creator.
    fn creator_identity(&self, snap: &TripleIndex, creator: Option<&EntityRef>) -> String {
        match creator {
            None => String::new(),
            Some(EntityRef::Name(name)) => person_key(name),
            Some(EntityRef::Uri(uri)) if *uri == self.unknown_agent_uri() => String::new(),
            Some(EntityRef::Uri(uri)) => match literal(snap, uri, hp::NAME) {
                Some(name) => person_key(&name),
                None => uri.clone(),
            },
        }
    }

    fn check_immutable_artwork_fields(
        &self,
        draft: &mut Draft<'_>,
        uri: &str,
        record: &ArtworkRecord,
    ) -> Result<()> {
        let current_creator = iri(draft.snap, uri, hp::CREATOR).unwrap_or_default();
        let creator_matches = match &record.creator {
            None => true,
            Some(EntityRef::Uri(wanted)) => *wanted == current_creator,
            Some(EntityRef::Name(name)) => {
                let candidates = self.agent_candidates(draft, None);
                match_names(&candidates, name.trim(), person_key)
                    .contains(&current_creator.as_str())
            }
        };
        if !creator_matches {
            draft.warnings.push(Warning::ImmutableFieldIgnored {
                field: "creator".into(),
                kept: current_creator,
            });
        }

        let current_date = literal(draft.snap, uri, hp::CREATION_DATE);
        if let Some(wanted) = non_empty(record.creation_date.as_deref()) {
            if current_date.as_deref() != Some(wanted) {
                draft.warnings.push(Warning::ImmutableFieldIgnored {
                    field: "creation_date".into(),
                    kept: current_date.unwrap_or_default(),
                });
            }
        }
        Ok(())
    }

    /// Create or update an agent. Without an explicit URI the name is
    /// resolved first; a unique match is updated in place. Name and kind
    /// identify the agent and are never rewritten.
    pub fn upsert_agent(&self, record: AgentRecord) -> Result<UpsertOutcome> {
        let _writes = self.lock_writes()?;
        let snap = self.store.snapshot()?;
        validate_agent(&record, &snap)?;
        let mut draft = Draft::new(&snap);
        let name = record.name.trim();

        let (uri, created) = match &record.uri {
            Some(uri) => match class_of(&snap, uri) {
                Some(Class::Agent(kind)) if kind == record.kind => (uri.clone(), false),
                Some(Class::Agent(kind)) => {
                    return Err(ValidationErrors::single(
                        "kind",
                        FieldErrorKind::Malformed,
                        format!("<{uri}> is a {}", Class::Agent(kind)),
                    )
                    .into())
                }
                None if !snap.has_subject(uri) => (uri.clone(), true),
                _ => return Err(explicit_uri_conflict(&snap, uri, "an Agent")),
            },
            None => {
                let candidates = self.agent_candidates(&draft, Some(record.kind));
                let matches: Vec<String> = match_names(&candidates, name, person_key)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                match matches.as_slice() {
                    [single] => (single.clone(), false),
                    found => {
                        let uri =
                            self.mint(&draft, Class::Agent(record.kind), &[name], Mint::Fresh);
                        if !found.is_empty() {
                            warn!(
                                name,
                                candidates = found.len(),
                                "ambiguous agent name; created a new agent"
                            );
                            draft.warnings.push(Warning::AmbiguousMatch {
                                field: "name".into(),
                                name: name.to_string(),
                                candidates: found.to_vec(),
                                created: uri.clone(),
                            });
                        }
                        (uri, true)
                    }
                }
            }
        };

        if created {
            draft.assert(&uri, RDF_TYPE, Term::iri(Class::Agent(record.kind).iri()));
            draft.assert(&uri, hp::NAME, Term::string(name));
        }
        draft.replace_literal(&uri, hp::BIRTH_DATE, record.birth_date.as_deref());
        draft.replace_literal(&uri, hp::DEATH_DATE, record.death_date.as_deref());
        draft.replace_literal(&uri, hp::NATIONALITY, record.nationality.as_deref());
        draft.replace_literal(&uri, hp::BIOGRAPHY, record.biography.as_deref());
        self.replace_links(&mut draft, &uri, &record.external_links);

        let warnings = self.commit_draft(draft)?;
        info!(uri = %uri, created, "agent upserted");
        Ok(UpsertOutcome {
            uri,
            created,
            warnings,
        })
    }

    /// Create or update a place, identified by name and country.
    pub fn upsert_place(&self, record: PlaceRecord) -> Result<UpsertOutcome> {
        let _writes = self.lock_writes()?;
        let snap = self.store.snapshot()?;
        validate_place(&record, &snap)?;
        let mut draft = Draft::new(&snap);
        let name = record.name.trim();
        let country = non_empty(record.country.as_deref());

        let (uri, created) = match &record.uri {
            Some(uri) => match class_of(&snap, uri) {
                Some(Class::Place) => (uri.clone(), false),
                None if !snap.has_subject(uri) => (uri.clone(), true),
                _ => return Err(explicit_uri_conflict(&snap, uri, "a Place")),
            },
            None => {
                let candidates = self.place_candidates(&draft, country);
                let matches: Vec<String> = match_names(&candidates, name, plain_key)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                match matches.as_slice() {
                    [single] => (single.clone(), false),
                    found => {
                        let identity = [name, country.unwrap_or_default()];
                        let uri = self.mint(&draft, Class::Place, &identity, Mint::Fresh);
                        if !found.is_empty() {
                            warn!(
                                name,
                                candidates = found.len(),
                                "ambiguous place name; created a new place"
                            );
                            draft.warnings.push(Warning::AmbiguousMatch {
                                field: "name".into(),
                                name: name.to_string(),
                                candidates: found.to_vec(),
                                created: uri.clone(),
                            });
                        }
                        (uri, true)
                    }
                }
            }
        };

        if created {
            draft.assert(&uri, RDF_TYPE, Term::iri(hp::PLACE));
            draft.assert(&uri, hp::NAME, Term::string(name));
        }
        // A place first seen by name alone learns its country here.
        if literal(&snap, &uri, hp::COUNTRY).is_none() || created {
            draft.replace_literal(&uri, hp::COUNTRY, country);
        }
        let (latitude, longitude) = match record.coordinates {
            Some(c) => (
                vec![Term::from(Literal::decimal(c.latitude))],
                vec![Term::from(Literal::decimal(c.longitude))],
            ),
            None => (Vec::new(), Vec::new()),
        };
        draft.replace(&uri, hp::LATITUDE, latitude);
        draft.replace(&uri, hp::LONGITUDE, longitude);
        self.replace_links(&mut draft, &uri, &record.external_links);

        let warnings = self.commit_draft(draft)?;
        info!(uri = %uri, created, "place upserted");
        Ok(UpsertOutcome {
            uri,
            created,
            warnings,
        })
    }

    /// Append an event to an artwork's provenance. Never rewrites existing
    /// events; a second creation event is a [`SchemaViolation`].
    pub fn append_event(&self, artwork: &str, record: EventRecord) -> Result<UpsertOutcome> {
        let kind = validate_event(&record)?;
        let _writes = self.lock_writes()?;
        let snap = self.store.snapshot()?;
        if class_of(&snap, artwork) != Some(Class::Artwork) {
            return Err(ProvenanceError::NotFound(format!("artwork <{artwork}>")));
        }
        let existing = events_of(&snap, artwork);
        if kind == EventKind::Creation {
            if let Some(first) = existing.iter().find(|e| e.kind == EventKind::Creation) {
                return Err(SchemaViolation::DuplicateCreation {
                    artwork: artwork.to_string(),
                    existing: first.uri.clone(),
                }
                .into());
            }
        }
        let sequence = existing.iter().map(|e| e.sequence + 1).max().unwrap_or(0);

        let mut draft = Draft::new(&snap);
        let from = match &record.from_agent {
            Some(reference) => Some(self.resolve_agent(&mut draft, "from_agent", reference)?),
            None => None,
        };
        let to = match &record.to_agent {
            Some(reference) => Some(self.resolve_agent(&mut draft, "to_agent", reference)?),
            None => None,
        };
        let place = match &record.place {
            Some(reference) => Some(self.resolve_place(&mut draft, "place", reference)?),
            None => None,
        };

        let date = non_empty(record.date.as_deref());
        let sequence_text = sequence.to_string();
        let uri = self.mint(
            &draft,
            Class::Event,
            &[artwork, kind.as_str(), date.unwrap_or_default(), sequence_text.as_str()],
            Mint::Fresh,
        );
        draft.assert(&uri, RDF_TYPE, Term::iri(hp::EVENT));
        draft.assert(&uri, hp::EVENT_TYPE, Term::string(kind.as_str()));
        draft.assert(&uri, hp::CONCERNS_ARTWORK, Term::iri(artwork));
        draft.assert(&uri, hp::SEQUENCE, Literal::integer(sequence));
        if let Some(date) = date {
            draft.assert(&uri, hp::EVENT_DATE, Term::string(date));
        }
        if let Some(from) = from {
            draft.assert(&uri, hp::FROM_AGENT, Term::iri(from));
        }
        if let Some(to) = to {
            draft.assert(&uri, hp::TO_AGENT, Term::iri(to));
        }
        if let Some(place) = place {
            draft.assert(&uri, hp::PLACE_REF, Term::iri(place));
        }
        if let Some(note) = non_empty(record.note.as_deref()) {
            draft.assert(&uri, hp::NOTE, Term::string(note));
        }

        let warnings = self.commit_draft(draft)?;
        info!(uri = %uri, artwork, kind = %kind, sequence, "event appended");
        Ok(UpsertOutcome {
            uri,
            created: true,
            warnings,
        })
    }

    /// Retract every statement about `uri` and retire the URI.
    ///
    /// Statements elsewhere that point at it are left in place and reported
    /// as dangling.
    pub fn retract_entity(&self, uri: &str) -> Result<RetractionReport> {
        if uri == self.unknown_agent_uri() {
            return Err(ValidationErrors::single(
                "uri",
                FieldErrorKind::Malformed,
                "the Unknown agent cannot be retracted",
            )
            .into());
        }
        let _writes = self.lock_writes()?;
        let snap = self.store.snapshot()?;
        let mut changes = ChangeSet::new();
        for (predicate, object) in snap.statements_for(uri) {
            changes.retract(Triple::new(uri, predicate, object.clone()));
        }
        if changes.retract.is_empty() {
            return Err(ProvenanceError::NotFound(format!("entity <{uri}>")));
        }
        changes.retire.push(uri.to_string());
        let summary = self.store.commit(&changes)?;

        let mut dangling: Vec<DanglingReference> = snap
            .references_to(&Term::iri(uri))
            .filter(|(subject, _)| *subject != uri)
            .map(|(subject, predicate)| DanglingReference {
                subject: subject.to_string(),
                predicate: predicate.to_string(),
                target: uri.to_string(),
            })
            .collect();
        dangling.sort();
        if dangling.is_empty() {
            info!(uri, retracted = summary.retracted, "entity retracted");
        } else {
            warn!(
                uri,
                retracted = summary.retracted,
                dangling = dangling.len(),
                "entity retracted; references left dangling"
            );
        }
        Ok(RetractionReport {
            uri: uri.to_string(),
            retracted: summary.retracted,
            dangling,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Coordinates, Dimensions, LocalizedText};

    fn graph() -> ProvenanceGraph {
        ProvenanceGraph::open_in_memory().unwrap()
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

    fn field_errors(err: ProvenanceError) -> Vec<(String, FieldErrorKind)> {
        match err {
            ProvenanceError::Validation(v) => {
                v.errors.into_iter().map(|e| (e.path, e.kind)).collect()
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn person_key_reduces_given_names() {
        assert_eq!(person_key("Nicolae Grigorescu"), "n grigorescu");
        assert_eq!(person_key("N. Grigorescu"), "n grigorescu");
        assert_eq!(person_key("Ștefan Luchian"), "s luchian");
        assert_eq!(person_key("Brâncuși"), "brancusi");
        assert_eq!(person_key("  "), "");
    }

    #[test]
    fn same_agent_name_resolves_to_same_uri() {
        let g = graph();
        let a = g
            .upsert_agent(AgentRecord {
                name: "Nicolae Grigorescu".into(),
                ..Default::default()
            })
            .unwrap();
        let b = g
            .upsert_agent(AgentRecord {
                name: "nicolae  grigorescu".into(),
                nationality: Some("Romanian".into()),
                ..Default::default()
            })
            .unwrap();
        let c = g
            .upsert_agent(AgentRecord {
                name: "N. Grigorescu".into(),
                ..Default::default()
            })
            .unwrap();
        assert!(a.created);
        assert!(!b.created);
        assert_eq!(a.uri, b.uri);
        assert_eq!(a.uri, c.uri);
        assert_eq!(g.agent(&a.uri).unwrap().name, "Nicolae Grigorescu");
    }

    #[test]
    fn ambiguous_name_creates_new_agent_with_warning() {
        let g = graph();
        let ion = g
            .upsert_agent(AgentRecord {
                uri: Some("http://example.org/agent/ion".into()),
                name: "Ion Andreescu".into(),
                ..Default::default()
            })
            .unwrap();
        let ioana = g
            .upsert_agent(AgentRecord {
                uri: Some("http://example.org/agent/ioana".into()),
                name: "Ioana Andreescu".into(),
                ..Default::default()
            })
            .unwrap();

        let outcome = g
            .upsert_artwork(ArtworkRecord {
                title: "Forest in Winter".into(),
                creator: Some(EntityRef::Name("I. Andreescu".into())),
                ..Default::default()
            })
            .unwrap();
        let creator = g.artwork(&outcome.uri).unwrap().creator.unwrap();
        assert_ne!(creator.uri, ion.uri);
        assert_ne!(creator.uri, ioana.uri);
        match &outcome.warnings[..] {
            [Warning::AmbiguousMatch { candidates, created, .. }] => {
                assert_eq!(candidates.len(), 2);
                assert_eq!(created, &creator.uri);
            }
            other => panic!("expected one AmbiguousMatch, got {other:?}"),
        }
    }

    #[test]
    fn upsert_artwork_is_idempotent_on_identity() {
        let g = graph();
        let first = g.upsert_artwork(village_fair()).unwrap();
        let mut again = village_fair();
        again.creator = Some(EntityRef::Name("N. Grigorescu".into()));
        again.medium = Some("oil on canvas".into());
        let second = g.upsert_artwork(again).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.uri, second.uri);
        let view = g.artwork(&first.uri).unwrap();
        assert_eq!(view.medium.as_deref(), Some("oil on canvas"));
        assert_eq!(view.provenance_chain.len(), 1);
        assert!(first.uri.starts_with("http://arp-greatteam.org/heritage-provenance/artwork/"));
    }

    #[test]
    fn record_round_trips_through_statements() {
        let g = graph();
        let creator = g
            .upsert_agent(AgentRecord {
                name: "Theodor Aman".into(),
                ..Default::default()
            })
            .unwrap()
            .uri;
        let museum = g
            .upsert_place(PlaceRecord {
                name: "National Museum of Art".into(),
                country: Some("Romania".into()),
                coordinates: Some(Coordinates {
                    latitude: 44.4396,
                    longitude: 26.0963,
                }),
                ..Default::default()
            })
            .unwrap()
            .uri;

        let record = ArtworkRecord {
            uri: Some("http://example.org/artwork/aman-1".into()),
            title: "The Ball".into(),
            localized_title: Some(LocalizedText {
                lang: "ro".into(),
                text: "Balul".into(),
            }),
            creation_date: Some("c. 1880".into()),
            artwork_type: Some("painting".into()),
            medium: Some("oil on canvas".into()),
            materials: vec!["canvas".into(), "oil".into()],
            dimensions: Some(Dimensions {
                height: Some(48.5),
                width: Some(61.0),
                depth: None,
            }),
            description: Some("A ball in a Bucharest salon".into()),
            creator: Some(EntityRef::Uri(creator)),
            location: Some(EntityRef::Uri(museum)),
            external_links: vec![ExternalLink {
                source: "Wikidata".into(),
                uri: "http://www.wikidata.org/entity/Q1".into(),
            }],
        };
        let uri = g.upsert_artwork(record.clone()).unwrap().uri;
        assert_eq!(g.artwork_record(&uri).unwrap(), record);
    }

    #[test]
    fn missing_creator_uses_unknown_agent() {
        let g = graph();
        let a = g
            .upsert_artwork(ArtworkRecord {
                title: "Icon".into(),
                ..Default::default()
            })
            .unwrap();
        let b = g
            .upsert_artwork(ArtworkRecord {
                title: "Another Icon".into(),
                ..Default::default()
            })
            .unwrap();
        let creator_a = g.artwork(&a.uri).unwrap().creator.unwrap();
        let creator_b = g.artwork(&b.uri).unwrap().creator.unwrap();
        assert!(creator_a.unknown);
        assert_eq!(creator_a.uri, creator_b.uri);
        assert_eq!(creator_a.name, "Unknown");
        assert!(g.retract_entity(&creator_a.uri).is_err());
    }

    #[test]
    fn validation_reports_every_field() {
        let g = graph();
        let err = g
            .upsert_artwork(ArtworkRecord {
                uri: Some("relative/uri".into()),
                title: "  ".into(),
                dimensions: Some(Dimensions {
                    height: Some(-1.0),
                    ..Default::default()
                }),
                external_links: vec![ExternalLink {
                    source: "Getty".into(),
                    uri: "ulan 500".into(),
                }],
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(
            field_errors(err),
            vec![
                ("uri".to_string(), FieldErrorKind::Malformed),
                ("title".to_string(), FieldErrorKind::Missing),
                ("dimensions.height".to_string(), FieldErrorKind::OutOfRange),
                ("external_links[0].uri".to_string(), FieldErrorKind::Malformed),
            ]
        );
    }

    #[test]
    fn event_requires_known_type_and_artwork() {
        let g = graph();
        let uri = g.upsert_artwork(village_fair()).unwrap().uri;

        let missing = g.append_event(&uri, EventRecord::default()).unwrap_err();
        assert_eq!(
            field_errors(missing),
            vec![("event_type".to_string(), FieldErrorKind::Missing)]
        );

        let unknown = g
            .append_event(
                &uri,
                EventRecord {
                    event_type: Some("auction".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(
            field_errors(unknown),
            vec![("event_type".to_string(), FieldErrorKind::Unknown)]
        );

        let absent = g.append_event(
            "http://example.org/artwork/none",
            EventRecord {
                event_type: Some("sale".into()),
                ..Default::default()
            },
        );
        assert!(matches!(absent, Err(ProvenanceError::NotFound(_))));

        let dangling_agent = g.append_event(
            &uri,
            EventRecord {
                event_type: Some("sale".into()),
                to_agent: Some(EntityRef::Uri("http://example.org/agent/nobody".into())),
                ..Default::default()
            },
        );
        assert!(matches!(dangling_agent, Err(ProvenanceError::NotFound(_))));
    }

    #[test]
    fn second_creation_event_is_schema_violation() {
        let g = graph();
        let uri = g.upsert_artwork(village_fair()).unwrap().uri;
        let err = g
            .append_event(
                &uri,
                EventRecord {
                    event_type: Some("creation".into()),
                    date: Some("1886".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ProvenanceError::SchemaViolation(SchemaViolation::DuplicateCreation { .. })
        ));
    }

    #[test]
    fn appended_events_get_increasing_sequence() {
        let g = graph();
        let uri = g.upsert_artwork(village_fair()).unwrap().uri;
        for year in ["1945", "1945"] {
            g.append_event(
                &uri,
                EventRecord {
                    event_type: Some("exhibition".into()),
                    date: Some(year.into()),
                    place: Some(EntityRef::Name("Bucharest".into())),
                    ..Default::default()
                },
            )
            .unwrap();
        }
        let chain = g.provenance_chain(&uri).unwrap();
        let sequences: Vec<i64> = chain.events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_ne!(chain.events[1].uri, chain.events[2].uri);
        assert_eq!(chain.events[1].place, chain.events[2].place);
        assert_eq!(g.places().unwrap().len(), 1);
    }

    #[test]
    fn retraction_retires_uri_and_reports_dangling() {
        let g = graph();
        let place = g
            .upsert_place(PlaceRecord {
                name: "Zambaccian Museum".into(),
                country: Some("Romania".into()),
                ..Default::default()
            })
            .unwrap()
            .uri;
        let mut record = village_fair();
        record.location = Some(EntityRef::Uri(place.clone()));
        let artwork = g.upsert_artwork(record).unwrap().uri;

        let report = g.retract_entity(&place).unwrap();
        assert_eq!(report.retracted, 3);
        assert_eq!(
            report.dangling,
            vec![DanglingReference {
                subject: artwork.clone(),
                predicate: hp::LOCATION.into(),
                target: place.clone(),
            }]
        );
        assert_eq!(g.dangling_references().unwrap(), report.dangling);
        assert!(matches!(g.place(&place), Err(ProvenanceError::NotFound(_))));
        assert!(matches!(g.retract_entity(&place), Err(ProvenanceError::NotFound(_))));

        // Same identity again: the retired URI is skipped.
        let again = g
            .upsert_place(PlaceRecord {
                name: "Zambaccian Museum".into(),
                country: Some("Romania".into()),
                ..Default::default()
            })
            .unwrap();
        assert!(again.created);
        assert_eq!(again.uri, format!("{place}-2"));

        let reused = g.upsert_place(PlaceRecord {
            uri: Some(place.clone()),
            name: "Zambaccian Museum".into(),
            ..Default::default()
        });
        assert_eq!(
            field_errors(reused.unwrap_err()),
            vec![("uri".to_string(), FieldErrorKind::Retired)]
        );
    }

    #[test]
    fn explicit_uri_of_other_class_is_rejected() {
        let g = graph();
        let agent = g
            .upsert_agent(AgentRecord {
                name: "Theodor Pallady".into(),
                ..Default::default()
            })
            .unwrap()
            .uri;
        let err = g
            .upsert_artwork(ArtworkRecord {
                uri: Some(agent),
                title: "Nude".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(field_errors(err), vec![("uri".to_string(), FieldErrorKind::Malformed)]);
    }

    #[test]
    fn creator_change_on_update_is_ignored_with_warning() {
        let g = graph();
        let uri = g.upsert_artwork(village_fair()).unwrap().uri;
        let mut update = village_fair();
        update.uri = Some(uri.clone());
        update.creator = Some(EntityRef::Name("Ion Andreescu".into()));
        let outcome = g.upsert_artwork(update).unwrap();
        assert!(matches!(
            &outcome.warnings[..],
            [Warning::ImmutableFieldIgnored { field, .. }] if field == "creator"
        ));
        assert_eq!(
            g.artwork(&uri).unwrap().creator.unwrap().name,
            "Nicolae Grigorescu"
        );
    }

    #[test]
    fn creator_by_uri_or_name_mints_same_artwork() {
        let g = graph();
        let first = g.upsert_artwork(village_fair()).unwrap();
        let creator = g.artwork(&first.uri).unwrap().creator.unwrap().uri;

        let mut by_uri = village_fair();
        by_uri.creator = Some(EntityRef::Uri(creator));
        let second = g.upsert_artwork(by_uri).unwrap();

        assert_eq!(second.uri, first.uri);
        assert!(!second.created);
        assert!(second.warnings.is_empty());
        assert_eq!(g.statistics().unwrap().total_artworks, 1);
        assert_eq!(g.provenance_chain(&first.uri).unwrap().events.len(), 1);
    }

    #[test]
    fn replaced_links_drop_stale_sources() {
        const Q1: &str = "http://www.wikidata.org/entity/Q1";
        const AAT: &str = "http://vocab.getty.edu/aat/2";
        let g = graph();
        let link = |source: &str, uri: &str| ExternalLink {
            source: source.into(),
            uri: uri.into(),
        };

        let mut record = village_fair();
        record.external_links = vec![link("Wikidata", Q1)];
        let uri = g.upsert_artwork(record.clone()).unwrap().uri;
        let triples_before = g.statistics().unwrap().total_triples;

        record.external_links = vec![link("Getty", AAT)];
        g.upsert_artwork(record).unwrap();

        assert!(g.statements_for(Q1).unwrap().is_empty());
        assert_eq!(
            g.statements_for(AAT).unwrap(),
            BTreeSet::from([(hp::LINK_SOURCE.to_string(), Term::string("Getty"))])
        );
        assert_eq!(g.artwork(&uri).unwrap().external_links, vec![link("Getty", AAT)]);
        assert_eq!(g.statistics().unwrap().total_triples, triples_before);
    }

    #[test]
    fn shared_link_target_keeps_its_source() {
        const Q1: &str = "http://www.wikidata.org/entity/Q1";
        let g = graph();
        let wikidata = vec![ExternalLink {
            source: "Wikidata".into(),
            uri: Q1.into(),
        }];

        let mut fair = village_fair();
        fair.external_links = wikidata.clone();
        g.upsert_artwork(fair.clone()).unwrap();
        g.upsert_artwork(ArtworkRecord {
            title: "Ox Cart".into(),
            external_links: wikidata,
            ..Default::default()
        })
        .unwrap();

        fair.external_links = Vec::new();
        g.upsert_artwork(fair).unwrap();

        assert_eq!(
            g.statements_for(Q1).unwrap(),
            BTreeSet::from([(hp::LINK_SOURCE.to_string(), Term::string("Wikidata"))])
        );
    }
}
