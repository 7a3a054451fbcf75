//! Indexed subject-predicate-object store.
//!
//! Statements are persisted in redb (one row per triple, keyed by its JSON
//! encoding) and mirrored in an in-memory [`TripleIndex`] that is indexed by
//! subject, predicate and object. Readers clone an `Arc` snapshot of the
//! index and never hold a lock while iterating; writers are serialised and
//! publish a new index only after the redb transaction has committed, so a
//! reader either sees a whole [`ChangeSet`] or none of it.
//!
//! # Complexity
//! - `statements_for`: O(log n) lookup plus the size of the description
//! - `matching` with a bound subject, object or predicate: proportional to
//!   that index bucket, never a full scan
//! - `commit`: O(k log n) for k changed triples; the index is copied only
//!   when a reader still holds the previous snapshot

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{NaiveDate, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{FieldError, FieldErrorKind, ProvenanceError, Result, ValidationErrors};

/// One row per triple. The key is the JSON encoding of the [`Triple`]; the
/// value is unused.
const TRIPLES: TableDefinition<&str, &str> = TableDefinition::new("triples");

/// URIs that were retracted, mapped to the RFC 3339 time of retraction.
/// Minting consults this table so a URI is never handed out twice.
const RETIRED: TableDefinition<&str, &str> = TableDefinition::new("retired");

// ---------------------------------------------------------------------------
// Terms
// ---------------------------------------------------------------------------

/// Datatype of a [`Literal`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    #[default]
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
}

impl Datatype {
    /// The XML Schema IRI for this datatype.
    pub fn xsd_iri(self) -> &'static str {
        match self {
            Datatype::String => "http://www.w3.org/2001/XMLSchema#string",
            Datatype::Integer => "http://www.w3.org/2001/XMLSchema#integer",
            Datatype::Decimal => "http://www.w3.org/2001/XMLSchema#decimal",
            Datatype::Boolean => "http://www.w3.org/2001/XMLSchema#boolean",
            Datatype::Date => "http://www.w3.org/2001/XMLSchema#date",
        }
    }

    /// Map a datatype IRI (full or `xsd:` prefixed) back to a [`Datatype`].
    /// Anything unrecognised is treated as a plain string.
    pub fn from_iri(iri: &str) -> Self {
        let local = iri
            .rsplit(['#', ':', '/'])
            .next()
            .unwrap_or(iri)
            .to_ascii_lowercase();
        match local.as_str() {
            "integer" | "int" | "long" | "short" | "nonnegativeinteger" => Datatype::Integer,
            "decimal" | "double" | "float" => Datatype::Decimal,
            "boolean" => Datatype::Boolean,
            "date" => Datatype::Date,
            _ => Datatype::String,
        }
    }
}

/// A literal value with its datatype and optional language tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub value: String,
    #[serde(default)]
    pub datatype: Datatype,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl Literal {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            datatype: Datatype::String,
            lang: None,
        }
    }

    pub fn lang(value: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            datatype: Datatype::String,
            lang: Some(lang.into()),
        }
    }

    pub fn integer(value: i64) -> Self {
        Self {
            value: value.to_string(),
            datatype: Datatype::Integer,
            lang: None,
        }
    }

    pub fn decimal(value: f64) -> Self {
        Self {
            value: value.to_string(),
            datatype: Datatype::Decimal,
            lang: None,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            value: value.to_string(),
            datatype: Datatype::Boolean,
            lang: None,
        }
    }

    /// Numeric view of the literal, if its lexical form parses as a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self.datatype {
            Datatype::Integer | Datatype::Decimal | Datatype::String => {
                self.value.trim().parse::<f64>().ok().filter(|n| n.is_finite())
            }
            Datatype::Boolean | Datatype::Date => None,
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let ok = match self.datatype {
            Datatype::String => true,
            Datatype::Integer => self.value.parse::<i64>().is_ok(),
            Datatype::Decimal => self
                .value
                .parse::<f64>()
                .map(|n| n.is_finite())
                .unwrap_or(false),
            Datatype::Boolean => matches!(self.value.as_str(), "true" | "false"),
            Datatype::Date => NaiveDate::parse_from_str(&self.value, "%Y-%m-%d").is_ok(),
        };
        if !ok {
            return Err(format!(
                "`{}` is not a valid {:?} literal",
                self.value, self.datatype
            ));
        }
        if let Some(tag) = &self.lang {
            if self.datatype != Datatype::String || !is_valid_lang_tag(tag) {
                return Err(format!("`{tag}` is not a valid language tag"));
            }
        }
        Ok(())
    }
}

/// The object position of a [`Triple`]: an IRI or a literal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Term {
    Iri(String),
    Literal(Literal),
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Term::Literal(Literal::string(value))
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            Term::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(lit) => Some(lit),
            Term::Iri(_) => None,
        }
    }

    /// The IRI or the literal's lexical form.
    pub fn lexical(&self) -> &str {
        match self {
            Term::Iri(iri) => iri,
            Term::Literal(lit) => &lit.value,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_literal().and_then(Literal::as_f64)
    }
}

impl From<Literal> for Term {
    fn from(lit: Literal) -> Self {
        Term::Literal(lit)
    }
}

/// SPARQL surface syntax: `<iri>`, `"text"@lang`, `"12"^^<xsd:integer>`.
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::Literal(lit) => {
                write!(f, "\"{}\"", escape_literal(&lit.value))?;
                match (&lit.lang, lit.datatype) {
                    (Some(tag), _) => write!(f, "@{tag}"),
                    (None, Datatype::String) => Ok(()),
                    (None, dt) => write!(f, "^^<{}>", dt.xsd_iri()),
                }
            }
        }
    }
}

fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Is `iri` an absolute IRI (`scheme:rest`) without forbidden characters?
pub fn is_valid_iri(iri: &str) -> bool {
    let Some((scheme, rest)) = iri.split_once(':') else {
        return false;
    };
    let mut scheme_chars = scheme.chars();
    let scheme_ok = scheme_chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme_chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    scheme_ok
        && !rest.is_empty()
        && !iri.chars().any(|c| {
            c.is_whitespace()
                || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '\\' | '^' | '`')
        })
}

/// BCP 47 shape check: `en`, `ro`, `en-GB`.
pub fn is_valid_lang_tag(tag: &str) -> bool {
    let mut parts = tag.split('-');
    let primary_ok = parts
        .next()
        .is_some_and(|p| (1..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphabetic()));
    primary_ok
        && parts.all(|p| {
            (1..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphanumeric())
        })
}

// ---------------------------------------------------------------------------
// Triples and change sets
// ---------------------------------------------------------------------------

/// A single statement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<Term>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Check IRIs and literal lexical forms, reporting every problem found.
    pub fn validate(&self, path: &str, errors: &mut ValidationErrors) {
        if !is_valid_iri(&self.subject) {
            errors.push(FieldError::new(
                format!("{path}.subject"),
                FieldErrorKind::Malformed,
                format!("`{}` is not an absolute IRI", self.subject),
            ));
        }
        if !is_valid_iri(&self.predicate) {
            errors.push(FieldError::new(
                format!("{path}.predicate"),
                FieldErrorKind::Malformed,
                format!("`{}` is not an absolute IRI", self.predicate),
            ));
        }
        let object_problem = match &self.object {
            Term::Iri(iri) if !is_valid_iri(iri) => Some(format!("`{iri}` is not an absolute IRI")),
            Term::Iri(_) => None,
            Term::Literal(lit) => lit.validate().err(),
        };
        if let Some(message) = object_problem {
            errors.push(FieldError::new(
                format!("{path}.object"),
                FieldErrorKind::Malformed,
                message,
            ));
        }
    }
}

/// An atomic batch of writes: retractions are applied before assertions.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub retract: Vec<Triple>,
    pub assert: Vec<Triple>,
    /// Subjects to mark as retired so their URIs are never minted again.
    pub retire: Vec<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assert(&mut self, subject: &str, predicate: &str, object: impl Into<Term>) {
        self.assert.push(Triple::new(subject, predicate, object));
    }

    pub fn retract(&mut self, triple: Triple) {
        self.retract.push(triple);
    }

    pub fn is_empty(&self) -> bool {
        self.retract.is_empty() && self.assert.is_empty() && self.retire.is_empty()
    }
}

/// What a commit actually changed after idempotency is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub asserted: usize,
    pub retracted: usize,
    pub retired: usize,
}

// ---------------------------------------------------------------------------
// In-memory index
// ---------------------------------------------------------------------------

/// Subject/predicate/object indexes over the committed statements.
#[derive(Debug, Clone, Default)]
pub struct TripleIndex {
    by_subject: HashMap<String, BTreeSet<(String, Term)>>,
    by_predicate: HashMap<String, BTreeSet<(String, Term)>>,
    by_object: HashMap<Term, BTreeSet<(String, String)>>,
    retired: BTreeSet<String>,
    len: usize,
}

/// A read-only, point-in-time view of the store.
pub type Snapshot = Arc<TripleIndex>;

impl TripleIndex {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.by_subject
            .get(&triple.subject)
            .is_some_and(|s| s.contains(&(triple.predicate.clone(), triple.object.clone())))
    }

    /// Does any statement have `subject` in subject position?
    pub fn has_subject(&self, subject: &str) -> bool {
        self.by_subject.contains_key(subject)
    }

    pub fn is_retired(&self, uri: &str) -> bool {
        self.retired.contains(uri)
    }

    pub fn retired(&self) -> impl Iterator<Item = &str> {
        self.retired.iter().map(String::as_str)
    }

    /// All `(predicate, object)` pairs describing `subject`.
    pub fn statements_for(&self, subject: &str) -> impl Iterator<Item = (&str, &Term)> {
        self.by_subject
            .get(subject)
            .into_iter()
            .flat_map(|set| set.iter().map(|(p, o)| (p.as_str(), o)))
    }

    /// Objects of `(subject, predicate, ?)`.
    pub fn objects<'a>(
        &'a self,
        subject: &str,
        predicate: &'a str,
    ) -> impl Iterator<Item = &'a Term> {
        self.by_subject
            .get(subject)
            .into_iter()
            .flat_map(move |set| set.iter().filter(move |(p, _)| p == predicate).map(|(_, o)| o))
    }

    /// Subjects of `(?, predicate, object)`.
    pub fn subjects<'a>(
        &'a self,
        predicate: &'a str,
        object: &Term,
    ) -> impl Iterator<Item = &'a str> {
        self.by_object.get(object).into_iter().flat_map(move |set| {
            set.iter()
                .filter(move |(_, p)| p == predicate)
                .map(|(s, _)| s.as_str())
        })
    }

    /// Every `(subject, predicate)` pointing at `object`.
    pub fn references_to(&self, object: &Term) -> impl Iterator<Item = (&str, &str)> {
        self.by_object
            .get(object)
            .into_iter()
            .flat_map(|set| set.iter().map(|(s, p)| (s.as_str(), p.as_str())))
    }

    /// Lazily enumerate triples matching the pattern; `None` is a wildcard.
    ///
    /// The most selective bound position drives the scan: subject, then
    /// object, then predicate. Only an all-wildcard pattern walks the whole
    /// subject index.
    pub fn matching<'a>(
        &'a self,
        subject: Option<&'a str>,
        predicate: Option<&'a str>,
        object: Option<&'a Term>,
    ) -> Box<dyn Iterator<Item = Triple> + 'a> {
        match (subject, predicate, object) {
            (Some(s), _, _) => Box::new(
                self.by_subject
                    .get(s)
                    .into_iter()
                    .flat_map(|set| set.iter())
                    .filter(move |(p, o)| {
                        predicate.is_none_or(|want| want == p)
                            && object.is_none_or(|want| want == o)
                    })
                    .map(move |(p, o)| Triple::new(s, p.clone(), o.clone())),
            ),
            (None, _, Some(o)) => Box::new(
                self.by_object
                    .get(o)
                    .into_iter()
                    .flat_map(|set| set.iter())
                    .filter(move |(_, p)| predicate.is_none_or(|want| want == p))
                    .map(move |(s, p)| Triple::new(s.clone(), p.clone(), o.clone())),
            ),
            (None, Some(p), None) => Box::new(
                self.by_predicate
                    .get(p)
                    .into_iter()
                    .flat_map(|set| set.iter())
                    .map(move |(s, o)| Triple::new(s.clone(), p, o.clone())),
            ),
            (None, None, None) => Box::new(self.by_subject.iter().flat_map(|(s, set)| {
                set.iter()
                    .map(move |(p, o)| Triple::new(s.clone(), p.clone(), o.clone()))
            })),
        }
    }

    fn insert(&mut self, triple: &Triple) -> bool {
        let added = self
            .by_subject
            .entry(triple.subject.clone())
            .or_default()
            .insert((triple.predicate.clone(), triple.object.clone()));
        if added {
            self.by_predicate
                .entry(triple.predicate.clone())
                .or_default()
                .insert((triple.subject.clone(), triple.object.clone()));
            self.by_object
                .entry(triple.object.clone())
                .or_default()
                .insert((triple.subject.clone(), triple.predicate.clone()));
            self.len += 1;
        }
        added
    }

    fn remove(&mut self, triple: &Triple) -> bool {
        let key = (triple.predicate.clone(), triple.object.clone());
        let removed = match self.by_subject.get_mut(&triple.subject) {
            Some(set) => {
                let removed = set.remove(&key);
                if set.is_empty() {
                    self.by_subject.remove(&triple.subject);
                }
                removed
            }
            None => false,
        };
        if !removed {
            return false;
        }
        if let Some(set) = self.by_predicate.get_mut(&triple.predicate) {
            set.remove(&(triple.subject.clone(), triple.object.clone()));
            if set.is_empty() {
                self.by_predicate.remove(&triple.predicate);
            }
        }
        if let Some(set) = self.by_object.get_mut(&triple.object) {
            set.remove(&(triple.subject.clone(), triple.predicate.clone()));
            if set.is_empty() {
                self.by_object.remove(&triple.object);
            }
        }
        self.len -= 1;
        true
    }

    /// Cross-check the three indexes against each other.
    fn verify(&self) -> std::result::Result<(), String> {
        let subject_count: usize = self.by_subject.values().map(BTreeSet::len).sum();
        let predicate_count: usize = self.by_predicate.values().map(BTreeSet::len).sum();
        let object_count: usize = self.by_object.values().map(BTreeSet::len).sum();
        if subject_count != self.len || predicate_count != self.len || object_count != self.len {
            return Err(format!(
                "index sizes disagree: len={} subject={subject_count} \
                 predicate={predicate_count} object={object_count}",
                self.len
            ));
        }
        for (subject, set) in &self.by_subject {
            for (predicate, object) in set {
                let in_predicate = self
                    .by_predicate
                    .get(predicate)
                    .is_some_and(|p| p.contains(&(subject.clone(), object.clone())));
                let in_object = self
                    .by_object
                    .get(object)
                    .is_some_and(|o| o.contains(&(subject.clone(), predicate.clone())));
                if !in_predicate || !in_object {
                    return Err(format!(
                        "statement <{subject}> <{predicate}> {object} missing from secondary index"
                    ));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Durable triple store.
///
/// # Example
///
/// ```rust,no_run
/// use provenance_graph::triple_store::{Term, TripleStore};
///
/// let store = TripleStore::open_in_memory().unwrap();
/// store
///     .assert("http://example.org/a", "http://example.org/name", Term::string("A"))
///     .unwrap();
/// assert_eq!(store.statements_for("http://example.org/a").unwrap().len(), 1);
/// ```
pub struct TripleStore {
    db: Database,
    current: RwLock<Snapshot>,
    writer: Mutex<()>,
}

impl TripleStore {
    /// Open or create a store file at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Create a store with no file backing. Data is lost on drop.
    pub fn open_in_memory() -> Result<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder().create_with_backend(backend)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        {
            let write_txn = db.begin_write()?;
            write_txn.open_table(TRIPLES)?;
            write_txn.open_table(RETIRED)?;
            write_txn.commit()?;
        }
        let index = Self::rebuild_index_from_db(&db)?;
        debug!(triples = index.len(), "triple index rebuilt");
        Ok(Self {
            db,
            current: RwLock::new(Arc::new(index)),
            writer: Mutex::new(()),
        })
    }

    /// Read every persisted row and build a fresh in-memory index.
    ///
    /// A row that does not decode, or decodes to an invalid statement, means
    /// the file is not something this store wrote; that is reported as
    /// corruption rather than skipped.
    fn rebuild_index_from_db(db: &Database) -> Result<TripleIndex> {
        let mut index = TripleIndex::default();
        let read_txn = db.begin_read()?;

        let triples = read_txn.open_table(TRIPLES)?;
        for entry in triples.iter()? {
            let (key, _) = entry?;
            let triple: Triple = serde_json::from_str(key.value()).map_err(|e| {
                ProvenanceError::StoreCorruption(format!("undecodable triple row: {e}"))
            })?;
            let mut errors = ValidationErrors::default();
            triple.validate("row", &mut errors);
            if !errors.is_empty() {
                return Err(ProvenanceError::StoreCorruption(format!(
                    "persisted triple failed validation: {errors}"
                )));
            }
            index.insert(&triple);
        }

        let retired = read_txn.open_table(RETIRED)?;
        for entry in retired.iter()? {
            let (key, _) = entry?;
            index.retired.insert(key.value().to_string());
        }

        Ok(index)
    }

    /// The current committed view. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.current
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| ProvenanceError::Internal("triple index lock poisoned".into()))
    }

    /// Apply a change set atomically.
    ///
    /// Asserting a present triple and retracting an absent one are no-ops.
    /// Every triple is validated before anything is written; one malformed
    /// triple rejects the whole set.
    pub fn commit(&self, changes: &ChangeSet) -> Result<CommitSummary> {
        let mut errors = ValidationErrors::default();
        for (i, triple) in changes.assert.iter().enumerate() {
            triple.validate(&format!("assert[{i}]"), &mut errors);
        }
        for (i, triple) in changes.retract.iter().enumerate() {
            triple.validate(&format!("retract[{i}]"), &mut errors);
        }
        for (i, uri) in changes.retire.iter().enumerate() {
            if !is_valid_iri(uri) {
                errors.push(FieldError::new(
                    format!("retire[{i}]"),
                    FieldErrorKind::Malformed,
                    format!("`{uri}` is not an absolute IRI"),
                ));
            }
        }
        errors.into_result()?;

        let _writer = self
            .writer
            .lock()
            .map_err(|_| ProvenanceError::Internal("writer lock poisoned".into()))?;
        let base = self.snapshot()?;

        // Net effect against the committed state, in change-set order.
        let mut removed: BTreeSet<&Triple> = BTreeSet::new();
        let mut added: BTreeSet<&Triple> = BTreeSet::new();
        for triple in &changes.retract {
            if !added.remove(triple) && base.contains(triple) {
                removed.insert(triple);
            }
        }
        for triple in &changes.assert {
            if !removed.remove(triple) && !base.contains(triple) {
                added.insert(triple);
            }
        }
        let retire: BTreeSet<&String> = changes
            .retire
            .iter()
            .filter(|uri| !base.is_retired(uri))
            .collect();

        let summary = CommitSummary {
            asserted: added.len(),
            retracted: removed.len(),
            retired: retire.len(),
        };
        if summary == CommitSummary::default() {
            return Ok(summary);
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TRIPLES)?;
            for triple in &removed {
                let key = serde_json::to_string(triple)?;
                table.remove(key.as_str())?;
            }
            for triple in &added {
                let key = serde_json::to_string(triple)?;
                table.insert(key.as_str(), "")?;
            }
        }
        if !retire.is_empty() {
            let retired_at = Utc::now().to_rfc3339();
            let mut table = write_txn.open_table(RETIRED)?;
            for uri in &retire {
                table.insert(uri.as_str(), retired_at.as_str())?;
            }
        }
        write_txn.commit()?;

        // Publish after the durable commit. Readers holding `base` keep
        // their view; make_mut copies the index only in that case.
        drop(base);
        {
            let mut guard = self
                .current
                .write()
                .map_err(|_| ProvenanceError::Internal("triple index lock poisoned".into()))?;
            let index = Arc::make_mut(&mut guard);
            for triple in &removed {
                index.remove(triple);
            }
            for triple in &added {
                index.insert(triple);
            }
            for uri in retire {
                index.retired.insert(uri.clone());
            }
        }

        debug!(
            asserted = summary.asserted,
            retracted = summary.retracted,
            retired = summary.retired,
            "committed change set"
        );
        Ok(summary)
    }

    /// Assert one statement. Idempotent.
    pub fn assert(&self, subject: &str, predicate: &str, object: impl Into<Term>) -> Result<bool> {
        let mut changes = ChangeSet::new();
        changes.assert(subject, predicate, object);
        Ok(self.commit(&changes)?.asserted == 1)
    }

    /// Retract one statement. Retracting an absent statement is a no-op.
    pub fn retract(&self, subject: &str, predicate: &str, object: impl Into<Term>) -> Result<bool> {
        let mut changes = ChangeSet::new();
        changes.retract(Triple::new(subject, predicate, object));
        Ok(self.commit(&changes)?.retracted == 1)
    }

    /// The `(predicate, object)` set describing `subject`.
    pub fn statements_for(&self, subject: &str) -> Result<BTreeSet<(String, Term)>> {
        let snapshot = self.snapshot()?;
        Ok(snapshot
            .statements_for(subject)
            .map(|(p, o)| (p.to_string(), o.clone()))
            .collect())
    }

    /// Verify the in-memory indexes against each other and against redb.
    ///
    /// Any disagreement is [`ProvenanceError::StoreCorruption`]; nothing is
    /// repaired.
    pub fn check_integrity(&self) -> Result<()> {
        let _writer = self
            .writer
            .lock()
            .map_err(|_| ProvenanceError::Internal("writer lock poisoned".into()))?;
        let snapshot = self.snapshot()?;
        snapshot.verify().map_err(ProvenanceError::StoreCorruption)?;

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRIPLES)?;
        let mut persisted = 0usize;
        for entry in table.iter()? {
            let (key, _) = entry?;
            let triple: Triple = serde_json::from_str(key.value()).map_err(|e| {
                ProvenanceError::StoreCorruption(format!("undecodable triple row: {e}"))
            })?;
            if !snapshot.contains(&triple) {
                return Err(ProvenanceError::StoreCorruption(format!(
                    "persisted statement <{}> <{}> {} is not indexed",
                    triple.subject, triple.predicate, triple.object
                )));
            }
            persisted += 1;
        }
        if persisted != snapshot.len() {
            return Err(ProvenanceError::StoreCorruption(format!(
                "index holds {} statements but {persisted} are persisted",
                snapshot.len()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
