//! Graph-pattern queries over the store, optionally federated.
//!
//! A [`PatternSet`] is validated and compiled into resolved groups, then
//! evaluated as a nested-loop join over a snapshot. Patterns are ordered
//! greedily by selectivity: a bound subject first, then a bound object,
//! then a bound predicate, where variables bound by earlier patterns count
//! as bound. OPTIONAL groups are left-outer joins, filters run after the
//! group's patterns.
//!
//! Federation is a bind join. Local rows are computed first; for every row
//! whose join variables hold IRIs that are not described locally (external
//! link targets), the remote group is sent to each named endpoint with those
//! values bound. Identical requests are sent once. An endpoint failure is
//! recorded in its [`EndpointStatus`] and leaves the local rows untouched.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::federation::{FederationError, RemoteEndpoint, RemoteQuery};
use crate::ontology::RDF_TYPE;
use crate::query_parser::parse_query;
use crate::triple_store::{is_valid_iri, Literal, Snapshot, Term, TripleIndex};
use crate::{FieldError, FieldErrorKind, ProvenanceGraph, Result, ValidationErrors};

/// Variable name → value for one solution.
pub type Binding = BTreeMap<String, Term>;

/// Source tag for rows produced by the local store.
pub const LOCAL_SOURCE: &str = "local";

// ---------------------------------------------------------------------------
// Pattern sets (input)
// ---------------------------------------------------------------------------

/// One position of a triple pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternTerm {
    Var(String),
    Iri(String),
    /// `prefix:local`, resolved against the pattern set's prefixes and the
    /// built-in ones.
    Prefixed(String),
    Literal(Literal),
}

impl PatternTerm {
    pub fn var(name: &str) -> Self {
        PatternTerm::Var(name.trim_start_matches('?').to_string())
    }

    pub fn iri(iri: &str) -> Self {
        PatternTerm::Iri(iri.to_string())
    }

    pub fn prefixed(name: &str) -> Self {
        PatternTerm::Prefixed(name.to_string())
    }

    pub fn string(value: &str) -> Self {
        PatternTerm::Literal(Literal::string(value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriplePattern {
    pub subject: PatternTerm,
    pub predicate: PatternTerm,
    pub object: PatternTerm,
}

impl TriplePattern {
    pub fn new(subject: PatternTerm, predicate: PatternTerm, object: PatternTerm) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

/// Value filters. An unbound variable fails every filter except `not_bound`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Equals { var: String, value: PatternTerm },
    NotEquals { var: String, value: PatternTerm },
    Contains {
        var: String,
        needle: String,
        #[serde(default)]
        case_insensitive: bool,
    },
    Regex {
        var: String,
        pattern: String,
        #[serde(default)]
        case_insensitive: bool,
    },
    /// Numeric when both sides are numbers, lexical otherwise.
    LessThan { var: String, value: PatternTerm },
    GreaterThan { var: String, value: PatternTerm },
    Bound { var: String },
    NotBound { var: String },
}

/// A conjunction of patterns with optional sub-groups and filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternGroup {
    pub patterns: Vec<TriplePattern>,
    pub optional: Vec<PatternGroup>,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSet {
    pub prefixes: BTreeMap<String, String>,
    /// Projected variables; empty selects every variable.
    pub select: Vec<String>,
    pub group: PatternGroup,
    /// Patterns answered by remote endpoints.
    pub remote: Option<PatternGroup>,
    pub limit: Option<usize>,
}

/// A pattern set plus the endpoints to federate with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub pattern_set: PatternSet,
    pub endpoints: Vec<String>,
    /// Overrides the configured overall timeout.
    pub timeout_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingRow {
    pub values: Binding,
    /// `local` and/or the names of endpoints that contributed values.
    pub sources: BTreeSet<String>,
}

impl BindingRow {
    fn local(values: Binding) -> Self {
        Self {
            values,
            sources: BTreeSet::from([LOCAL_SOURCE.to_string()]),
        }
    }

    pub fn get(&self, var: &str) -> Option<&Term> {
        self.values.get(var)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EndpointState {
    Ok,
    /// No row had an external join value, or there was no remote group.
    Skipped,
    /// The overall deadline passed before every request was sent.
    Truncated,
    Failed { error: FederationError },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStatus {
    pub endpoint: String,
    #[serde(flatten)]
    pub state: EndpointState,
    pub requests: usize,
    pub rows: usize,
    pub elapsed_ms: u64,
}

impl EndpointStatus {
    fn new(endpoint: &str, state: EndpointState) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            state,
            requests: 0,
            rows: 0,
            elapsed_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMetadata {
    pub elapsed_ms: u64,
    pub result_count: usize,
    pub truncated: bool,
    pub endpoints: Vec<EndpointStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub variables: Vec<String>,
    pub rows: Vec<BindingRow>,
    pub metadata: QueryMetadata,
}

// ---------------------------------------------------------------------------
// Compiled form
// ---------------------------------------------------------------------------

/// A resolved pattern position.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Var(String),
    Term(Term),
}

impl Slot {
    fn var(&self) -> Option<&str> {
        match self {
            Slot::Var(v) => Some(v),
            Slot::Term(_) => None,
        }
    }

    fn is_bound(&self, bound: &BTreeSet<String>) -> bool {
        match self {
            Slot::Var(v) => bound.contains(v),
            Slot::Term(_) => true,
        }
    }

    fn value<'a>(&'a self, row: &'a Binding) -> Option<&'a Term> {
        match self {
            Slot::Var(v) => row.get(v),
            Slot::Term(t) => Some(t),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPattern {
    pub subject: Slot,
    pub predicate: Slot,
    pub object: Slot,
}

impl ResolvedPattern {
    fn slots(&self) -> [&Slot; 3] {
        [&self.subject, &self.predicate, &self.object]
    }
}

#[derive(Debug, Clone)]
pub enum ResolvedFilter {
    Equals { var: String, value: Term },
    NotEquals { var: String, value: Term },
    Contains { var: String, needle: String, case_insensitive: bool },
    Regex { var: String, regex: Regex, pattern: String, case_insensitive: bool },
    LessThan { var: String, value: Term },
    GreaterThan { var: String, value: Term },
    Bound { var: String },
    NotBound { var: String },
}

impl ResolvedFilter {
    pub fn var(&self) -> &str {
        match self {
            ResolvedFilter::Equals { var, .. }
            | ResolvedFilter::NotEquals { var, .. }
            | ResolvedFilter::Contains { var, .. }
            | ResolvedFilter::Regex { var, .. }
            | ResolvedFilter::LessThan { var, .. }
            | ResolvedFilter::GreaterThan { var, .. }
            | ResolvedFilter::Bound { var }
            | ResolvedFilter::NotBound { var } => var,
        }
    }

    pub fn accepts(&self, row: &Binding) -> bool {
        let value = row.get(self.var());
        match self {
            ResolvedFilter::Bound { .. } => value.is_some(),
            ResolvedFilter::NotBound { .. } => value.is_none(),
            ResolvedFilter::Equals { value: want, .. } => {
                value.is_some_and(|v| terms_equal(v, want))
            }
            ResolvedFilter::NotEquals { value: want, .. } => {
                value.is_some_and(|v| !terms_equal(v, want))
            }
            ResolvedFilter::Contains {
                needle,
                case_insensitive,
                ..
            } => value.is_some_and(|v| {
                if *case_insensitive {
                    v.lexical().to_lowercase().contains(&needle.to_lowercase())
                } else {
                    v.lexical().contains(needle.as_str())
                }
            }),
            ResolvedFilter::Regex { regex, .. } => {
                value.is_some_and(|v| regex.is_match(v.lexical()))
            }
            ResolvedFilter::LessThan { value: bound, .. } => {
                value.is_some_and(|v| compare_terms(v, bound) == std::cmp::Ordering::Less)
            }
            ResolvedFilter::GreaterThan { value: bound, .. } => {
                value.is_some_and(|v| compare_terms(v, bound) == std::cmp::Ordering::Greater)
            }
        }
    }
}

fn terms_equal(a: &Term, b: &Term) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Term::Literal(x), Term::Literal(y)) => {
            (x.value == y.value && x.lang == y.lang)
                || matches!((x.as_f64(), y.as_f64()), (Some(m), Some(n)) if m == n)
        }
        _ => false,
    }
}

fn compare_terms(a: &Term, b: &Term) -> std::cmp::Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.lexical().cmp(b.lexical()),
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedGroup {
    pub patterns: Vec<ResolvedPattern>,
    pub optional: Vec<Arc<ResolvedGroup>>,
    pub filters: Vec<ResolvedFilter>,
}

impl ResolvedGroup {
    /// Variables mentioned by the group's patterns, including optionals.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut vars: BTreeSet<String> = self
            .patterns
            .iter()
            .flat_map(|p| p.slots())
            .filter_map(|s| s.var().map(str::to_string))
            .collect();
        for optional in &self.optional {
            vars.extend(optional.variables());
        }
        vars
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledQuery {
    pub select: Vec<String>,
    pub group: Arc<ResolvedGroup>,
    pub remote: Option<Arc<ResolvedGroup>>,
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Validation / compilation
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum Position {
    Subject,
    Predicate,
    Object,
}

struct Compiler<'a> {
    prefixes: BTreeMap<&'a str, &'a str>,
    errors: ValidationErrors,
}

fn is_valid_var(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

impl<'a> Compiler<'a> {
    fn error(&mut self, path: impl Into<String>, kind: FieldErrorKind, message: impl Into<String>) {
        self.errors.push(FieldError::new(path, kind, message));
    }

    fn iri(&mut self, path: &str, iri: String) -> Option<Term> {
        if is_valid_iri(&iri) {
            Some(Term::Iri(iri))
        } else {
            self.error(path, FieldErrorKind::Malformed, format!("`{iri}` is not an absolute IRI"));
            None
        }
    }

    fn expand(&mut self, path: &str, name: &str) -> Option<Term> {
        let Some((prefix, local)) = name.split_once(':') else {
            self.error(path, FieldErrorKind::Malformed, format!("`{name}` is not a prefixed name"));
            return None;
        };
        match self.prefixes.get(prefix) {
            Some(ns) => {
                let iri = format!("{ns}{local}");
                self.iri(path, iri)
            }
            None => {
                self.error(path, FieldErrorKind::Unknown, format!("undefined prefix `{prefix}`"));
                None
            }
        }
    }

    fn term(&mut self, path: &str, term: &PatternTerm) -> Option<Term> {
        match term {
            PatternTerm::Var(_) => {
                self.error(path, FieldErrorKind::Malformed, "a variable is not allowed here");
                None
            }
            PatternTerm::Iri(iri) => self.iri(path, iri.clone()),
            PatternTerm::Prefixed(name) => self.expand(path, name),
            PatternTerm::Literal(lit) => Some(Term::Literal(lit.clone())),
        }
    }

    fn var(&mut self, path: &str, name: &str) -> Option<String> {
        let name = name.trim_start_matches('?');
        if is_valid_var(name) {
            Some(name.to_string())
        } else {
            self.error(path, FieldErrorKind::Malformed, format!("`{name}` is not a variable name"));
            None
        }
    }

    fn slot(&mut self, path: String, term: &PatternTerm, position: Position) -> Option<Slot> {
        match term {
            PatternTerm::Var(name) => self.var(&path, name).map(Slot::Var),
            PatternTerm::Literal(_) if position != Position::Object => {
                self.error(
                    path,
                    FieldErrorKind::Malformed,
                    "a literal is only allowed in object position",
                );
                None
            }
            other => self.term(&path, other).map(Slot::Term),
        }
    }

    fn filter(&mut self, path: String, filter: &Filter) -> Option<ResolvedFilter> {
        let var_path = format!("{path}.var");
        let value_path = format!("{path}.value");
        Some(match filter {
            Filter::Equals { var, value } => ResolvedFilter::Equals {
                var: self.var(&var_path, var)?,
                value: self.term(&value_path, value)?,
            },
            Filter::NotEquals { var, value } => ResolvedFilter::NotEquals {
                var: self.var(&var_path, var)?,
                value: self.term(&value_path, value)?,
            },
            Filter::LessThan { var, value } => ResolvedFilter::LessThan {
                var: self.var(&var_path, var)?,
                value: self.term(&value_path, value)?,
            },
            Filter::GreaterThan { var, value } => ResolvedFilter::GreaterThan {
                var: self.var(&var_path, var)?,
                value: self.term(&value_path, value)?,
            },
            Filter::Contains {
                var,
                needle,
                case_insensitive,
            } => ResolvedFilter::Contains {
                var: self.var(&var_path, var)?,
                needle: needle.clone(),
                case_insensitive: *case_insensitive,
            },
            Filter::Regex {
                var,
                pattern,
                case_insensitive,
            } => {
                let var = self.var(&var_path, var)?;
                let source = if *case_insensitive {
                    format!("(?i){pattern}")
                } else {
                    pattern.clone()
                };
                match Regex::new(&source) {
                    Ok(regex) => ResolvedFilter::Regex {
                        var,
                        regex,
                        pattern: pattern.clone(),
                        case_insensitive: *case_insensitive,
                    },
                    Err(e) => {
                        let path = format!("{path}.pattern");
                        self.error(path, FieldErrorKind::Malformed, e.to_string());
                        return None;
                    }
                }
            }
            Filter::Bound { var } => ResolvedFilter::Bound {
                var: self.var(&var_path, var)?,
            },
            Filter::NotBound { var } => ResolvedFilter::NotBound {
                var: self.var(&var_path, var)?,
            },
        })
    }

    /// `depth` is 0 for a top-level group, 1 inside OPTIONAL.
    fn group(&mut self, path: &str, group: &PatternGroup, depth: usize) -> ResolvedGroup {
        if group.patterns.is_empty() {
            self.error(
                format!("{path}.patterns"),
                FieldErrorKind::Missing,
                "a group needs at least one triple pattern",
            );
        }
        let mut patterns = Vec::with_capacity(group.patterns.len());
        for (i, p) in group.patterns.iter().enumerate() {
            let base = format!("{path}.patterns[{i}]");
            let subject = self.slot(format!("{base}.subject"), &p.subject, Position::Subject);
            let predicate =
                self.slot(format!("{base}.predicate"), &p.predicate, Position::Predicate);
            let object = self.slot(format!("{base}.object"), &p.object, Position::Object);
            if let (Some(subject), Some(predicate), Some(object)) = (subject, predicate, object) {
                patterns.push(ResolvedPattern {
                    subject,
                    predicate,
                    object,
                });
            }
        }

        if depth >= 1 && !group.optional.is_empty() {
            self.error(
                format!("{path}.optional"),
                FieldErrorKind::Malformed,
                "OPTIONAL groups nest at most one level",
            );
        }
        let optional = group
            .optional
            .iter()
            .enumerate()
            .map(|(i, g)| Arc::new(self.group(&format!("{path}.optional[{i}]"), g, depth + 1)))
            .collect();

        let filters = group
            .filters
            .iter()
            .enumerate()
            .filter_map(|(i, f)| self.filter(format!("{path}.filters[{i}]"), f))
            .collect();

        ResolvedGroup {
            patterns,
            optional,
            filters,
        }
    }
}

/// Validate a pattern set and resolve every prefixed name.
pub(crate) fn compile(
    set: &PatternSet,
    builtin_prefixes: &BTreeMap<String, String>,
) -> Result<CompiledQuery> {
    let mut compiler = Compiler {
        prefixes: builtin_prefixes
            .iter()
            .map(|(p, ns)| (p.as_str(), ns.as_str()))
            .collect(),
        errors: ValidationErrors::default(),
    };
    for (prefix, ns) in &set.prefixes {
        if !is_valid_iri(ns) {
            compiler.error(
                format!("prefixes.{prefix}"),
                FieldErrorKind::Malformed,
                format!("`{ns}` is not an absolute IRI"),
            );
        }
        compiler.prefixes.insert(prefix.as_str(), ns.as_str());
    }

    let group = compiler.group("group", &set.group, 0);
    let remote = set.remote.as_ref().map(|g| compiler.group("remote", g, 0));

    let mut bindable = group.variables();
    if let Some(remote) = &remote {
        let remote_vars = remote.variables();
        if !remote.patterns.is_empty() && remote_vars.is_disjoint(&bindable) {
            compiler.error(
                "remote",
                FieldErrorKind::Malformed,
                "the remote group shares no variable with the local patterns",
            );
        }
        bindable.extend(remote_vars);
    }
    let mut select = Vec::with_capacity(set.select.len());
    for (i, var) in set.select.iter().enumerate() {
        let path = format!("select[{i}]");
        if let Some(name) = compiler.var(&path, var) {
            if bindable.contains(&name) {
                select.push(name);
            } else {
                let message = format!("?{name} is never bound by any pattern");
                compiler.error(path, FieldErrorKind::Malformed, message);
            }
        }
    }

    compiler.errors.into_result()?;
    Ok(CompiledQuery {
        select,
        group: Arc::new(group),
        remote: remote.map(Arc::new),
        limit: set.limit,
    })
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

type BindingIter = Box<dyn Iterator<Item = Binding> + Send>;

/// Greedy join order: most selective remaining pattern first.
fn plan(patterns: &[ResolvedPattern], seed: &BTreeSet<String>) -> Vec<usize> {
    let mut bound = seed.clone();
    let mut remaining: Vec<usize> = (0..patterns.len()).collect();
    let mut order = Vec::with_capacity(patterns.len());
    while !remaining.is_empty() {
        let (pos, best) = remaining
            .iter()
            .copied()
            .enumerate()
            .min_by_key(|&(_, i)| {
                let p = &patterns[i];
                let (s, pr, o) = (
                    p.subject.is_bound(&bound),
                    p.predicate.is_bound(&bound),
                    p.object.is_bound(&bound),
                );
                let primary = if s {
                    0
                } else if o {
                    1
                } else if pr {
                    2
                } else {
                    3
                };
                let free = [s, pr, o].iter().filter(|b| !**b).count();
                (primary, free, i)
            })
            .unwrap_or((0, remaining[0]));
        remaining.remove(pos);
        for slot in patterns[best].slots() {
            if let Some(v) = slot.var() {
                bound.insert(v.to_string());
            }
        }
        order.push(best);
    }
    order
}

/// Extend one row with every match of one pattern.
fn extend(snap: &TripleIndex, pattern: &ResolvedPattern, row: &Binding) -> Vec<Binding> {
    let subject = pattern.subject.value(row);
    let predicate = pattern.predicate.value(row);
    let object = pattern.object.value(row);

    // Subjects and predicates are always IRIs.
    let subject_iri = match subject {
        Some(Term::Iri(iri)) => Some(iri.as_str()),
        Some(Term::Literal(_)) => return Vec::new(),
        None => None,
    };
    let predicate_iri = match predicate {
        Some(Term::Iri(iri)) => Some(iri.as_str()),
        Some(Term::Literal(_)) => return Vec::new(),
        None => None,
    };

    snap.matching(subject_iri, predicate_iri, object)
        .filter_map(|triple| {
            let mut next = row.clone();
            let values = [
                (&pattern.subject, Term::Iri(triple.subject)),
                (&pattern.predicate, Term::Iri(triple.predicate)),
                (&pattern.object, triple.object),
            ];
            for (slot, value) in values {
                if let Slot::Var(name) = slot {
                    match next.get(name) {
                        Some(existing) if *existing != value => return None,
                        Some(_) => {}
                        None => {
                            next.insert(name.clone(), value);
                        }
                    }
                }
            }
            Some(next)
        })
        .collect()
}

/// Lazily solve `group` starting from `seed`.
fn solve(snap: Snapshot, group: Arc<ResolvedGroup>, seed: Binding) -> BindingIter {
    let seeded: BTreeSet<String> = seed.keys().cloned().collect();
    let order = plan(&group.patterns, &seeded);
    debug!(?order, patterns = group.patterns.len(), "join order");

    let mut iter: BindingIter = Box::new(std::iter::once(seed));
    for idx in order {
        let snap = Arc::clone(&snap);
        let group = Arc::clone(&group);
        iter = Box::new(iter.flat_map(move |row| extend(&snap, &group.patterns[idx], &row)));
    }
    for optional in group.optional.iter().cloned() {
        let snap = Arc::clone(&snap);
        iter = Box::new(iter.flat_map(move |row| {
            let extended: Vec<Binding> =
                solve(Arc::clone(&snap), Arc::clone(&optional), row.clone()).collect();
            if extended.is_empty() {
                vec![row]
            } else {
                extended
            }
        }));
    }
    if group.filters.is_empty() {
        return iter;
    }
    Box::new(iter.filter(move |row| group.filters.iter().all(|f| f.accepts(row))))
}

fn project(values: Binding, select: &[String]) -> Binding {
    if select.is_empty() {
        return values;
    }
    values
        .into_iter()
        .filter(|(k, _)| select.iter().any(|s| s == k))
        .collect()
}

/// A lazy stream of local solutions, projected onto the selected variables.
pub struct BindingStream {
    inner: BindingIter,
    select: Vec<String>,
    remaining: Option<usize>,
}

impl Iterator for BindingStream {
    type Item = Binding;

    fn next(&mut self) -> Option<Binding> {
        if self.remaining == Some(0) {
            return None;
        }
        let values = self.inner.next()?;
        if let Some(n) = self.remaining.as_mut() {
            *n -= 1;
        }
        Some(project(values, &self.select))
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Is `row` consistent with the remote binding on shared variables?
fn compatible(row: &Binding, remote: &Binding) -> bool {
    remote
        .iter()
        .all(|(k, v)| row.get(k).is_none_or(|existing| existing == v))
}

/// Only IRIs that are not typed entities of this graph are looked up
/// remotely; link targets carry a source label but no class.
fn is_external(snap: &TripleIndex, iri: &str) -> bool {
    snap.objects(iri, RDF_TYPE).next().is_none()
}

/// Bind-join `rows` with one endpoint. Returns the merged rows unless the
/// endpoint failed, in which case the caller keeps its rows unchanged.
fn federate(
    snap: &TripleIndex,
    endpoint: &dyn RemoteEndpoint,
    remote: &Arc<ResolvedGroup>,
    local_vars: &BTreeSet<String>,
    rows: &[BindingRow],
    deadline: Instant,
) -> (Option<Vec<BindingRow>>, EndpointStatus) {
    let started = Instant::now();
    let name = endpoint.name();
    let remote_vars = remote.variables();
    let join_vars: Vec<&String> = remote_vars.intersection(local_vars).collect();
    let variables: Vec<String> = remote_vars.iter().cloned().collect();

    let mut status = EndpointStatus::new(name, EndpointState::Skipped);
    let mut cache: HashMap<Binding, Vec<Binding>> = HashMap::new();
    let mut merged = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        let key: Option<Binding> = join_vars
            .iter()
            .map(|var| match row.values.get(*var) {
                Some(Term::Iri(iri)) if is_external(snap, iri) => {
                    Some(((*var).clone(), Term::Iri(iri.clone())))
                }
                _ => None,
            })
            .collect();
        let Some(key) = key else {
            merged.push(row.clone());
            continue;
        };

        if !cache.contains_key(&key) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    endpoint = name,
                    pending = rows.len() - i,
                    "query deadline reached during federation"
                );
                status.state = EndpointState::Truncated;
                merged.extend(rows[i..].iter().cloned());
                status.elapsed_ms = elapsed_ms(started);
                return (Some(merged), status);
            }
            let per_call = remaining.min(endpoint.timeout());
            let request = RemoteQuery {
                variables: variables.clone(),
                group: Arc::clone(remote),
                bindings: key.clone(),
                limit: None,
            };
            status.requests += 1;
            match endpoint.query(&request, per_call) {
                Ok(bindings) => {
                    status.rows += bindings.len();
                    cache.insert(key.clone(), bindings);
                }
                Err(error) => {
                    warn!(endpoint = name, %error, "federated sub-query failed");
                    status.state = EndpointState::Failed { error };
                    status.elapsed_ms = elapsed_ms(started);
                    return (None, status);
                }
            }
        }

        let mut matched = false;
        for remote_row in cache.get(&key).into_iter().flatten() {
            if compatible(&row.values, remote_row) {
                let mut values = row.values.clone();
                values.extend(remote_row.iter().map(|(k, v)| (k.clone(), v.clone())));
                let mut sources = row.sources.clone();
                sources.insert(name.to_string());
                merged.push(BindingRow { values, sources });
                matched = true;
            }
        }
        if !matched {
            merged.push(row.clone());
        }
    }

    if status.requests > 0 {
        status.state = EndpointState::Ok;
    }
    status.elapsed_ms = elapsed_ms(started);
    (Some(merged), status)
}

impl ProvenanceGraph {
    /// Lazily enumerate local solutions. The remote group, if any, is
    /// ignored; the snapshot is fixed when the stream is created.
    pub fn stream(&self, set: &PatternSet) -> Result<BindingStream> {
        let compiled = compile(set, self.ontology.prefixes())?;
        let snap = self.store.snapshot()?;
        Ok(BindingStream {
            inner: solve(snap, compiled.group, Binding::new()),
            select: compiled.select,
            remaining: compiled.limit,
        })
    }

    /// Run a local query. A pattern set with a remote group needs an
    /// endpoint; use [`ProvenanceGraph::execute`] for that.
    pub fn query(&self, set: &PatternSet) -> Result<QueryResult> {
        self.execute(&QueryRequest {
            pattern_set: set.clone(),
            ..Default::default()
        })
    }

    /// Run a query federated with one endpoint.
    pub fn federated_query(&self, endpoint: &str, set: &PatternSet) -> Result<QueryResult> {
        self.execute(&QueryRequest {
            pattern_set: set.clone(),
            endpoints: vec![endpoint.to_string()],
            timeout_ms: None,
        })
    }

    /// Parse query text and run it, federating with the endpoints named in
    /// its `SERVICE` clause. A `SERVICE` block without a name uses every
    /// registered endpoint.
    pub fn query_text(&self, text: &str) -> Result<QueryResult> {
        let parsed = parse_query(text)?;
        let endpoints = if parsed.pattern_set.remote.is_some() && parsed.endpoints.is_empty() {
            self.endpoint_names()?
        } else {
            parsed.endpoints
        };
        self.execute(&QueryRequest {
            pattern_set: parsed.pattern_set,
            endpoints,
            timeout_ms: None,
        })
    }

    pub fn execute(&self, request: &QueryRequest) -> Result<QueryResult> {
        let started = Instant::now();
        let timeout = request
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.query.timeout());
        let deadline = started + timeout;

        let compiled = compile(&request.pattern_set, self.ontology.prefixes())?;
        if compiled.remote.is_some() && request.endpoints.is_empty() {
            return Err(ValidationErrors::single(
                "remote",
                FieldErrorKind::Missing,
                "a remote group needs at least one endpoint",
            )
            .into());
        }

        let snap = self.store.snapshot()?;
        let cap = compiled.limit.unwrap_or(self.config.query.max_rows);
        let mut truncated = false;
        let mut rows: Vec<BindingRow> = Vec::new();
        for values in solve(Arc::clone(&snap), Arc::clone(&compiled.group), Binding::new()) {
            if Instant::now() >= deadline {
                truncated = true;
                break;
            }
            if rows.len() == cap {
                truncated |= compiled.limit.is_none();
                break;
            }
            rows.push(BindingRow::local(values));
        }

        let mut statuses = Vec::with_capacity(request.endpoints.len());
        let local_vars = compiled.group.variables();
        for name in &request.endpoints {
            let Some(remote) = &compiled.remote else {
                statuses.push(EndpointStatus::new(name, EndpointState::Skipped));
                continue;
            };
            let Some(endpoint) = self.endpoint(name)? else {
                warn!(endpoint = %name, "unknown endpoint");
                statuses.push(EndpointStatus::new(
                    name,
                    EndpointState::Failed {
                        error: FederationError::UnknownEndpoint(name.clone()),
                    },
                ));
                continue;
            };
            let (merged, status) =
                federate(&snap, endpoint.as_ref(), remote, &local_vars, &rows, deadline);
            if let Some(merged) = merged {
                rows = merged;
            }
            truncated |= status.state == EndpointState::Truncated;
            statuses.push(status);
        }

        if rows.len() > cap {
            truncated |= compiled.limit.is_none();
            rows.truncate(cap);
        }
        let variables: Vec<String> = if compiled.select.is_empty() {
            let mut all = local_vars;
            if let Some(remote) = &compiled.remote {
                all.extend(remote.variables());
            }
            all.into_iter().collect()
        } else {
            compiled.select.clone()
        };
        for row in &mut rows {
            row.values = project(std::mem::take(&mut row.values), &compiled.select);
        }

        let metadata = QueryMetadata {
            elapsed_ms: elapsed_ms(started),
            result_count: rows.len(),
            truncated,
            endpoints: statuses,
        };
        info!(
            rows = metadata.result_count,
            truncated,
            elapsed_ms = metadata.elapsed_ms,
            endpoints = metadata.endpoints.len(),
            "query executed"
        );
        Ok(QueryResult {
            variables,
            rows,
            metadata,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
