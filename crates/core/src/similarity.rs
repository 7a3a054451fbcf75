//! Multi-criteria artwork recommendations.
//!
//! Each criterion yields a partial score in `[0, 1]` when both artworks have
//! data for it and nothing otherwise. The final score is the (weighted) mean
//! of the partial scores that exist, so a missing medium neither helps nor
//! hurts. An unknown creator counts as missing.
//!
//! # Complexity
//! - `recommend`: O(N·c) for N artworks and c criteria, plus one pass over
//!   all descriptions to build the TF-IDF corpus when `description` is asked
//!   for. Every candidate is scored; there is no index.
//! - `recommend_by_provenance`: O(N·e) for e events per artwork.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dates::{ordinal, parse_date};
use crate::materialize::{
    artwork_summary, chain_of, class_of, display_name, iri, literal, subjects_of_class,
};
use crate::ontology::{hp, Class, EventKind};
use crate::provenance::current_location;
use crate::records::{ArtworkSummary, CurrentLocation, NamedRef};
use crate::triple_store::TripleIndex;
use crate::{FieldError, FieldErrorKind, ProvenanceError, ProvenanceGraph, Result, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Artist,
    Period,
    Type,
    Location,
    Medium,
    Description,
}

impl Criterion {
    /// Used when a request names no criteria.
    pub const DEFAULT: [Criterion; 4] = [
        Criterion::Artist,
        Criterion::Period,
        Criterion::Type,
        Criterion::Location,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Criterion::Artist => "artist",
            Criterion::Period => "period",
            Criterion::Type => "type",
            Criterion::Location => "location",
            Criterion::Medium => "medium",
            Criterion::Description => "description",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendRequest {
    pub artwork: String,
    pub criteria: Vec<Criterion>,
    /// Defaults to `similarity.default_limit` from the configuration.
    pub limit: Option<usize>,
    pub min_score: Option<f64>,
    /// Per-criterion weights; criteria not listed weigh 1.0.
    pub weights: BTreeMap<Criterion, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub artwork: ArtworkSummary,
    pub score: f64,
    pub reasons: Vec<String>,
}

/// What the scorer needs to know about one artwork.
#[derive(Debug, Default)]
struct Features {
    uri: String,
    creator: Option<NamedRef>,
    artwork_type: Option<String>,
    century: Option<i32>,
    location: Option<NamedRef>,
    medium: Option<String>,
    has_description: bool,
}

fn normalized(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty())
}

fn features(snap: &TripleIndex, uri: &str, unknown_agent: &str) -> Features {
    let creator = iri(snap, uri, hp::CREATOR)
        .filter(|c| c != unknown_agent)
        .map(|c| NamedRef {
            name: display_name(snap, &c),
            uri: c,
        });
    let recorded = iri(snap, uri, hp::LOCATION).map(|u| NamedRef {
        name: display_name(snap, &u),
        uri: u,
    });
    let chain = chain_of(snap, uri);
    let location = match current_location(&chain.events, recorded) {
        CurrentLocation::Known(at) => Some(NamedRef {
            name: at.name.or_else(|| display_name(snap, &at.uri)),
            uri: at.uri,
        }),
        CurrentLocation::Unknown => None,
    };
    Features {
        uri: uri.to_string(),
        creator,
        artwork_type: normalized(literal(snap, uri, hp::ARTWORK_TYPE)),
        century: literal(snap, uri, hp::CREATION_DATE).and_then(|d| parse_date(&d).century()),
        location,
        medium: normalized(literal(snap, uri, hp::MEDIUM)),
        has_description: literal(snap, uri, hp::DESCRIPTION).is_some_and(|d| !d.trim().is_empty()),
    }
}

// ---------------------------------------------------------------------------
// TF-IDF
// ---------------------------------------------------------------------------

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
}

/// Sparse TF-IDF vectors for every artwork description, with smoothed IDF
/// `ln((1 + n) / (1 + df)) + 1` over the whole corpus.
#[derive(Debug, Default)]
struct TfIdfIndex {
    vectors: HashMap<String, HashMap<String, f64>>,
}

impl TfIdfIndex {
    fn build<'a>(docs: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        let counted: Vec<(&str, HashMap<String, f64>)> = docs
            .into_iter()
            .map(|(uri, text)| {
                let mut tf: HashMap<String, f64> = HashMap::new();
                for token in tokenize(&text) {
                    *tf.entry(token).or_default() += 1.0;
                }
                (uri, tf)
            })
            .collect();

        let mut df: HashMap<&str, f64> = HashMap::new();
        for (_, tf) in &counted {
            for term in tf.keys() {
                *df.entry(term.as_str()).or_default() += 1.0;
            }
        }
        let n = counted.len() as f64;
        let idf: HashMap<String, f64> = df
            .into_iter()
            .map(|(term, d)| (term.to_string(), ((1.0 + n) / (1.0 + d)).ln() + 1.0))
            .collect();

        let vectors = counted
            .into_iter()
            .map(|(uri, tf)| {
                let weighted = tf
                    .into_iter()
                    .map(|(term, count)| {
                        let w = count * idf.get(&term).copied().unwrap_or(1.0);
                        (term, w)
                    })
                    .collect();
                (uri.to_string(), weighted)
            })
            .collect();
        Self { vectors }
    }

    /// Cosine similarity of two descriptions; `None` when either is absent
    /// or has no tokens.
    fn cosine(&self, a: &str, b: &str) -> Option<f64> {
        let (va, vb) = (self.vectors.get(a)?, self.vectors.get(b)?);
        let norm = |v: &HashMap<String, f64>| v.values().map(|w| w * w).sum::<f64>().sqrt();
        let (na, nb) = (norm(va), norm(vb));
        if na == 0.0 || nb == 0.0 {
            return None;
        }
        let dot: f64 = va
            .iter()
            .filter_map(|(term, w)| vb.get(term).map(|x| w * x))
            .sum();
        Some((dot / (na * nb)).clamp(0.0, 1.0))
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

struct Scorer<'a> {
    max_century_gap: u32,
    tfidf: Option<&'a TfIdfIndex>,
}

fn exact<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(if x == y { 1.0 } else { 0.0 }),
        _ => None,
    }
}

impl Scorer<'_> {
    /// Partial score and, for a non-zero score, the reason shown to users.
    fn partial(
        &self,
        criterion: Criterion,
        target: &Features,
        candidate: &Features,
    ) -> Option<(f64, Option<String>)> {
        let (score, reason) = match criterion {
            Criterion::Artist => {
                let (a, b) = (target.creator.as_ref()?, candidate.creator.as_ref()?);
                let name = b.name.clone().unwrap_or_else(|| b.uri.clone());
                (if a.uri == b.uri { 1.0 } else { 0.0 }, format!("Same artist: {name}"))
            }
            Criterion::Type => {
                let score = exact(&target.artwork_type, &candidate.artwork_type)?;
                let kind = candidate.artwork_type.clone().unwrap_or_default();
                (score, format!("Same type: {kind}"))
            }
            Criterion::Medium => {
                let score = exact(&target.medium, &candidate.medium)?;
                let medium = candidate.medium.clone().unwrap_or_default();
                (score, format!("Same medium: {medium}"))
            }
            Criterion::Location => {
                let (a, b) = (target.location.as_ref()?, candidate.location.as_ref()?);
                let name = b.name.clone().unwrap_or_else(|| b.uri.clone());
                (if a.uri == b.uri { 1.0 } else { 0.0 }, format!("Same location: {name}"))
            }
            Criterion::Period => {
                let (a, b) = (target.century?, candidate.century?);
                let distance = a.abs_diff(b);
                let score = if distance <= self.max_century_gap {
                    1.0 - f64::from(distance) / f64::from(self.max_century_gap + 1)
                } else {
                    0.0
                };
                (score, format!("Similar period: {} century", ordinal(b)))
            }
            Criterion::Description => {
                if !(target.has_description && candidate.has_description) {
                    return None;
                }
                let score = self.tfidf?.cosine(&target.uri, &candidate.uri)?;
                (score, "Similar themes".to_string())
            }
        };
        Some((score, (score > 0.0).then_some(reason)))
    }

    /// Weighted mean over criteria with data on both sides; `None` when no
    /// criterion applies.
    fn score(
        &self,
        criteria: &[Criterion],
        weights: &BTreeMap<Criterion, f64>,
        target: &Features,
        candidate: &Features,
    ) -> Option<(f64, Vec<String>)> {
        let mut total = 0.0;
        let mut weight_sum = 0.0;
        let mut reasons = Vec::new();
        for &criterion in criteria {
            let Some((partial, reason)) = self.partial(criterion, target, candidate) else {
                continue;
            };
            let weight = weights.get(&criterion).copied().unwrap_or(1.0);
            total += weight * partial;
            weight_sum += weight;
            reasons.extend(reason);
        }
        (weight_sum > 0.0).then(|| ((total / weight_sum).clamp(0.0, 1.0), reasons))
    }
}

fn by_score(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.artwork.uri.cmp(&b.artwork.uri))
}

fn check_min_score(errors: &mut ValidationErrors, min_score: Option<f64>) {
    if let Some(min) = min_score {
        if !(0.0..=1.0).contains(&min) {
            errors.push(FieldError::new(
                "min_score",
                FieldErrorKind::OutOfRange,
                format!("{min} is outside [0, 1]"),
            ));
        }
    }
}

fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Post-creation history of one artwork, by name where one is known.
#[derive(Default)]
struct ProvenanceFeatures {
    kinds: BTreeSet<EventKind>,
    places: BTreeMap<String, String>,
    agents: BTreeMap<String, String>,
}

fn provenance_features(snap: &TripleIndex, artwork: &str) -> ProvenanceFeatures {
    let mut out = ProvenanceFeatures::default();
    for event in chain_of(snap, artwork).events {
        if event.kind == EventKind::Creation {
            continue;
        }
        out.kinds.insert(event.kind);
        if let Some(place) = event.place {
            let label = place.name.unwrap_or_else(|| place.uri.clone());
            out.places.insert(place.uri, label);
        }
        for agent in [event.from_agent, event.to_agent].into_iter().flatten() {
            let label = agent.name.unwrap_or_else(|| agent.uri.clone());
            out.agents.insert(agent.uri, label);
        }
    }
    out
}

fn shared_labels(a: &BTreeMap<String, String>, b: &BTreeMap<String, String>) -> Vec<String> {
    let mut labels: Vec<String> = a
        .iter()
        .filter(|(uri, _)| b.contains_key(*uri))
        .map(|(_, label)| label.clone())
        .collect();
    labels.sort();
    labels.truncate(2);
    labels
}

impl ProvenanceGraph {
    fn target_artwork(&self, snap: &TripleIndex, uri: &str) -> Result<()> {
        if class_of(snap, uri) != Some(Class::Artwork) {
            return Err(ProvenanceError::NotFound(format!("artwork <{uri}>")));
        }
        Ok(())
    }

    /// Rank every other artwork by similarity to `request.artwork`.
    pub fn recommend(&self, request: &RecommendRequest) -> Result<Vec<Recommendation>> {
        let mut errors = ValidationErrors::default();
        check_min_score(&mut errors, request.min_score);
        for (criterion, weight) in &request.weights {
            if !weight.is_finite() || *weight < 0.0 {
                errors.push(FieldError::new(
                    format!("weights.{criterion}"),
                    FieldErrorKind::OutOfRange,
                    format!("{weight} is not a non-negative weight"),
                ));
            }
        }
        if errors.is_empty() && !request.weights.values().sum::<f64>().is_finite() {
            errors.push(FieldError::new(
                "weights",
                FieldErrorKind::OutOfRange,
                "weights must sum to a finite value",
            ));
        }
        errors.into_result()?;

        let snap = self.store.snapshot()?;
        self.target_artwork(&snap, &request.artwork)?;
        let criteria: Vec<Criterion> = if request.criteria.is_empty() {
            Criterion::DEFAULT.to_vec()
        } else {
            let mut seen = BTreeSet::new();
            request.criteria.iter().copied().filter(|c| seen.insert(*c)).collect()
        };

        let unknown = self.unknown_agent_uri();
        let artworks = subjects_of_class(&snap, Class::Artwork);
        let tfidf = criteria.contains(&Criterion::Description).then(|| {
            TfIdfIndex::build(artworks.iter().filter_map(|uri| {
                literal(&snap, uri, hp::DESCRIPTION).map(|d| (uri.as_str(), d))
            }))
        });
        let scorer = Scorer {
            max_century_gap: self.config.similarity.max_century_gap,
            tfidf: tfidf.as_ref(),
        };

        let target = features(&snap, &request.artwork, &unknown);
        let min_score = request.min_score.unwrap_or(0.0);
        let mut out: Vec<Recommendation> = artworks
            .iter()
            .filter(|uri| **uri != request.artwork)
            .filter_map(|uri| {
                let candidate = features(&snap, uri, &unknown);
                let (score, reasons) =
                    scorer.score(&criteria, &request.weights, &target, &candidate)?;
                (score >= min_score).then_some((uri, score, reasons))
            })
            .filter_map(|(uri, score, reasons)| {
                artwork_summary(&snap, uri).map(|artwork| Recommendation {
                    artwork,
                    score,
                    reasons,
                })
            })
            .collect();

        out.sort_by(by_score);
        out.truncate(request.limit.unwrap_or(self.config.similarity.default_limit));
        debug!(
            artwork = %request.artwork,
            candidates = artworks.len(),
            returned = out.len(),
            "recommendations scored"
        );
        Ok(out)
    }

    /// Rank artworks whose ownership history resembles `artwork`'s: Jaccard
    /// overlap of event kinds (weight 0.3), event places (0.4) and involved
    /// agents (0.3). Creation events are not part of the comparison, so an
    /// artwork without later events has no provenance neighbours.
    pub fn recommend_by_provenance(
        &self,
        artwork: &str,
        limit: Option<usize>,
        min_score: Option<f64>,
    ) -> Result<Vec<Recommendation>> {
        let mut errors = ValidationErrors::default();
        check_min_score(&mut errors, min_score);
        errors.into_result()?;

        let snap = self.store.snapshot()?;
        self.target_artwork(&snap, artwork)?;
        let target = provenance_features(&snap, artwork);
        if target.kinds.is_empty() {
            return Ok(Vec::new());
        }

        let target_places: BTreeSet<&String> = target.places.keys().collect();
        let target_agents: BTreeSet<&String> = target.agents.keys().collect();
        let min_score = min_score.unwrap_or(0.0);
        let mut out = Vec::new();

        for uri in subjects_of_class(&snap, Class::Artwork) {
            if uri == artwork {
                continue;
            }
            let candidate = provenance_features(&snap, &uri);
            if candidate.kinds.is_empty() {
                continue;
            }
            let mut score = 0.0;
            let mut reasons = Vec::new();

            let kinds = jaccard(&target.kinds, &candidate.kinds);
            score += 0.3 * kinds;
            if kinds > 0.5 {
                reasons.push("Similar provenance event types".to_string());
            }

            let places = jaccard(&target_places, &candidate.places.keys().collect());
            if places > 0.0 {
                score += 0.4 * places;
                let shared = shared_labels(&target.places, &candidate.places);
                reasons.push(format!("Shared provenance locations: {}", shared.join(", ")));
            }

            let agents = jaccard(&target_agents, &candidate.agents.keys().collect());
            if agents > 0.0 {
                score += 0.3 * agents;
                let shared = shared_labels(&target.agents, &candidate.agents);
                reasons.push(format!("Shared collectors/dealers: {}", shared.join(", ")));
            }

            if score > 0.0 && score >= min_score {
                if let Some(summary) = artwork_summary(&snap, &uri) {
                    out.push(Recommendation {
                        artwork: summary,
                        score: score.clamp(0.0, 1.0),
                        reasons,
                    });
                }
            }
        }

        out.sort_by(by_score);
        out.truncate(limit.unwrap_or(self.config.similarity.default_limit));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ArtworkRecord, EntityRef, EventRecord};
    use crate::EngineConfig;

    fn artwork(
        g: &ProvenanceGraph,
        title: &str,
        creator: Option<&str>,
        date: &str,
        kind: &str,
    ) -> String {
        g.upsert_artwork(ArtworkRecord {
            title: title.into(),
            creation_date: Some(date.into()),
            artwork_type: Some(kind.into()),
            creator: creator.map(|c| EntityRef::Name(c.into())),
            ..Default::default()
        })
        .unwrap()
        .uri
    }

    fn request(artwork: &str, criteria: &[Criterion]) -> RecommendRequest {
        RecommendRequest {
            artwork: artwork.into(),
            criteria: criteria.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn unknown_artist_is_missing_not_mismatched() {
        let g = ProvenanceGraph::open_in_memory().unwrap();
        let fair = artwork(&g, "Village Fair", Some("Nicolae Grigorescu"), "1885", "painting");
        let anon = artwork(&g, "Harvest", None, "1890", "painting");

        let recs = g.recommend(&request(&fair, &[Criterion::Artist, Criterion::Type])).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].artwork.uri, anon);
        assert_eq!(recs[0].score, 1.0);
        assert_eq!(recs[0].reasons, vec!["Same type: painting"]);
    }

    #[test]
    fn scores_are_means_of_available_criteria() {
        let g = ProvenanceGraph::open_in_memory().unwrap();
        let fair = artwork(&g, "Village Fair", Some("Nicolae Grigorescu"), "1885", "painting");
        let girl = artwork(&g, "Peasant Girl", Some("Nicolae Grigorescu"), "1894", "painting");
        let bird = artwork(&g, "Bird in Space", Some("Constantin Brâncuși"), "1923", "sculpture");

        let recs = g
            .recommend(&request(&fair, &[Criterion::Artist, Criterion::Period, Criterion::Type]))
            .unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].artwork.uri, girl);
        assert_eq!(recs[0].score, 1.0);
        assert_eq!(
            recs[0].reasons,
            vec![
                "Same artist: Nicolae Grigorescu",
                "Similar period: 19th century",
                "Same type: painting"
            ]
        );
        // Artist 0, type 0, period one century apart with gap 2: 1 - 1/3.
        assert_eq!(recs[1].artwork.uri, bird);
        assert!((recs[1].score - (2.0 / 3.0) / 3.0).abs() < 1e-9);
        assert_eq!(recs[1].reasons, vec!["Similar period: 20th century"]);
        assert!(recs.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[test]
    fn weights_min_score_and_limit() {
        let g = ProvenanceGraph::open_in_memory().unwrap();
        let fair = artwork(&g, "Village Fair", Some("Nicolae Grigorescu"), "1885", "painting");
        artwork(&g, "Bird in Space", Some("Constantin Brâncuși"), "1885", "sculpture");
        let girl = artwork(&g, "Peasant Girl", Some("Nicolae Grigorescu"), "1450", "painting");

        let mut req = request(&fair, &[Criterion::Period, Criterion::Type]);
        req.weights.insert(Criterion::Type, 3.0);
        let recs = g.recommend(&req).unwrap();
        assert_eq!(recs[0].artwork.uri, girl);
        assert!((recs[0].score - 3.0 / 4.0).abs() < 1e-9);
        assert!((recs[1].score - 1.0 / 4.0).abs() < 1e-9);

        req.min_score = Some(0.5);
        assert_eq!(g.recommend(&req).unwrap().len(), 1);
        req.min_score = None;
        req.limit = Some(1);
        assert_eq!(g.recommend(&req).unwrap().len(), 1);
    }

    #[test]
    fn period_beyond_gap_scores_zero() {
        let config = EngineConfig {
            similarity: crate::SimilarityConfig {
                max_century_gap: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let g = ProvenanceGraph::open_in_memory_with_config(config).unwrap();
        let fair = artwork(&g, "Village Fair", None, "1885", "painting");
        artwork(&g, "Bird in Space", None, "1923", "sculpture");
        let recs = g.recommend(&request(&fair, &[Criterion::Period])).unwrap();
        assert_eq!(recs[0].score, 0.0);
        assert!(recs[0].reasons.is_empty());
    }

    #[test]
    fn description_uses_tfidf() {
        let g = ProvenanceGraph::open_in_memory().unwrap();
        let mut uris = Vec::new();
        for (title, text) in [
            ("Village Fair", "peasants gathering at a village fair with oxen and carts"),
            ("Ox Cart", "oxen pulling a cart along a village road"),
            ("Portrait", "portrait of a lady in a blue dress"),
        ] {
            let out = g
                .upsert_artwork(ArtworkRecord {
                    title: title.into(),
                    description: Some(text.into()),
                    ..Default::default()
                })
                .unwrap();
            uris.push(out.uri);
        }
        let recs = g.recommend(&request(&uris[0], &[Criterion::Description])).unwrap();
        assert_eq!(recs[0].artwork.uri, uris[1]);
        assert_eq!(recs[0].reasons, vec!["Similar themes"]);
        assert!(recs[0].score > recs[1].score);
    }

    #[test]
    fn rejects_bad_requests() {
        let g = ProvenanceGraph::open_in_memory().unwrap();
        let fair = artwork(&g, "Village Fair", None, "1885", "painting");
        let mut req = request(&fair, &[]);
        req.min_score = Some(1.5);
        req.weights.insert(Criterion::Type, -1.0);
        let Err(ProvenanceError::Validation(errors)) = g.recommend(&req) else {
            panic!("expected validation error");
        };
        assert_eq!(errors.errors.len(), 2);

        let mut huge = request(&fair, &[Criterion::Type, Criterion::Period]);
        huge.weights.insert(Criterion::Type, 1e308);
        huge.weights.insert(Criterion::Period, 1e308);
        let Err(ProvenanceError::Validation(errors)) = g.recommend(&huge) else {
            panic!("expected validation error");
        };
        assert_eq!(errors.errors[0].path, "weights");

        assert!(matches!(
            g.recommend(&request("http://example.org/nothing", &[])),
            Err(ProvenanceError::NotFound(_))
        ));
    }

    #[test]
    fn provenance_overlap() {
        let g = ProvenanceGraph::open_in_memory().unwrap();
        let a = artwork(&g, "Village Fair", None, "1885", "painting");
        let b = artwork(&g, "Peasant Girl", None, "1894", "painting");
        let c = artwork(&g, "Bird in Space", None, "1923", "sculpture");
        for uri in [&a, &b] {
            g.append_event(
                uri,
                EventRecord {
                    event_type: Some("acquisition".into()),
                    date: Some("1945".into()),
                    to_agent: Some(EntityRef::Name("National Museum of Art".into())),
                    place: Some(EntityRef::Name("Bucharest".into())),
                    ..Default::default()
                },
            )
            .unwrap();
        }
        g.append_event(
            &c,
            EventRecord {
                event_type: Some("exhibition".into()),
                date: Some("1926".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let recs = g.recommend_by_provenance(&a, None, None).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].artwork.uri, b);
        assert!((recs[0].score - 1.0).abs() < 1e-9);
        assert_eq!(
            recs[0].reasons,
            vec![
                "Similar provenance event types",
                "Shared provenance locations: Bucharest",
                "Shared collectors/dealers: National Museum of Art",
            ]
        );

        let lonely = artwork(&g, "Sketch", None, "1900", "drawing");
        assert!(g.recommend_by_provenance(&lonely, None, None).unwrap().is_empty());
    }
}
