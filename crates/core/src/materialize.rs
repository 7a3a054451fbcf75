//! Read side: rebuild records and views from a snapshot.

use std::collections::{BTreeMap, BTreeSet};

use crate::dates::{ordinal, parse_date};
use crate::ontology::{hp, AgentKind, Class, EventKind, OWL_SAME_AS, RDF_TYPE};
use crate::provenance::{build_chain, current_location, ProvenanceChain};
use crate::records::{
    AgentView, ArtworkRecord, ArtworkSummary, ArtworkView, Coordinates, CurrentLocation,
    DanglingReference, Dimensions, EntityRef, EventView, ExternalLink, LocalizedText, NamedRef,
    PlaceView, Statistics,
};
use crate::triple_store::{Term, TripleIndex};
use crate::{ProvenanceError, ProvenanceGraph, Result};

// ---------------------------------------------------------------------------
// Snapshot accessors
// ---------------------------------------------------------------------------

pub(crate) fn class_of(snap: &TripleIndex, uri: &str) -> Option<Class> {
    snap.objects(uri, RDF_TYPE)
        .filter_map(Term::as_iri)
        .find_map(Class::from_iri)
}

/// The first plain literal of `(uri, predicate, ?)`.
pub(crate) fn literal(snap: &TripleIndex, uri: &str, predicate: &str) -> Option<String> {
    snap.objects(uri, predicate)
        .filter_map(Term::as_literal)
        .find(|lit| lit.lang.is_none())
        .map(|lit| lit.value.clone())
}

pub(crate) fn literals(snap: &TripleIndex, uri: &str, predicate: &str) -> Vec<String> {
    snap.objects(uri, predicate)
        .filter_map(Term::as_literal)
        .map(|lit| lit.value.clone())
        .collect()
}

fn number(snap: &TripleIndex, uri: &str, predicate: &str) -> Option<f64> {
    snap.objects(uri, predicate).find_map(Term::as_f64)
}

pub(crate) fn iri(snap: &TripleIndex, uri: &str, predicate: &str) -> Option<String> {
    snap.objects(uri, predicate)
        .find_map(Term::as_iri)
        .map(str::to_string)
}

/// Subjects typed as `class`, sorted by URI.
pub(crate) fn subjects_of_class(snap: &TripleIndex, class: Class) -> Vec<String> {
    let mut out: Vec<String> = snap
        .subjects(RDF_TYPE, &Term::iri(class.iri()))
        .map(str::to_string)
        .collect();
    out.sort();
    out
}

pub(crate) fn agent_uris(snap: &TripleIndex) -> Vec<String> {
    let mut out = subjects_of_class(snap, Class::Agent(AgentKind::Person));
    out.extend(subjects_of_class(snap, Class::Agent(AgentKind::Organization)));
    out.sort();
    out
}

/// Display name of any entity: `hp:name`, else `hp:title`.
pub(crate) fn display_name(snap: &TripleIndex, uri: &str) -> Option<String> {
    literal(snap, uri, hp::NAME).or_else(|| literal(snap, uri, hp::TITLE))
}

fn named_ref(snap: &TripleIndex, uri: String) -> NamedRef {
    let name = display_name(snap, &uri);
    NamedRef { uri, name }
}

pub(crate) fn external_links(snap: &TripleIndex, uri: &str) -> Vec<ExternalLink> {
    let mut links: Vec<ExternalLink> = snap
        .objects(uri, OWL_SAME_AS)
        .filter_map(Term::as_iri)
        .map(|target| ExternalLink {
            source: literal(snap, target, hp::LINK_SOURCE).unwrap_or_default(),
            uri: target.to_string(),
        })
        .collect();
    links.sort();
    links
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

pub(crate) fn agent_view(snap: &TripleIndex, uri: &str, unknown_uri: &str) -> Option<AgentView> {
    let Some(Class::Agent(kind)) = class_of(snap, uri) else {
        return None;
    };
    Some(AgentView {
        uri: uri.to_string(),
        name: literal(snap, uri, hp::NAME).unwrap_or_default(),
        kind,
        birth_date: literal(snap, uri, hp::BIRTH_DATE),
        death_date: literal(snap, uri, hp::DEATH_DATE),
        nationality: literal(snap, uri, hp::NATIONALITY),
        biography: literal(snap, uri, hp::BIOGRAPHY),
        external_links: external_links(snap, uri),
        unknown: uri == unknown_uri,
    })
}

pub(crate) fn place_view(snap: &TripleIndex, uri: &str) -> Option<PlaceView> {
    if class_of(snap, uri) != Some(Class::Place) {
        return None;
    }
    let coordinates = match (
        number(snap, uri, hp::LATITUDE),
        number(snap, uri, hp::LONGITUDE),
    ) {
        (Some(latitude), Some(longitude)) => Some(Coordinates {
            latitude,
            longitude,
        }),
        _ => None,
    };
    Some(PlaceView {
        uri: uri.to_string(),
        name: literal(snap, uri, hp::NAME).unwrap_or_default(),
        country: literal(snap, uri, hp::COUNTRY),
        coordinates,
        external_links: external_links(snap, uri),
    })
}

pub(crate) fn event_view(snap: &TripleIndex, uri: &str) -> Option<EventView> {
    if class_of(snap, uri) != Some(Class::Event) {
        return None;
    }
    let kind: EventKind = literal(snap, uri, hp::EVENT_TYPE)?.parse().ok()?;
    let date = literal(snap, uri, hp::EVENT_DATE);
    let ordered = date.as_deref().is_some_and(|d| parse_date(d).is_ordered());
    let reference = |predicate: &str| iri(snap, uri, predicate).map(|u| named_ref(snap, u));
    Some(EventView {
        uri: uri.to_string(),
        kind,
        artwork: iri(snap, uri, hp::CONCERNS_ARTWORK).unwrap_or_default(),
        date,
        ordered,
        from_agent: reference(hp::FROM_AGENT),
        to_agent: reference(hp::TO_AGENT),
        place: reference(hp::PLACE_REF),
        note: literal(snap, uri, hp::NOTE),
        sequence: snap
            .objects(uri, hp::SEQUENCE)
            .find_map(|t| t.as_literal().and_then(|l| l.value.parse::<i64>().ok()))
            .unwrap_or(0),
    })
}

/// Events attached to `artwork`, unordered.
pub(crate) fn events_of(snap: &TripleIndex, artwork: &str) -> Vec<EventView> {
    snap.subjects(hp::CONCERNS_ARTWORK, &Term::iri(artwork))
        .filter_map(|event| event_view(snap, event))
        .collect()
}

pub(crate) fn chain_of(snap: &TripleIndex, artwork: &str) -> ProvenanceChain {
    build_chain(artwork, events_of(snap, artwork))
}

pub(crate) fn artwork_record(snap: &TripleIndex, uri: &str) -> Option<ArtworkRecord> {
    if class_of(snap, uri) != Some(Class::Artwork) {
        return None;
    }
    let localized_title = snap
        .objects(uri, hp::LOCALIZED_TITLE)
        .filter_map(Term::as_literal)
        .find_map(|lit| {
            lit.lang.as_ref().map(|lang| LocalizedText {
                lang: lang.clone(),
                text: lit.value.clone(),
            })
        });
    let dimensions = Dimensions {
        height: number(snap, uri, hp::HEIGHT),
        width: number(snap, uri, hp::WIDTH),
        depth: number(snap, uri, hp::DEPTH),
    };
    let mut materials = literals(snap, uri, hp::MATERIAL);
    materials.sort();

    Some(ArtworkRecord {
        uri: Some(uri.to_string()),
        title: literal(snap, uri, hp::TITLE).unwrap_or_default(),
        localized_title,
        creation_date: literal(snap, uri, hp::CREATION_DATE),
        artwork_type: literal(snap, uri, hp::ARTWORK_TYPE),
        medium: literal(snap, uri, hp::MEDIUM),
        materials,
        dimensions: (!dimensions.is_empty()).then_some(dimensions),
        description: literal(snap, uri, hp::DESCRIPTION),
        creator: iri(snap, uri, hp::CREATOR).map(EntityRef::Uri),
        location: iri(snap, uri, hp::LOCATION).map(EntityRef::Uri),
        external_links: external_links(snap, uri),
    })
}

pub(crate) fn artwork_view(
    snap: &TripleIndex,
    uri: &str,
    unknown_uri: &str,
) -> Option<ArtworkView> {
    let record = artwork_record(snap, uri)?;
    let chain = chain_of(snap, uri);
    let recorded_location = iri(snap, uri, hp::LOCATION).map(|u| named_ref(snap, u));
    let current = current_location(&chain.events, recorded_location.clone());
    let creator = iri(snap, uri, hp::CREATOR).and_then(|c| agent_view(snap, &c, unknown_uri));

    Some(ArtworkView {
        uri: uri.to_string(),
        title: record.title,
        localized_title: record.localized_title,
        creation_date: record.creation_date,
        artwork_type: record.artwork_type,
        medium: record.medium,
        materials: record.materials,
        dimensions: record.dimensions,
        description: record.description,
        creator,
        recorded_location,
        current_location: current,
        provenance_chain: chain.events,
        gaps: chain.gaps,
        external_links: record.external_links,
    })
}

pub(crate) fn artwork_summary(snap: &TripleIndex, uri: &str) -> Option<ArtworkSummary> {
    if class_of(snap, uri) != Some(Class::Artwork) {
        return None;
    }
    Some(ArtworkSummary {
        uri: uri.to_string(),
        title: literal(snap, uri, hp::TITLE).unwrap_or_default(),
        creator: iri(snap, uri, hp::CREATOR).and_then(|c| literal(snap, &c, hp::NAME)),
        artwork_type: literal(snap, uri, hp::ARTWORK_TYPE),
        creation_date: literal(snap, uri, hp::CREATION_DATE),
    })
}

fn sorted_summaries(
    snap: &TripleIndex,
    uris: impl IntoIterator<Item = String>,
) -> Vec<ArtworkSummary> {
    let mut out: Vec<ArtworkSummary> = uris
        .into_iter()
        .filter_map(|u| artwork_summary(snap, &u))
        .collect();
    out.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.uri.cmp(&b.uri)));
    out
}

fn dangling(snap: &TripleIndex) -> Vec<DanglingReference> {
    let mut out: Vec<DanglingReference> = snap
        .retired()
        .flat_map(|target| {
            snap.references_to(&Term::iri(target))
                .map(move |(subject, predicate)| DanglingReference {
                    subject: subject.to_string(),
                    predicate: predicate.to_string(),
                    target: target.to_string(),
                })
                .collect::<Vec<_>>()
        })
        .collect();
    out.sort();
    out
}

// ---------------------------------------------------------------------------
// Public read API
// ---------------------------------------------------------------------------

impl ProvenanceGraph {
    pub(crate) fn unknown_agent_uri(&self) -> String {
        format!("{}agent/unknown", self.config.base_uri)
    }

    /// The full artwork with derived location and provenance.
    pub fn artwork(&self, uri: &str) -> Result<ArtworkView> {
        let snap = self.store.snapshot()?;
        artwork_view(&snap, uri, &self.unknown_agent_uri())
            .ok_or_else(|| ProvenanceError::NotFound(format!("artwork <{uri}>")))
    }

    /// The artwork as a record, re-materialized from its statements.
    /// References come back as [`EntityRef::Uri`].
    pub fn artwork_record(&self, uri: &str) -> Result<ArtworkRecord> {
        let snap = self.store.snapshot()?;
        artwork_record(&snap, uri)
            .ok_or_else(|| ProvenanceError::NotFound(format!("artwork <{uri}>")))
    }

    pub fn agent(&self, uri: &str) -> Result<AgentView> {
        let snap = self.store.snapshot()?;
        agent_view(&snap, uri, &self.unknown_agent_uri())
            .ok_or_else(|| ProvenanceError::NotFound(format!("agent <{uri}>")))
    }

    pub fn place(&self, uri: &str) -> Result<PlaceView> {
        let snap = self.store.snapshot()?;
        place_view(&snap, uri).ok_or_else(|| ProvenanceError::NotFound(format!("place <{uri}>")))
    }

    pub fn event(&self, uri: &str) -> Result<EventView> {
        let snap = self.store.snapshot()?;
        event_view(&snap, uri).ok_or_else(|| ProvenanceError::NotFound(format!("event <{uri}>")))
    }

    /// All artworks, sorted by title then URI.
    pub fn artworks(&self) -> Result<Vec<ArtworkSummary>> {
        let snap = self.store.snapshot()?;
        Ok(sorted_summaries(&snap, subjects_of_class(&snap, Class::Artwork)))
    }

    pub fn agents(&self) -> Result<Vec<AgentView>> {
        let snap = self.store.snapshot()?;
        let unknown = self.unknown_agent_uri();
        Ok(agent_uris(&snap)
            .iter()
            .filter_map(|u| agent_view(&snap, u, &unknown))
            .collect())
    }

    pub fn places(&self) -> Result<Vec<PlaceView>> {
        let snap = self.store.snapshot()?;
        Ok(subjects_of_class(&snap, Class::Place)
            .iter()
            .filter_map(|u| place_view(&snap, u))
            .collect())
    }

    pub fn artworks_by_creator(&self, agent: &str) -> Result<Vec<ArtworkSummary>> {
        let snap = self.store.snapshot()?;
        if !matches!(class_of(&snap, agent), Some(Class::Agent(_))) {
            return Err(ProvenanceError::NotFound(format!("agent <{agent}>")));
        }
        let uris = snap
            .subjects(hp::CREATOR, &Term::iri(agent))
            .map(str::to_string)
            .collect::<Vec<_>>();
        Ok(sorted_summaries(&snap, uris))
    }

    /// Artworks whose derived current location is `place`.
    pub fn artworks_at_place(&self, place: &str) -> Result<Vec<ArtworkSummary>> {
        let snap = self.store.snapshot()?;
        if class_of(&snap, place) != Some(Class::Place) {
            return Err(ProvenanceError::NotFound(format!("place <{place}>")));
        }
        let uris = subjects_of_class(&snap, Class::Artwork)
            .into_iter()
            .filter(|artwork| {
                let chain = chain_of(&snap, artwork);
                let recorded =
                    iri(&snap, artwork, hp::LOCATION).map(|uri| NamedRef { uri, name: None });
                matches!(
                    current_location(&chain.events, recorded),
                    CurrentLocation::Known(ref at) if at.uri == place
                )
            })
            .collect::<Vec<_>>();
        Ok(sorted_summaries(&snap, uris))
    }

    pub fn provenance_chain(&self, artwork: &str) -> Result<ProvenanceChain> {
        let snap = self.store.snapshot()?;
        if class_of(&snap, artwork) != Some(Class::Artwork) {
            return Err(ProvenanceError::NotFound(format!("artwork <{artwork}>")));
        }
        Ok(chain_of(&snap, artwork))
    }

    /// Statements whose object is a retracted entity.
    pub fn dangling_references(&self) -> Result<Vec<DanglingReference>> {
        let snap = self.store.snapshot()?;
        Ok(dangling(&snap))
    }

    pub fn statements_for(&self, uri: &str) -> Result<BTreeSet<(String, Term)>> {
        self.store.statements_for(uri)
    }

    pub fn statistics(&self) -> Result<Statistics> {
        let snap = self.store.snapshot()?;
        let unknown = self.unknown_agent_uri();
        let artworks = subjects_of_class(&snap, Class::Artwork);

        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_century: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_country: BTreeMap<String, usize> = BTreeMap::new();
        let mut unknown_creator_count = 0;

        for artwork in &artworks {
            if let Some(kind) = literal(&snap, artwork, hp::ARTWORK_TYPE) {
                *by_type.entry(kind).or_default() += 1;
            }
            let century = literal(&snap, artwork, hp::CREATION_DATE)
                .and_then(|d| parse_date(&d).century());
            if let Some(century) = century {
                *by_century.entry(format!("{} century", ordinal(century))).or_default() += 1;
            }
            let chain = chain_of(&snap, artwork);
            let recorded =
                iri(&snap, artwork, hp::LOCATION).map(|uri| NamedRef { uri, name: None });
            if let CurrentLocation::Known(at) = current_location(&chain.events, recorded) {
                if let Some(country) = literal(&snap, &at.uri, hp::COUNTRY) {
                    *by_country.entry(country).or_default() += 1;
                }
            }
            if iri(&snap, artwork, hp::CREATOR).is_none_or(|c| c == unknown) {
                unknown_creator_count += 1;
            }
        }

        Ok(Statistics {
            total_artworks: artworks.len(),
            total_agents: agent_uris(&snap).len(),
            total_places: subjects_of_class(&snap, Class::Place).len(),
            total_events: subjects_of_class(&snap, Class::Event).len(),
            total_triples: snap.len(),
            artworks_by_type: by_type,
            artworks_by_century: by_century,
            artworks_by_country: by_country,
            unknown_creator_count,
            dangling_references: dangling(&snap).len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{AgentRecord, EventRecord, PlaceRecord};

    fn graph() -> ProvenanceGraph {
        ProvenanceGraph::open_in_memory().unwrap()
    }

    fn place(g: &ProvenanceGraph, name: &str, country: &str) -> String {
        g.upsert_place(PlaceRecord {
            name: name.into(),
            country: Some(country.into()),
            ..Default::default()
        })
        .unwrap()
        .uri
    }

    #[test]
    fn current_location_follows_latest_custody_change() {
        let g = graph();
        let bucharest = place(&g, "Bucharest", "Romania");
        let paris = place(&g, "Paris", "France");
        let london = place(&g, "London", "United Kingdom");
        let artwork = g
            .upsert_artwork(ArtworkRecord {
                title: "Village Fair".into(),
                creation_date: Some("1885".into()),
                location: Some(EntityRef::Uri(bucharest.clone())),
                ..Default::default()
            })
            .unwrap()
            .uri;

        assert_eq!(
            g.artwork(&artwork).unwrap().current_location,
            CurrentLocation::Known(NamedRef {
                uri: bucharest.clone(),
                name: Some("Bucharest".into())
            })
        );

        g.append_event(
            &artwork,
            EventRecord {
                event_type: Some("sale".into()),
                date: Some("1920".into()),
                place: Some(EntityRef::Uri(paris.clone())),
                ..Default::default()
            },
        )
        .unwrap();
        // An exhibition does not move custody.
        g.append_event(
            &artwork,
            EventRecord {
                event_type: Some("exhibition".into()),
                date: Some("1930".into()),
                place: Some(EntityRef::Uri(london.clone())),
                ..Default::default()
            },
        )
        .unwrap();

        let view = g.artwork(&artwork).unwrap();
        assert!(matches!(view.current_location, CurrentLocation::Known(ref at) if at.uri == paris));
        assert_eq!(view.recorded_location.map(|r| r.uri), Some(bucharest.clone()));

        let at_paris = g.artworks_at_place(&paris).unwrap();
        assert_eq!(at_paris.len(), 1);
        assert!(g.artworks_at_place(&bucharest).unwrap().is_empty());
        assert!(g.artworks_at_place(&london).unwrap().is_empty());
    }

    #[test]
    fn listings_are_sorted_and_checked() {
        let g = graph();
        let artist = g
            .upsert_agent(AgentRecord {
                name: "Nicolae Grigorescu".into(),
                ..Default::default()
            })
            .unwrap()
            .uri;
        for title in ["Village Fair", "Ox Cart"] {
            g.upsert_artwork(ArtworkRecord {
                title: title.into(),
                creator: Some(EntityRef::Uri(artist.clone())),
                ..Default::default()
            })
            .unwrap();
        }

        let titles: Vec<String> = g
            .artworks_by_creator(&artist)
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["Ox Cart", "Village Fair"]);
        assert_eq!(g.artworks().unwrap().len(), 2);

        assert!(matches!(
            g.artworks_by_creator("http://example.org/nobody"),
            Err(ProvenanceError::NotFound(_))
        ));
        assert!(matches!(
            g.artworks_at_place(&artist),
            Err(ProvenanceError::NotFound(_))
        ));
        assert!(matches!(g.artwork(&artist), Err(ProvenanceError::NotFound(_))));
    }

    #[test]
    fn statistics_group_by_type_century_and_country() {
        let g = graph();
        let bucharest = place(&g, "Bucharest", "Romania");
        for (title, date, kind) in [
            ("Village Fair", "1885", "painting"),
            ("Ox Cart", "1899", "painting"),
            ("Bust", "1910", "sculpture"),
        ] {
            g.upsert_artwork(ArtworkRecord {
                title: title.into(),
                creation_date: Some(date.into()),
                artwork_type: Some(kind.into()),
                location: Some(EntityRef::Uri(bucharest.clone())),
                ..Default::default()
            })
            .unwrap();
        }

        let stats = g.statistics().unwrap();
        assert_eq!(stats.total_artworks, 3);
        assert_eq!(stats.total_places, 1);
        assert_eq!(stats.artworks_by_type.get("painting"), Some(&2));
        assert_eq!(stats.artworks_by_type.get("sculpture"), Some(&1));
        assert_eq!(stats.artworks_by_century.get("19th century"), Some(&2));
        assert_eq!(stats.artworks_by_century.get("20th century"), Some(&1));
        assert_eq!(stats.artworks_by_country.get("Romania"), Some(&3));
        assert_eq!(stats.unknown_creator_count, 3);
        assert_eq!(stats.dangling_references, 0);
        assert!(stats.total_triples > 0);
    }
}
