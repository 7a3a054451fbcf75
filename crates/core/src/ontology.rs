//! The heritage-provenance vocabulary and the rules statements must obey.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::triple_store::{Datatype, Term};

pub const HP: &str = "http://arp-greatteam.org/heritage-provenance#";
pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const OWL: &str = "http://www.w3.org/2002/07/owl#";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const OWL_SAME_AS: &str = "http://www.w3.org/2002/07/owl#sameAs";

/// Predicate IRIs in the `hp:` namespace.
pub mod hp {
    pub const ARTWORK: &str = "http://arp-greatteam.org/heritage-provenance#Artwork";
    pub const PERSON: &str = "http://arp-greatteam.org/heritage-provenance#Person";
    pub const ORGANIZATION: &str = "http://arp-greatteam.org/heritage-provenance#Organization";
    pub const PLACE: &str = "http://arp-greatteam.org/heritage-provenance#Place";
    pub const EVENT: &str = "http://arp-greatteam.org/heritage-provenance#Event";

    pub const TITLE: &str = "http://arp-greatteam.org/heritage-provenance#title";
    pub const LOCALIZED_TITLE: &str = "http://arp-greatteam.org/heritage-provenance#localizedTitle";
    pub const CREATOR: &str = "http://arp-greatteam.org/heritage-provenance#creator";
    pub const CREATION_DATE: &str = "http://arp-greatteam.org/heritage-provenance#creationDate";
    pub const ARTWORK_TYPE: &str = "http://arp-greatteam.org/heritage-provenance#artworkType";
    pub const MEDIUM: &str = "http://arp-greatteam.org/heritage-provenance#medium";
    pub const MATERIAL: &str = "http://arp-greatteam.org/heritage-provenance#material";
    pub const HEIGHT: &str = "http://arp-greatteam.org/heritage-provenance#height";
    pub const WIDTH: &str = "http://arp-greatteam.org/heritage-provenance#width";
    pub const DEPTH: &str = "http://arp-greatteam.org/heritage-provenance#depth";
    pub const DESCRIPTION: &str = "http://arp-greatteam.org/heritage-provenance#description";
    pub const LOCATION: &str = "http://arp-greatteam.org/heritage-provenance#location";

    pub const NAME: &str = "http://arp-greatteam.org/heritage-provenance#name";
    pub const BIRTH_DATE: &str = "http://arp-greatteam.org/heritage-provenance#birthDate";
    pub const DEATH_DATE: &str = "http://arp-greatteam.org/heritage-provenance#deathDate";
    pub const NATIONALITY: &str = "http://arp-greatteam.org/heritage-provenance#nationality";
    pub const BIOGRAPHY: &str = "http://arp-greatteam.org/heritage-provenance#biography";

    pub const COUNTRY: &str = "http://arp-greatteam.org/heritage-provenance#country";
    pub const LATITUDE: &str = "http://arp-greatteam.org/heritage-provenance#latitude";
    pub const LONGITUDE: &str = "http://arp-greatteam.org/heritage-provenance#longitude";

    pub const EVENT_TYPE: &str = "http://arp-greatteam.org/heritage-provenance#eventType";
    pub const EVENT_DATE: &str = "http://arp-greatteam.org/heritage-provenance#eventDate";
    pub const FROM_AGENT: &str = "http://arp-greatteam.org/heritage-provenance#fromAgent";
    pub const TO_AGENT: &str = "http://arp-greatteam.org/heritage-provenance#toAgent";
    pub const PLACE_REF: &str = "http://arp-greatteam.org/heritage-provenance#place";
    pub const NOTE: &str = "http://arp-greatteam.org/heritage-provenance#note";
    pub const SEQUENCE: &str = "http://arp-greatteam.org/heritage-provenance#sequence";
    pub const CONCERNS_ARTWORK: &str =
        "http://arp-greatteam.org/heritage-provenance#concernsArtwork";

    pub const LINK_SOURCE: &str = "http://arp-greatteam.org/heritage-provenance#linkSource";
}

// ---------------------------------------------------------------------------
// Classes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    #[default]
    Person,
    Organization,
}

/// Entity classes. Agents carry their kind as a discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "class", content = "kind", rename_all = "lowercase")]
pub enum Class {
    Artwork,
    Agent(AgentKind),
    Place,
    Event,
}

impl Class {
    pub fn iri(self) -> &'static str {
        match self {
            Class::Artwork => hp::ARTWORK,
            Class::Agent(AgentKind::Person) => hp::PERSON,
            Class::Agent(AgentKind::Organization) => hp::ORGANIZATION,
            Class::Place => hp::PLACE,
            Class::Event => hp::EVENT,
        }
    }

    pub fn from_iri(iri: &str) -> Option<Self> {
        match iri {
            hp::ARTWORK => Some(Class::Artwork),
            hp::PERSON => Some(Class::Agent(AgentKind::Person)),
            hp::ORGANIZATION => Some(Class::Agent(AgentKind::Organization)),
            hp::PLACE => Some(Class::Place),
            hp::EVENT => Some(Class::Event),
            _ => None,
        }
    }

    /// Segment used in minted URIs: `{base}{segment}/{hash}`.
    pub fn uri_segment(self) -> &'static str {
        match self {
            Class::Artwork => "artwork",
            Class::Agent(_) => "agent",
            Class::Place => "place",
            Class::Event => "event",
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Class::Artwork => f.write_str("Artwork"),
            Class::Agent(AgentKind::Person) => f.write_str("Person"),
            Class::Agent(AgentKind::Organization) => f.write_str("Organization"),
            Class::Place => f.write_str("Place"),
            Class::Event => f.write_str("Event"),
        }
    }
}

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Creation,
    Acquisition,
    Sale,
    Transfer,
    Exhibition,
    Loan,
    Restoration,
    Theft,
    Recovery,
    Donation,
    Inheritance,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::Creation,
        EventKind::Acquisition,
        EventKind::Sale,
        EventKind::Transfer,
        EventKind::Exhibition,
        EventKind::Loan,
        EventKind::Restoration,
        EventKind::Theft,
        EventKind::Recovery,
        EventKind::Donation,
        EventKind::Inheritance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Creation => "creation",
            EventKind::Acquisition => "acquisition",
            EventKind::Sale => "sale",
            EventKind::Transfer => "transfer",
            EventKind::Exhibition => "exhibition",
            EventKind::Loan => "loan",
            EventKind::Restoration => "restoration",
            EventKind::Theft => "theft",
            EventKind::Recovery => "recovery",
            EventKind::Donation => "donation",
            EventKind::Inheritance => "inheritance",
        }
    }

    /// Whether the event moves the artwork into someone else's custody.
    /// Exhibitions, loans and restorations leave custody where it was.
    pub fn changes_custody(self) -> bool {
        !matches!(
            self,
            EventKind::Exhibition | EventKind::Loan | EventKind::Restoration
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown event type `{s}` (expected one of {})", known.join(", "))
            })
    }
}

// ---------------------------------------------------------------------------
// Predicate rules
// ---------------------------------------------------------------------------

/// Which subjects a predicate may describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Any,
    Artwork,
    Agent,
    Place,
    Event,
    ArtworkOrAgent,
    AgentOrPlace,
    /// External link targets: subjects with no class of their own.
    ExternalLink,
}

impl Domain {
    fn admits(self, class: Option<Class>) -> bool {
        match (self, class) {
            (Domain::Any, _) => true,
            (Domain::ExternalLink, None) => true,
            (_, None) => false,
            (Domain::Artwork, Some(Class::Artwork)) => true,
            (Domain::Agent, Some(Class::Agent(_))) => true,
            (Domain::Place, Some(Class::Place)) => true,
            (Domain::Event, Some(Class::Event)) => true,
            (Domain::ArtworkOrAgent, Some(Class::Artwork | Class::Agent(_))) => true,
            (Domain::AgentOrPlace, Some(Class::Agent(_) | Class::Place)) => true,
            _ => false,
        }
    }
}

/// The kind of object a predicate takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Iri,
    Literal,
    LangLiteral,
    Decimal,
    Integer,
}

impl ObjectKind {
    fn admits(self, term: &Term) -> bool {
        match (self, term) {
            (ObjectKind::Iri, Term::Iri(_)) => true,
            (ObjectKind::Literal, Term::Literal(_)) => true,
            (ObjectKind::LangLiteral, Term::Literal(lit)) => lit.lang.is_some(),
            (ObjectKind::Decimal, Term::Literal(lit)) => {
                matches!(lit.datatype, Datatype::Decimal | Datatype::Integer)
            }
            (ObjectKind::Integer, Term::Literal(lit)) => lit.datatype == Datatype::Integer,
            _ => false,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ObjectKind::Iri => "an IRI",
            ObjectKind::Literal => "a literal",
            ObjectKind::LangLiteral => "a language-tagged literal",
            ObjectKind::Decimal => "a decimal literal",
            ObjectKind::Integer => "an integer literal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy)]
pub struct PredicateRule {
    pub iri: &'static str,
    pub domain: Domain,
    pub object: ObjectKind,
    pub cardinality: Cardinality,
}

/// A statement that breaks the ontology.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum SchemaViolation {
    #[error("unknown predicate <{predicate}> on <{subject}>")]
    UnknownPredicate { subject: String, predicate: String },
    #[error("<{predicate}> on <{subject}> expects {expected}")]
    ObjectKind {
        subject: String,
        predicate: String,
        expected: &'static str,
    },
    #[error("<{predicate}> is not allowed on {class} <{subject}>")]
    Domain {
        subject: String,
        predicate: String,
        class: String,
    },
    #[error("<{subject}> has {count} values for single-valued <{predicate}>")]
    Cardinality {
        subject: String,
        predicate: String,
        count: usize,
    },
    #[error("artwork <{artwork}> already has creation event <{existing}>")]
    DuplicateCreation { artwork: String, existing: String },
}

/// The closed vocabulary: classes, predicates and their rules.
#[derive(Debug, Clone)]
pub struct Ontology {
    rules: HashMap<&'static str, PredicateRule>,
    prefixes: BTreeMap<String, String>,
}

impl Ontology {
    /// The heritage-provenance ontology.
    pub fn heritage() -> Self {
        use Cardinality::{Multi, Single};
        use ObjectKind::{Decimal, Integer, Iri, LangLiteral, Literal};

        let table: [(&'static str, Domain, ObjectKind, Cardinality); 32] = [
            (RDF_TYPE, Domain::Any, Iri, Multi),
            (OWL_SAME_AS, Domain::Any, Iri, Multi),
            (hp::TITLE, Domain::Artwork, Literal, Single),
            (hp::LOCALIZED_TITLE, Domain::Artwork, LangLiteral, Multi),
            (hp::CREATOR, Domain::Artwork, Iri, Single),
            (hp::CREATION_DATE, Domain::Artwork, Literal, Single),
            (hp::ARTWORK_TYPE, Domain::Artwork, Literal, Single),
            (hp::MEDIUM, Domain::Artwork, Literal, Single),
            (hp::MATERIAL, Domain::Artwork, Literal, Multi),
            (hp::HEIGHT, Domain::Artwork, Decimal, Single),
            (hp::WIDTH, Domain::Artwork, Decimal, Single),
            (hp::DEPTH, Domain::Artwork, Decimal, Single),
            (hp::DESCRIPTION, Domain::ArtworkOrAgent, Literal, Single),
            (hp::LOCATION, Domain::Artwork, Iri, Single),
            (hp::NAME, Domain::AgentOrPlace, Literal, Single),
            (hp::BIRTH_DATE, Domain::Agent, Literal, Single),
            (hp::DEATH_DATE, Domain::Agent, Literal, Single),
            (hp::NATIONALITY, Domain::Agent, Literal, Single),
            (hp::BIOGRAPHY, Domain::Agent, Literal, Single),
            (hp::COUNTRY, Domain::Place, Literal, Single),
            (hp::LATITUDE, Domain::Place, Decimal, Single),
            (hp::LONGITUDE, Domain::Place, Decimal, Single),
            (hp::EVENT_TYPE, Domain::Event, Literal, Single),
            (hp::EVENT_DATE, Domain::Event, Literal, Single),
            (hp::FROM_AGENT, Domain::Event, Iri, Single),
            (hp::TO_AGENT, Domain::Event, Iri, Single),
            (hp::PLACE_REF, Domain::Event, Iri, Single),
            (hp::NOTE, Domain::Event, Literal, Single),
            (hp::SEQUENCE, Domain::Event, Integer, Single),
            (hp::CONCERNS_ARTWORK, Domain::Event, Iri, Single),
            (hp::LINK_SOURCE, Domain::ExternalLink, Literal, Single),
            (RDFS_LABEL, Domain::Any, Literal, Multi),
        ];

        let rules = table
            .into_iter()
            .map(|(iri, domain, object, cardinality)| {
                (
                    iri,
                    PredicateRule {
                        iri,
                        domain,
                        object,
                        cardinality,
                    },
                )
            })
            .collect();

        let prefixes = [("hp", HP), ("rdf", RDF), ("rdfs", RDFS), ("owl", OWL), ("xsd", XSD)]
            .into_iter()
            .map(|(p, ns)| (p.to_string(), ns.to_string()))
            .collect();

        Self { rules, prefixes }
    }

    pub fn rule(&self, predicate: &str) -> Option<&PredicateRule> {
        self.rules.get(predicate)
    }

    /// Built-in prefixes available to every query: hp, rdf, rdfs, owl, xsd.
    pub fn prefixes(&self) -> &BTreeMap<String, String> {
        &self.prefixes
    }

    /// The class of a subject, read from its `rdf:type` objects.
    pub fn class_of<'a>(&self, types: impl IntoIterator<Item = &'a Term>) -> Option<Class> {
        types
            .into_iter()
            .filter_map(Term::as_iri)
            .find_map(Class::from_iri)
    }

    /// Check the complete description of one subject.
    ///
    /// `statements` is the subject's full `(predicate, object)` set as it
    /// would be after the pending write, so cardinality is checked against
    /// the final state rather than the delta.
    pub fn check_subject<'a>(
        &self,
        subject: &str,
        statements: impl IntoIterator<Item = (&'a str, &'a Term)>,
    ) -> Result<(), SchemaViolation> {
        let statements: Vec<(&str, &Term)> = statements.into_iter().collect();
        let class = self.class_of(
            statements
                .iter()
                .filter(|(p, _)| *p == RDF_TYPE)
                .map(|(_, o)| *o),
        );

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for (predicate, object) in &statements {
            let Some(rule) = self.rule(predicate) else {
                return Err(SchemaViolation::UnknownPredicate {
                    subject: subject.to_string(),
                    predicate: predicate.to_string(),
                });
            };
            if !rule.object.admits(object) {
                return Err(SchemaViolation::ObjectKind {
                    subject: subject.to_string(),
                    predicate: predicate.to_string(),
                    expected: rule.object.describe(),
                });
            }
            if !rule.domain.admits(class) {
                return Err(SchemaViolation::Domain {
                    subject: subject.to_string(),
                    predicate: predicate.to_string(),
                    class: class.map_or_else(|| "untyped subject".to_string(), |c| c.to_string()),
                });
            }
            *counts.entry(rule.iri).or_default() += 1;
        }

        for (predicate, count) in counts {
            let single = self
                .rule(predicate)
                .is_some_and(|r| r.cardinality == Cardinality::Single);
            if single && count > 1 {
                return Err(SchemaViolation::Cardinality {
                    subject: subject.to_string(),
                    predicate: predicate.to_string(),
                    count,
                });
            }
        }
        Ok(())
    }
}

const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triple_store::Literal;

    const SUBJECT: &str = "http://arp-greatteam.org/heritage-provenance/artwork/abc";

    fn artwork_type() -> Term {
        Term::iri(hp::ARTWORK)
    }

    #[test]
    fn accepts_a_well_formed_artwork() {
        let onto = Ontology::heritage();
        let ty = artwork_type();
        let title = Term::string("Village Fair");
        let height = Term::from(Literal::decimal(42.5));
        let ro = Term::from(Literal::lang("Târg la țară", "ro"));
        onto.check_subject(
            SUBJECT,
            [
                (RDF_TYPE, &ty),
                (hp::TITLE, &title),
                (hp::HEIGHT, &height),
                (hp::LOCALIZED_TITLE, &ro),
            ],
        )
        .unwrap();
    }

    #[test]
    fn rejects_unknown_predicate() {
        let onto = Ontology::heritage();
        let v = Term::string("x");
        let err = onto
            .check_subject(SUBJECT, [("http://example.org/colour", &v)])
            .unwrap_err();
        assert!(matches!(err, SchemaViolation::UnknownPredicate { .. }));
    }

    #[test]
    fn rejects_second_title() {
        let onto = Ontology::heritage();
        let ty = artwork_type();
        let a = Term::string("A");
        let b = Term::string("B");
        let err = onto
            .check_subject(SUBJECT, [(RDF_TYPE, &ty), (hp::TITLE, &a), (hp::TITLE, &b)])
            .unwrap_err();
        assert_eq!(
            err,
            SchemaViolation::Cardinality {
                subject: SUBJECT.into(),
                predicate: hp::TITLE.into(),
                count: 2
            }
        );
    }

    #[test]
    fn rejects_object_kind_and_domain_mismatch() {
        let onto = Ontology::heritage();
        let ty = artwork_type();
        let literal_creator = Term::string("Grigorescu");
        assert!(matches!(
            onto.check_subject(SUBJECT, [(RDF_TYPE, &ty), (hp::CREATOR, &literal_creator)]),
            Err(SchemaViolation::ObjectKind { .. })
        ));

        let country = Term::string("Romania");
        assert!(matches!(
            onto.check_subject(SUBJECT, [(RDF_TYPE, &ty), (hp::COUNTRY, &country)]),
            Err(SchemaViolation::Domain { .. })
        ));
    }

    #[test]
    fn event_kinds_parse_and_classify_custody() {
        assert_eq!("Acquisition".parse::<EventKind>().unwrap(), EventKind::Acquisition);
        assert!("auction".parse::<EventKind>().is_err());
        assert!(EventKind::Sale.changes_custody());
        assert!(!EventKind::Exhibition.changes_custody());
        assert!(!EventKind::Loan.changes_custody());
    }

    #[test]
    fn class_round_trips_through_iri() {
        for class in [
            Class::Artwork,
            Class::Agent(AgentKind::Person),
            Class::Agent(AgentKind::Organization),
            Class::Place,
            Class::Event,
        ] {
            assert_eq!(Class::from_iri(class.iri()), Some(class));
        }
    }
}
