//! Provenance chains: ordering an artwork's events and finding the holes.

use serde::Serialize;
use tracing::warn;

use crate::dates::{parse_date, EventDate};
use crate::ontology::EventKind;
use crate::records::{CurrentLocation, EventView, NamedRef};

/// The ordered events of one artwork with any data-quality gaps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvenanceChain {
    pub artwork: String,
    pub events: Vec<EventView>,
    pub gaps: Vec<ProvenanceGap>,
}

/// A signal that the recorded history is incomplete or contradictory.
/// Gaps are reported, never rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "gap", rename_all = "snake_case")]
pub enum ProvenanceGap {
    /// The event says custody passed from `claimed_from`, but the previous
    /// custody change left the artwork with `holder`.
    CustodyMismatch {
        event: String,
        holder: String,
        claimed_from: String,
    },
    /// The event's date is missing or did not parse, so its place in the
    /// chain is unknown.
    Unordered { event: String, raw_date: Option<String> },
}

/// Sort key: where an event sits in the chain.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Position {
    /// An undated creation event opens the chain.
    Origin,
    Dated {
        date: crate::dates::DateSpan,
        creation_last: bool,
    },
    Undated,
}

fn position(event: &EventView, date: &EventDate) -> Position {
    match date.span {
        Some(span) => Position::Dated {
            date: span,
            creation_last: event.kind != EventKind::Creation,
        },
        None if event.kind == EventKind::Creation && event.date.is_none() => Position::Origin,
        None => Position::Undated,
    }
}

/// Build the chain for `artwork` from its events in any order.
///
/// Dated events come first in ascending order (creation wins ties, then
/// `sequence`, then URI). Events whose date is missing or unparseable follow
/// in `sequence` order.
pub fn build_chain(artwork: &str, events: Vec<EventView>) -> ProvenanceChain {
    let mut keyed: Vec<(Position, EventView)> = events
        .into_iter()
        .map(|event| {
            let date = parse_date(event.date.as_deref().unwrap_or_default());
            (position(&event, &date), event)
        })
        .collect();
    keyed.sort_by(|(pa, a), (pb, b)| {
        pa.cmp(pb)
            .then_with(|| a.sequence.cmp(&b.sequence))
            .then_with(|| a.uri.cmp(&b.uri))
    });

    let events: Vec<EventView> = keyed.into_iter().map(|(_, e)| e).collect();
    let gaps = detect_gaps(&events);
    if !gaps.is_empty() {
        warn!(artwork, gaps = gaps.len(), "provenance chain has gaps");
    }
    ProvenanceChain {
        artwork: artwork.to_string(),
        events,
        gaps,
    }
}

/// Walk the ordered events tracking who holds the artwork.
fn detect_gaps(events: &[EventView]) -> Vec<ProvenanceGap> {
    let mut gaps = Vec::new();
    let mut holder: Option<&str> = None;

    for event in events {
        let origin = event.kind == EventKind::Creation && event.date.is_none();
        if !event.ordered && !origin {
            gaps.push(ProvenanceGap::Unordered {
                event: event.uri.clone(),
                raw_date: event.date.clone(),
            });
            continue;
        }
        if !event.kind.changes_custody() {
            continue;
        }
        let from = event.from_agent.as_ref().map(|a| a.uri.as_str());
        if let (Some(current), Some(claimed)) = (holder, from) {
            if current != claimed {
                gaps.push(ProvenanceGap::CustodyMismatch {
                    event: event.uri.clone(),
                    holder: current.to_string(),
                    claimed_from: claimed.to_string(),
                });
            }
        }
        holder = event.to_agent.as_ref().map(|a| a.uri.as_str());
    }
    gaps
}

/// The place of the most recent custody change that names one, else the
/// recorded location, else unknown.
pub fn current_location(events: &[EventView], recorded: Option<NamedRef>) -> CurrentLocation {
    events
        .iter()
        .filter(|e| e.ordered && e.kind.changes_custody())
        .filter_map(|e| e.place.clone())
        .last()
        .or(recorded)
        .map_or(CurrentLocation::Unknown, CurrentLocation::Known)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(uri: &str) -> Option<NamedRef> {
        Some(NamedRef {
            uri: uri.into(),
            name: None,
        })
    }

    fn event(uri: &str, kind: EventKind, date: Option<&str>, sequence: i64) -> EventView {
        EventView {
            uri: uri.into(),
            kind,
            artwork: "http://x/artwork/1".into(),
            date: date.map(str::to_string),
            ordered: date.is_some_and(|d| parse_date(d).is_ordered()),
            from_agent: None,
            to_agent: None,
            place: None,
            note: None,
            sequence,
        }
    }

    fn uris(chain: &ProvenanceChain) -> Vec<&str> {
        chain.events.iter().map(|e| e.uri.as_str()).collect()
    }

    #[test]
    fn sorts_ascending_with_unordered_last() {
        let chain = build_chain(
            "http://x/artwork/1",
            vec![
                event("e:sale", EventKind::Sale, Some("1950"), 2),
                event("e:lost", EventKind::Theft, Some("during the war"), 3),
                event("e:acq", EventKind::Acquisition, Some("1945-08-20"), 1),
                event("e:create", EventKind::Creation, Some("1885"), 0),
            ],
        );
        assert_eq!(uris(&chain), ["e:create", "e:acq", "e:sale", "e:lost"]);
        assert_eq!(
            chain.gaps,
            vec![ProvenanceGap::Unordered {
                event: "e:lost".into(),
                raw_date: Some("during the war".into())
            }]
        );
    }

    #[test]
    fn undated_creation_opens_the_chain() {
        let chain = build_chain(
            "http://x/artwork/1",
            vec![
                event("e:acq", EventKind::Acquisition, Some("1945"), 1),
                event("e:create", EventKind::Creation, None, 0),
            ],
        );
        assert_eq!(uris(&chain), ["e:create", "e:acq"]);
        assert!(chain.gaps.is_empty());
    }

    #[test]
    fn creation_wins_same_span_tie() {
        let chain = build_chain(
            "http://x/artwork/1",
            vec![
                event("e:a", EventKind::Sale, Some("1885"), 1),
                event("e:b", EventKind::Creation, Some("1885"), 0),
            ],
        );
        assert_eq!(uris(&chain), ["e:b", "e:a"]);
    }

    #[test]
    fn custody_mismatch_is_reported() {
        let mut create = event("e:create", EventKind::Creation, Some("1885"), 0);
        create.to_agent = agent("agent:painter");
        let mut show = event("e:show", EventKind::Exhibition, Some("1890"), 1);
        show.from_agent = agent("agent:museum");
        let mut sale = event("e:sale", EventKind::Sale, Some("1900"), 2);
        sale.from_agent = agent("agent:dealer");
        sale.to_agent = agent("agent:collector");
        let mut gift = event("e:gift", EventKind::Donation, Some("1920"), 3);
        gift.from_agent = agent("agent:collector");

        let chain = build_chain("http://x/artwork/1", vec![gift, sale, show, create]);
        assert_eq!(
            chain.gaps,
            vec![ProvenanceGap::CustodyMismatch {
                event: "e:sale".into(),
                holder: "agent:painter".into(),
                claimed_from: "agent:dealer".into()
            }]
        );
    }

    #[test]
    fn current_location_skips_exhibitions() {
        let place = |uri: &str| NamedRef {
            uri: uri.into(),
            name: None,
        };
        let mut acq = event("e:acq", EventKind::Acquisition, Some("1945"), 1);
        acq.place = Some(place("place:bucharest"));
        let mut show = event("e:show", EventKind::Exhibition, Some("1960"), 2);
        show.place = Some(place("place:paris"));
        let chain = build_chain("a", vec![show, acq]);

        assert_eq!(
            current_location(&chain.events, Some(place("place:recorded"))),
            CurrentLocation::Known(place("place:bucharest"))
        );
        assert_eq!(
            current_location(&[], Some(place("place:recorded"))),
            CurrentLocation::Known(place("place:recorded"))
        );
        assert_eq!(current_location(&[], None), CurrentLocation::Unknown);
    }
}
