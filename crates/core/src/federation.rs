//! Remote SPARQL endpoints.
//!
//! The query engine talks to endpoints through [`RemoteEndpoint`], so tests
//! can register in-process fakes. [`SparqlEndpoint`] is the HTTP
//! implementation (SPARQL 1.1 protocol, JSON results).

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::query::{Binding, ResolvedFilter, ResolvedGroup, ResolvedPattern, Slot};
use crate::triple_store::{Datatype, Literal, Term};

pub const DEFAULT_ENDPOINT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FederationError {
    #[error("no endpoint named `{0}` is registered")]
    UnknownEndpoint(String),
    #[error("endpoint `{endpoint}` did not answer within {timeout_ms} ms")]
    Timeout { endpoint: String, timeout_ms: u64 },
    #[error("endpoint `{endpoint}` is unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },
    #[error("endpoint `{endpoint}` answered HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("endpoint `{endpoint}` sent an unreadable response: {reason}")]
    Malformed { endpoint: String, reason: String },
}

/// The remote half of a federated query, with the join values of one local
/// row bound through a `VALUES` block.
#[derive(Debug, Clone)]
pub struct RemoteQuery {
    pub variables: Vec<String>,
    pub group: Arc<ResolvedGroup>,
    pub bindings: Binding,
    pub limit: Option<usize>,
}

impl RemoteQuery {
    /// Render as a SPARQL `SELECT`.
    pub fn to_sparql(&self) -> String {
        let mut out = String::from("SELECT");
        if self.variables.is_empty() {
            out.push_str(" *");
        }
        for var in &self.variables {
            let _ = write!(out, " ?{var}");
        }
        out.push_str(" WHERE {\n");
        if !self.bindings.is_empty() {
            out.push_str("  VALUES (");
            let vars: Vec<String> = self.bindings.keys().map(|v| format!("?{v}")).collect();
            out.push_str(&vars.join(" "));
            out.push_str(") { (");
            let values: Vec<String> = self.bindings.values().map(Term::to_string).collect();
            out.push_str(&values.join(" "));
            out.push_str(") }\n");
        }
        write_group(&mut out, &self.group, 1);
        out.push('}');
        if let Some(limit) = self.limit {
            let _ = write!(out, "\nLIMIT {limit}");
        }
        out
    }
}

fn slot_text(slot: &Slot) -> String {
    match slot {
        Slot::Var(v) => format!("?{v}"),
        Slot::Term(t) => t.to_string(),
    }
}

fn write_pattern(out: &mut String, pattern: &ResolvedPattern, indent: &str) {
    let _ = writeln!(
        out,
        "{indent}{} {} {} .",
        slot_text(&pattern.subject),
        slot_text(&pattern.predicate),
        slot_text(&pattern.object)
    );
}

fn quote(text: &str) -> String {
    Term::Literal(Literal::string(text)).to_string()
}

fn filter_text(filter: &ResolvedFilter) -> String {
    match filter {
        ResolvedFilter::Equals { var, value } => format!("?{var} = {value}"),
        ResolvedFilter::NotEquals { var, value } => format!("?{var} != {value}"),
        ResolvedFilter::LessThan { var, value } => format!("?{var} < {value}"),
        ResolvedFilter::GreaterThan { var, value } => format!("?{var} > {value}"),
        ResolvedFilter::Contains {
            var,
            needle,
            case_insensitive: true,
        } => format!("CONTAINS(LCASE(STR(?{var})), {})", quote(&needle.to_lowercase())),
        ResolvedFilter::Contains { var, needle, .. } => {
            format!("CONTAINS(STR(?{var}), {})", quote(needle))
        }
        ResolvedFilter::Regex {
            var,
            pattern,
            case_insensitive,
            ..
        } => {
            let flags = if *case_insensitive { ", \"i\"" } else { "" };
            format!("REGEX(STR(?{var}), {}{flags})", quote(pattern))
        }
        ResolvedFilter::Bound { var } => format!("BOUND(?{var})"),
        ResolvedFilter::NotBound { var } => format!("!BOUND(?{var})"),
    }
}

fn write_group(out: &mut String, group: &ResolvedGroup, depth: usize) {
    let indent = "  ".repeat(depth);
    for pattern in &group.patterns {
        write_pattern(out, pattern, &indent);
    }
    for optional in &group.optional {
        let _ = writeln!(out, "{indent}OPTIONAL {{");
        write_group(out, optional, depth + 1);
        let _ = writeln!(out, "{indent}}}");
    }
    for filter in &group.filters {
        let _ = writeln!(out, "{indent}FILTER({})", filter_text(filter));
    }
}

/// A source of remote bindings.
pub trait RemoteEndpoint: Send + Sync {
    fn name(&self) -> &str;

    /// Upper bound for a single request.
    fn timeout(&self) -> Duration {
        Duration::from_millis(DEFAULT_ENDPOINT_TIMEOUT_MS)
    }

    /// Answer `query` within `timeout`. The engine passes the smaller of
    /// [`RemoteEndpoint::timeout`] and what is left of the query budget.
    fn query(
        &self,
        query: &RemoteQuery,
        timeout: Duration,
    ) -> Result<Vec<Binding>, FederationError>;
}

// ---------------------------------------------------------------------------
// SPARQL JSON results
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SparqlResults {
    results: SparqlBindings,
}

#[derive(Deserialize)]
struct SparqlBindings {
    bindings: Vec<std::collections::BTreeMap<String, SparqlValue>>,
}

#[derive(Deserialize)]
struct SparqlValue {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    #[serde(rename = "xml:lang")]
    lang: Option<String>,
    datatype: Option<String>,
}

impl SparqlValue {
    fn into_term(self) -> Term {
        match self.kind.as_str() {
            "uri" => Term::Iri(self.value),
            // Labels are only stable within one response.
            "bnode" => Term::Iri(format!("_:{}", self.value)),
            _ => {
                let datatype = self
                    .datatype
                    .as_deref()
                    .map(Datatype::from_iri)
                    .unwrap_or_default();
                Term::Literal(Literal {
                    value: self.value,
                    lang: self.lang,
                    datatype,
                })
            }
        }
    }
}

/// Decode a `application/sparql-results+json` document.
pub fn parse_sparql_results(endpoint: &str, body: &str) -> Result<Vec<Binding>, FederationError> {
    let results: SparqlResults = serde_json::from_str(body).map_err(|e| FederationError::Malformed {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    Ok(results
        .results
        .bindings
        .into_iter()
        .map(|row| row.into_iter().map(|(var, value)| (var, value.into_term())).collect())
        .collect())
}

// ---------------------------------------------------------------------------
// HTTP endpoint
// ---------------------------------------------------------------------------

#[cfg(feature = "federation")]
pub use http::SparqlEndpoint;

#[cfg(feature = "federation")]
mod http {
    use std::time::{Duration, Instant};

    use tracing::debug;

    use super::{parse_sparql_results, FederationError, RemoteEndpoint, RemoteQuery};
    use crate::config::EndpointConfig;
    use crate::query::Binding;
    use crate::{ProvenanceError, Result};

    const RESULTS_JSON: &str = "application/sparql-results+json";

    /// A SPARQL 1.1 protocol endpoint queried with HTTP GET.
    pub struct SparqlEndpoint {
        name: String,
        url: String,
        timeout: Duration,
        client: reqwest::blocking::Client,
    }

    impl SparqlEndpoint {
        pub fn new(name: &str, url: &str, timeout: Duration) -> Result<Self> {
            let client = reqwest::blocking::Client::builder()
                .user_agent(concat!("provenance-graph/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| ProvenanceError::Config(format!("endpoint `{name}`: {e}")))?;
            Ok(Self {
                name: name.to_string(),
                url: url.to_string(),
                timeout,
                client,
            })
        }

        pub fn from_config(config: &EndpointConfig) -> Result<Self> {
            Self::new(&config.name, &config.url, Duration::from_millis(config.timeout_ms))
        }

        fn classify(&self, error: reqwest::Error, timeout: Duration) -> FederationError {
            if error.is_timeout() {
                FederationError::Timeout {
                    endpoint: self.name.clone(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }
            } else if error.is_decode() || error.is_body() {
                FederationError::Malformed {
                    endpoint: self.name.clone(),
                    reason: error.to_string(),
                }
            } else {
                FederationError::Unreachable {
                    endpoint: self.name.clone(),
                    reason: error.to_string(),
                }
            }
        }
    }

    impl RemoteEndpoint for SparqlEndpoint {
        fn name(&self) -> &str {
            &self.name
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        fn query(
            &self,
            query: &RemoteQuery,
            timeout: Duration,
        ) -> std::result::Result<Vec<Binding>, FederationError> {
            let text = query.to_sparql();
            let started = Instant::now();
            let response = self
                .client
                .get(&self.url)
                .query(&[("query", text.as_str()), ("format", "json")])
                .header(reqwest::header::ACCEPT, RESULTS_JSON)
                .timeout(timeout)
                .send()
                .map_err(|e| self.classify(e, timeout))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FederationError::Status {
                    endpoint: self.name.clone(),
                    status: status.as_u16(),
                });
            }
            let body = response.text().map_err(|e| self.classify(e, timeout))?;
            let rows = parse_sparql_results(&self.name, &body)?;
            debug!(
                endpoint = %self.name,
                rows = rows.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "remote query answered"
            );
            Ok(rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ResolvedFilter;

    fn remote_query() -> RemoteQuery {
        let group = ResolvedGroup {
            patterns: vec![ResolvedPattern {
                subject: Slot::Var("link".into()),
                predicate: Slot::Term(Term::iri("http://www.wikidata.org/prop/direct/P18")),
                object: Slot::Var("image".into()),
            }],
            optional: Vec::new(),
            filters: vec![ResolvedFilter::Contains {
                var: "image".into(),
                needle: "Fair".into(),
                case_insensitive: true,
            }],
        };
        RemoteQuery {
            variables: vec!["image".into(), "link".into()],
            group: Arc::new(group),
            bindings: Binding::from([(
                "link".to_string(),
                Term::iri("http://www.wikidata.org/entity/Q18"),
            )]),
            limit: Some(5),
        }
    }

    #[test]
    fn renders_values_block_and_filters() {
        let text = remote_query().to_sparql();
        assert_eq!(
            text,
            "SELECT ?image ?link WHERE {\n  \
             VALUES (?link) { (<http://www.wikidata.org/entity/Q18>) }\n  \
             ?link <http://www.wikidata.org/prop/direct/P18> ?image .\n  \
             FILTER(CONTAINS(LCASE(STR(?image)), \"fair\"))\n}\nLIMIT 5"
        );
    }

    #[test]
    fn parses_sparql_json() {
        let body = r#"{
            "head": {"vars": ["link", "label", "year"]},
            "results": {"bindings": [
                {
                    "link": {"type": "uri", "value": "http://www.wikidata.org/entity/Q18"},
                    "label": {"type": "literal", "value": "Târg", "xml:lang": "ro"},
                    "year": {"type": "literal", "value": "1885",
                             "datatype": "http://www.w3.org/2001/XMLSchema#integer"}
                },
                {"link": {"type": "bnode", "value": "b0"}}
            ]}
        }"#;
        let rows = parse_sparql_results("wikidata", body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["link"], Term::iri("http://www.wikidata.org/entity/Q18"));
        assert_eq!(rows[0]["label"].as_literal().unwrap().lang.as_deref(), Some("ro"));
        assert_eq!(rows[0]["year"].as_f64(), Some(1885.0));
        assert_eq!(rows[1]["link"], Term::iri("_:b0"));
    }

    #[test]
    fn malformed_body_is_reported() {
        let err = parse_sparql_results("getty", "<html>busy</html>").unwrap_err();
        assert!(matches!(
            err,
            FederationError::Malformed { ref endpoint, .. } if endpoint == "getty"
        ));
    }
}
