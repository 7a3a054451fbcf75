//! Text front end for the query engine: a SPARQL-flavoured subset.
//!
//! ```text
//! PREFIX wdt: <http://www.wikidata.org/prop/direct/>
//! SELECT ?artwork ?title ?image WHERE {
//!   ?artwork a hp:Artwork .
//!   ?artwork hp:title ?title .
//!   OPTIONAL { ?artwork owl:sameAs ?link . }
//!   FILTER(CONTAINS(LCASE(?title), "fair"))
//!   SERVICE <wikidata> { ?link wdt:P18 ?image . }
//! }
//! LIMIT 10
//! ```
//!
//! Supported: `PREFIX`, `SELECT *` or a variable list, `a`, IRIs, prefixed
//! names, literals with language tag or datatype, numbers and booleans,
//! `OPTIONAL`, `FILTER` (`BOUND`, `!BOUND`, `CONTAINS`, `REGEX`, `=`, `!=`,
//! `<`, `>`), `SERVICE` with zero or more endpoint names, and `LIMIT`.
//! One triple per statement; `;` and `,` lists are not supported.
//! The parser only builds a [`PatternSet`]; prefixes and variables are
//! checked when the set is compiled.

use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::ontology::RDF_TYPE;
use crate::query::{Filter, PatternGroup, PatternSet, PatternTerm, TriplePattern};
use crate::triple_store::{Datatype, Literal};
use crate::{FieldErrorKind, ProvenanceError, Result, ValidationErrors};

#[derive(Parser)]
#[grammar_inline = r##"
// Provenance query language

query = { SOI ~ prefix_decl* ~ select_clause ~ where_clause ~ limit_clause? ~ EOI }

prefix_decl   = { ^"prefix" ~ pname_ns ~ iri_ref }
select_clause = { ^"select" ~ (star | var+) }
star          = { "*" }
where_clause  = { ^"where"? ~ top_group }
limit_clause  = { ^"limit" ~ integer }

// SERVICE blocks are only allowed at the top level
top_group  = { "{" ~ (service_block | group_item)* ~ "}" }
group      = { "{" ~ group_item* ~ "}" }
group_item = _{ optional_block | filter_clause | triple_stmt }

optional_block = { ^"optional" ~ group }
service_block  = { ^"service" ~ service_name* ~ group }
service_name   = { iri_ref | identifier }
triple_stmt    = { term ~ verb ~ term ~ "."? }
verb           = _{ a_kw | term }
a_kw           = @{ "a" ~ !(ASCII_ALPHANUMERIC | "_" | "-" | ":") }

// Filters
filter_clause = { ^"filter" ~ "(" ~ filter_expr ~ ")" }
filter_expr   = _{ not_bound_fn | bound_fn | contains_fn | regex_fn | comparison }
bound_fn      = { ^"bound" ~ "(" ~ var ~ ")" }
not_bound_fn  = { "!" ~ ^"bound" ~ "(" ~ var ~ ")" }
contains_fn   = { ^"contains" ~ "(" ~ (lcase_var | str_var | var) ~ "," ~ string_lit ~ ")" }
regex_fn      = { ^"regex" ~ "(" ~ (str_var | var) ~ "," ~ string_lit ~ ("," ~ string_lit)? ~ ")" }
lcase_var     = { ^"lcase" ~ "(" ~ (str_var | var) ~ ")" }
str_var       = { ^"str" ~ "(" ~ var ~ ")" }
comparison    = { var ~ comp_op ~ term }
comp_op       = { "!=" | "=" | "<" | ">" }

// Terms
term          = _{ var | iri_ref | literal | prefixed_name }
var           = ${ "?" ~ var_name }
var_name      = @{ (ASCII_ALPHANUMERIC | "_")+ }
iri_ref       = ${ "<" ~ iri_body ~ ">" }
iri_body      = @{ (!(">" | "<" | " " | "\t" | "\r" | "\n") ~ ANY)* }
pn_chars      = _{ ASCII_ALPHANUMERIC | "_" | "-" }
pn_prefix     = @{ ASCII_ALPHA ~ pn_chars* }
pn_local      = @{ pn_chars+ ~ ("." ~ pn_chars+)* }
pname_ns      = @{ pn_prefix? ~ ":" }
prefixed_name = @{ pn_prefix? ~ ":" ~ pn_local? }
identifier    = @{ ASCII_ALPHA ~ pn_chars* }

literal       = ${ string_lit ~ (lang_tag | "^^" ~ datatype)? | number | boolean }
datatype      = { iri_ref | prefixed_name }
string_lit    = ${ "\"" ~ dq_inner ~ "\"" | "'" ~ sq_inner ~ "'" }
dq_inner      = @{ (!("\"" | "\\") ~ ANY | "\\" ~ ANY)* }
sq_inner      = @{ (!("'" | "\\") ~ ANY | "\\" ~ ANY)* }
lang_tag      = @{ "@" ~ ASCII_ALPHA+ ~ ("-" ~ ASCII_ALPHANUMERIC+)* }
number        = @{ "-"? ~ ASCII_DIGIT+ ~ ("." ~ ASCII_DIGIT+)? }
boolean       = @{ ("true" | "false") ~ !(pn_chars | ":") }
integer       = @{ ASCII_DIGIT+ }

WHITESPACE = _{ " " | "\t" | "\r" | "\n" }
COMMENT    = _{ "#" ~ (!"\n" ~ ANY)* }
"##]
struct QueryParser;

/// A parsed query: the pattern set plus the endpoints named by `SERVICE`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextQuery {
    pub pattern_set: PatternSet,
    /// Empty when there is no `SERVICE` block or it names no endpoint.
    pub endpoints: Vec<String>,
}

fn malformed(path: &str, message: impl Into<String>) -> ProvenanceError {
    ValidationErrors::single(path, FieldErrorKind::Malformed, message).into()
}

fn unexpected(pair: &Pair<'_, Rule>) -> ProvenanceError {
    ProvenanceError::Internal(format!("unexpected {:?} in query parse tree", pair.as_rule()))
}

/// Parse query text into a [`TextQuery`]. Syntax errors are reported as a
/// validation error on the `query` field with line and column.
pub fn parse_query(text: &str) -> Result<TextQuery> {
    let mut pairs = QueryParser::parse(Rule::query, text).map_err(|e| {
        let (line, column) = match e.line_col {
            LineColLocation::Pos(pos) | LineColLocation::Span(pos, _) => pos,
        };
        malformed(
            "query",
            format!("syntax error at line {line}, column {column}: {}", e.variant.message()),
        )
    })?;
    let root = pairs
        .next()
        .ok_or_else(|| ProvenanceError::Internal("empty query parse tree".into()))?;

    let mut out = TextQuery::default();
    for pair in root.into_inner() {
        match pair.as_rule() {
            Rule::prefix_decl => {
                let mut inner = pair.into_inner();
                let (Some(ns), Some(iri)) = (inner.next(), inner.next()) else {
                    return Err(ProvenanceError::Internal("incomplete PREFIX declaration".into()));
                };
                let prefix = ns.as_str().trim_end_matches(':').to_string();
                out.pattern_set.prefixes.insert(prefix, iri_body(iri));
            }
            Rule::select_clause => {
                out.pattern_set.select = pair
                    .into_inner()
                    .filter(|p| p.as_rule() == Rule::var)
                    .map(var_of)
                    .collect();
            }
            Rule::where_clause => {
                for top in pair.into_inner() {
                    build_top_group(top, &mut out)?;
                }
            }
            Rule::limit_clause => {
                let digits = pair.into_inner().as_str();
                let limit = digits
                    .parse::<usize>()
                    .map_err(|_| malformed("limit", format!("`{digits}` is not a valid limit")))?;
                out.pattern_set.limit = Some(limit);
            }
            Rule::EOI => {}
            _ => return Err(unexpected(&pair)),
        }
    }
    Ok(out)
}

fn build_top_group(pair: Pair<'_, Rule>, out: &mut TextQuery) -> Result<()> {
    for item in pair.into_inner() {
        if item.as_rule() == Rule::service_block {
            let mut remote = out.pattern_set.remote.take().unwrap_or_default();
            for part in item.into_inner() {
                match part.as_rule() {
                    Rule::service_name => {
                        let name = match part.clone().into_inner().next() {
                            Some(inner) if inner.as_rule() == Rule::iri_ref => iri_body(inner),
                            _ => part.as_str().to_string(),
                        };
                        if !out.endpoints.contains(&name) {
                            out.endpoints.push(name);
                        }
                    }
                    Rule::group => {
                        let block = build_group(part)?;
                        remote.patterns.extend(block.patterns);
                        remote.optional.extend(block.optional);
                        remote.filters.extend(block.filters);
                    }
                    _ => return Err(unexpected(&part)),
                }
            }
            out.pattern_set.remote = Some(remote);
        } else {
            add_item(item, &mut out.pattern_set.group)?;
        }
    }
    Ok(())
}

fn build_group(pair: Pair<'_, Rule>) -> Result<PatternGroup> {
    let mut group = PatternGroup::default();
    for item in pair.into_inner() {
        add_item(item, &mut group)?;
    }
    Ok(group)
}

fn add_item(item: Pair<'_, Rule>, group: &mut PatternGroup) -> Result<()> {
    match item.as_rule() {
        Rule::triple_stmt => {
            let mut inner = item.into_inner();
            let (Some(s), Some(p), Some(o)) = (inner.next(), inner.next(), inner.next()) else {
                return Err(ProvenanceError::Internal("incomplete triple pattern".into()));
            };
            group
                .patterns
                .push(TriplePattern::new(build_term(s)?, build_term(p)?, build_term(o)?));
        }
        Rule::optional_block => {
            for inner in item.into_inner() {
                group.optional.push(build_group(inner)?);
            }
        }
        Rule::filter_clause => {
            for inner in item.into_inner() {
                group.filters.push(build_filter(inner)?);
            }
        }
        _ => return Err(unexpected(&item)),
    }
    Ok(())
}

fn build_filter(pair: Pair<'_, Rule>) -> Result<Filter> {
    let rule = pair.as_rule();
    let mut inner = pair.clone().into_inner();
    let first = inner.next().ok_or_else(|| unexpected(&pair))?;
    let var = var_of(first.clone());

    Ok(match rule {
        Rule::bound_fn => Filter::Bound { var },
        Rule::not_bound_fn => Filter::NotBound { var },
        Rule::contains_fn => {
            let needle = inner.next().map(string_value).ok_or_else(|| unexpected(&pair))?;
            Filter::Contains {
                var,
                needle,
                case_insensitive: first.as_rule() == Rule::lcase_var,
            }
        }
        Rule::regex_fn => {
            let pattern = inner.next().map(string_value).ok_or_else(|| unexpected(&pair))?;
            let flags = inner.next().map(string_value).unwrap_or_default();
            Filter::Regex {
                var,
                pattern,
                case_insensitive: flags.contains('i'),
            }
        }
        Rule::comparison => {
            let (Some(op), Some(value)) = (inner.next(), inner.next()) else {
                return Err(unexpected(&pair));
            };
            let value = build_term(value)?;
            match op.as_str() {
                "=" => Filter::Equals { var, value },
                "!=" => Filter::NotEquals { var, value },
                "<" => Filter::LessThan { var, value },
                ">" => Filter::GreaterThan { var, value },
                _ => return Err(unexpected(&op)),
            }
        }
        _ => return Err(unexpected(&pair)),
    })
}

/// The variable name under `pair`, which is a `var` or wraps one.
fn var_of(pair: Pair<'_, Rule>) -> String {
    pair.into_inner()
        .flatten()
        .find(|p| p.as_rule() == Rule::var_name)
        .map(|p| p.as_str().to_string())
        .unwrap_or_default()
}

fn iri_body(pair: Pair<'_, Rule>) -> String {
    pair.into_inner().as_str().to_string()
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Contents of a `string_lit`, unescaped.
fn string_value(pair: Pair<'_, Rule>) -> String {
    unescape(pair.into_inner().as_str())
}

fn build_literal(pair: Pair<'_, Rule>) -> Result<Literal> {
    let mut inner = pair.clone().into_inner();
    let first = inner.next().ok_or_else(|| unexpected(&pair))?;
    Ok(match first.as_rule() {
        Rule::string_lit => {
            let value = string_value(first);
            match inner.next() {
                None => Literal::string(value),
                Some(tag) if tag.as_rule() == Rule::lang_tag => {
                    Literal::lang(value, tag.as_str().trim_start_matches('@'))
                }
                Some(dt) => {
                    let target = dt.into_inner().next().ok_or_else(|| unexpected(&pair))?;
                    let iri = if target.as_rule() == Rule::iri_ref {
                        iri_body(target)
                    } else {
                        target.as_str().to_string()
                    };
                    Literal {
                        value,
                        datatype: Datatype::from_iri(&iri),
                        lang: None,
                    }
                }
            }
        }
        Rule::number => {
            let text = first.as_str();
            Literal {
                value: text.to_string(),
                datatype: if text.contains('.') {
                    Datatype::Decimal
                } else {
                    Datatype::Integer
                },
                lang: None,
            }
        }
        Rule::boolean => Literal::boolean(first.as_str() == "true"),
        _ => return Err(unexpected(&first)),
    })
}

fn build_term(pair: Pair<'_, Rule>) -> Result<PatternTerm> {
    Ok(match pair.as_rule() {
        Rule::var => PatternTerm::Var(var_of(pair)),
        Rule::iri_ref => PatternTerm::Iri(iri_body(pair)),
        Rule::prefixed_name => PatternTerm::Prefixed(pair.as_str().to_string()),
        Rule::a_kw => PatternTerm::Iri(RDF_TYPE.to_string()),
        Rule::literal => PatternTerm::Literal(build_literal(pair)?),
        _ => return Err(unexpected(&pair)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ArtworkRecord, EntityRef};
    use crate::ProvenanceGraph;

    #[test]
    fn parses_a_full_query() {
        let q = parse_query(
            r#"
            PREFIX wdt: <http://www.wikidata.org/prop/direct/>
            # artworks and their images
            SELECT ?artwork ?title ?image WHERE {
              ?artwork a hp:Artwork .
              ?artwork hp:title ?title .
              OPTIONAL { ?artwork owl:sameAs ?link }
              FILTER(CONTAINS(LCASE(?title), "fair"))
              SERVICE <wikidata> { ?link wdt:P18 ?image . }
            }
            LIMIT 10
            "#,
        )
        .unwrap();

        let set = &q.pattern_set;
        assert_eq!(set.prefixes["wdt"], "http://www.wikidata.org/prop/direct/");
        assert_eq!(set.select, vec!["artwork", "title", "image"]);
        assert_eq!(set.limit, Some(10));
        assert_eq!(set.group.patterns.len(), 2);
        assert_eq!(set.group.patterns[0].predicate, PatternTerm::Iri(RDF_TYPE.into()));
        assert_eq!(set.group.patterns[0].object, PatternTerm::prefixed("hp:Artwork"));
        assert_eq!(set.group.optional.len(), 1);
        assert_eq!(
            set.group.filters,
            vec![Filter::Contains {
                var: "title".into(),
                needle: "fair".into(),
                case_insensitive: true
            }]
        );
        let remote = set.remote.as_ref().unwrap();
        assert_eq!(remote.patterns[0].predicate, PatternTerm::prefixed("wdt:P18"));
        assert_eq!(q.endpoints, vec!["wikidata"]);
    }

    #[test]
    fn parses_literals_and_filters() {
        let q = parse_query(
            r#"SELECT * {
                 ?a hp:title "Târg de țară"@ro .
                 ?a hp:height "65.5"^^xsd:decimal .
                 ?a hp:sequence 3 .
                 ?a hp:medium 'oil \'on\' canvas' .
                 FILTER(?h > 60)
                 FILTER(!BOUND(?d))
                 FILTER(REGEX(STR(?t), "^village", "i"))
                 FILTER(?a != <http://x/artwork/1>)
               }"#,
        )
        .unwrap();
        let set = &q.pattern_set;
        assert!(set.select.is_empty());
        assert_eq!(
            set.group.patterns[0].object,
            PatternTerm::Literal(Literal::lang("Târg de țară", "ro"))
        );
        let PatternTerm::Literal(height) = &set.group.patterns[1].object else {
            panic!("expected literal");
        };
        assert_eq!(height.datatype, Datatype::Decimal);
        assert_eq!(set.group.patterns[2].object, PatternTerm::Literal(Literal::integer(3)));
        assert_eq!(set.group.patterns[3].object, PatternTerm::string("oil 'on' canvas"));
        assert_eq!(
            set.group.filters,
            vec![
                Filter::GreaterThan {
                    var: "h".into(),
                    value: PatternTerm::Literal(Literal::integer(60))
                },
                Filter::NotBound { var: "d".into() },
                Filter::Regex {
                    var: "t".into(),
                    pattern: "^village".into(),
                    case_insensitive: true
                },
                Filter::NotEquals {
                    var: "a".into(),
                    value: PatternTerm::iri("http://x/artwork/1")
                },
            ]
        );
        assert!(q.endpoints.is_empty());
    }

    #[test]
    fn comments_are_skipped_anywhere() {
        let q = parse_query(
            r##"# leading comment
            SELECT ?a # trailing after select
            WHERE {
              ?a hp:title "#not a comment"# right after a literal
              # on its own line
            } LIMIT 2 # end"##,
        )
        .unwrap();
        let set = &q.pattern_set;
        assert_eq!(set.select, vec!["a"]);
        assert_eq!(set.group.patterns.len(), 1);
        assert_eq!(set.group.patterns[0].object, PatternTerm::string("#not a comment"));
        assert_eq!(set.limit, Some(2));
    }

    #[test]
    fn syntax_errors_carry_position() {
        let err = parse_query("SELECT ?a WHERE { ?a hp:title }").unwrap_err();
        let ProvenanceError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.errors[0].path, "query");
        assert!(errors.errors[0].message.contains("line 1"), "{}", errors.errors[0].message);

        assert!(parse_query("SELECT ?a WHERE { ?a a hp:Artwork } LIMIT").is_err());
        assert!(parse_query("").is_err());
    }

    #[test]
    fn query_text_runs_against_the_graph() {
        let g = ProvenanceGraph::open_in_memory().unwrap();
        for (title, kind) in [("Village Fair", "painting"), ("Bird in Space", "sculpture")] {
            g.upsert_artwork(ArtworkRecord {
                title: title.into(),
                artwork_type: Some(kind.into()),
                creator: Some(EntityRef::Name("Nicolae Grigorescu".into())),
                ..Default::default()
            })
            .unwrap();
        }

        let result = g
            .query_text(
                r#"SELECT ?title WHERE {
                     ?a a hp:Artwork .
                     ?a hp:title ?title .
                     ?a hp:artworkType "sculpture" .
                   }"#,
            )
            .unwrap();
        assert_eq!(result.variables, vec!["title"]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("title").unwrap().lexical(), "Bird in Space");

        let err = g.query_text("SELECT ?x WHERE { ?x nope:thing ?y }").unwrap_err();
        assert!(matches!(err, ProvenanceError::Validation(_)));
    }
}
