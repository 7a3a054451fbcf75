use anyhow::{Context, Result};
use provenance_graph::{
    AgentRecord, ArtworkRecord, EngineConfig, EventRecord, PlaceRecord, ProvenanceError,
    ProvenanceGraph, QueryRequest, RecommendRequest,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use std::env;
use std::io::{self, BufRead, BufReader, Write};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MAX_MESSAGE_BYTES: usize = 1_048_576; // 1 MiB
const MAX_TEXT_BYTES: usize = 32 * 1024; // 32 KiB
const MAX_QUERY_BYTES: usize = 8 * 1024; // 8 KiB
const MAX_URI_BYTES: usize = 2048;
const MAX_RESULT_LIMIT: usize = 200;

struct AppState {
    graph: ProvenanceGraph,
}

impl AppState {
    fn open() -> Result<Self> {
        let db_path = env::var("PROVENANCE_MCP_DB_PATH")
            .unwrap_or_else(|_| "./provenance-mcp.redb".to_string());
        let config = match env::var("PROVENANCE_MCP_CONFIG") {
            Ok(path) => EngineConfig::from_file(&path)
                .with_context(|| format!("failed to load config from {path}"))?,
            Err(_) => EngineConfig::default(),
        };
        let graph = ProvenanceGraph::open_with_config(&db_path, config)?;
        info!(db_path, "provenance graph ready");
        Ok(Self { graph })
    }
}

fn main() -> Result<()> {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let state = AppState::open().context("failed to open provenance database")?;
    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin.lock());
    let stdout = io::stdout();
    let mut writer = stdout.lock();

    loop {
        let maybe = match read_message(&mut reader) {
            Ok(m) => m,
            Err(e) => {
                // Bad framing answers -32700 and the loop keeps reading.
                warn!(error = %e, "unreadable message");
                let err_resp = json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": { "code": -32700, "message": format!("Parse error: {e}") }
                });
                write_message(&mut writer, &err_resp)?;
                continue;
            }
        };
        let Some(request) = maybe else {
            break;
        };
        if let Some(response) = handle_request(&state, &request) {
            write_message(&mut writer, &response)?;
        }
    }

    Ok(())
}

fn read_message<R: BufRead>(reader: &mut R) -> Result<Option<JsonValue>> {
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }

        if let Some((name, value)) = trimmed.split_once(':') {
            if name.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(
                    value
                        .trim()
                        .parse::<usize>()
                        .context("invalid Content-Length")?,
                );
            }
        }
    }

    let len = content_length.context("missing Content-Length header")?;
    if len > MAX_MESSAGE_BYTES {
        anyhow::bail!("Content-Length {} exceeds max allowed {} bytes", len, MAX_MESSAGE_BYTES);
    }
    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload)?;
    let value: JsonValue = serde_json::from_slice(&payload).context("invalid JSON payload")?;
    Ok(Some(value))
}

fn write_message<W: Write>(writer: &mut W, value: &JsonValue) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    write!(writer, "Content-Length: {}\r\n\r\n", payload.len())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

fn handle_request(state: &AppState, req: &JsonValue) -> Option<JsonValue> {
    let id = req.get("id").cloned();
    let method = req.get("method").and_then(JsonValue::as_str)?;
    debug!(method, "request");

    match method {
        "initialize" => id.map(|id_val| {
            json!({
                "jsonrpc": "2.0",
                "id": id_val,
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "provenance-mcp", "version": env!("CARGO_PKG_VERSION") }
                }
            })
        }),
        "notifications/initialized" => None,
        "tools/list" => id.map(|id_val| {
            json!({
                "jsonrpc": "2.0",
                "id": id_val,
                "result": {
                    "tools": tools_schema()
                }
            })
        }),
        "tools/call" => id.map(|id_val| {
            let result = call_tool(state, req.get("params"));
            match result {
                Ok(tool_result) => json!({
                    "jsonrpc": "2.0",
                    "id": id_val,
                    "result": tool_result
                }),
                Err(err) => json!({
                    "jsonrpc": "2.0",
                    "id": id_val,
                    "result": tool_error(&err)
                }),
            }
        }),
        "ping" => id.map(|id_val| json!({ "jsonrpc": "2.0", "id": id_val, "result": {} })),
        _ => id.map(|id_val| {
            json!({
                "jsonrpc": "2.0",
                "id": id_val,
                "error": {
                    "code": -32601,
                    "message": format!("method not found: {method}")
                }
            })
        }),
    }
}

/// Tool failures are results with `isError`; field errors are also passed
/// through as structured content so a client can point at the bad input.
fn tool_error(err: &anyhow::Error) -> JsonValue {
    let mut out = json!({
        "content": [{ "type": "text", "text": format!("tool error: {err:#}") }],
        "isError": true
    });
    if let Some(ProvenanceError::Validation(errors)) = err.downcast_ref::<ProvenanceError>() {
        out["structuredContent"] = json!({ "errors": errors.errors });
    }
    out
}

fn uri_schema() -> JsonValue {
    json!({ "type": "object", "properties": { "uri": {"type": "string"} }, "required": ["uri"] })
}

fn tools_schema() -> Vec<JsonValue> {
    let entity_ref = json!({
        "description": "Either {\"uri\": ...} or {\"name\": ...}",
        "type": "object"
    });
    let links = json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": { "source": {"type": "string"}, "uri": {"type": "string"} },
            "required": ["source", "uri"]
        }
    });
    vec![
        json!({
            "name": "upsert_artwork",
            "description":
                "Create or update an artwork. Creator and location may be given by name.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "uri": {"type": "string"},
                    "title": {"type": "string"},
                    "localized_title": {"type": "object"},
                    "creation_date": {"type": "string"},
                    "artwork_type": {"type": "string"},
                    "medium": {"type": "string"},
                    "materials": {"type": "array", "items": {"type": "string"}},
                    "dimensions": {"type": "object"},
                    "description": {"type": "string"},
                    "creator": entity_ref,
                    "location": entity_ref,
                    "external_links": links
                },
                "required": ["title"]
            }
        }),
        json!({
            "name": "upsert_agent",
            "description": "Create or update a person or organization.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "uri": {"type": "string"},
                    "name": {"type": "string"},
                    "kind": {"type": "string", "enum": ["person", "organization"]},
                    "birth_date": {"type": "string"},
                    "death_date": {"type": "string"},
                    "nationality": {"type": "string"},
                    "biography": {"type": "string"},
                    "external_links": links
                },
                "required": ["name"]
            }
        }),
        json!({
            "name": "upsert_place",
            "description": "Create or update a place.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "uri": {"type": "string"},
                    "name": {"type": "string"},
                    "country": {"type": "string"},
                    "coordinates": {"type": "object"},
                    "external_links": links
                },
                "required": ["name"]
            }
        }),
        json!({
            "name": "append_event",
            "description":
                "Append a provenance event (sale, acquisition, exhibition, ...) to an artwork.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "artwork": {"type": "string"},
                    "event": {
                        "type": "object",
                        "properties": {
                            "event_type": {"type": "string"},
                            "date": {"type": "string"},
                            "from_agent": entity_ref,
                            "to_agent": entity_ref,
                            "place": entity_ref,
                            "note": {"type": "string"}
                        },
                        "required": ["event_type"]
                    }
                },
                "required": ["artwork", "event"]
            }
        }),
        json!({
            "name": "retract_entity",
            "description": "Remove an entity's statements and retire its URI.",
            "inputSchema": uri_schema()
        }),
        json!({
            "name": "get_artwork",
            "description": "Return an artwork with its creator, location and provenance chain.",
            "inputSchema": uri_schema()
        }),
        json!({
            "name": "provenance_chain",
            "description": "Return the ordered provenance events and gaps of an artwork.",
            "inputSchema": uri_schema()
        }),
        json!({
            "name": "query",
            "description": "Run a graph-pattern query, as text or as a structured pattern set.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "pattern_set": {"type": "object"},
                    "endpoints": {"type": "array", "items": {"type": "string"}},
                    "timeout_ms": {"type": "integer", "minimum": 1}
                }
            }
        }),
        json!({
            "name": "recommend",
            "description": "Recommend similar artworks by attributes or by provenance history.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "artwork": {"type": "string"},
                    "criteria": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "enum": [
                                "artist", "period", "type", "location", "medium", "description"
                            ]
                        }
                    },
                    "limit": {"type": "integer", "minimum": 1, "maximum": MAX_RESULT_LIMIT},
                    "min_score": {"type": "number", "minimum": 0, "maximum": 1},
                    "weights": {"type": "object"},
                    "by_provenance": {"type": "boolean"}
                },
                "required": ["artwork"]
            }
        }),
        json!({
            "name": "statistics",
            "description": "Counts of artworks, agents, places and events.",
            "inputSchema": { "type": "object", "properties": {} }
        }),
    ]
}

fn parse_args<T: DeserializeOwned>(args: &JsonValue, what: &str) -> Result<T> {
    serde_json::from_value(args.clone()).with_context(|| format!("invalid {what} arguments"))
}

fn required_str<'a>(args: &'a JsonValue, field: &str, max: usize) -> Result<&'a str> {
    let value = args
        .get(field)
        .and_then(JsonValue::as_str)
        .with_context(|| format!("{field} is required"))?;
    if value.len() > max {
        anyhow::bail!("{field} exceeds max allowed size ({max} bytes)");
    }
    Ok(value)
}

fn check_text(field: &str, value: Option<&str>) -> Result<()> {
    if value.is_some_and(|v| v.len() > MAX_TEXT_BYTES) {
        anyhow::bail!("{field} exceeds max allowed size ({} bytes)", MAX_TEXT_BYTES);
    }
    Ok(())
}

fn check_limit(limit: Option<usize>) -> Result<()> {
    if limit.is_some_and(|l| l > MAX_RESULT_LIMIT) {
        anyhow::bail!("limit exceeds max allowed value ({MAX_RESULT_LIMIT})");
    }
    Ok(())
}

fn structured<T: serde::Serialize>(text: String, key: &str, value: &T) -> Result<JsonValue> {
    let mut content = serde_json::Map::new();
    content.insert(key.to_string(), serde_json::to_value(value)?);
    Ok(json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": content
    }))
}

fn call_tool(state: &AppState, params: Option<&JsonValue>) -> Result<JsonValue> {
    let name = params
        .and_then(|v| v.get("name"))
        .and_then(JsonValue::as_str)
        .context("missing tool name")?;
    let args = params
        .and_then(|v| v.get("arguments"))
        .cloned()
        .unwrap_or_else(|| json!({}));
    let graph = &state.graph;

    match name {
        "upsert_artwork" => {
            let record: ArtworkRecord = parse_args(&args, "artwork")?;
            check_text("description", record.description.as_deref())?;
            let outcome = graph.upsert_artwork(record)?;
            let verb = if outcome.created { "created" } else { "updated" };
            structured(format!("{verb} artwork {}", outcome.uri), "outcome", &outcome)
        }
        "upsert_agent" => {
            let record: AgentRecord = parse_args(&args, "agent")?;
            check_text("biography", record.biography.as_deref())?;
            let outcome = graph.upsert_agent(record)?;
            let verb = if outcome.created { "created" } else { "updated" };
            structured(format!("{verb} agent {}", outcome.uri), "outcome", &outcome)
        }
        "upsert_place" => {
            let record: PlaceRecord = parse_args(&args, "place")?;
            let outcome = graph.upsert_place(record)?;
            let verb = if outcome.created { "created" } else { "updated" };
            structured(format!("{verb} place {}", outcome.uri), "outcome", &outcome)
        }
        "append_event" => {
            let artwork = required_str(&args, "artwork", MAX_URI_BYTES)?;
            let event = args.get("event").context("event is required")?;
            let record: EventRecord = parse_args(event, "event")?;
            check_text("note", record.note.as_deref())?;
            let outcome = graph.append_event(artwork, record)?;
            structured(format!("appended event {}", outcome.uri), "outcome", &outcome)
        }
        "retract_entity" => {
            let uri = required_str(&args, "uri", MAX_URI_BYTES)?;
            let report = graph.retract_entity(uri)?;
            structured(
                format!(
                    "retracted {} statement(s), {} dangling reference(s)",
                    report.retracted,
                    report.dangling.len()
                ),
                "report",
                &report,
            )
        }
        "get_artwork" => {
            let uri = required_str(&args, "uri", MAX_URI_BYTES)?;
            let view = graph.artwork(uri)?;
            structured(
                format!("{} ({} event(s))", view.title, view.provenance_chain.len()),
                "artwork",
                &view,
            )
        }
        "provenance_chain" => {
            let uri = required_str(&args, "uri", MAX_URI_BYTES)?;
            let chain = graph.provenance_chain(uri)?;
            structured(
                format!("{} event(s), {} gap(s)", chain.events.len(), chain.gaps.len()),
                "chain",
                &chain,
            )
        }
        "query" => {
            let result = if let Some(text) = args.get("query").and_then(JsonValue::as_str) {
                if text.len() > MAX_QUERY_BYTES {
                    anyhow::bail!("query exceeds max allowed size ({} bytes)", MAX_QUERY_BYTES);
                }
                graph.query_text(text)?
            } else {
                if serde_json::to_vec(&args)?.len() > MAX_QUERY_BYTES {
                    anyhow::bail!("query exceeds max allowed size ({} bytes)", MAX_QUERY_BYTES);
                }
                let request: QueryRequest = parse_args(&args, "query")?;
                graph.execute(&request)?
            };
            let text = format!(
                "{} row(s){}",
                result.metadata.result_count,
                if result.metadata.truncated { " (truncated)" } else { "" }
            );
            structured(text, "result", &result)
        }
        "recommend" => {
            let by_provenance = args
                .get("by_provenance")
                .and_then(JsonValue::as_bool)
                .unwrap_or(false);
            let request: RecommendRequest = parse_args(&args, "recommend")?;
            if request.artwork.len() > MAX_URI_BYTES {
                anyhow::bail!("artwork exceeds max allowed size ({MAX_URI_BYTES} bytes)");
            }
            check_limit(request.limit)?;
            let recommendations = if by_provenance {
                graph.recommend_by_provenance(&request.artwork, request.limit, request.min_score)?
            } else {
                graph.recommend(&request)?
            };
            structured(
                format!("{} recommendation(s)", recommendations.len()),
                "recommendations",
                &recommendations,
            )
        }
        "statistics" => {
            let stats = graph.statistics()?;
            structured(format!("{} artwork(s)", stats.total_artworks), "statistics", &stats)
        }
        _ => anyhow::bail!("unknown tool: {name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::NamedTempFile;

    fn temp_state() -> (AppState, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().to_string();
        let state = AppState {
            graph: ProvenanceGraph::open(&path).unwrap(),
        };
        (state, file)
    }

    fn call(state: &AppState, name: &str, arguments: JsonValue) -> Result<JsonValue> {
        call_tool(state, Some(&json!({ "name": name, "arguments": arguments })))
    }

    fn upsert_village_fair(state: &AppState) -> String {
        let out = call(
            state,
            "upsert_artwork",
            json!({
                "title": "Village Fair",
                "creation_date": "1885",
                "artwork_type": "painting",
                "creator": { "name": "Nicolae Grigorescu" }
            }),
        )
        .unwrap();
        out["structuredContent"]["outcome"]["uri"].as_str().unwrap().to_string()
    }

    #[test]
    fn upsert_then_chain_and_artwork() {
        let (state, _db) = temp_state();
        let uri = upsert_village_fair(&state);
        call(
            &state,
            "append_event",
            json!({
                "artwork": uri,
                "event": { "event_type": "acquisition", "date": "1945-08-20" }
            }),
        )
        .unwrap();

        let chain = call(&state, "provenance_chain", json!({ "uri": uri })).unwrap();
        let events = chain["structuredContent"]["chain"]["events"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["kind"], "creation");
        assert_eq!(events[1]["kind"], "acquisition");

        let artwork = call(&state, "get_artwork", json!({ "uri": uri })).unwrap();
        assert_eq!(
            artwork["structuredContent"]["artwork"]["creator"]["name"],
            "Nicolae Grigorescu"
        );
    }

    #[test]
    fn text_query_and_statistics() {
        let (state, _db) = temp_state();
        upsert_village_fair(&state);
        let out = call(
            &state,
            "query",
            json!({ "query": "SELECT ?t WHERE { ?a a hp:Artwork . ?a hp:title ?t }" }),
        )
        .unwrap();
        let rows = out["structuredContent"]["result"]["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 1);

        let stats = call(&state, "statistics", json!({})).unwrap();
        assert_eq!(stats["structuredContent"]["statistics"]["total_artworks"], 1);
    }

    #[test]
    fn validation_errors_are_structured() {
        let (state, _db) = temp_state();
        let err = call(&state, "upsert_artwork", json!({ "title": "" })).unwrap_err();
        let result = tool_error(&err);
        assert_eq!(result["isError"], true);
        let errors = result["structuredContent"]["errors"].as_array().unwrap();
        assert_eq!(errors[0]["path"], "title");
    }

    #[test]
    fn read_message_rejects_oversized_frame() {
        let raw = format!("Content-Length: {}\r\n\r\n", MAX_MESSAGE_BYTES + 1);
        let mut cursor = Cursor::new(raw.into_bytes());
        let err = read_message(&mut cursor).expect_err("oversized frame must fail");
        assert!(err.to_string().contains("exceeds max allowed"));
    }

    #[test]
    fn query_rejects_oversized_text() {
        let (state, _db) = temp_state();
        let huge = format!("SELECT * WHERE {{ {} }}", "?a ?b ?c . ".repeat(MAX_QUERY_BYTES / 8));
        let err = call(&state, "query", json!({ "query": huge }))
            .expect_err("oversized query must fail");
        assert!(err.to_string().contains("query exceeds max"));
    }

    #[test]
    fn recommend_rejects_excessive_limit() {
        let (state, _db) = temp_state();
        let uri = upsert_village_fair(&state);
        let err = call(
            &state,
            "recommend",
            json!({ "artwork": uri, "limit": MAX_RESULT_LIMIT + 1 }),
        )
        .expect_err("excessive limit must fail");
        assert!(err.to_string().contains("limit exceeds max"));
    }

    #[test]
    fn unknown_tool_fails() {
        let (state, _db) = temp_state();
        assert!(call(&state, "forget_everything", json!({})).is_err());
    }
}
