use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;

fn write_mcp_message(stdin: &mut impl Write, payload: &Value) {
    let body = serde_json::to_vec(payload).unwrap();
    write!(stdin, "Content-Length: {}\r\n\r\n", body.len()).unwrap();
    stdin.write_all(&body).unwrap();
    stdin.flush().unwrap();
}

fn read_mcp_message(stdout: &mut impl BufRead) -> Value {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let n = stdout.read_line(&mut line).unwrap();
        assert!(n > 0, "unexpected EOF");
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(value.trim().parse::<usize>().unwrap());
            }
        }
    }
    let len = content_length.expect("missing Content-Length");
    let mut buf = vec![0_u8; len];
    stdout.read_exact(&mut buf).unwrap();
    serde_json::from_slice(&buf).unwrap()
}

fn call(
    stdin: &mut impl Write,
    stdout: &mut impl BufRead,
    id: u64,
    name: &str,
    arguments: Value,
) -> Value {
    write_mcp_message(
        stdin,
        &serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        }),
    );
    let response = read_mcp_message(stdout);
    assert_eq!(response["id"], id);
    response
}

#[test]
fn stdio_server_upsert_and_read_back() {
    let db = NamedTempFile::new().unwrap();
    let mut config = NamedTempFile::new().unwrap();
    writeln!(config, "endpoints = []").unwrap();

    let bin = env!("CARGO_BIN_EXE_provenance-mcp");
    let mut child = Command::new(bin)
        .env("PROVENANCE_MCP_DB_PATH", db.path())
        .env("PROVENANCE_MCP_CONFIG", config.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();

    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    write_mcp_message(
        &mut stdin,
        &serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {}
        }),
    );
    let init = read_mcp_message(&mut stdout);
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["serverInfo"]["name"], "provenance-mcp");

    let upsert = call(
        &mut stdin,
        &mut stdout,
        2,
        "upsert_artwork",
        serde_json::json!({
            "title": "Village Fair",
            "creation_date": "1885",
            "artwork_type": "painting",
            "creator": { "name": "Nicolae Grigorescu" }
        }),
    );
    let uri = upsert["result"]["structuredContent"]["outcome"]["uri"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(upsert["result"]["structuredContent"]["outcome"]["created"], true);

    let artwork = call(
        &mut stdin,
        &mut stdout,
        3,
        "get_artwork",
        serde_json::json!({ "uri": uri }),
    );
    assert_eq!(artwork["result"]["structuredContent"]["artwork"]["title"], "Village Fair");

    let stats = call(&mut stdin, &mut stdout, 4, "statistics", serde_json::json!({}));
    assert_eq!(stats["result"]["structuredContent"]["statistics"]["total_artworks"], 1);

    let missing = call(
        &mut stdin,
        &mut stdout,
        5,
        "get_artwork",
        serde_json::json!({ "uri": "http://arp-greatteam.org/heritage-provenance/artwork/nope" }),
    );
    assert_eq!(missing["result"]["isError"], true);

    // Stop child cleanly.
    drop(stdin);
    let _ = child.wait();
}
