//! Integration tests for the Tome MCP server.
//!
//! These tests spawn the actual MCP server binary and talk to it over stdio
//! using JSON-RPC, exercising the transport, the blocking-pool handoff and the
//! error envelope together.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;

/// Helper to spawn the MCP server process
struct McpServerProcess {
    child: Child,
    stdout: BufReader<ChildStdout>,
}

impl McpServerProcess {
    fn spawn() -> Self {
        Self::spawn_with_args(&[])
    }

    fn spawn_with_args(args: &[&str]) -> Self {
        let binary = env!("CARGO_BIN_EXE_tome-mcp");

        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .unwrap_or_else(|e| panic!("Failed to spawn MCP server at {:?}: {}", binary, e));
        let stdout = BufReader::new(child.stdout.take().expect("stdout not captured"));

        Self { child, stdout }
    }

    /// Send a JSON-RPC request and get the response
    fn request(&mut self, request: Value) -> Value {
        self.notify(request);

        let mut response_line = String::new();
        self.stdout
            .read_line(&mut response_line)
            .expect("read response");

        serde_json::from_str(&response_line)
            .unwrap_or_else(|e| panic!("parse response '{}': {}", response_line.trim(), e))
    }

    /// Send a message without waiting for a reply
    fn notify(&mut self, message: Value) {
        let stdin = self.child.stdin.as_mut().expect("stdin not captured");
        let line = serde_json::to_string(&message).expect("serialize message");
        writeln!(stdin, "{}", line).expect("write message");
        stdin.flush().expect("flush stdin");
    }

    /// Call a tool and return the `result` object
    fn call(&mut self, id: u64, name: &str, arguments: Value) -> Value {
        let response = self.request(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        }));
        assert_eq!(response["id"], id);
        response
            .get("result")
            .cloned()
            .unwrap_or_else(|| panic!("Expected result, got: {}", response))
    }
}

impl Drop for McpServerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Perform MCP initialization handshake
fn initialize(server: &mut McpServerProcess) -> Value {
    let init_response = server.request(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "tome-mcp-test",
                "version": "0.1.0"
            }
        }
    }));

    assert_eq!(init_response["jsonrpc"], "2.0");
    assert_eq!(init_response["id"], 1);
    assert!(
        init_response.get("result").is_some(),
        "Expected result in initialize response, got: {}",
        init_response
    );

    server.notify(json!({
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }));

    // Give the server a moment to process
    std::thread::sleep(Duration::from_millis(50));

    init_response
}

/// Parse the JSON envelope carried in a tool result's text content
fn envelope(result: &Value) -> Value {
    let text = result["content"][0]["text"]
        .as_str()
        .unwrap_or_else(|| panic!("Expected text content, got: {}", result));
    serde_json::from_str(text).unwrap_or_else(|e| panic!("parse envelope '{}': {}", text, e))
}

fn write_log(dir: &Path, lines: usize) -> String {
    let path = dir.join("app.log");
    let content: String = (1..=lines)
        .map(|i| {
            let level = if i % 250 == 0 { "ERROR" } else { "INFO" };
            format!("{} event {}\n", level, i)
        })
        .collect();
    fs::write(&path, content).expect("write log");
    path.display().to_string()
}

#[test]
fn test_mcp_initialize() {
    let mut server = McpServerProcess::spawn();
    let response = initialize(&mut server);

    let result = &response["result"];
    assert!(
        result.get("serverInfo").is_some(),
        "Expected serverInfo in result"
    );
    assert!(
        result["capabilities"].get("tools").is_some(),
        "Expected tools capability"
    );
}

#[test]
fn test_mcp_list_tools() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    let response = server.request(json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/list",
        "params": {}
    }));

    let tools = response["result"]["tools"]
        .as_array()
        .expect("tools should be an array");
    for name in [
        "stat",
        "read_lines",
        "head",
        "tail",
        "read_bytes",
        "search",
        "read_chunk",
        "read_line_chunk",
        "convert_url",
    ] {
        let tool = tools
            .iter()
            .find(|t| t["name"] == name)
            .unwrap_or_else(|| panic!("Expected '{}' tool", name));
        assert!(tool.get("description").is_some());
        assert!(tool.get("inputSchema").is_some());
    }
}

#[test]
fn test_mcp_stat_and_read_lines() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = write_log(temp_dir.path(), 10_000);
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    let stat = envelope(&server.call(10, "stat", json!({ "path": path })));
    assert_eq!(stat["data"]["line_count"], 10_000);
    assert_eq!(stat["data"]["line_count_exact"], true);

    let lines = envelope(&server.call(
        11,
        "read_lines",
        json!({ "path": path, "start_line": 9995, "end_line": 10010 }),
    ));
    assert_eq!(lines["data"].as_array().map(Vec::len), Some(6));
    assert_eq!(lines["metadata"]["total_lines"], 10_000);
    assert_eq!(lines["truncated"], false);
}

#[test]
fn test_mcp_head_tail_search() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = write_log(temp_dir.path(), 1000);
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    let head = envelope(&server.call(20, "head", json!({ "path": path, "n_lines": 2 })));
    assert_eq!(head["data"], json!(["INFO event 1", "INFO event 2"]));

    let tail = envelope(&server.call(21, "tail", json!({ "path": path })));
    assert_eq!(tail["data"].as_array().map(Vec::len), Some(10));
    assert_eq!(tail["data"][9], "ERROR event 1000");

    let search = envelope(&server.call(
        22,
        "search",
        json!({ "path": path, "pattern": "error", "max_matches": 3, "context_lines": 1 }),
    ));
    let matches = search["data"].as_array().expect("matches");
    assert_eq!(matches.len(), 3);
    assert_eq!(matches[0]["line_number"], 250);
    assert_eq!(matches[0]["context_before"][0]["text"], "INFO event 249");
    assert_eq!(search["truncated"], true);
}

#[test]
fn test_mcp_read_chunk() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = temp_dir.path().join("small.txt");
    fs::write(&path, "hello chunked world").expect("write file");
    let path = path.display().to_string();
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    let chunk = envelope(&server.call(
        30,
        "read_chunk",
        json!({ "path": path, "chunk_index": 1, "chunk_size_bytes": 8 }),
    ));
    assert_eq!(chunk["data"]["content"], "unked wo");
    assert_eq!(chunk["data"]["content_encoding"], "utf-8");
    assert_eq!(chunk["data"]["is_last_chunk"], false);
    assert_eq!(chunk["metadata"]["total_chunks"], 3);
}

#[test]
fn test_mcp_missing_file_is_tool_error() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    let result = server.call(40, "stat", json!({ "path": "/no/such/file.log" }));
    assert_eq!(result["isError"], true);
    let error = envelope(&result);
    assert_eq!(error["error"]["kind"], "not_found");
    assert_eq!(error["error"]["exit_code"], 2);
}

#[test]
fn test_mcp_invalid_params() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    let response = server.request(json!({
        "jsonrpc": "2.0",
        "id": 41,
        "method": "tools/call",
        "params": { "name": "read_bytes", "arguments": { "path": "/tmp/x" } }
    }));
    assert!(
        response.get("error").is_some(),
        "Expected JSON-RPC error for missing arguments, got: {}",
        response
    );
}

#[test]
fn test_mcp_unknown_tool() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    let response = server.request(json!({
        "jsonrpc": "2.0",
        "id": 42,
        "method": "tools/call",
        "params": { "name": "nonexistent_tool", "arguments": {} }
    }));
    assert!(
        response.get("error").is_some(),
        "Expected error for unknown tool, got: {}",
        response
    );
}

#[test]
fn test_mcp_strict_encoding_flag() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = temp_dir.path().join("latin1.txt");
    fs::write(&path, b"caf\xe9\n").expect("write file");
    let path = path.display().to_string();

    let mut lossy = McpServerProcess::spawn();
    initialize(&mut lossy);
    let ok = lossy.call(50, "head", json!({ "path": path }));
    assert_ne!(ok["isError"], true);
    assert_eq!(envelope(&ok)["metadata"]["encoding"], "utf-8 (lossy)");

    let mut strict = McpServerProcess::spawn_with_args(&["--strict-encoding"]);
    initialize(&mut strict);
    let err = strict.call(51, "head", json!({ "path": path }));
    assert_eq!(err["isError"], true);
    assert_eq!(envelope(&err)["error"]["kind"], "encoding");
}

#[test]
fn test_mcp_config_file_limits() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = write_log(temp_dir.path(), 100);
    let config = temp_dir.path().join("limits.json");
    fs::write(&config, r#"{"max_lines": 5}"#).expect("write config");
    let config = config.display().to_string();

    let mut server = McpServerProcess::spawn_with_args(&["--config", &config]);
    initialize(&mut server);

    let head = envelope(&server.call(60, "head", json!({ "path": path, "n_lines": 50 })));
    assert_eq!(head["data"].as_array().map(Vec::len), Some(5));
    assert_eq!(head["truncated"], true);
}

#[test]
fn test_mcp_multiple_calls() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = write_log(temp_dir.path(), 50);
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    for i in 0..5u64 {
        let chunk = envelope(&server.call(
            100 + i,
            "read_line_chunk",
            json!({ "path": path, "chunk_index": i, "lines_per_chunk": 10 }),
        ));
        assert_eq!(chunk["data"][0], format!("INFO event {}", i * 10 + 1));
        assert_eq!(chunk["metadata"]["has_more"], i < 4);
    }
}
