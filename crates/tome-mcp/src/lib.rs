//! Tome MCP Server
//!
//! An MCP server that exposes bounded large-file reading as tools. Every tool
//! returns a JSON envelope `{data, truncated, metadata}`; failures come back as
//! a tool error carrying `{error: {kind, message, exit_code}}`.

pub mod middleware;

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    model::*,
    schemars::{self, JsonSchema},
    service::{RequestContext, RoleServer},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tome::{
    DEFAULT_CHUNK_SIZE_BYTES, DEFAULT_LINES_PER_CHUNK, DEFAULT_MAX_MATCHES, DEFAULT_N_LINES,
    FileAccess, ReadLinesOptions, SearchRequest,
};

use crate::middleware::run_tool;

/// Parameters for tools that only need a path
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PathParams {
    /// Path of the file to inspect
    pub path: String,
}

/// Parameters for `read_lines`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadLinesParams {
    /// Path of the file to read
    pub path: String,
    /// First line to return (1-based)
    pub start_line: i64,
    /// Last line to return (inclusive)
    pub end_line: i64,
    /// Per-line character cap (default: server limit)
    #[serde(default)]
    pub max_line_length: Option<usize>,
    /// Keep counting to the end of the file so `total_lines` is reported
    #[serde(default)]
    pub count_total: bool,
}

/// Parameters for `head` and `tail`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LineCountParams {
    /// Path of the file to read
    pub path: String,
    /// Number of lines (default: 10)
    #[serde(default = "default_n_lines")]
    pub n_lines: i64,
}

/// Parameters for `read_bytes`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadBytesParams {
    /// Path of the file to read
    pub path: String,
    /// Byte offset to start from
    pub start_offset: i64,
    /// Number of bytes to read
    pub length: i64,
}

/// Parameters for `search`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Path of the file to search
    pub path: String,
    /// Substring to look for, or a regular expression when `use_regex` is set
    pub pattern: String,
    /// Lines of context around each match (default: 0)
    #[serde(default)]
    pub context_lines: i64,
    /// Maximum number of matches to return (default: 100)
    #[serde(default = "default_max_matches")]
    pub max_matches: i64,
    /// Interpret `pattern` as a regular expression (default: false)
    #[serde(default)]
    pub use_regex: bool,
    /// Case-insensitive matching (default: true)
    #[serde(default = "default_true")]
    pub ignore_case: bool,
}

impl SearchParams {
    fn request(&self) -> SearchRequest {
        SearchRequest {
            pattern: self.pattern.clone(),
            context_lines: self.context_lines,
            max_matches: self.max_matches,
            use_regex: self.use_regex,
            ignore_case: self.ignore_case,
        }
    }
}

/// Parameters for `read_chunk`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadChunkParams {
    /// Path of the file to read
    pub path: String,
    /// Zero-based chunk index
    pub chunk_index: i64,
    /// Chunk size in bytes (default: 65536)
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: i64,
}

/// Parameters for `read_line_chunk`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadLineChunkParams {
    /// Path of the file to read
    pub path: String,
    /// Zero-based chunk index
    pub chunk_index: i64,
    /// Lines per chunk (default: 1000)
    #[serde(default = "default_lines_per_chunk")]
    pub lines_per_chunk: i64,
}

/// Parameters for `convert_url`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConvertUrlParams {
    /// deer.social profile or post URL
    pub url: String,
}

fn default_n_lines() -> i64 {
    DEFAULT_N_LINES as i64
}

fn default_max_matches() -> i64 {
    DEFAULT_MAX_MATCHES as i64
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> i64 {
    DEFAULT_CHUNK_SIZE_BYTES as i64
}

fn default_lines_per_chunk() -> i64 {
    DEFAULT_LINES_PER_CHUNK as i64
}

/// MCP Server that provides bounded file access via Tome
#[derive(Clone)]
pub struct TomeServer {
    access: Arc<FileAccess>,
}

impl std::fmt::Debug for TomeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TomeServer")
            .field("limits", self.access.limits())
            .finish_non_exhaustive()
    }
}

impl TomeServer {
    /// Create a server that serves every request through `access`.
    pub fn new(access: FileAccess) -> Self {
        Self {
            access: Arc::new(access),
        }
    }

    /// Every tool this server exposes.
    pub fn tools(&self) -> Vec<Tool> {
        vec![
            tool::<PathParams>(
                "stat",
                "File Stats",
                "Size, line count and encoding of a file. Line counts of very large files \
                are estimated from a prefix sample and flagged as inexact.",
            ),
            tool::<ReadLinesParams>(
                "read_lines",
                "Read Line Range",
                "Read lines start_line..=end_line (1-based). Ranges past the end of the file \
                return the lines that exist along with the true line count.",
            ),
            tool::<LineCountParams>(
                "head",
                "Read First Lines",
                "Read the first n_lines lines of a file without scanning the rest.",
            ),
            tool::<LineCountParams>(
                "tail",
                "Read Last Lines",
                "Read the last n_lines lines of a file by scanning backward from the end.",
            ),
            tool::<ReadBytesParams>(
                "read_bytes",
                "Read Byte Range",
                "Read raw bytes from an offset. Text comes back as UTF-8, anything else as \
                base64.",
            ),
            tool::<SearchParams>(
                "search",
                "Search Lines",
                "Find lines matching a substring or regular expression, with optional context. \
                Stops after max_matches and sets truncated when more matches exist.",
            ),
            tool::<ReadChunkParams>(
                "read_chunk",
                "Read Byte Chunk",
                "Read one fixed-size byte window of a file. Chunks concatenated in order \
                reproduce the file; the final one has is_last_chunk set.",
            ),
            tool::<ReadLineChunkParams>(
                "read_line_chunk",
                "Read Line Chunk",
                "Read one block of lines_per_chunk lines. has_more tells whether later chunks \
                exist.",
            ),
            tool::<ConvertUrlParams>(
                "convert_url",
                "Convert deer.social URL",
                "Convert a deer.social profile or post URL into its AT URI.",
            ),
        ]
    }

    /// Route one tool call by name.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, McpError> {
        let access = self.access.as_ref();
        match name {
            "stat" => {
                run_tool(access, "stat", parse::<PathParams>(name, arguments)?, |a, p| {
                    a.stat(&p.path)
                })
                .await
            }
            "read_lines" => {
                let params = parse::<ReadLinesParams>(name, arguments)?;
                run_tool(access, "read_lines", params, |a, p| {
                    let options = ReadLinesOptions {
                        max_line_length: p.max_line_length,
                        count_total: p.count_total,
                    };
                    a.read_lines(&p.path, p.start_line, p.end_line, options)
                })
                .await
            }
            "head" => {
                let params = parse::<LineCountParams>(name, arguments)?;
                run_tool(access, "head", params, |a, p| a.head(&p.path, p.n_lines)).await
            }
            "tail" => {
                let params = parse::<LineCountParams>(name, arguments)?;
                run_tool(access, "tail", params, |a, p| a.tail(&p.path, p.n_lines)).await
            }
            "read_bytes" => {
                let params = parse::<ReadBytesParams>(name, arguments)?;
                run_tool(access, "read_bytes", params, |a, p| {
                    a.read_bytes(&p.path, p.start_offset, p.length)
                })
                .await
            }
            "search" => {
                let params = parse::<SearchParams>(name, arguments)?;
                run_tool(access, "search", params, |a, p| a.search(&p.path, &p.request())).await
            }
            "read_chunk" => {
                let params = parse::<ReadChunkParams>(name, arguments)?;
                run_tool(access, "read_chunk", params, |a, p| {
                    a.read_chunk(&p.path, p.chunk_index, p.chunk_size_bytes)
                })
                .await
            }
            "read_line_chunk" => {
                let params = parse::<ReadLineChunkParams>(name, arguments)?;
                run_tool(access, "read_line_chunk", params, |a, p| {
                    a.read_line_chunk(&p.path, p.chunk_index, p.lines_per_chunk)
                })
                .await
            }
            "convert_url" => {
                let params = parse::<ConvertUrlParams>(name, arguments)?;
                run_tool(access, "convert_url", params, |_, p| {
                    tome::convert_deer_url(&p.url)
                })
                .await
            }
            _ => Err(McpError::invalid_params(
                format!("Unknown tool: {}", name),
                None,
            )),
        }
    }
}

fn tool<P: JsonSchema>(name: &'static str, title: &'static str, description: &'static str) -> Tool {
    let schema = schemars::schema_for!(P);
    let schema_json = serde_json::to_value(schema).unwrap_or_default();
    let input_schema = match schema_json {
        serde_json::Value::Object(map) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    };

    Tool {
        name: name.into(),
        title: Some(title.into()),
        description: Some(description.into()),
        input_schema,
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    }
}

fn parse<P: DeserializeOwned>(tool: &str, arguments: Option<JsonObject>) -> Result<P, McpError> {
    let args = arguments.unwrap_or_default();
    serde_json::from_value(serde_json::Value::Object(args)).map_err(|e| {
        McpError::invalid_params(format!("Invalid parameters for {}: {}", tool, e), None)
    })
}

impl ServerHandler for TomeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Tome reads large files without loading them whole. Start with 'stat' to learn a \
                file's size and line count, then use 'head', 'tail', 'read_lines', 'search' or \
                the chunk tools to page through it. Results carry a 'truncated' flag whenever a \
                limit cut them short."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch(request.name.as_ref(), request.arguments).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::Write;

    use serde_json::{Value, json};

    use super::*;

    fn args(value: Value) -> Option<JsonObject> {
        match value {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    fn envelope(result: &CallToolResult) -> Value {
        let json = serde_json::to_value(result).expect("serialize result");
        let text = json["content"][0]["text"].as_str().expect("text content");
        serde_json::from_str(text).expect("envelope json")
    }

    // ==================== Params Tests ====================

    #[test]
    fn test_line_count_params_defaults() {
        let params: LineCountParams =
            serde_json::from_str(r#"{"path": "/var/log/app.log"}"#).expect("parse failed");
        assert_eq!(params.n_lines, 10);
    }

    #[test]
    fn test_search_params_defaults() {
        let params: SearchParams =
            serde_json::from_str(r#"{"path": "a.log", "pattern": "ERROR"}"#).expect("parse failed");
        assert_eq!(params.context_lines, 0);
        assert_eq!(params.max_matches, 100);
        assert!(!params.use_regex);
        assert!(params.ignore_case);
    }

    #[test]
    fn test_chunk_params_defaults() {
        let bytes: ReadChunkParams =
            serde_json::from_str(r#"{"path": "a", "chunk_index": 3}"#).expect("parse failed");
        assert_eq!(bytes.chunk_size_bytes, 65536);
        let lines: ReadLineChunkParams =
            serde_json::from_str(r#"{"path": "a", "chunk_index": 0}"#).expect("parse failed");
        assert_eq!(lines.lines_per_chunk, 1000);
    }

    #[test]
    fn test_read_lines_params_require_range() {
        let err = serde_json::from_str::<ReadLinesParams>(r#"{"path": "a", "start_line": 1}"#);
        assert!(err.is_err());
    }

    // ==================== Tool List Tests ====================

    #[test]
    fn test_tool_names() {
        let server = TomeServer::new(FileAccess::default());
        let names: Vec<String> = server.tools().iter().map(|t| t.name.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "stat",
                "read_lines",
                "head",
                "tail",
                "read_bytes",
                "search",
                "read_chunk",
                "read_line_chunk",
                "convert_url"
            ]
        );
    }

    #[test]
    fn test_tool_schemas_list_properties() {
        let server = TomeServer::new(FileAccess::default());
        for tool in server.tools() {
            let schema = Value::Object((*tool.input_schema).clone());
            assert!(
                schema["properties"].is_object(),
                "{} has no properties: {}",
                tool.name,
                schema
            );
        }
    }

    // ==================== Dispatch Tests ====================

    #[tokio::test]
    async fn test_dispatch_tail() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 1..=30 {
            writeln!(file, "entry {}", i).unwrap();
        }
        let server = TomeServer::new(FileAccess::default());

        let result = server
            .dispatch(
                "tail",
                args(json!({"path": file.path(), "n_lines": 2})),
            )
            .await
            .unwrap();

        let env = envelope(&result);
        assert_eq!(env["data"], json!(["entry 29", "entry 30"]));
        assert_eq!(env["truncated"], false);
    }

    #[tokio::test]
    async fn test_dispatch_invalid_range_is_tool_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "x").unwrap();
        let server = TomeServer::new(FileAccess::default());

        let result = server
            .dispatch(
                "read_lines",
                args(json!({"path": file.path(), "start_line": 5, "end_line": 2})),
            )
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        assert_eq!(envelope(&result)["error"]["kind"], "invalid_range");
    }

    #[tokio::test]
    async fn test_dispatch_negative_context_is_invalid_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "x").unwrap();
        let server = TomeServer::new(FileAccess::default());

        let result = server
            .dispatch(
                "search",
                args(json!({"path": file.path(), "pattern": "x", "context_lines": -1})),
            )
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        assert_eq!(envelope(&result)["error"]["kind"], "invalid_range");
    }

    #[tokio::test]
    async fn test_dispatch_bad_arguments_are_invalid_params() {
        let server = TomeServer::new(FileAccess::default());
        let err = server
            .dispatch("head", args(json!({"n_lines": 3})))
            .await
            .unwrap_err();
        assert!(err.message.contains("head"));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let server = TomeServer::new(FileAccess::default());
        assert!(server.dispatch("execute", None).await.is_err());
    }

    #[tokio::test]
    async fn test_dispatch_convert_url() {
        let server = TomeServer::new(FileAccess::default());
        let result = server
            .dispatch(
                "convert_url",
                args(json!({"url": "https://deer.social/profile/did:plc:abc123/post/3kxyz"})),
            )
            .await
            .unwrap();
        let env = envelope(&result);
        assert_eq!(env["data"]["at_uri"], "at://did:plc:abc123/app.bsky.feed.post/3kxyz");
        assert_eq!(env["data"]["kind"], "post");
    }
}
