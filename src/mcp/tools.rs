//! MCP tool definitions and dispatch.
//!
//! `TOOL_DEFINITIONS` mirrors the teacher's const-array-of-JSON-schema
//! convention. `ToolRouter` wires each of the nine core tools plus the
//! `smart_complete` stub to a [`crate::MemoryEngine`], matching call results
//! as `✓`/`✗`-prefixed text per the external interface contract.

use serde_json::{json, Value};

use crate::engine::{ConflictInfo, MemoryEngine, RecallResult, RememberOutcome};
use crate::error::{MemoryError, Result};
use crate::mcp::protocol::{McpHandler, McpRequest, McpResponse, ToolCallResult, ToolDefinition};
use crate::types::{EntityStatus, EntityType, EdgeType, Memory, Priority};

/// All tool definitions: `(name, description, input_schema_json)`.
pub const TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    (
        "remember",
        "Store a new memory. Without confirmed=true, returns a markdown preview of what would be stored instead of writing it.",
        r#"{
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "The content to remember"},
                "memory_type": {"type": "string", "default": "note", "description": "fact, preference, decision, pattern, solution, note, or another memory type"},
                "importance": {"type": "number", "minimum": 0, "maximum": 1, "default": 0.5},
                "project": {"type": "string"},
                "source_role": {"type": "string"},
                "metadata": {"type": "object"},
                "check_conflicts": {"type": "boolean", "default": false, "description": "Run the contradiction scan before writing"},
                "supersede": {"type": "array", "items": {"type": "string"}, "description": "Memory ids this new memory replaces"},
                "confirmed": {"type": "boolean", "default": false, "description": "Must be true to actually write; otherwise a preview is returned"}
            },
            "required": ["content"]
        }"#,
    ),
    (
        "recall",
        "Hybrid (semantic + keyword) search over memories, scored by the composite relevance formula.",
        r#"{
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer", "default": 10},
                "project": {"type": "string"},
                "memory_types": {"type": "array", "items": {"type": "string"}},
                "current_role": {"type": "string"},
                "hybrid_search": {"type": "boolean", "default": true}
            },
            "required": ["query"]
        }"#,
    ),
    (
        "context",
        "Project-scoped recall: merges project-local results with universal (no-project) ones, detecting the project from cwd.",
        r#"{
            "type": "object",
            "properties": {
                "query": {"type": "string", "default": ""},
                "cwd": {"type": "string"},
                "limit": {"type": "integer", "default": 5},
                "current_role": {"type": "string"}
            }
        }"#,
    ),
    (
        "related",
        "Graph-only related memories (entity connections), depth 2. No vector fallback.",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "Starting memory id"},
                "limit": {"type": "integer", "default": 5}
            },
            "required": ["id"]
        }"#,
    ),
    (
        "consolidate",
        "Find or apply memory consolidation clusters.",
        r#"{
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["candidates", "merge"], "default": "candidates"},
                "threshold": {"type": "number", "default": 0.85},
                "min_cluster": {"type": "integer", "default": 3},
                "ids": {"type": "array", "items": {"type": "string"}, "description": "Required for action=merge"},
                "content": {"type": "string", "description": "Required for action=merge"},
                "memory_type": {"type": "string", "default": "pattern"},
                "importance": {"type": "number", "default": 0.8}
            }
        }"#,
    ),
    (
        "link",
        "Create an edge between two memories in the knowledge graph.",
        r#"{
            "type": "object",
            "properties": {
                "source": {"type": "string"},
                "target": {"type": "string"},
                "edge_type": {"type": "string", "default": "related_to"},
                "strength": {"type": "number", "default": 0.5},
                "confidence": {"type": "number", "default": 0.8},
                "evidence": {"type": "string"},
                "bidirectional": {"type": "boolean", "default": false}
            },
            "required": ["source", "target"]
        }"#,
    ),
    (
        "entity",
        "Create an entity node, or list memories linked to an existing one.",
        r#"{
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["get", "create"], "default": "get"},
                "entity_type": {"type": "string", "description": "project, episode, phase, tool, concept, goal, blocker, pattern, decision_point, person"},
                "name": {"type": "string"},
                "status": {"type": "string", "enum": ["active", "achieved", "abandoned"], "default": "active"},
                "priority": {"type": "string", "enum": ["p0", "p1", "p2"]},
                "description": {"type": "string"},
                "limit": {"type": "integer", "default": 10}
            },
            "required": ["entity_type", "name"]
        }"#,
    ),
    (
        "validate",
        "Validate, update, delete, or fetch a memory by id.",
        r#"{
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["validate", "get", "update", "delete"], "default": "validate"},
                "id": {"type": "string"},
                "content": {"type": "string", "description": "For action=update"},
                "memory_type": {"type": "string", "description": "For action=update"},
                "importance": {"type": "number", "description": "For action=update"}
            },
            "required": ["id"]
        }"#,
    ),
    (
        "graph",
        "Read-only knowledge graph queries: blockers, requirements, contradictions, hub entities, shortest path, neighborhood.",
        r#"{
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["blockers_for", "requirements_for", "contradictions", "hub_entities", "shortest_path", "visualize_neighborhood", "stats"],
                    "default": "stats"
                },
                "id": {"type": "string"},
                "name": {"type": "string", "description": "Goal or task name for blockers_for/requirements_for"},
                "from": {"type": "string"},
                "to": {"type": "string"},
                "limit": {"type": "integer", "default": 10}
            }
        }"#,
    ),
    (
        "smart_complete",
        "Optional pass-through to an external text-generation collaborator. Not wired up; always reports unavailable.",
        r#"{"type": "object", "properties": {"prompt": {"type": "string"}}}"#,
    ),
];

pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str(schema).expect("tool schema is valid JSON"),
        })
        .collect()
}

/// Dispatches `tools/call` requests to [`MemoryEngine`] operations.
pub struct ToolRouter {
    engine: MemoryEngine,
}

impl ToolRouter {
    pub fn new(engine: MemoryEngine) -> Self {
        Self { engine }
    }

    fn dispatch(&self, name: &str, args: &Value) -> Result<String> {
        match name {
            "remember" => self.call_remember(args),
            "recall" => self.call_recall(args),
            "context" => self.call_context(args),
            "related" => self.call_related(args),
            "consolidate" => self.call_consolidate(args),
            "link" => self.call_link(args),
            "entity" => self.call_entity(args),
            "validate" => self.call_validate(args),
            "graph" => self.call_graph(args),
            "smart_complete" => Ok(json!({"status": "unavailable"}).to_string()),
            other => Err(MemoryError::Validation(format!("unknown tool: {other}"))),
        }
    }

    fn call_remember(&self, args: &Value) -> Result<String> {
        let content = str_field(args, "content")?;
        let memory_type = args.get("memory_type").and_then(Value::as_str).unwrap_or("note");
        let importance = args.get("importance").and_then(Value::as_f64).unwrap_or(0.5) as f32;
        let project = args.get("project").and_then(Value::as_str).map(str::to_string);
        let source_role = args.get("source_role").and_then(Value::as_str).map(str::to_string);
        let metadata = args.get("metadata").cloned();
        let check_conflicts = args.get("check_conflicts").and_then(Value::as_bool).unwrap_or(false);
        let supersede: Vec<String> = args
            .get("supersede")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let confirmed = args.get("confirmed").and_then(Value::as_bool).unwrap_or(false);

        if !confirmed {
            return Ok(format!(
                "## Preview (not written — pass confirmed=true to store)\n\n**type:** {memory_type}\n**importance:** {importance}\n**project:** {}\n**content:**\n\n{content}",
                project.as_deref().unwrap_or("—")
            ));
        }

        let outcome = self.engine.remember(
            content,
            memory_type,
            importance,
            project,
            source_role,
            metadata,
            check_conflicts,
            &supersede,
        )?;
        match outcome {
            RememberOutcome::Written { id } => Ok(format!("stored as {id}")),
            RememberOutcome::ConflictsFound { conflicts } => {
                Ok(format!("conflicts_found: {}", format_conflicts(&conflicts)))
            }
        }
    }

    fn call_recall(&self, args: &Value) -> Result<String> {
        let query = str_field(args, "query")?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;
        let project = args.get("project").and_then(Value::as_str);
        let memory_types: Vec<String> = args
            .get("memory_types")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let current_role = args.get("current_role").and_then(Value::as_str);
        let hybrid_search = args.get("hybrid_search").and_then(Value::as_bool).unwrap_or(true);

        let results = self.engine.recall(query, limit, project, &memory_types, current_role, hybrid_search)?;
        Ok(format_recall_results(&results))
    }

    fn call_context(&self, args: &Value) -> Result<String> {
        let query = args.get("query").and_then(Value::as_str).unwrap_or("");
        let cwd = args.get("cwd").and_then(Value::as_str);
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(5) as usize;
        let current_role = args.get("current_role").and_then(Value::as_str);
        let results = self.engine.context(query, cwd, limit, current_role)?;
        Ok(format_recall_results(&results))
    }

    fn call_related(&self, args: &Value) -> Result<String> {
        let id = str_field(args, "id")?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(5) as usize;
        let memories = self.engine.related(id, limit)?;
        Ok(format_memories(&memories))
    }

    fn call_consolidate(&self, args: &Value) -> Result<String> {
        let action = args.get("action").and_then(Value::as_str).unwrap_or("candidates");
        match action {
            "merge" => {
                let ids: Vec<String> = args
                    .get("ids")
                    .and_then(Value::as_array)
                    .ok_or_else(|| MemoryError::Validation("merge requires ids".into()))?
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                let content = str_field(args, "content")?;
                let memory_type = args.get("memory_type").and_then(Value::as_str).unwrap_or("pattern");
                let importance = args.get("importance").and_then(Value::as_f64).unwrap_or(0.8) as f32;
                let new_id = self.engine.consolidate(&ids, content, memory_type, importance)?;
                Ok(format!("consolidated {} memories into {new_id}", ids.len()))
            }
            _ => {
                let threshold = args.get("threshold").and_then(Value::as_f64).unwrap_or(0.85) as f32;
                let min_cluster = args.get("min_cluster").and_then(Value::as_u64).unwrap_or(3) as usize;
                let clusters = self.engine.consolidate_candidates(threshold, min_cluster)?;
                if clusters.is_empty() {
                    return Ok("no consolidation candidates found".to_string());
                }
                let lines: Vec<String> = clusters
                    .iter()
                    .map(|c| format!("- \"{}\" ({} memories: {})", c.topic, c.ids.len(), c.ids.join(", ")))
                    .collect();
                Ok(lines.join("\n"))
            }
        }
    }

    fn call_link(&self, args: &Value) -> Result<String> {
        let source = str_field(args, "source")?;
        let target = str_field(args, "target")?;
        let edge_type: EdgeType = args
            .get("edge_type")
            .and_then(Value::as_str)
            .unwrap_or("related_to")
            .parse()?;
        let strength = args.get("strength").and_then(Value::as_f64).unwrap_or(0.5) as f32;
        let confidence = args.get("confidence").and_then(Value::as_f64).unwrap_or(0.8) as f32;
        let evidence = args.get("evidence").and_then(Value::as_str).map(str::to_string);
        let bidirectional = args.get("bidirectional").and_then(Value::as_bool).unwrap_or(false);
        self.engine.link(source, target, edge_type, strength, confidence, evidence, bidirectional)?;
        Ok(format!("linked {source} -{}-> {target}", edge_type.as_str()))
    }

    fn call_entity(&self, args: &Value) -> Result<String> {
        let entity_type: EntityType = str_field(args, "entity_type")?.parse()?;
        let name = str_field(args, "name")?;
        let action = args.get("action").and_then(Value::as_str).unwrap_or("get");
        match action {
            "create" => {
                let status = parse_entity_status(args.get("status").and_then(Value::as_str).unwrap_or("active"))?;
                let priority = args.get("priority").and_then(Value::as_str).map(parse_priority).transpose()?;
                let description = args.get("description").and_then(Value::as_str).map(str::to_string);
                let entity = self.engine.add_entity(entity_type, name, status, priority, description)?;
                Ok(format!("entity created: {}", entity.id))
            }
            _ => {
                let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;
                let memories = self.engine.get_by_entity(entity_type, name, limit)?;
                Ok(format_memories(&memories))
            }
        }
    }

    fn call_validate(&self, args: &Value) -> Result<String> {
        let id = str_field(args, "id")?;
        let action = args.get("action").and_then(Value::as_str).unwrap_or("validate");
        match action {
            "update" => {
                let content = args.get("content").and_then(Value::as_str);
                let memory_type = args.get("memory_type").and_then(Value::as_str);
                let importance = args.get("importance").and_then(Value::as_f64).map(|v| v as f32);
                self.engine.update(id, content, memory_type, importance)?;
                Ok(format!("updated {id}"))
            }
            "delete" => {
                self.engine.delete(id)?;
                Ok(format!("deleted {id}"))
            }
            "get" => {
                let memory = self.engine.get_current_memory(id)?;
                Ok(format_memories(std::slice::from_ref(&memory)))
            }
            _ => {
                let confidence = self.engine.validate_memory(id)?;
                Ok(format!("validated {id}, confidence={confidence:.2}"))
            }
        }
    }

    fn call_graph(&self, args: &Value) -> Result<String> {
        let action = args.get("action").and_then(Value::as_str).unwrap_or("stats");
        let graph = self.engine.graph();
        match action {
            "blockers_for" => {
                let name = str_field(args, "name")?;
                Ok(graph.blockers_for(name).join(", "))
            }
            "requirements_for" => {
                let name = str_field(args, "name")?;
                Ok(graph.requirements_for(name).join(", "))
            }
            "contradictions" => {
                let id = str_field(args, "id")?;
                Ok(graph.contradictions(id).join(", "))
            }
            "hub_entities" => {
                let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;
                let hubs = graph.hub_entities(limit);
                Ok(hubs.iter().map(|(id, deg)| format!("{id} ({deg})")).collect::<Vec<_>>().join(", "))
            }
            "shortest_path" => {
                let from = str_field(args, "from")?;
                let to = str_field(args, "to")?;
                Ok(graph
                    .shortest_path(from, to)
                    .map(|p| p.join(" -> "))
                    .unwrap_or_else(|| "no path found".to_string()))
            }
            "visualize_neighborhood" => {
                let id = str_field(args, "id")?;
                Ok(graph.visualize_neighborhood(id))
            }
            _ => {
                let stats = self.engine.get_stats()?;
                Ok(format!(
                    "{} memories ({} active, {} archived); graph: {} nodes, {} edges",
                    stats.total, stats.active, stats.archived, stats.graph_nodes, stats.graph_edges
                ))
            }
        }
    }
}

impl McpHandler for ToolRouter {
    fn handle_request(&self, request: McpRequest) -> McpResponse {
        use crate::mcp::protocol::methods;
        match request.method.as_str() {
            methods::INITIALIZE => {
                McpResponse::success(request.id, json!(crate::mcp::protocol::InitializeResult::default()))
            }
            methods::INITIALIZED => McpResponse::success(request.id, json!({})),
            methods::LIST_TOOLS => {
                McpResponse::success(request.id, json!({"tools": get_tool_definitions()}))
            }
            methods::CALL_TOOL => {
                let name = request.params.get("name").and_then(Value::as_str).unwrap_or("");
                let arguments = request.params.get("arguments").cloned().unwrap_or_else(|| json!({}));
                let result = match self.dispatch(name, &arguments) {
                    Ok(text) => ToolCallResult::text(format!("\u{2713} {text}")),
                    Err(e) => ToolCallResult::error(format!("\u{2717} {e}")),
                };
                McpResponse::success(request.id, json!(result))
            }
            other => McpResponse::error(request.id, -32601, format!("method not found: {other}")),
        }
    }
}

fn str_field<'a>(args: &'a Value, field: &str) -> Result<&'a str> {
    args.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| MemoryError::Validation(format!("missing required field: {field}")))
}

fn parse_entity_status(s: &str) -> Result<EntityStatus> {
    match s {
        "active" => Ok(EntityStatus::Active),
        "achieved" => Ok(EntityStatus::Achieved),
        "abandoned" => Ok(EntityStatus::Abandoned),
        other => Err(MemoryError::Validation(format!("unknown entity status: {other}"))),
    }
}

fn parse_priority(s: &str) -> Result<Priority> {
    match s {
        "p0" => Ok(Priority::P0),
        "p1" => Ok(Priority::P1),
        "p2" => Ok(Priority::P2),
        other => Err(MemoryError::Validation(format!("unknown priority: {other}"))),
    }
}

fn format_conflicts(conflicts: &[ConflictInfo]) -> String {
    conflicts
        .iter()
        .map(|c| format!("{} (similarity={:.2}, reasons=[{}])", c.memory_id, c.similarity, c.reasons.join("; ")))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn format_recall_results(results: &[RecallResult]) -> String {
    if results.is_empty() {
        return "no matches".to_string();
    }
    results
        .iter()
        .map(|r| {
            format!(
                "{} [{}] relevance={:.3} similarity={:.2} — {}",
                r.id,
                r.memory_type,
                r.relevance,
                r.similarity,
                truncate(&r.content, 120)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_memories(memories: &[Memory]) -> String {
    if memories.is_empty() {
        return "no memories".to_string();
    }
    memories
        .iter()
        .map(|m| format!("{} [{}] — {}", m.id, m.memory_type.as_str(), truncate(&m.content, 120)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definitions_parse_as_valid_json_schemas() {
        let defs = get_tool_definitions();
        assert_eq!(defs.len(), TOOL_DEFINITIONS.len());
        assert!(defs.iter().any(|d| d.name == "remember"));
        assert!(defs.iter().any(|d| d.name == "smart_complete"));
    }

    #[test]
    fn remember_without_confirmed_returns_preview_not_write() {
        let engine = MemoryEngine::in_memory(32).unwrap();
        let router = ToolRouter::new(engine.clone());
        let args = json!({"content": "test content for preview"});
        let text = router.call_remember(&args).unwrap();
        assert!(text.contains("Preview"));
        let stats = engine.get_stats().unwrap();
        assert_eq!(stats.total, 0);
    }

    #[test]
    fn remember_with_confirmed_writes_and_recall_finds_it() {
        let engine = MemoryEngine::in_memory(32).unwrap();
        let router = ToolRouter::new(engine.clone());
        let args = json!({"content": "the sqlite migration is complete", "confirmed": true});
        let text = router.call_remember(&args).unwrap();
        assert!(text.starts_with("stored as mem_"));

        let recall_args = json!({"query": "sqlite migration"});
        let recall_text = router.call_recall(&recall_args).unwrap();
        assert!(recall_text.contains("sqlite migration"));
    }

    #[test]
    fn smart_complete_reports_unavailable() {
        let engine = MemoryEngine::in_memory(32).unwrap();
        let router = ToolRouter::new(engine);
        let text = router.dispatch("smart_complete", &json!({})).unwrap();
        assert!(text.contains("unavailable"));
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let engine = MemoryEngine::in_memory(32).unwrap();
        let router = ToolRouter::new(engine);
        assert!(router.dispatch("no_such_tool", &json!({})).is_err());
    }

    #[test]
    fn handle_request_dispatches_tools_call() {
        let engine = MemoryEngine::in_memory(32).unwrap();
        let router = ToolRouter::new(engine);
        let request = McpRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "tools/call".to_string(),
            params: json!({"name": "smart_complete", "arguments": {}}),
        };
        let response = router.handle_request(request);
        assert!(response.error.is_none());
    }
}
