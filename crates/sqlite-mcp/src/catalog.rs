// sqlite-mcp/src/catalog.rs
// ============================================================================
// Module: Tool Catalog
// Description: Canonical tool names, definitions, and input schemas.
// Purpose: Single source of truth for the tools/list surface.
// Dependencies: jsonschema, serde, serde_json
// ============================================================================

//! ## Overview
//! The catalog is built once from the static [`ToolName`] enum. Every input
//! schema is compiled when the catalog is constructed, so a broken schema
//! fails startup instead of the first call. Schemas reject unknown
//! properties; the `db_path`, `data`, and `where` spellings are accepted as
//! aliases of `path`, `values`, and `filter`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use jsonschema::Draft;
use jsonschema::Validator;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Tool Names
// ============================================================================

/// Canonical tool names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Resolve a database and make it the default.
    ConnectDatabase,
    /// Run one parameterized SQL statement.
    Query,
    /// List tables and views.
    GetTables,
    /// Describe one table.
    GetSchema,
    /// Insert one row.
    Create,
    /// Select rows with filters and ordering.
    Read,
    /// Update rows matching a filter.
    Update,
    /// Delete rows matching a filter.
    Delete,
    /// Compute column statistics.
    AnalyzeTable,
    /// Search text columns across tables.
    SearchData,
}

impl ToolName {
    /// Returns the canonical string name for the tool.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectDatabase => "connect_database",
            Self::Query => "query",
            Self::GetTables => "get_tables",
            Self::GetSchema => "get_schema",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::AnalyzeTable => "analyze_table",
            Self::SearchData => "search_data",
        }
    }

    /// Returns all tool names in canonical order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::ConnectDatabase,
            Self::Query,
            Self::GetTables,
            Self::GetSchema,
            Self::Create,
            Self::Read,
            Self::Update,
            Self::Delete,
            Self::AnalyzeTable,
            Self::SearchData,
        ]
    }

    /// Parses a tool name from its string representation.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "connect_database" => Some(Self::ConnectDatabase),
            "query" => Some(Self::Query),
            "get_tables" => Some(Self::GetTables),
            "get_schema" => Some(Self::GetSchema),
            "create" => Some(Self::Create),
            "read" => Some(Self::Read),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "analyze_table" => Some(Self::AnalyzeTable),
            "search_data" => Some(Self::SearchData),
            _ => None,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Definitions
// ============================================================================

/// Tool definition returned by `tools/list`.
///
/// # Invariants
/// - `input_schema` compiles as a draft 2020-12 JSON Schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: ToolName,
    /// Tool description for clients.
    pub description: String,
    /// JSON schema for tool input.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Returns the definitions for every tool in canonical order.
#[must_use]
pub fn tool_definitions() -> Vec<ToolDefinition> {
    ToolName::all()
        .iter()
        .map(|name| ToolDefinition {
            name: *name,
            description: description(*name).to_string(),
            input_schema: input_schema(*name),
        })
        .collect()
}

/// Returns the client-facing description of a tool.
const fn description(name: ToolName) -> &'static str {
    match name {
        ToolName::ConnectDatabase => {
            "Open a SQLite database file and make it the default for later calls"
        }
        ToolName::Query => "Execute one parameterized SQL statement",
        ToolName::GetTables => "List all tables and views in the database",
        ToolName::GetSchema => "Describe the columns, foreign keys, and indexes of a table",
        ToolName::Create => "Insert a new row into a table",
        ToolName::Read => "Read rows from a table with optional filtering and ordering",
        ToolName::Update => "Update rows in a table that match a filter",
        ToolName::Delete => "Delete rows from a table that match a filter",
        ToolName::AnalyzeTable => "Compute row counts, column statistics, and sample rows",
        ToolName::SearchData => "Search text columns across tables for a term",
    }
}

// ============================================================================
// SECTION: Input Schemas
// ============================================================================

/// Builds the input schema for one tool.
fn input_schema(name: ToolName) -> Value {
    match name {
        ToolName::ConnectDatabase => {
            let mut schema = object_schema(Map::new(), &[]);
            schema.insert(
                "anyOf".to_string(),
                json!([{ "required": ["path"] }, { "required": ["db_path"] }]),
            );
            Value::Object(schema)
        }
        ToolName::Query => Value::Object(object_schema(
            properties(json!({
                "sql": { "type": "string", "minLength": 1, "description": "SQL statement to execute" },
                "params": {
                    "type": ["array", "object", "null"],
                    "description": "Positional (array) or named (object) parameter values"
                }
            })),
            &["sql"],
        )),
        ToolName::GetTables => Value::Object(object_schema(Map::new(), &[])),
        ToolName::GetSchema | ToolName::AnalyzeTable => {
            Value::Object(object_schema(properties(json!({ "table": table_schema() })), &["table"]))
        }
        ToolName::Create => {
            let mut schema = object_schema(
                properties(json!({
                    "table": table_schema(),
                    "values": values_schema(),
                    "data": values_schema()
                })),
                &["table"],
            );
            schema.insert("oneOf".to_string(), one_of_required("values", "data"));
            Value::Object(schema)
        }
        ToolName::Read => Value::Object(object_schema(
            properties(json!({
                "table": table_schema(),
                "filter": filter_schema(),
                "where": filter_schema(),
                "order_by": {
                    "type": ["string", "object", "array"],
                    "description": "Column name, \"column desc\", {column, direction}, or a list of these"
                },
                "limit": { "type": "integer", "minimum": 1 },
                "offset": { "type": "integer", "minimum": 0 }
            })),
            &["table"],
        )),
        ToolName::Update => {
            let mut schema = object_schema(
                properties(json!({
                    "table": table_schema(),
                    "values": values_schema(),
                    "data": values_schema(),
                    "filter": filter_schema(),
                    "where": filter_schema(),
                    "affect_all": { "type": "boolean" },
                    "max_affected": { "type": "integer", "minimum": 0 }
                })),
                &["table"],
            );
            schema.insert("oneOf".to_string(), one_of_required("values", "data"));
            Value::Object(schema)
        }
        ToolName::Delete => Value::Object(object_schema(
            properties(json!({
                "table": table_schema(),
                "filter": filter_schema(),
                "where": filter_schema(),
                "affect_all": { "type": "boolean" },
                "max_affected": { "type": "integer", "minimum": 0 }
            })),
            &["table"],
        )),
        ToolName::SearchData => Value::Object(object_schema(
            properties(json!({
                "search_term": { "type": "string", "minLength": 1 },
                "tables": { "type": "array", "items": { "type": "string", "minLength": 1 } },
                "match_mode": { "type": "string", "enum": ["contains", "exact"] },
                "limit_per_table": { "type": "integer", "minimum": 1 }
            })),
            &["search_term"],
        )),
    }
}

/// Wraps tool properties into a closed object schema with database path
/// properties added.
fn object_schema(mut props: Map<String, Value>, required: &[&str]) -> Map<String, Value> {
    props.insert("path".to_string(), path_schema());
    props.insert("db_path".to_string(), path_schema());
    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(props));
    schema.insert("required".to_string(), json!(required));
    schema.insert("additionalProperties".to_string(), Value::Bool(false));
    schema
}

/// Unwraps a `json!` object literal.
fn properties(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Requires exactly one of two alias spellings.
fn one_of_required(primary: &str, alias: &str) -> Value {
    json!([{ "required": [primary] }, { "required": [alias] }])
}

/// Schema for the database path argument.
fn path_schema() -> Value {
    json!({
        "type": "string",
        "minLength": 1,
        "description": "Database file path; defaults to the connected database"
    })
}

/// Schema for a table name argument.
fn table_schema() -> Value {
    json!({ "type": "string", "minLength": 1, "description": "Table name" })
}

/// Schema for a column to value map.
fn values_schema() -> Value {
    json!({ "type": "object", "minProperties": 1, "description": "Column to value map" })
}

/// Schema for a filter object.
fn filter_schema() -> Value {
    json!({
        "type": "object",
        "description": "Column to value, or column to {op, value}; ops: eq ne lt lte gt gte like in is_null"
    })
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Tool definitions with their compiled input validators.
pub struct ToolCatalog {
    /// Definitions in canonical order.
    definitions: Vec<ToolDefinition>,
    /// Compiled validators keyed by tool.
    validators: BTreeMap<ToolName, Validator>,
}

impl ToolCatalog {
    /// Builds the catalog for every tool.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when a schema fails to compile.
    pub fn new() -> Result<Self, RegistryError> {
        Self::from_definitions(tool_definitions())
    }

    /// Builds a catalog from explicit definitions.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on duplicate names or invalid schemas.
    pub fn from_definitions(definitions: Vec<ToolDefinition>) -> Result<Self, RegistryError> {
        let mut validators = BTreeMap::new();
        for definition in &definitions {
            let validator = jsonschema::options()
                .with_draft(Draft::Draft202012)
                .build(&definition.input_schema)
                .map_err(|err| RegistryError::InvalidSchema {
                    tool: definition.name,
                    message: err.to_string(),
                })?;
            if validators.insert(definition.name, validator).is_some() {
                return Err(RegistryError::DuplicateTool(definition.name));
            }
        }
        Ok(Self {
            definitions,
            validators,
        })
    }

    /// Returns the definitions in canonical order.
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Validates tool arguments against the tool's input schema.
    ///
    /// Returns every violation message; an empty list means the arguments
    /// are valid. Tools missing from the catalog report one violation.
    #[must_use]
    pub fn violations(&self, name: ToolName, arguments: &Value) -> Vec<String> {
        self.validators.get(&name).map_or_else(
            || vec![format!("tool {name} is not registered")],
            |validator| validator.iter_errors(arguments).map(|err| err.to_string()).collect(),
        )
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Catalog construction errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The same tool was defined twice.
    #[error("duplicate tool definition: {0}")]
    DuplicateTool(ToolName),
    /// A tool schema failed to compile.
    #[error("invalid input schema for {tool}: {message}")]
    InvalidSchema {
        /// Tool owning the schema.
        tool: ToolName,
        /// Compiler message.
        message: String,
    },
}

// ============================================================================
// SECTION: Tests
// ============================================================================
