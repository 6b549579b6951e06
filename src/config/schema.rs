use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "scope": { "type": "string" },
            "sources": { "type": "array", "items": { "type": "string", "minLength": 1 } },
            "arbitrator": { "type": "string" },
            "engines": { "type": "array", "items": { "$ref": "#/$defs/engine" } },
            "dimensions": {
                "type": "array",
                "items": {
                    "type": "string",
                    "enum": ["architecture", "defects", "error-handling", "type-design", "test-coverage", "comment-accuracy"]
                }
            },
            "isolation": {
                "type": "object",
                "properties": {
                    "kind": { "type": "string", "enum": ["worktree", "scratch"] },
                    "repo": { "type": "string" },
                    "base_dir": { "type": "string" }
                }
            },
            "limits": {
                "type": "object",
                "properties": {
                    "engine_timeout_secs": { "type": "integer", "minimum": 1 },
                    "max_retries": { "type": "integer", "minimum": 0 },
                    "position_tolerance": { "type": "integer", "minimum": 0, "maximum": 50 }
                }
            },
            "output": {
                "type": "object",
                "properties": {
                    "directory": { "type": "string" }
                }
            }
        },
        "$defs": {
            "engine": {
                "type": "object",
                "required": ["id", "kind"],
                "properties": {
                    "id": { "type": "string", "minLength": 1 },
                    "kind": { "type": "string", "enum": ["command", "http", "stub"] },
                    "program": { "type": "string" },
                    "args": { "type": "array", "items": { "type": "string" } },
                    "state_env": { "type": "string" },
                    "prompt_via": { "type": "string", "enum": ["arg", "stdin"] },
                    "base_url": { "type": "string" },
                    "model": { "type": "string" },
                    "api_key_env": { "type": "string" },
                    "response": { "type": "string" }
                }
            }
        }
    })
});
