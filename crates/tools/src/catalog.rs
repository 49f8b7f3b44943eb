//! Loading tool definitions from disk.
//!
//! Two formats are accepted, picked by file extension:
//! - `.json`: an array of `{name, description, input_schema}`
//! - anything else: TOML with `[[tools]]` tables
//!
//! The `switch_agent` definition is always registered and pinned, so every
//! agent can hand off regardless of its access list.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use toolrelay_core::provider::ToolDefinition;
use toolrelay_core::tool::ToolCatalog;
use tracing::info;

use crate::switch_agent::SwitchAgentTool;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read tool catalog {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse tool catalog {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Tool '{0}' has an empty name or a non-object input_schema")]
    Invalid(String),
}

#[derive(Deserialize)]
struct TomlCatalog {
    #[serde(default)]
    tools: Vec<ToolDefinition>,
}

/// A catalog holding only the built-in tools.
pub fn default_catalog() -> ToolCatalog {
    let mut catalog = ToolCatalog::default();
    add_builtins(&mut catalog);
    catalog
}

fn add_builtins(catalog: &mut ToolCatalog) {
    let switch = SwitchAgentTool;
    if catalog.get(switch.name()).is_none() {
        catalog.register(switch.definition());
    }
    catalog.pin(switch.name());
}

pub fn load_catalog(path: &Path) -> Result<ToolCatalog, CatalogError> {
    let source = std::fs::read_to_string(path).map_err(|e| CatalogError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let catalog = parse_catalog(&source, path)?;
    info!(path = %path.display(), tools = catalog.len(), "Loaded tool catalog");
    Ok(catalog)
}

pub fn parse_catalog(source: &str, path: &Path) -> Result<ToolCatalog, CatalogError> {
    let parse_err = |reason: String| CatalogError::Parse {
        path: path.to_path_buf(),
        reason,
    };

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let definitions: Vec<ToolDefinition> = if is_json {
        serde_json::from_str(source).map_err(|e| parse_err(e.to_string()))?
    } else {
        toml::from_str::<TomlCatalog>(source)
            .map_err(|e| parse_err(e.to_string()))?
            .tools
    };

    let mut catalog = ToolCatalog::default();
    for def in definitions {
        if def.name.trim().is_empty() || !def.input_schema.is_object() {
            return Err(CatalogError::Invalid(def.name));
        }
        catalog.register(def);
    }
    add_builtins(&mut catalog);
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_json_array() {
        let source = r#"[
            {"name": "create_and_set_rfp", "description": "Create an RFP",
             "input_schema": {"type": "object", "properties": {"name": {"type": "string"}}}}
        ]"#;
        let catalog = parse_catalog(source, Path::new("tools.json")).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("create_and_set_rfp").is_some());
        assert!(catalog.get("switch_agent").is_some());
    }

    #[test]
    fn parses_toml_tables() {
        let source = r#"
            [[tools]]
            name = "create_form_artifact"
            description = "Build a questionnaire"
            input_schema = { type = "object", required = ["title"] }
        "#;
        let catalog = parse_catalog(source, Path::new("tools.toml")).unwrap();
        let def = catalog.get("create_form_artifact").unwrap();
        assert_eq!(def.input_schema["required"][0], "title");
    }

    #[test]
    fn switch_agent_is_always_available() {
        let source = r#"
            [[tools]]
            name = "a"
            description = "A"
            input_schema = { type = "object" }

            [[tools]]
            name = "b"
            description = "B"
            input_schema = { type = "object" }
        "#;
        let catalog = parse_catalog(source, Path::new("tools.toml")).unwrap();
        let names: Vec<String> = catalog
            .for_access(&["a".to_string()])
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["a", "switch_agent"]);
    }

    #[test]
    fn catalog_override_of_switch_agent_is_kept() {
        let source = r#"[{"name": "switch_agent", "description": "custom", "input_schema": {"type": "object"}}]"#;
        let catalog = parse_catalog(source, Path::new("tools.json")).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("switch_agent").unwrap().description, "custom");
    }

    #[test]
    fn rejects_non_object_schema() {
        let source = r#"[{"name": "bad", "description": "", "input_schema": "string"}]"#;
        assert!(matches!(
            parse_catalog(source, Path::new("tools.json")),
            Err(CatalogError::Invalid(name)) if name == "bad"
        ));
    }

    #[test]
    fn load_from_file_and_missing_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(b"[]").unwrap();
        let catalog = load_catalog(file.path()).unwrap();
        assert_eq!(catalog.len(), 1);

        assert!(matches!(
            load_catalog(Path::new("/nonexistent/tools.toml")),
            Err(CatalogError::Read { .. })
        ));
    }

    #[test]
    fn default_catalog_has_builtins() {
        let catalog = default_catalog();
        assert_eq!(catalog.definitions()[0].name, "switch_agent");
    }
}
