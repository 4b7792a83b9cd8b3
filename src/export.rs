//! One-shot export of the detailed graph.

use std::path::Path;

use anyhow::{Context, Result};
use nettopo_engine::Engine;

/// Write the detailed-graph view to `path` as pretty JSON.
pub fn export_graph(engine: &Engine, path: &Path) -> Result<()> {
    let graph = engine.query().detailed_graph();
    let json = serde_json::to_string_pretty(&graph)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write export to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_writes_detailed_graph() {
        let engine = Engine::builder().local_identity("192.168.1.10").build();
        engine.ingest_line(r#"{"src_ip": "192.168.1.10", "dst_ip": "10.0.0.7", "protocol": "UDP"}"#);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        export_graph(&engine, &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["stats"]["totalNodes"], 2);
        assert_eq!(value["stats"]["localId"], "192.168.1.10");
        assert_eq!(value["config"]["nodeTimeoutSeconds"], 300);
        assert_eq!(value["edges"][0]["protocols"][0], "UDP");
    }

    #[test]
    fn export_to_missing_directory_fails() {
        let engine = Engine::default();
        let dir = tempfile::tempdir().unwrap();
        let result = export_graph(&engine, &dir.path().join("missing").join("graph.json"));
        assert!(result.is_err());
    }
}
