//! Partition a spec document into fixed-size path slices.
//!
//! Each chunk preserves every top-level field of the source document and
//! replaces `paths` with a contiguous slice, so workers can load a chunk
//! exactly like a full spec.

use serde_json::{Map, Value};

use sweep_common::{Result, ScanError};

pub const DEFAULT_CHUNK_SIZE: usize = 4;

/// Split `doc` into `⌈paths / chunk_size⌉` chunk documents.
///
/// Degenerates to a single chunk (the document itself) when the path
/// count fits in one chunk.
pub fn chunk_paths(doc: &Value, chunk_size: usize) -> Result<Vec<Value>> {
    if chunk_size == 0 {
        return Err(ScanError::InvalidParams("chunk size must be >= 1".into()));
    }
    let paths = doc
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| ScanError::SpecInvalid("spec has no paths object".into()))?;

    if paths.len() <= chunk_size {
        return Ok(vec![doc.clone()]);
    }

    let entries: Vec<(&String, &Value)> = paths.iter().collect();
    let chunks = entries
        .chunks(chunk_size)
        .map(|slice| {
            let mut chunk = doc.clone();
            let sliced: Map<String, Value> = slice
                .iter()
                .map(|(k, v)| ((*k).clone(), (*v).clone()))
                .collect();
            chunk["paths"] = Value::Object(sliced);
            chunk
        })
        .collect();
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec_with_paths(n: usize) -> Value {
        let mut paths = Map::new();
        for i in 0..n {
            paths.insert(
                format!("/r{i}"),
                json!({"get": {"responses": {"200": {"description": "ok"}}}}),
            );
        }
        json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "servers": [{"url": "http://t.local"}],
            "paths": paths,
        })
    }

    #[test]
    fn small_specs_become_one_chunk() {
        let doc = spec_with_paths(DEFAULT_CHUNK_SIZE);
        let chunks = chunk_paths(&doc, DEFAULT_CHUNK_SIZE).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], doc);
    }

    #[test]
    fn chunks_partition_paths_without_duplication() {
        let doc = spec_with_paths(10);
        let chunks = chunk_paths(&doc, DEFAULT_CHUNK_SIZE).unwrap();
        assert_eq!(chunks.len(), 3);

        let mut seen = Vec::new();
        for chunk in &chunks {
            let paths = chunk["paths"].as_object().unwrap();
            assert!(paths.len() <= DEFAULT_CHUNK_SIZE);
            seen.extend(paths.keys().cloned());
        }
        let expected: Vec<String> = (0..10).map(|i| format!("/r{i}")).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn chunks_keep_top_level_fields() {
        let doc = spec_with_paths(9);
        for chunk in chunk_paths(&doc, 4).unwrap() {
            assert_eq!(chunk["info"], doc["info"]);
            assert_eq!(chunk["servers"], doc["servers"]);
        }
    }

    #[test]
    fn reunioning_chunks_restores_the_path_set() {
        let doc = spec_with_paths(7);
        let chunks = chunk_paths(&doc, 2).unwrap();
        let mut union = Map::new();
        for chunk in &chunks {
            for (k, v) in chunk["paths"].as_object().unwrap() {
                assert!(union.insert(k.clone(), v.clone()).is_none());
            }
        }
        assert_eq!(&Value::Object(union), &doc["paths"]);
    }
}
