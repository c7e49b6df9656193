//! Batch emission: object and relationship artifacts plus a load descriptor.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, StrataError};
use crate::jsonl;
use crate::naming::ArtifactName;
use crate::types::{ContainmentEdge, EdgeKind, SourceDescriptor, StorageObject};

pub const OBJECTS_COLLECTION: &str = "Objects";
pub const RELATIONSHIPS_COLLECTION: &str = "Relationships";

/// Where a finished batch ended up.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EmitReport {
    pub objects_path: Option<PathBuf>,
    pub relationships_path: Option<PathBuf>,
    pub descriptor_path: Option<PathBuf>,
    pub object_count: usize,
    pub edge_count: usize,
}

/// Accepts one complete batch of objects and edges.
pub trait BatchSink {
    fn emit(&mut self, objects: &[StorageObject], edges: &[ContainmentEdge]) -> Result<EmitReport>;
}

/// Keeps the batch in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub objects: Vec<StorageObject>,
    pub edges: Vec<ContainmentEdge>,
}

impl BatchSink for MemorySink {
    fn emit(&mut self, objects: &[StorageObject], edges: &[ContainmentEdge]) -> Result<EmitReport> {
        self.objects.extend_from_slice(objects);
        self.edges.extend_from_slice(edges);
        Ok(EmitReport {
            object_count: objects.len(),
            edge_count: edges.len(),
            ..Default::default()
        })
    }
}

/// Reference to an object in a collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub collection: String,
    pub object: Uuid,
}

impl ObjectRef {
    fn object(id: Uuid) -> Self {
        Self {
            collection: OBJECTS_COLLECTION.to_string(),
            object: id,
        }
    }
}

/// Wire shape of one relationship record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EdgeRecord {
    #[serde(rename = "_from")]
    pub from: String,
    #[serde(rename = "_to")]
    pub to: String,
    pub object1: ObjectRef,
    pub object2: ObjectRef,
    pub relationship: Uuid,
    pub kind: EdgeKind,
    pub source: SourceDescriptor,
}

impl From<&ContainmentEdge> for EdgeRecord {
    fn from(edge: &ContainmentEdge) -> Self {
        Self {
            from: format!("{}/{}", OBJECTS_COLLECTION, edge.source),
            to: format!("{}/{}", OBJECTS_COLLECTION, edge.target),
            object1: ObjectRef::object(edge.source),
            object2: ObjectRef::object(edge.target),
            relationship: edge.relationship,
            kind: edge.kind,
            source: edge.descriptor.clone(),
        }
    }
}

/// One artifact in a load descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadEntry {
    pub collection: String,
    pub file: String,
    pub records: usize,
    pub command: String,
}

/// TOML manifest describing how to bulk load a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadDescriptor {
    pub generated: DateTime<Utc>,
    pub load: Vec<LoadEntry>,
}

impl LoadDescriptor {
    fn entry(collection: &str, path: &Path, records: usize) -> LoadEntry {
        let file = path.display().to_string();
        LoadEntry {
            collection: collection.to_string(),
            command: format!("import --collection {} --type jsonl \"{}\"", collection, file),
            file,
            records,
        }
    }
}

/// Writes NDJSON artifacts and a TOML load descriptor into a directory.
#[derive(Debug)]
pub struct JsonlSink {
    dir: PathBuf,
    name: ArtifactName,
}

impl JsonlSink {
    /// `name` supplies prefix, platform, machine and timestamp. Object and
    /// relationship artifacts add their collection; the descriptor uses
    /// `name` as is.
    pub fn new(dir: impl Into<PathBuf>, name: ArtifactName) -> Self {
        Self {
            dir: dir.into(),
            name,
        }
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        let name = self.name.clone().with_collection(collection);
        self.dir.join(name.to_file_name(".jsonl"))
    }
}

impl BatchSink for JsonlSink {
    fn emit(&mut self, objects: &[StorageObject], edges: &[ContainmentEdge]) -> Result<EmitReport> {
        let objects_path = self.collection_path(OBJECTS_COLLECTION);
        let relationships_path = self.collection_path(RELATIONSHIPS_COLLECTION);
        let descriptor_path = self.dir.join(self.name.to_file_name(".toml"));

        let records: Vec<EdgeRecord> = edges.iter().map(EdgeRecord::from).collect();

        let (objects_tmp, object_count) = jsonl::write_staged(&objects_path, objects)?;
        let (edges_tmp, edge_count) = match jsonl::write_staged(&relationships_path, &records) {
            Ok(staged) => staged,
            Err(e) => {
                let _ = fs::remove_file(&objects_tmp);
                return Err(e);
            }
        };

        if let Err(e) = jsonl::commit(&objects_tmp, &objects_path) {
            let _ = fs::remove_file(&edges_tmp);
            return Err(e);
        }
        if let Err(e) = jsonl::commit(&edges_tmp, &relationships_path) {
            warn!(path = %objects_path.display(), "removing object artifact after failed commit");
            let _ = fs::remove_file(&objects_path);
            let _ = fs::remove_file(&edges_tmp);
            return Err(e);
        }

        let descriptor = LoadDescriptor {
            generated: Utc::now(),
            load: vec![
                LoadDescriptor::entry(OBJECTS_COLLECTION, &objects_path, object_count),
                LoadDescriptor::entry(RELATIONSHIPS_COLLECTION, &relationships_path, edge_count),
            ],
        };
        let body = toml::to_string_pretty(&descriptor)?;
        let descriptor_tmp = jsonl::temp_path(&descriptor_path);
        fs::write(&descriptor_tmp, body)?;
        fs::rename(&descriptor_tmp, &descriptor_path).map_err(|source| StrataError::Persist {
            path: descriptor_path.clone(),
            source,
        })?;

        info!(
            objects = object_count,
            edges = edge_count,
            descriptor = %descriptor_path.display(),
            "batch emitted"
        );

        Ok(EmitReport {
            objects_path: Some(objects_path),
            relationships_path: Some(relationships_path),
            descriptor_path: Some(descriptor_path),
            object_count,
            edge_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Platform;
    use chrono::TimeZone;
    use serde_json::Map;
    use tempfile::TempDir;

    fn dir_object(path: &str) -> StorageObject {
        StorageObject {
            object_identifier: Uuid::new_v4(),
            label: path.to_string(),
            path: path.to_string(),
            parent_path: None,
            local_identifier: path.to_string(),
            uri: format!("file://{}", path),
            volume: None,
            size: 0,
            timestamps: Vec::new(),
            attributes: Map::new(),
            raw_data: String::new(),
            is_directory: true,
            source: SourceDescriptor::for_platform(Platform::Linux),
        }
    }

    fn sink(dir: &Path) -> JsonlSink {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        JsonlSink::new(dir, ArtifactName::new("strata", Platform::Linux, "ingest", ts))
    }

    #[test]
    fn test_edge_record_shape() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let edge = ContainmentEdge::contains(a, b, SourceDescriptor::for_platform(Platform::Mac));
        let json = serde_json::to_value(EdgeRecord::from(&edge)).unwrap();
        assert_eq!(json["_from"], format!("Objects/{}", a));
        assert_eq!(json["_to"], format!("Objects/{}", b));
        assert_eq!(json["Object1"]["collection"], "Objects");
        assert_eq!(json["Kind"], "Contains");
        assert_eq!(json["Relationship"], "cde81295-f171-45be-8607-8100f4611430");
    }

    #[test]
    fn test_jsonl_sink_writes_all_artifacts() {
        let dir = TempDir::new().unwrap();
        let parent = dir_object("/p");
        let mut child = dir_object("/p/c");
        child.parent_path = Some("/p".to_string());
        let edges = vec![
            ContainmentEdge::contains(parent.object_identifier, child.object_identifier, parent.source.clone()),
            ContainmentEdge::contained_by(child.object_identifier, parent.object_identifier, parent.source.clone()),
        ];

        let report = sink(dir.path()).emit(&[parent, child], &edges).unwrap();
        assert_eq!(report.object_count, 2);
        assert_eq!(report.edge_count, 2);

        let objects_path = report.objects_path.unwrap();
        assert!(objects_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("-collection=Objects-"));
        assert_eq!(fs::read_to_string(&objects_path).unwrap().lines().count(), 2);

        let descriptor: LoadDescriptor =
            toml::from_str(&fs::read_to_string(report.descriptor_path.unwrap()).unwrap()).unwrap();
        assert_eq!(descriptor.load.len(), 2);
        assert_eq!(descriptor.load[1].collection, "Relationships");
        assert_eq!(descriptor.load[1].records, 2);
        assert!(descriptor.load[0].command.contains("--collection Objects"));

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::default();
        let report = sink.emit(&[dir_object("/x")], &[]).unwrap();
        assert_eq!(report.object_count, 1);
        assert!(report.descriptor_path.is_none());
        assert_eq!(sink.objects.len(), 1);
    }
}
