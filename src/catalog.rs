use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    descriptor::{DatasetDescriptor, FileObject},
    error::CatalogError,
};

const DATASET_LABEL: &str = "sc:Dataset";
const RELATIONAL_LABEL: &str = "Relational_Database";
const FILE_OBJECT_LABEL: &str = "cr:FileObject";

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    nodes: Vec<Node>,
}

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    properties: Map<String, Value>,
}

impl Node {
    fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Dataset descriptors loaded from a JSON catalog of dataset graphs.
///
/// Each entry is `{"nodes": [{"id", "labels", "properties"}]}`. The node
/// labelled `sc:Dataset` describes the dataset; `cr:FileObject` nodes list
/// the files of a file collection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    descriptors: Vec<DatasetDescriptor>,
}

impl Catalog {
    pub fn new(descriptors: Vec<DatasetDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Parse a catalog. Relative file paths are kept as written.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        Self::parse(json, None)
    }

    /// Load a catalog file. Relative file paths resolve against its directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        Self::parse(&json, path.parent())
    }

    fn parse(json: &str, base: Option<&Path>) -> Result<Self, CatalogError> {
        let entries: Vec<Entry> = serde_json::from_str(json)?;
        let mut descriptors = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match parse_entry(entry, base)? {
                Some(descriptor) => descriptors.push(descriptor),
                None => warn!(entry = index, "catalog entry has no dataset node, skipping"),
            }
        }
        debug!(datasets = descriptors.len(), "loaded catalog");
        Ok(Self { descriptors })
    }

    pub fn descriptors(&self) -> &[DatasetDescriptor] {
        &self.descriptors
    }

    pub fn into_descriptors(self) -> Vec<DatasetDescriptor> {
        self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn parse_entry(entry: Entry, base: Option<&Path>) -> Result<Option<DatasetDescriptor>, CatalogError> {
    let Some(dataset) = entry.nodes.iter().find(|n| n.has_label(DATASET_LABEL)) else {
        return Ok(None);
    };
    let id = dataset
        .id
        .clone()
        .ok_or(CatalogError::MissingField { field: "id" })?;
    let description = dataset.property("description").unwrap_or_default();

    if dataset.has_label(RELATIONAL_LABEL) {
        let table = dataset
            .property("table")
            .or_else(|| dataset.property("name"))
            .or_else(|| {
                dataset
                    .property("contentUrl")
                    .and_then(|url| url.trim_end_matches('/').rsplit('/').next())
                    .filter(|s| !s.is_empty())
            })
            .ok_or(CatalogError::MissingField { field: "table" })?;
        let name = dataset.property("name").unwrap_or(table);
        let mut metadata = Map::new();
        metadata.insert("names".into(), Value::from(vec![name.to_string()]));
        return Ok(Some(
            DatasetDescriptor::relational(id, description, table).with_metadata(metadata),
        ));
    }

    let files = entry
        .nodes
        .iter()
        .filter(|n| n.has_label(FILE_OBJECT_LABEL))
        .map(|node| file_object(node, base))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(DatasetDescriptor::files(id, description, files)))
}

fn file_object(node: &Node, base: Option<&Path>) -> Result<FileObject, CatalogError> {
    let url = node
        .property("contentUrl")
        .ok_or(CatalogError::MissingField { field: "contentUrl" })?;
    let mut path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
    if let Some(base) = base.filter(|_| path.is_relative()) {
        path = base.join(path);
    }
    let name = node
        .property("name")
        .map(str::to_string)
        .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default();
    Ok(FileObject {
        name,
        path,
        encoding_format: node.property("encodingFormat").unwrap_or_default().to_string(),
    })
}
