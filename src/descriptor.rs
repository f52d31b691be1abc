use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend type tag of a dataset
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// A table reachable through a SQL engine
    RelationalDb,
    /// A collection of files
    FileDataset,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::RelationalDb => "relational_db",
            BackendKind::FileDataset => "file_dataset",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file of a file collection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileObject {
    pub name: String,
    pub path: PathBuf,
    /// Declared encoding, e.g. `application/x-parquet`
    pub encoding_format: String,
}

/// Where a dataset's rows live.
///
/// Opaque to the expansion engine; only readers interpret it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentHandle {
    /// Table name as understood by the SQL engine
    Table { table: String },
    Files { files: Vec<FileObject> },
}

/// Immutable description of one underlying dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    id: String,
    description: String,
    kind: BackendKind,
    content: ContentHandle,
    metadata: Map<String, Value>,
}

impl DatasetDescriptor {
    /// Describe a relational table
    pub fn relational(
        id: impl Into<String>,
        description: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        let table = table.into();
        let mut metadata = Map::new();
        metadata.insert("names".into(), Value::from(vec![table.clone()]));
        Self {
            id: id.into(),
            description: description.into(),
            kind: BackendKind::RelationalDb,
            content: ContentHandle::Table { table },
            metadata,
        }
    }

    /// Describe a file collection
    pub fn files(
        id: impl Into<String>,
        description: impl Into<String>,
        files: Vec<FileObject>,
    ) -> Self {
        let names: Vec<Value> = files.iter().map(|f| Value::from(f.name.clone())).collect();
        let mut metadata = Map::new();
        metadata.insert("names".into(), Value::Array(names));
        Self {
            id: id.into(),
            description: description.into(),
            kind: BackendKind::FileDataset,
            content: ContentHandle::Files { files },
            metadata,
        }
    }

    /// Replace the metadata mapping
    pub fn with_metadata(self, metadata: Map<String, Value>) -> Self {
        Self { metadata, ..self }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn content(&self) -> &ContentHandle {
        &self.content
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Project the requested attributes into a JSON object.
    ///
    /// This is what a metadata-only classifier gets to see.
    pub fn project(&self, attributes: &[Attribute]) -> Value {
        let mut out = Map::new();
        for attribute in attributes {
            let value = match attribute {
                Attribute::Id => Value::from(self.id.clone()),
                Attribute::Description => Value::from(self.description.clone()),
                Attribute::Kind => Value::from(self.kind.as_str()),
                Attribute::Metadata => Value::Object(self.metadata.clone()),
            };
            out.insert(attribute.as_str().to_string(), value);
        }
        Value::Object(out)
    }
}

/// Serializable metadata view of a descriptor, as returned by `find`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DescriptorRecord {
    pub id: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: BackendKind,
    pub content: ContentHandle,
    pub metadata: Map<String, Value>,
}

impl From<&DatasetDescriptor> for DescriptorRecord {
    fn from(descriptor: &DatasetDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            description: descriptor.description.clone(),
            kind: descriptor.kind,
            content: descriptor.content.clone(),
            metadata: descriptor.metadata.clone(),
        }
    }
}

/// Descriptor attribute a metadata condition may depend on
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Id,
    Description,
    Kind,
    Metadata,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Id => "id",
            Attribute::Description => "description",
            Attribute::Kind => "type",
            Attribute::Metadata => "metadata",
        }
    }
}
