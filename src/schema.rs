use std::fmt::Write;

use arrow_schema::Schema;
use serde::{Deserialize, Serialize};

/// One column as shown to a query translator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    /// SQL-ish type name, e.g. `BIGINT`
    pub data_type: String,
    pub nullable: bool,
}

/// Backend schema descriptor handed to a [`QueryTranslator`](crate::QueryTranslator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescription {
    /// Table (or file collection) the filter will run against
    pub name: String,
    pub columns: Vec<ColumnDescription>,
}

impl SchemaDescription {
    /// Describe an Arrow schema under the given relation name
    pub fn from_arrow(name: impl Into<String>, schema: &Schema) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|field| ColumnDescription {
                name: field.name().clone(),
                data_type: sql_type_name(field.data_type()),
                nullable: field.is_nullable(),
            })
            .collect();
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescription> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Render as a `CREATE TABLE` statement
    pub fn to_ddl(&self) -> String {
        let mut ddl = format!("CREATE TABLE \"{}\" (", self.name);
        for (idx, column) in self.columns.iter().enumerate() {
            if idx > 0 {
                ddl.push(',');
            }
            let _ = write!(ddl, "\n    \"{}\" {}", column.name, column.data_type);
            if !column.nullable {
                ddl.push_str(" NOT NULL");
            }
        }
        ddl.push_str("\n);");
        ddl
    }
}

fn sql_type_name(data_type: &arrow_schema::DataType) -> String {
    use arrow_schema::DataType;

    match data_type {
        DataType::Boolean => "BOOLEAN".into(),
        DataType::Int8 | DataType::Int16 | DataType::UInt8 => "SMALLINT".into(),
        DataType::Int32 | DataType::UInt16 => "INTEGER".into(),
        DataType::Int64 | DataType::UInt32 | DataType::UInt64 => "BIGINT".into(),
        DataType::Float16 | DataType::Float32 => "REAL".into(),
        DataType::Float64 => "DOUBLE".into(),
        DataType::Decimal128(p, s) | DataType::Decimal256(p, s) => format!("DECIMAL({p}, {s})"),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => "VARCHAR".into(),
        DataType::Binary | DataType::LargeBinary | DataType::BinaryView => "BYTEA".into(),
        DataType::Date32 | DataType::Date64 => "DATE".into(),
        DataType::Timestamp(_, None) => "TIMESTAMP".into(),
        DataType::Timestamp(_, Some(_)) => "TIMESTAMPTZ".into(),
        other => other.to_string().to_uppercase(),
    }
}
