//! Bronze layer: the raw pull stored as a parquet file with one nullable
//! UTF8 column per source field.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use parquet::basic::{Compression, ConvertedType, LogicalType, Repetition, Type as PhysicalType};
use parquet::data_type::{ByteArray, ByteArrayType};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::Field;
use parquet::schema::types::{Type, TypePtr};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Column-named, all-text table. Rows keep the order they were fetched in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

fn raw_schema(columns: &[String]) -> Result<TypePtr> {
    let fields = columns
        .iter()
        .map(|name| {
            Type::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
                .with_repetition(Repetition::OPTIONAL)
                .with_converted_type(ConvertedType::UTF8)
                .with_logical_type(Some(LogicalType::String))
                .build()
                .map(Arc::new)
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let schema = Type::group_type_builder("breweries_raw")
        .with_fields(fields)
        .build()?;
    Ok(Arc::new(schema))
}

/// Non-null values plus definition levels (1 = present, 0 = null) for one column.
fn column_batch(table: &RawTable, index: usize) -> (Vec<ByteArray>, Vec<i16>) {
    let mut values = Vec::new();
    let mut levels = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        match row.get(index).and_then(|c| c.as_deref()) {
            Some(text) => {
                values.push(ByteArray::from(text));
                levels.push(1);
            }
            None => levels.push(0),
        }
    }
    (values, levels)
}

pub fn write_bronze(table: &RawTable, path: &Path) -> Result<()> {
    let schema = raw_schema(&table.columns)?;
    let props = Arc::new(
        WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build(),
    );

    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = SerializedFileWriter::new(file, schema, props)?;
    let mut row_group = writer.next_row_group()?;

    let mut index = 0;
    while let Some(mut column) = row_group.next_column()? {
        let (values, levels) = column_batch(table, index);
        column
            .typed::<ByteArrayType>()
            .write_batch(&values, Some(levels.as_slice()), None)?;
        column.close()?;
        index += 1;
    }

    row_group.close()?;
    writer.close()?;
    debug!(path = %path.display(), rows = table.len(), columns = index, "parquet written");
    Ok(())
}

pub fn read_bronze(path: &Path) -> Result<RawTable> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let reader = SerializedFileReader::new(file)?;

    let columns: Vec<String> = reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let mut rows = Vec::new();
    for row in reader.get_row_iter(None)? {
        let row = row?;
        let cells = row
            .get_column_iter()
            .map(|(_, field)| field_text(field))
            .collect();
        rows.push(cells);
    }

    debug!(path = %path.display(), rows = rows.len(), columns = columns.len(), "parquet read");
    Ok(RawTable { columns, rows })
}

fn field_text(field: &Field) -> Option<String> {
    match field {
        Field::Null => None,
        Field::Str(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
