use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::StoreError;

/// A generic time-indexed columnar table used for campaign artifacts
/// (trade lists, equity curves). One Int64 `time` column in epoch millis
/// plus named float and string columns of equal length.
#[derive(Debug, Clone, Default)]
pub struct NumericTable {
    pub time: Vec<i64>,
    pub floats: BTreeMap<String, Vec<f64>>,
    pub strings: BTreeMap<String, Vec<String>>,
}

impl NumericTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    fn validate(&self) -> Result<(), String> {
        let n = self.len();
        for (name, col) in &self.floats {
            if col.len() != n {
                return Err(format!("float column {name} has length {}, expected {n}", col.len()));
            }
        }
        for (name, col) in &self.strings {
            if col.len() != n {
                return Err(format!("string column {name} has length {}, expected {n}", col.len()));
            }
        }
        Ok(())
    }

    /// Write the table atomically and return the file's SHA-256 checksum.
    pub fn write(&self, path: &Path) -> Result<String, StoreError> {
        self.validate()
            .map_err(|m| StoreError::schema(path, m))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let mut fields = vec![Field::new("time", DataType::Int64, false)];
        for name in self.floats.keys() {
            fields.push(Field::new(name, DataType::Float64, false));
        }
        for name in self.strings.keys() {
            fields.push(Field::new(name, DataType::Utf8, false));
        }
        let schema = Arc::new(Schema::new(fields));

        let mut columns: Vec<ArrayRef> = vec![Arc::new(Int64Array::from(self.time.clone()))];
        for col in self.floats.values() {
            columns.push(Arc::new(Float64Array::from(col.clone())));
        }
        for col in self.strings.values() {
            columns.push(Arc::new(StringArray::from(col.clone())));
        }
        let batch = RecordBatch::try_new(schema.clone(), columns)?;

        let tmp = path.with_extension("parquet.tmp");
        {
            let file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
            let props = WriterProperties::builder()
                .set_compression(Compression::SNAPPY)
                .build();
            let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
            writer.write(&batch)?;
            writer.close()?;
        }
        let checksum =
            signal_core::hashing::sha256_file(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
        Ok(checksum)
    }

    pub fn read(path: &Path) -> Result<NumericTable, StoreError> {
        let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut table = NumericTable::new();
        for batch in reader {
            let batch = batch?;
            for field in batch.schema().fields() {
                let name = field.name().as_str();
                let col = batch
                    .column_by_name(name)
                    .ok_or_else(|| StoreError::schema(path, format!("missing column {name}")))?;
                match field.data_type() {
                    DataType::Int64 if name == "time" => {
                        let arr = col
                            .as_any()
                            .downcast_ref::<Int64Array>()
                            .ok_or_else(|| StoreError::schema(path, "time is not int64"))?;
                        table.time.extend(arr.values().iter().copied());
                    }
                    DataType::Float64 => {
                        let arr = col
                            .as_any()
                            .downcast_ref::<Float64Array>()
                            .ok_or_else(|| StoreError::schema(path, format!("{name} is not float64")))?;
                        table
                            .floats
                            .entry(name.to_string())
                            .or_default()
                            .extend(arr.values().iter().copied());
                    }
                    DataType::Utf8 => {
                        let arr = col
                            .as_any()
                            .downcast_ref::<StringArray>()
                            .ok_or_else(|| StoreError::schema(path, format!("{name} is not utf8")))?;
                        table
                            .strings
                            .entry(name.to_string())
                            .or_default()
                            .extend((0..arr.len()).map(|i| arr.value(i).to_string()));
                    }
                    other => {
                        return Err(StoreError::schema(
                            path,
                            format!("unsupported column type {other} for {name}"),
                        ));
                    }
                }
            }
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.parquet");

        let mut table = NumericTable::new();
        table.time = vec![1_700_000_000_000, 1_700_000_060_000];
        table.floats.insert("pnl".to_string(), vec![12.5, -4.0]);
        table
            .strings
            .insert("exit_reason".to_string(), vec!["TP".to_string(), "SL".to_string()]);

        let checksum = table.write(&path).unwrap();
        assert_eq!(checksum.len(), 64);

        let loaded = NumericTable::read(&path).unwrap();
        assert_eq!(loaded.time, table.time);
        assert_eq!(loaded.floats["pnl"], vec![12.5, -4.0]);
        assert_eq!(loaded.strings["exit_reason"], vec!["TP", "SL"]);
    }

    #[test]
    fn ragged_columns_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = NumericTable::new();
        table.time = vec![1, 2, 3];
        table.floats.insert("pnl".to_string(), vec![1.0]);
        assert!(table.write(&dir.path().join("bad.parquet")).is_err());
    }

    #[test]
    fn identical_content_identical_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = NumericTable::new();
        table.time = vec![1, 2];
        table.floats.insert("equity".to_string(), vec![100.0, 101.0]);

        let c1 = table.write(&dir.path().join("a.parquet")).unwrap();
        let c2 = table.write(&dir.path().join("b.parquet")).unwrap();
        assert_eq!(c1, c2);
    }
}
