use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{Column, KeyValueStore, StoreError, WriteBatch, WriteOp};

type ColumnMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Volatile store used by tests and short-lived validation runs.
#[derive(Default)]
pub struct MemoryStore {
    columns: [RwLock<ColumnMap>; Column::COUNT],
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held in `column`.
    pub fn key_count(&self, column: Column) -> Result<usize, StoreError> {
        Ok(self.read(column)?.len())
    }

    fn read(&self, column: Column) -> Result<RwLockReadGuard<'_, ColumnMap>, StoreError> {
        self.columns[column.index()]
            .read()
            .map_err(|_| poisoned(column))
    }

    fn write(&self, column: Column) -> Result<RwLockWriteGuard<'_, ColumnMap>, StoreError> {
        self.columns[column.index()]
            .write()
            .map_err(|_| poisoned(column))
    }
}

fn poisoned(column: Column) -> StoreError {
    StoreError::Backend(format!("memory store column {} poisoned", column.as_str()))
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.read(column)?.get(key).cloned())
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.write(column)?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        self.write(column)?.remove(key);
        Ok(())
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        // Columns are locked in index order so readers never see half a batch.
        let touched = batch.touched_columns();
        let mut guards: [Option<RwLockWriteGuard<'_, ColumnMap>>; Column::COUNT] = Default::default();
        for column in Column::ALL {
            if touched & column.bit() != 0 {
                guards[column.index()] = Some(self.write(column)?);
            }
        }
        for op in batch.iter() {
            let Some(map) = guards[op.column().index()].as_mut() else {
                continue;
            };
            match op {
                WriteOp::Put { key, value, .. } => {
                    map.insert(key.to_vec(), value.clone());
                }
                WriteOp::Delete { key, .. } => {
                    map.remove(key.as_slice());
                }
            }
        }
        posd_log::log_trace!("memory store applied batch of {} ops", batch.len());
        Ok(())
    }
}
