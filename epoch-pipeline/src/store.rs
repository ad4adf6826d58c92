use crate::{OrderingError, StoreError};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use stereo_core::{CorrespondenceSet, Epoch};

/// The append-only history of correspondence records, one per epoch.
///
/// Epochs are appended strictly in order starting at `0` and a record is never modified
/// once appended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureStore {
    records: Vec<CorrespondenceSet>,
}

impl FeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the record of `epoch`, which must be the next epoch.
    pub fn append(&mut self, epoch: Epoch, record: CorrespondenceSet) -> Result<(), OrderingError> {
        if epoch != self.records.len() {
            return Err(OrderingError::OutOfOrder {
                epoch,
                expected: self.records.len(),
            });
        }
        self.records.push(record);
        Ok(())
    }

    pub fn get(&self, epoch: Epoch) -> Result<&CorrespondenceSet, OrderingError> {
        self.records.get(epoch).ok_or(OrderingError::NotRecorded {
            epoch,
            recorded: self.records.len(),
        })
    }

    /// The number of recorded epochs, which is also the next epoch to append.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn latest(&self) -> Option<(Epoch, &CorrespondenceSet)> {
        self.records.len().checked_sub(1).map(|e| (e, &self.records[e]))
    }

    pub fn epochs(&self) -> impl Iterator<Item = (Epoch, &CorrespondenceSet)> + '_ {
        self.records.iter().enumerate()
    }

    pub fn save(&self, writer: impl Write) -> Result<(), StoreError> {
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    /// Reads a store written by [`FeatureStore::save`] and checks that every record is consistent.
    pub fn load(reader: impl Read) -> Result<Self, StoreError> {
        let store: Self = bincode::deserialize_from(reader)?;
        for (epoch, record) in store.epochs() {
            record
                .validate()
                .map_err(|source| StoreError::Corrupt { epoch, source })?;
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_core::{
        nalgebra::{DMatrix, Point2},
        CameraFeatures,
    };

    fn record(n: usize) -> CorrespondenceSet {
        let camera = |offset: f64| {
            CameraFeatures::new(
                (0..n).map(|i| Point2::new(i as f64 + offset, 2.0)).collect(),
                DMatrix::from_element(3, n, 0.25),
                vec![0.5; n],
            )
            .unwrap()
        };
        CorrespondenceSet::new(camera(0.0), camera(7.0)).unwrap()
    }

    #[test]
    fn strictly_sequential() {
        let mut store = FeatureStore::new();
        assert_eq!(
            store.append(1, record(2)),
            Err(OrderingError::OutOfOrder {
                epoch: 1,
                expected: 0
            })
        );
        store.append(0, record(2)).unwrap();
        assert_eq!(
            store.append(0, record(3)),
            Err(OrderingError::OutOfOrder {
                epoch: 0,
                expected: 1
            })
        );
        assert_eq!(
            store.append(2, record(3)),
            Err(OrderingError::OutOfOrder {
                epoch: 2,
                expected: 1
            })
        );
        store.append(1, record(3)).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1).unwrap().len(), 3);
        assert_eq!(store.latest().map(|(e, r)| (e, r.len())), Some((1, 3)));
    }

    #[test]
    fn get_before_append() {
        let store = FeatureStore::new();
        assert_eq!(
            store.get(0).unwrap_err(),
            OrderingError::NotRecorded {
                epoch: 0,
                recorded: 0
            }
        );
        assert!(store.latest().is_none());
    }

    #[test]
    fn saved_store_loads_back() {
        let mut store = FeatureStore::new();
        store.append(0, record(4)).unwrap();
        store.append(1, record(0)).unwrap();
        let mut bytes = vec![];
        store.save(&mut bytes).unwrap();
        assert_eq!(FeatureStore::load(bytes.as_slice()).unwrap(), store);
        assert!(FeatureStore::load(&bytes[..bytes.len() / 2]).is_err());
    }
}
