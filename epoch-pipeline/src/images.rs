use crate::ConfigurationError;
use log::*;
use std::path::{Path, PathBuf};
use stereo_core::{CameraIndex, Epoch};

/// The ordered image sequence of every camera, where the index of an image is its epoch.
///
/// All sequences have the same length, so every epoch has exactly one image per camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageStore {
    camera_ids: Vec<String>,
    sequences: Vec<Vec<PathBuf>>,
}

impl ImageStore {
    /// Lists `<base_folder>/<camera_id>/*.<extension>` for every camera, sorted by path.
    ///
    /// The extension may be given with or without its leading dot and is compared
    /// case-insensitively.
    pub fn load<S: AsRef<str>>(
        camera_ids: &[S],
        base_folder: impl AsRef<Path>,
        extension: &str,
    ) -> Result<Self, ConfigurationError> {
        let extension = extension.trim_start_matches('.');
        let mut sequences = Vec::with_capacity(camera_ids.len());
        for camera in camera_ids {
            let camera = camera.as_ref();
            let folder = base_folder.as_ref().join(camera);
            let entries = std::fs::read_dir(&folder).map_err(|source| {
                ConfigurationError::CameraDirectory {
                    camera: camera.to_owned(),
                    path: folder.clone(),
                    source,
                }
            })?;
            let mut sequence = vec![];
            for entry in entries {
                let path = entry
                    .map_err(|source| ConfigurationError::CameraDirectory {
                        camera: camera.to_owned(),
                        path: folder.clone(),
                        source,
                    })?
                    .path();
                let matches_extension = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case(extension))
                    .unwrap_or(false);
                if matches_extension && path.is_file() {
                    sequence.push(path);
                }
            }
            if sequence.is_empty() {
                return Err(ConfigurationError::EmptySequence {
                    camera: camera.to_owned(),
                    path: folder,
                    extension: extension.to_owned(),
                });
            }
            sequence.sort();
            info!(
                "found {} images for camera {} in {}",
                sequence.len(),
                camera,
                folder.display()
            );
            sequences.push(sequence);
        }
        Self::from_sequences(camera_ids, sequences)
    }

    /// Builds a store from already listed sequences, which are used in the order given.
    pub fn from_sequences<S: AsRef<str>>(
        camera_ids: &[S],
        sequences: Vec<Vec<PathBuf>>,
    ) -> Result<Self, ConfigurationError> {
        if camera_ids.len() != sequences.len() {
            return Err(ConfigurationError::CameraCount {
                found: sequences.len(),
                expected: camera_ids.len(),
            });
        }
        let camera_ids: Vec<String> = camera_ids.iter().map(|id| id.as_ref().to_owned()).collect();
        if let Some(first) = sequences.first() {
            for (camera, sequence) in camera_ids.iter().zip(&sequences).skip(1) {
                if sequence.len() != first.len() {
                    return Err(ConfigurationError::SequenceLengthMismatch {
                        camera: camera.clone(),
                        found: sequence.len(),
                        reference: camera_ids[0].clone(),
                        expected: first.len(),
                    });
                }
            }
        }
        Ok(Self {
            camera_ids,
            sequences,
        })
    }

    pub fn camera_ids(&self) -> &[String] {
        &self.camera_ids
    }

    pub fn cameras(&self) -> usize {
        self.sequences.len()
    }

    /// The number of epochs, which is the length of every sequence.
    pub fn epochs(&self) -> usize {
        self.sequences.first().map(Vec::len).unwrap_or(0)
    }

    pub fn sequence(&self, camera: CameraIndex) -> Option<&[PathBuf]> {
        self.sequences.get(camera).map(Vec::as_slice)
    }

    pub fn path(&self, camera: CameraIndex, epoch: Epoch) -> Option<&Path> {
        self.sequences
            .get(camera)?
            .get(epoch)
            .map(PathBuf::as_path)
    }

    /// The images of camera 0 and camera 1 at `epoch`.
    pub fn pair(&self, epoch: Epoch) -> Option<[&Path; 2]> {
        Some([self.path(0, epoch)?, self.path(1, epoch)?])
    }

    /// The images of `camera` at `epoch - 1` and `epoch`.
    pub fn consecutive(&self, camera: CameraIndex, epoch: Epoch) -> Option<[&Path; 2]> {
        let previous = epoch.checked_sub(1)?;
        Some([self.path(camera, previous)?, self.path(camera, epoch)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(dir: &Path, names: &[&str]) {
        std::fs::create_dir_all(dir).unwrap();
        for name in names {
            File::create(dir.join(name)).unwrap();
        }
    }

    #[test]
    fn sorted_and_filtered() {
        let base = tempfile::tempdir().unwrap();
        touch(
            &base.path().join("p2"),
            &["IMG_0003.tif", "IMG_0001.tif", "notes.txt", "IMG_0002.TIF"],
        );
        touch(
            &base.path().join("p3"),
            &["IMG_1002.tif", "IMG_1001.tif", "IMG_1003.tif"],
        );
        let store = ImageStore::load(&["p2", "p3"], base.path(), ".tif").unwrap();
        assert_eq!(store.epochs(), 3);
        assert_eq!(store.cameras(), 2);
        let names: Vec<_> = store
            .sequence(0)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, ["IMG_0001.tif", "IMG_0002.TIF", "IMG_0003.tif"]);
        assert_eq!(
            store.pair(1).unwrap(),
            [
                base.path().join("p2/IMG_0002.TIF").as_path(),
                base.path().join("p3/IMG_1002.tif").as_path()
            ]
        );
        assert_eq!(
            store.consecutive(1, 2).unwrap()[0],
            base.path().join("p3/IMG_1002.tif")
        );
        assert!(store.consecutive(0, 0).is_none());
        assert!(store.pair(3).is_none());

        let without_dot = ImageStore::load(&["p2", "p3"], base.path(), "tif").unwrap();
        assert_eq!(without_dot, store);
    }

    #[test]
    fn unequal_lengths_are_rejected() {
        let base = tempfile::tempdir().unwrap();
        touch(&base.path().join("p2"), &["a.png", "b.png", "c.png"]);
        touch(&base.path().join("p3"), &["a.png", "b.png"]);
        match ImageStore::load(&["p2", "p3"], base.path(), "png") {
            Err(ConfigurationError::SequenceLengthMismatch {
                camera,
                found,
                expected,
                ..
            }) => {
                assert_eq!(camera, "p3");
                assert_eq!(found, 2);
                assert_eq!(expected, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_or_empty_cameras() {
        let base = tempfile::tempdir().unwrap();
        touch(&base.path().join("p2"), &["a.png"]);
        touch(&base.path().join("p3"), &["a.jpg"]);
        assert!(matches!(
            ImageStore::load(&["p2", "p4"], base.path(), "png"),
            Err(ConfigurationError::CameraDirectory { .. })
        ));
        assert!(matches!(
            ImageStore::load(&["p2", "p3"], base.path(), "png"),
            Err(ConfigurationError::EmptySequence { .. })
        ));
    }
}
