//! Grouping of scanned DICOM images into patients, studies and series.
//!
//! Files are scanned in parallel; a file that cannot be read is reported and
//! left out without affecting the others.

use crate::error::{DicomError, Result};
use crate::frame::Frame;
use crate::image::Image;
use crate::options::ReconstructOptions;
use crate::util::add_line;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A DICOM series: the images sharing a series instance UID.
#[derive(Debug, Clone, Default)]
pub struct Series {
    /// series description
    pub name: String,
    /// series instance UID
    pub uid: String,
    /// modality
    pub modality: String,
    /// series date
    pub date: String,
    /// series time
    pub time: String,
    /// the images of the series, in scanning order
    pub images: Vec<Image>,
}

/// A DICOM study.
#[derive(Debug, Clone, Default)]
pub struct Study {
    /// study description
    pub name: String,
    /// study ID
    pub id: String,
    /// study instance UID
    pub uid: String,
    /// study date
    pub date: String,
    /// study time
    pub time: String,
    /// series of the study
    pub series: Vec<Series>,
}

/// A patient.
#[derive(Debug, Clone, Default)]
pub struct Patient {
    /// patient name
    pub name: String,
    /// patient ID
    pub id: String,
    /// date of birth
    pub dob: String,
    /// studies of the patient
    pub studies: Vec<Study>,
}

/// All the patients found in a set of DICOM files.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    /// patients, in the order they were first found
    pub patients: Vec<Patient>,
}

/// A series together with the study and patient it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct SeriesRef<'a> {
    /// the patient
    pub patient: &'a Patient,
    /// the study
    pub study: &'a Study,
    /// the series
    pub series: &'a Series,
}

impl Series {
    /// Series number, from the first frame.
    pub fn number(&self) -> Option<usize> {
        self.frames().next().map(|f| f.series_num).filter(|n| *n != usize::MAX)
    }

    /// Iterate over the frames of all images of the series.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.images.iter().flat_map(|image| image.frames.iter())
    }

    /// A short name for diagnostics.
    pub fn label(&self) -> String {
        match self.number() {
            Some(n) => format!("{} - {}", n, self.name),
            None => self.name.clone(),
        }
    }
}

impl<'a> SeriesRef<'a> {
    /// Human readable description of where the series comes from, one item
    /// per line.
    pub fn comments(&self) -> String {
        let mut text = String::new();
        add_line(
            &mut text,
            &format!("{} [MRN {}]", self.patient.name, self.patient.id),
        );
        add_line(
            &mut text,
            &format!(
                "{}: {} [{}]",
                self.series.modality,
                self.series.name,
                self.series.number().map(|n| n.to_string()).unwrap_or_default()
            ),
        );
        add_line(
            &mut text,
            &format!("{} [{}] {} {}", self.study.name, self.study.id, self.study.date, self.study.time),
        );
        text
    }
}

impl Tree {
    /// Scan the given files in parallel and group their images.
    pub fn read_files<P>(paths: &[P], options: &ReconstructOptions) -> Tree
    where
        P: AsRef<Path> + Sync,
    {
        let images: Vec<Image> = paths
            .par_iter()
            .filter_map(|path| match Image::open(path, options.force_read) {
                Ok(image) => {
                    if image.frames.is_empty() {
                        debug!("no image data in file \"{}\"", image.filename);
                        None
                    } else {
                        Some(image)
                    }
                }
                Err(e) => {
                    warn!("error reading file \"{}\": {}", path.as_ref().display(), e);
                    None
                }
            })
            .collect();

        let mut tree = Tree::default();
        for image in images {
            tree.add(image);
        }
        info!(
            "found {} DICOM series in {} files",
            tree.series().count(),
            paths.len()
        );
        tree
    }

    /// Scan all files under the given directory, recursively.
    pub fn read_dir<P: AsRef<Path>>(dir: P, options: &ReconstructOptions) -> Result<Tree> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(dir) {
            let entry = entry.map_err(|e| DicomError::Io(e.into()))?;
            if entry.file_type().is_file() {
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        Ok(Tree::read_files(&paths, options))
    }

    /// Add an image to the tree, creating its patient, study and series as
    /// needed.
    pub fn add(&mut self, image: Image) {
        let patient = match self.patients.iter().position(|p| {
            p.name == image.patient_name && p.id == image.patient_id && p.dob == image.patient_dob
        }) {
            Some(i) => &mut self.patients[i],
            None => {
                self.patients.push(Patient {
                    name: image.patient_name.clone(),
                    id: image.patient_id.clone(),
                    dob: image.patient_dob.clone(),
                    studies: Vec::new(),
                });
                let last = self.patients.len() - 1;
                &mut self.patients[last]
            }
        };

        let study = match patient.studies.iter().position(|s| {
            s.uid == image.study_uid && s.id == image.study_id && s.name == image.study_description
        }) {
            Some(i) => &mut patient.studies[i],
            None => {
                patient.studies.push(Study {
                    name: image.study_description.clone(),
                    id: image.study_id.clone(),
                    uid: image.study_uid.clone(),
                    date: image.study_date.clone(),
                    time: image.study_time.clone(),
                    series: Vec::new(),
                });
                let last = patient.studies.len() - 1;
                &mut patient.studies[last]
            }
        };

        match study
            .series
            .iter()
            .position(|s| s.uid == image.series_uid && s.name == image.series_description)
        {
            Some(i) => study.series[i].images.push(image),
            None => study.series.push(Series {
                name: image.series_description.clone(),
                uid: image.series_uid.clone(),
                modality: image.modality.clone(),
                date: image.series_date.clone(),
                time: image.series_time.clone(),
                images: vec![image],
            }),
        }
    }

    /// Iterate over all series.
    pub fn series(&self) -> impl Iterator<Item = SeriesRef> {
        self.patients.iter().flat_map(|patient| {
            patient.studies.iter().flat_map(move |study| {
                study.series.iter().map(move |series| SeriesRef {
                    patient,
                    study,
                    series,
                })
            })
        })
    }

    /// The only series of the tree.
    ///
    /// # Errors
    ///
    /// - `DicomError::NoFrames` if no series was found
    /// - `DicomError::AmbiguousSeries` if more than one series was found
    pub fn single_series(&self) -> Result<SeriesRef> {
        let mut iter = self.series();
        match (iter.next(), iter.next()) {
            (None, _) => Err(DicomError::NoFrames),
            (Some(s), None) => Ok(s),
            (Some(_), Some(_)) => Err(DicomError::AmbiguousSeries(self.series().count())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(patient: &str, series_uid: &str, instance: usize) -> Image {
        Image {
            filename: format!("{}-{}", series_uid, instance),
            patient_name: patient.to_string(),
            patient_id: "ID".to_string(),
            study_uid: "1.2.3".to_string(),
            series_uid: series_uid.to_string(),
            series_description: "dwi".to_string(),
            modality: "MR".to_string(),
            frames: vec![Frame {
                series_num: 7,
                instance,
                ..Frame::default()
            }],
            ..Image::default()
        }
    }

    #[test]
    fn grouping() {
        let mut tree = Tree::default();
        tree.add(image("DOE^JOHN", "1.2.3.4", 1));
        tree.add(image("DOE^JOHN", "1.2.3.4", 2));
        tree.add(image("DOE^JOHN", "1.2.3.5", 1));
        tree.add(image("ROE^JANE", "1.2.3.6", 1));

        assert_eq!(tree.patients.len(), 2);
        assert_eq!(tree.patients[0].studies.len(), 1);
        assert_eq!(tree.patients[0].studies[0].series.len(), 2);
        assert_eq!(tree.series().count(), 3);
        let first = tree.series().next().unwrap();
        assert_eq!(first.series.images.len(), 2);
        assert_eq!(first.series.number(), Some(7));
        assert_eq!(first.series.label(), "7 - dwi");
        assert!(matches!(
            tree.single_series(),
            Err(DicomError::AmbiguousSeries(3))
        ));
    }

    #[test]
    fn comments() {
        let mut tree = Tree::default();
        tree.add(image("DOE^JOHN", "1.2.3.4", 1));
        let s = tree.single_series().unwrap();
        let comments = s.comments();
        let lines: Vec<&str> = comments.lines().collect();
        assert_eq!(lines[0], "DOE^JOHN [MRN ID]");
        assert_eq!(lines[1], "MR: dwi [7]");
    }

    #[test]
    fn empty_tree() {
        assert!(matches!(
            Tree::default().single_series(),
            Err(DicomError::NoFrames)
        ));
    }
}
