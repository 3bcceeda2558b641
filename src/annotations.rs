//! Viewing annotations attached to scans.
//!
//! Each subject (scan id) owns an ordered list of annotations, addressed by
//! position. The JSON file layout is `{ "<subject>": [ { "angle": ..,
//! "note": .. }, .. ] }`, pretty-printed, and a subject disappears from the
//! file once its last annotation is deleted.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::ErrorKind;

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("No annotations for {0:?}")]
    SubjectNotFound(String),

    #[error("Annotation {index} of {subject:?} does not exist")]
    IndexOutOfRange { subject: String, index: usize },

    #[error("Invalid orientation: {0}")]
    InvalidOrientation(String),

    #[error("Subject must not be empty")]
    EmptySubject,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Annotation file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnnotationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnnotationError::SubjectNotFound(_) | AnnotationError::IndexOutOfRange { .. } => {
                ErrorKind::NotFound
            }
            AnnotationError::InvalidOrientation(_) | AnnotationError::EmptySubject => {
                ErrorKind::InvalidRequest
            }
            AnnotationError::Io(_) | AnnotationError::Json(_) => ErrorKind::Internal,
        }
    }
}

/// Camera orientation the note was taken at.
///
/// In JSON a bare array of two numbers reads as `primary` and `secondary`
/// angles, while three numbers read as a direction vector. Three angles use
/// the object form `{ "primary", "secondary", "roll" }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ViewOrientation {
    /// Free-text label such as `"LAO 30 / CRAN 15"`.
    Label(String),
    /// View direction vector.
    Vector([f64; 3]),
    /// C-arm style angles in degrees.
    Angles {
        primary: f64,
        secondary: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        roll: Option<f64>,
    },
}

/// Accepted JSON shapes of a [`ViewOrientation`].
#[derive(Deserialize)]
#[serde(untagged)]
enum OrientationRepr {
    Label(String),
    AnglePair([f64; 2]),
    Vector([f64; 3]),
    Angles {
        primary: f64,
        secondary: f64,
        #[serde(default)]
        roll: Option<f64>,
    },
}

impl From<OrientationRepr> for ViewOrientation {
    fn from(repr: OrientationRepr) -> Self {
        match repr {
            OrientationRepr::Label(label) => ViewOrientation::Label(label),
            OrientationRepr::AnglePair([primary, secondary]) => ViewOrientation::Angles {
                primary,
                secondary,
                roll: None,
            },
            OrientationRepr::Vector(v) => ViewOrientation::Vector(v),
            OrientationRepr::Angles {
                primary,
                secondary,
                roll,
            } => ViewOrientation::Angles {
                primary,
                secondary,
                roll,
            },
        }
    }
}

impl<'de> Deserialize<'de> for ViewOrientation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        OrientationRepr::deserialize(deserializer).map(Into::into)
    }
}

impl ViewOrientation {
    pub fn validate(&self) -> Result<(), AnnotationError> {
        match self {
            ViewOrientation::Label(label) if label.trim().is_empty() => Err(
                AnnotationError::InvalidOrientation("label is empty".into()),
            ),
            ViewOrientation::Label(_) => Ok(()),
            ViewOrientation::Angles {
                primary,
                secondary,
                roll,
            } => {
                let finite = primary.is_finite()
                    && secondary.is_finite()
                    && roll.is_none_or(|r| r.is_finite());
                if finite {
                    Ok(())
                } else {
                    Err(AnnotationError::InvalidOrientation(
                        "angles must be finite".into(),
                    ))
                }
            }
            ViewOrientation::Vector(v) => {
                if !v.iter().all(|c| c.is_finite()) {
                    return Err(AnnotationError::InvalidOrientation(
                        "vector components must be finite".into(),
                    ));
                }
                if v.iter().all(|&c| c == 0.0) {
                    return Err(AnnotationError::InvalidOrientation(
                        "vector must be non-zero".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "angle")]
    pub orientation: ViewOrientation,
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

/// Position of an annotation within its subject's list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnotationId {
    pub subject: String,
    pub index: usize,
}

impl AnnotationId {
    pub fn new(subject: impl Into<String>, index: usize) -> Self {
        Self {
            subject: subject.into(),
            index,
        }
    }
}

pub type AnnotationMap = BTreeMap<String, Vec<Annotation>>;

pub trait AnnotationStore: Send + Sync {
    fn list_all(&self) -> Result<AnnotationMap, AnnotationError>;

    /// Annotations of one subject; empty when it has none.
    fn list(&self, subject: &str) -> Result<Vec<Annotation>, AnnotationError>;

    fn get(&self, id: &AnnotationId) -> Result<Annotation, AnnotationError>;

    /// Append an annotation and return where it landed.
    fn create(
        &self,
        subject: &str,
        orientation: ViewOrientation,
        note: Option<String>,
        owner_id: Option<String>,
    ) -> Result<AnnotationId, AnnotationError>;

    /// Replace orientation and note, keeping the owner.
    fn update(
        &self,
        id: &AnnotationId,
        orientation: ViewOrientation,
        note: Option<String>,
    ) -> Result<Annotation, AnnotationError>;

    /// Remove an annotation; later entries of the subject shift down by one.
    fn delete(&self, id: &AnnotationId) -> Result<Annotation, AnnotationError>;
}

/// Annotations persisted in a single pretty-printed JSON file.
///
/// Writes go to a sibling temporary file that then replaces the original.
/// A process-local lock serializes read-modify-write cycles.
pub struct JsonFileAnnotationStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileAnnotationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<AnnotationMap, AnnotationError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(AnnotationMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(AnnotationMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, annotations: &AnnotationMap) -> Result<(), AnnotationError> {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        let json = serde_json::to_vec_pretty(annotations)?;
        fs::write(&staging, json)?;
        fs::rename(&staging, &self.path)?;
        debug!(path = %self.path.display(), subjects = annotations.len(), "Saved annotations");
        Ok(())
    }

    fn modify<T>(
        &self,
        f: impl FnOnce(&mut AnnotationMap) -> Result<T, AnnotationError>,
    ) -> Result<T, AnnotationError> {
        let _guard = self.lock.lock();
        let mut annotations = self.load()?;
        let result = f(&mut annotations)?;
        self.save(&annotations)?;
        Ok(result)
    }
}

fn entry_mut<'a>(
    annotations: &'a mut AnnotationMap,
    id: &AnnotationId,
) -> Result<&'a mut Annotation, AnnotationError> {
    annotations
        .get_mut(&id.subject)
        .ok_or_else(|| AnnotationError::SubjectNotFound(id.subject.clone()))?
        .get_mut(id.index)
        .ok_or_else(|| AnnotationError::IndexOutOfRange {
            subject: id.subject.clone(),
            index: id.index,
        })
}

impl AnnotationStore for JsonFileAnnotationStore {
    fn list_all(&self) -> Result<AnnotationMap, AnnotationError> {
        let _guard = self.lock.lock();
        self.load()
    }

    fn list(&self, subject: &str) -> Result<Vec<Annotation>, AnnotationError> {
        Ok(self.list_all()?.remove(subject).unwrap_or_default())
    }

    fn get(&self, id: &AnnotationId) -> Result<Annotation, AnnotationError> {
        let mut annotations = self.list_all()?;
        entry_mut(&mut annotations, id).map(|annotation| annotation.clone())
    }

    fn create(
        &self,
        subject: &str,
        orientation: ViewOrientation,
        note: Option<String>,
        owner_id: Option<String>,
    ) -> Result<AnnotationId, AnnotationError> {
        if subject.is_empty() {
            return Err(AnnotationError::EmptySubject);
        }
        orientation.validate()?;

        self.modify(|annotations| {
            let list = annotations.entry(subject.to_string()).or_default();
            list.push(Annotation {
                orientation,
                note,
                owner_id,
            });
            Ok(AnnotationId::new(subject, list.len() - 1))
        })
    }

    fn update(
        &self,
        id: &AnnotationId,
        orientation: ViewOrientation,
        note: Option<String>,
    ) -> Result<Annotation, AnnotationError> {
        orientation.validate()?;

        self.modify(|annotations| {
            let annotation = entry_mut(annotations, id)?;
            annotation.orientation = orientation;
            annotation.note = note;
            Ok(annotation.clone())
        })
    }

    fn delete(&self, id: &AnnotationId) -> Result<Annotation, AnnotationError> {
        self.modify(|annotations| {
            let list = annotations
                .get_mut(&id.subject)
                .ok_or_else(|| AnnotationError::SubjectNotFound(id.subject.clone()))?;
            if id.index >= list.len() {
                return Err(AnnotationError::IndexOutOfRange {
                    subject: id.subject.clone(),
                    index: id.index,
                });
            }
            let removed = list.remove(id.index);
            if list.is_empty() {
                annotations.remove(&id.subject);
            }
            Ok(removed)
        })
    }
}
