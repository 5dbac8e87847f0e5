// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON persistence for measurement jobs.
//!
//! A [`JobDocument`] is the serialized form of a
//! [`Job`](stakeout_core::job::Job): the job's name and version plus flat
//! lists of feature and observation records keyed by their stored ids.
//! Restoring is a two-pass affair — pass one instantiates every element
//! under its stored id, pass two restores values and wiring — so records may
//! reference elements that appear later in the document. A document that
//! references an id that never materializes fails to load as a whole; a
//! half-restored job is never returned.
//!
//! Version compatibility follows the loader's own version: documents written
//! by an older loader load fine, documents written by a *newer* loader (or
//! predating the current format) are rejected up front.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stakeout_core::error::JobError;
use stakeout_core::feature::{ElementId, Feature, FeatureValue};
use stakeout_core::function::{FixedParameter, Function, FunctionKind, InputElement};
use stakeout_core::job::Job;
use stakeout_core::observation::Observation;
use stakeout_core::transform::Transform3d;

/// The version stamped into documents written by this loader.
pub const DOCUMENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Oldest document version this loader can still restore.
const MIGRATION_FLOOR: (u64, u64, u64) = (0, 0, 1);

/// Outcome of comparing a document's version against this loader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compatibility {
    /// Document and loader versions are identical.
    Match,
    /// The document's version string is not `major.minor.patch`.
    DocumentVersionInvalid,
    /// The loader's own version string is not `major.minor.patch`.
    LoaderVersionInvalid,
    /// The document was written by a newer loader.
    LoaderOlderThanDocument,
    /// The document was written by an older loader; loading is fine.
    LoaderNewerThanDocument,
    /// The document predates the oldest supported format.
    DocumentPreMigration,
}

impl Compatibility {
    /// Whether a document with this classification may be restored.
    #[must_use]
    pub const fn is_loadable(self) -> bool {
        matches!(self, Self::Match | Self::LoaderNewerThanDocument)
    }
}

/// A failure to save or restore a document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The document is not valid JSON (or not a valid record layout).
    #[error("document failed to parse: {0}")]
    Parse(#[from] serde_json::Error),
    /// The document's version cannot be loaded by this loader.
    #[error("document version {document:?} is not loadable ({compatibility:?})")]
    VersionMismatch {
        /// Version string found in the document.
        document: String,
        /// Why it was rejected.
        compatibility: Compatibility,
    },
    /// A record references an element id that does not exist in the
    /// document.
    #[error("document references element {id} which it never defines")]
    Unresolved {
        /// The dangling id.
        id: ElementId,
    },
    /// Restoring a record was rejected by the job's own validation.
    #[error(transparent)]
    Job(#[from] JobError),
}

/// One function of a feature, reduced to its recipe and configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionRecord {
    /// The function's stored id.
    pub id: ElementId,
    /// Which recipe to rebuild.
    pub recipe: FunctionRecipe,
    /// Pinned geometry parameters.
    #[serde(default)]
    pub fixed_parameters: Vec<FixedParameter>,
    /// Wired input elements with their slot positions.
    #[serde(default)]
    pub inputs: Vec<(u32, InputElement)>,
}

/// The closed set of function recipes a document can name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionRecipe {
    /// [`Function::best_fit`] of the owning feature's kind.
    BestFit,
    /// [`Function::distance`].
    Distance,
    /// [`Function::angle`].
    Angle,
    /// [`Function::temperature_mean`].
    TemperatureMean,
    /// [`Function::system_from_trafo`].
    SystemFromTrafo,
    /// [`Function::trafo_from_points`].
    TrafoFromPoints,
}

impl FunctionRecipe {
    fn of(function: &Function) -> Self {
        match function.kind() {
            FunctionKind::BestFit => Self::BestFit,
            FunctionKind::Distance => Self::Distance,
            FunctionKind::Angle => Self::Angle,
            FunctionKind::TemperatureMean => Self::TemperatureMean,
            FunctionKind::TrafoFromPoints => Self::TrafoFromPoints,
            FunctionKind::SystemFromTrafo => Self::SystemFromTrafo,
        }
    }

    fn build(
        self,
        id: ElementId,
        target: stakeout_core::feature::FeatureKind,
    ) -> Result<Function, JobError> {
        match self {
            Self::BestFit => Function::best_fit(id, target),
            Self::Distance => Ok(Function::distance(id)),
            Self::Angle => Ok(Function::angle(id)),
            Self::TemperatureMean => Ok(Function::temperature_mean(id)),
            Self::SystemFromTrafo => Ok(Function::system_from_trafo(id)),
            Self::TrafoFromPoints => Ok(Function::trafo_from_points(id)),
        }
    }
}

/// One feature of a job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// The feature's stored id.
    pub id: ElementId,
    /// Name within its collision scope.
    pub name: String,
    /// Group name, empty when ungrouped.
    #[serde(default)]
    pub group: String,
    /// Free-form comment.
    #[serde(default)]
    pub comment: String,
    /// Whether the stored value came from a successful execution.
    pub is_solved: bool,
    /// Nominal-geometry system, when this is a nominal.
    #[serde(default)]
    pub nominal_system: Option<ElementId>,
    /// Actual counterpart, when this is a nominal.
    #[serde(default)]
    pub actual: Option<ElementId>,
    /// The stored derived value; its variant doubles as the feature's kind.
    pub value: FeatureValue,
    /// The feature's ordered function list.
    #[serde(default)]
    pub functions: Vec<FunctionRecord>,
}

/// The serialized form of a whole job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobDocument {
    /// Version of the loader that wrote the document.
    pub version: String,
    /// The job's name.
    pub name: String,
    /// Every feature, ascending id order.
    pub features: Vec<FeatureRecord>,
    /// Every observation, ascending id order.
    #[serde(default)]
    pub observations: Vec<Observation>,
}

/// Classifies a document version string against this loader.
#[must_use]
pub fn check_compatibility(document_version: &str) -> Compatibility {
    let Some(document) = parse_version(document_version) else {
        return Compatibility::DocumentVersionInvalid;
    };
    let Some(loader) = parse_version(DOCUMENT_VERSION) else {
        return Compatibility::LoaderVersionInvalid;
    };
    if document < MIGRATION_FLOOR {
        Compatibility::DocumentPreMigration
    } else if document == loader {
        Compatibility::Match
    } else if document < loader {
        Compatibility::LoaderNewerThanDocument
    } else {
        Compatibility::LoaderOlderThanDocument
    }
}

fn parse_version(version: &str) -> Option<(u64, u64, u64)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

/// Captures a job into a document.
#[must_use]
pub fn save(job: &Job) -> JobDocument {
    let features = job
        .store()
        .features()
        .map(|feature| FeatureRecord {
            id: feature.id(),
            name: feature.name().to_owned(),
            group: feature.group().to_owned(),
            comment: feature.comment().to_owned(),
            is_solved: feature.is_solved(),
            nominal_system: feature.nominal_system(),
            actual: feature.actual(),
            value: feature.value().clone(),
            functions: feature
                .functions()
                .iter()
                .map(|function| FunctionRecord {
                    id: function.id(),
                    recipe: FunctionRecipe::of(function),
                    fixed_parameters: function.fixed_parameters().to_vec(),
                    inputs: function
                        .all_input_elements()
                        .map(|(position, element)| (position, element.clone()))
                        .collect(),
                })
                .collect(),
        })
        .collect();
    JobDocument {
        version: DOCUMENT_VERSION.to_owned(),
        name: job.name().to_owned(),
        features,
        observations: job.store().observations().cloned().collect(),
    }
}

/// Serializes a job to pretty-printed JSON.
pub fn save_to_string(job: &Job) -> Result<String, DocumentError> {
    Ok(serde_json::to_string_pretty(&save(job))?)
}

/// Restores a job from JSON.
///
/// Fails without side effects when the version is not loadable, a record
/// references an undefined element, or restored wiring would violate a job
/// invariant. The returned [`Compatibility`] tells the caller whether the
/// document was written by an older loader.
pub fn load_from_str(json: &str) -> Result<(Job, Compatibility), DocumentError> {
    let document: JobDocument = serde_json::from_str(json)?;
    load(&document)
}

/// Restores a job from an already-parsed document.
pub fn load(document: &JobDocument) -> Result<(Job, Compatibility), DocumentError> {
    let compatibility = check_compatibility(&document.version);
    if !compatibility.is_loadable() {
        return Err(DocumentError::VersionMismatch {
            document: document.version.clone(),
            compatibility,
        });
    }

    let mut job = Job::new(document.name.clone());
    job.set_loaded_version(document.version.clone());

    // Pass 1: every element exists under its stored id before anything
    // references anything.
    for record in &document.features {
        job.add_feature_with_id(
            record.id,
            record.name.clone(),
            record.value.kind(),
            record.nominal_system,
        )?;
    }
    for observation in &document.observations {
        job.add_observation_with_id(observation.clone())?;
    }

    // Pass 2: values, descriptive state, functions, wiring, master links.
    for record in &document.features {
        if let Some(system) = record.nominal_system
            && job.store().feature(system).is_none()
        {
            return Err(DocumentError::Unresolved { id: system });
        }
        job.restore_value(record.id, record.value.clone(), record.is_solved)?;
        if !record.group.is_empty() {
            job.set_group(record.id, record.group.clone())?;
        }
        if !record.comment.is_empty() {
            job.set_comment(record.id, record.comment.clone())?;
        }
        for function_record in &record.functions {
            let mut function = function_record
                .recipe
                .build(function_record.id, record.value.kind())?;
            for fixed in &function_record.fixed_parameters {
                function.fix_parameter(fixed.parameter, fixed.value);
            }
            for (position, element) in &function_record.inputs {
                function.add_input_element(*position, element.clone())?;
            }
            job.add_function_with_id(record.id, function)
                .map_err(unresolved_or_job)?;
        }
        if let Some(actual) = record.actual {
            job.set_actual(record.id, actual).map_err(unresolved_or_job)?;
        }
    }

    // Cross references stored inside values (trafo endpoints, bundle links,
    // per-system trafo lists) were restored wholesale; verify they resolve
    // and that the restored trafo state still honors the job's invariants.
    for feature in job.store().features() {
        verify_value_references(&job, feature)?;
        verify_trafo_invariants(&job, feature)?;
    }

    // Restore noise is of no interest to the caller.
    let _ = job.drain_notifications();
    Ok((job, compatibility))
}

fn unresolved_or_job(err: JobError) -> DocumentError {
    match err {
        JobError::UnknownElement { id } => DocumentError::Unresolved { id },
        other => DocumentError::Job(other),
    }
}

fn verify_value_references(job: &Job, feature: &Feature) -> Result<(), DocumentError> {
    let mut referenced = Vec::new();
    match feature.value() {
        FeatureValue::TrafoParam(data) => {
            referenced.extend(data.from_system);
            referenced.extend(data.to_system);
            referenced.extend(data.bundle_parent);
            referenced.extend(data.bundle_children.iter().copied());
        }
        FeatureValue::CoordinateSystem(data) => {
            referenced.extend(data.outgoing_trafos.iter().copied());
            referenced.extend(data.incoming_trafos.iter().copied());
        }
        _ => {}
    }
    for id in referenced {
        if job.store().feature(id).is_none() {
            return Err(DocumentError::Unresolved { id });
        }
    }
    Ok(())
}

/// Rejects restored trafo params whose state could never have come out of
/// the job's own setters: a cached matrix disagreeing with its parameter
/// vectors, a datum trafo wired into a bundle chain, or a bundle-parent
/// loop.
fn verify_trafo_invariants(job: &Job, feature: &Feature) -> Result<(), DocumentError> {
    let FeatureValue::TrafoParam(data) = feature.value() else {
        return Ok(());
    };
    // Every setter re-derives the matrix from the vectors, so a saved
    // document always agrees exactly.
    if data.homogen != Transform3d::trs(data.rotation, data.translation, data.scale) {
        return Err(DocumentError::Job(JobError::InvalidParameters {
            reason: "stored homogeneous matrix disagrees with its parameter vectors",
        }));
    }
    if data.is_datum_trafo && (data.bundle_parent.is_some() || !data.bundle_children.is_empty()) {
        return Err(DocumentError::Job(JobError::InvalidParameters {
            reason: "datum trafos take no part in bundle chains",
        }));
    }
    let mut visited = BTreeSet::from([feature.id()]);
    let mut data = data;
    while let Some(parent_id) = data.bundle_parent {
        if !visited.insert(parent_id) {
            return Err(DocumentError::Job(JobError::CycleDetected {
                producer: parent_id,
                consumer: feature.id(),
            }));
        }
        let Some(FeatureValue::TrafoParam(parent)) =
            job.store().feature(parent_id).map(Feature::value)
        else {
            return Err(DocumentError::Job(JobError::InvalidParameters {
                reason: "bundle parent is not a trafo param",
            }));
        };
        if parent.is_datum_trafo {
            return Err(DocumentError::Job(JobError::InvalidParameters {
                reason: "datum trafos take no part in bundle chains",
            }));
        }
        data = parent;
    }
    Ok(())
}
