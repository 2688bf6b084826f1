//! Definition of errors.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

/// A specialized Result type for Otml.
pub type Result<T, E = OtmlError> = std::result::Result<T, E>;

/// The kind of an [`OtmlError`], used as a tag in logs and exit-code mapping.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    /// Invalid value, missing key, weights summing to zero, min > max, unknown constraint type.
    Configuration,
    /// Duplicate feature label, value not admissible, wrong number of features for a segment.
    FeatureParse,
    /// Constraint descriptor references an unknown feature/type, or has too many bundles.
    GrammarParse,
    /// An alignment constraint encountered a segment outside its expected class.
    Constraint,
    /// Adding or comparing cost vectors of mismatched length.
    CostVectorOperation,
    /// A malformed transducer.
    Transducer,
    /// Optimal-paths reduction could not complete.
    TransducerOptimization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Configuration => "ConfigurationError",
            Self::FeatureParse => "FeatureParseError",
            Self::GrammarParse => "GrammarParseError",
            Self::Constraint => "ConstraintError",
            Self::CostVectorOperation => "CostVectorOperationError",
            Self::Transducer => "TransducerError",
            Self::TransducerOptimization => "TransducerOptimizationError",
        };
        write!(f, "{s}")
    }
}

/// The error type for Otml.
#[derive(Debug)]
pub enum OtmlError {
    /// The error variant for [`TaggedError`], covering the flat taxonomy of §7.
    Tagged(TaggedError),

    /// The error variant for [`ParseIntError`](std::num::ParseIntError).
    ParseInt(std::num::ParseIntError),

    /// The error variant for [`ParseFloatError`](std::num::ParseFloatError).
    ParseFloat(std::num::ParseFloatError),

    /// The error variant for [`serde_json::Error`].
    Json(serde_json::Error),

    /// The error variant for [`csv::Error`].
    Csv(csv::Error),

    /// The error variant for [`std::io::Error`].
    StdIo(std::io::Error),
}

impl OtmlError {
    pub(crate) fn tagged<S>(kind: ErrorKind, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::Tagged(TaggedError {
            kind,
            msg: msg.into(),
            context: BTreeMap::new(),
        })
    }

    pub(crate) fn tagged_with<S>(kind: ErrorKind, msg: S, context: BTreeMap<String, String>) -> Self
    where
        S: Into<String>,
    {
        Self::Tagged(TaggedError {
            kind,
            msg: msg.into(),
            context,
        })
    }

    pub(crate) fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::tagged(ErrorKind::Configuration, msg)
    }

    pub(crate) fn feature_parse<S: Into<String>>(msg: S) -> Self {
        Self::tagged(ErrorKind::FeatureParse, msg)
    }

    pub(crate) fn grammar_parse<S: Into<String>>(msg: S) -> Self {
        Self::tagged(ErrorKind::GrammarParse, msg)
    }

    pub(crate) fn constraint<S: Into<String>>(msg: S) -> Self {
        Self::tagged(ErrorKind::Constraint, msg)
    }

    pub(crate) fn cost_vector_operation<S: Into<String>>(msg: S) -> Self {
        Self::tagged(ErrorKind::CostVectorOperation, msg)
    }

    pub(crate) fn transducer<S: Into<String>>(msg: S) -> Self {
        Self::tagged(ErrorKind::Transducer, msg)
    }

    pub(crate) fn transducer_optimization<S: Into<String>>(msg: S) -> Self {
        Self::tagged(ErrorKind::TransducerOptimization, msg)
    }

    /// The error's kind tag, if it belongs to the flat taxonomy of §7.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Tagged(e) => Some(e.kind),
            _ => None,
        }
    }

    /// The error's structured context map, `None` for non-tagged (ambient I/O) errors.
    pub fn context(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Tagged(e) => Some(&e.context),
            _ => None,
        }
    }
}

impl fmt::Display for OtmlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Tagged(e) => e.fmt(f),
            Self::ParseInt(e) => e.fmt(f),
            Self::ParseFloat(e) => e.fmt(f),
            Self::Json(e) => e.fmt(f),
            Self::Csv(e) => e.fmt(f),
            Self::StdIo(e) => e.fmt(f),
        }
    }
}

impl Error for OtmlError {}

/// Error carrying one of the flat taxonomy kinds plus a structured context map.
#[derive(Debug)]
pub struct TaggedError {
    pub(crate) kind: ErrorKind,
    pub(crate) msg: String,
    pub(crate) context: BTreeMap<String, String>,
}

impl fmt::Display for TaggedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.msg)?;
        for (k, v) in &self.context {
            write!(f, " {k}={v}")?;
        }
        Ok(())
    }
}

impl Error for TaggedError {}

impl From<std::num::ParseIntError> for OtmlError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::ParseInt(error)
    }
}

impl From<std::num::ParseFloatError> for OtmlError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::ParseFloat(error)
    }
}

impl From<serde_json::Error> for OtmlError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error)
    }
}

impl From<csv::Error> for OtmlError {
    fn from(error: csv::Error) -> Self {
        Self::Csv(error)
    }
}

impl From<std::io::Error> for OtmlError {
    fn from(error: std::io::Error) -> Self {
        Self::StdIo(error)
    }
}
