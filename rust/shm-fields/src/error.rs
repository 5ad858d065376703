use std::fmt;
use std::io;

use crate::layout::FieldTag;
use crate::scalar::ScalarType;
use crate::shape::Shape;

pub type Result<T, E = FieldError> = std::result::Result<T, E>;

/// Errors from attaching to a segment and resolving or transforming views.
#[derive(Debug)]
pub enum FieldError {
    /// The named segment does not exist or cannot be opened read/write.
    SegmentOpen { segment: String, source: io::Error },
    /// The segment was opened but mapping it failed.
    SegmentMap { segment: String, source: io::Error },
    /// The tag is not in the layout table.
    UnknownField(FieldTag),
    /// The descriptor extends past the end of the attached segment.
    OutOfBoundsField {
        tag: FieldTag,
        offset: usize,
        byte_size: usize,
        segment_size: usize,
    },
    /// The field's address is not aligned for its scalar type.
    MisalignedField {
        tag: FieldTag,
        offset: usize,
        align: usize,
    },
    /// Element counts or shapes differ where they must agree.
    ShapeMismatch { expected: Shape, found: Shape },
    /// Scalar type or shape of a copy target (or requested view) differs.
    TypeMismatch {
        expected: (ScalarType, Shape),
        found: (ScalarType, Shape),
    },
    /// The matrix adapter only supports rank 1 and rank 2.
    UnsupportedRank(usize),
    /// The layout table could not be loaded or is inconsistent.
    Schema(SchemaError),
    /// A caller-supplied coordination handle failed to acquire.
    Coordination(io::Error),
}

impl FieldError {
    /// Errors that mean the segment or layout cannot be used by this process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SegmentOpen { .. }
                | Self::SegmentMap { .. }
                | Self::UnknownField(_)
                | Self::OutOfBoundsField { .. }
                | Self::MisalignedField { .. }
                | Self::Schema(_)
        )
    }

    /// Errors the caller can fix by asking for a different shape or target.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatch { .. } | Self::TypeMismatch { .. } | Self::UnsupportedRank(_)
        )
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SegmentOpen { segment, source } => {
                write!(f, "failed to open shared memory '{segment}': {source}")
            }
            Self::SegmentMap { segment, source } => {
                write!(f, "failed to map shared memory '{segment}': {source}")
            }
            Self::UnknownField(tag) => write!(f, "unknown field '{tag}'"),
            Self::OutOfBoundsField {
                tag,
                offset,
                byte_size,
                segment_size,
            } => write!(
                f,
                "field '{tag}' spans [{offset}, {}) but the segment is only {segment_size} bytes",
                offset.saturating_add(*byte_size)
            ),
            Self::MisalignedField { tag, offset, align } => write!(
                f,
                "field '{tag}' at offset {offset} is not aligned to {align} bytes"
            ),
            Self::ShapeMismatch { expected, found } => {
                write!(f, "shape mismatch: expected {expected}, found {found}")
            }
            Self::TypeMismatch { expected, found } => write!(
                f,
                "type mismatch: expected {}{}, found {}{}",
                expected.0, expected.1, found.0, found.1
            ),
            Self::UnsupportedRank(rank) => write!(
                f,
                "matrix view needs a rank 1 or rank 2 field, got rank {rank}"
            ),
            Self::Schema(e) => write!(f, "layout error: {e}"),
            Self::Coordination(e) => write!(f, "coordination handle failed: {e}"),
        }
    }
}

impl std::error::Error for FieldError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SegmentOpen { source, .. } | Self::SegmentMap { source, .. } => Some(source),
            Self::Schema(e) => Some(e),
            Self::Coordination(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SchemaError> for FieldError {
    fn from(e: SchemaError) -> Self {
        Self::Schema(e)
    }
}

/// Errors from loading or validating a layout table.
#[derive(Debug)]
pub enum SchemaError {
    /// Reading the schema file failed.
    Io(io::Error),
    /// The schema is not valid JSON or is missing required keys.
    Parse(serde_json::Error),
    /// A required configuration value is absent.
    MissingConfig(&'static str),
    UnknownScalarType { tag: FieldTag, name: String },
    DuplicateTag(FieldTag),
    /// `size(type) * product(shape)` or `offset + size` overflows `usize`.
    SizeOverflow(FieldTag),
    /// A descriptor's byte size disagrees with its type and shape.
    SizeMismatch {
        tag: FieldTag,
        declared: usize,
        computed: usize,
    },
    Misaligned {
        tag: FieldTag,
        offset: usize,
        align: usize,
    },
    /// A field ends past the declared total segment size.
    ExceedsSegment {
        tag: FieldTag,
        end: usize,
        total_size: usize,
    },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read schema: {e}"),
            Self::Parse(e) => write!(f, "invalid schema: {e}"),
            Self::MissingConfig(key) => write!(f, "{key} is not set"),
            Self::UnknownScalarType { tag, name } => {
                write!(f, "field '{tag}' has unsupported type '{name}'")
            }
            Self::DuplicateTag(tag) => write!(f, "field '{tag}' is declared twice"),
            Self::SizeOverflow(tag) => write!(f, "size of field '{tag}' overflows"),
            Self::SizeMismatch {
                tag,
                declared,
                computed,
            } => write!(
                f,
                "field '{tag}' declares {declared} bytes but its type and shape need {computed}"
            ),
            Self::Misaligned { tag, offset, align } => write!(
                f,
                "field '{tag}' at offset {offset} is not aligned to {align} bytes"
            ),
            Self::ExceedsSegment {
                tag,
                end,
                total_size,
            } => write!(
                f,
                "field '{tag}' ends at byte {end}, past the segment size {total_size}"
            ),
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SchemaError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}
