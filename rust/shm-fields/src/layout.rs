//! Layout tables: where every field lives in the segment.
//!
//! A [`LayoutTable`] is produced once per process, either in code through
//! [`LayoutTable::builder`] or from the generator's JSON schema (see
//! [`crate::schema`]), and is never mutated afterwards. Every attached process
//! must agree on it byte for byte; nothing in the segment records it.

use std::borrow::{Borrow, Cow};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::error::{FieldError, Result, SchemaError};
use crate::scalar::{Scalar, ScalarType};
use crate::shape::Shape;

/// Symbolic name of one field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldTag(Cow<'static, str>);

impl FieldTag {
    pub const fn from_static(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for FieldTag {
    fn from(tag: &'static str) -> Self {
        Self::from_static(tag)
    }
}

impl From<String> for FieldTag {
    fn from(tag: String) -> Self {
        Self(Cow::Owned(tag))
    }
}

impl Borrow<str> for FieldTag {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tag that also names its scalar type, so resolving it needs no turbofish.
///
/// ```
/// use shm_fields::Field;
///
/// const GRID: Field<f32> = Field::new("grid");
/// assert_eq!(GRID.tag(), "grid");
/// ```
pub struct Field<T> {
    tag: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T: Scalar> Field<T> {
    pub const fn new(tag: &'static str) -> Self {
        Self {
            tag,
            _type: PhantomData,
        }
    }

    pub const fn tag(&self) -> &'static str {
        self.tag
    }

    pub const fn scalar_type(&self) -> ScalarType {
        T::TYPE
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T: Scalar> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field<{}>({:?})", T::TYPE, self.tag)
    }
}

/// Metadata for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub tag: FieldTag,
    pub scalar_type: ScalarType,
    /// Empty for scalars.
    pub shape: Shape,
    /// Byte offset from the start of the segment.
    pub offset: usize,
    /// Always `scalar_type.size() * shape.element_count()`.
    pub byte_size: usize,
}

impl FieldDescriptor {
    /// Build a descriptor, computing its byte size.
    pub fn new(
        tag: impl Into<FieldTag>,
        scalar_type: ScalarType,
        shape: impl Into<Shape>,
        offset: usize,
    ) -> Result<Self, SchemaError> {
        let tag = tag.into();
        let shape = shape.into();
        let byte_size = byte_size(&tag, scalar_type, &shape)?;
        Ok(Self {
            tag,
            scalar_type,
            shape,
            offset,
            byte_size,
        })
    }

    /// One past the last byte of the field.
    #[inline]
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.byte_size)
    }

    #[inline]
    pub fn element_count(&self) -> usize {
        self.shape.element_count()
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    fn validate(&self, total_size: usize) -> Result<(), SchemaError> {
        let computed = byte_size(&self.tag, self.scalar_type, &self.shape)?;
        if computed != self.byte_size {
            return Err(SchemaError::SizeMismatch {
                tag: self.tag.clone(),
                declared: self.byte_size,
                computed,
            });
        }
        let align = self.scalar_type.align();
        if self.offset % align != 0 {
            return Err(SchemaError::Misaligned {
                tag: self.tag.clone(),
                offset: self.offset,
                align,
            });
        }
        let end = self
            .offset
            .checked_add(self.byte_size)
            .ok_or_else(|| SchemaError::SizeOverflow(self.tag.clone()))?;
        if end > total_size {
            return Err(SchemaError::ExceedsSegment {
                tag: self.tag.clone(),
                end,
                total_size,
            });
        }
        Ok(())
    }
}

fn byte_size(tag: &FieldTag, scalar_type: ScalarType, shape: &Shape) -> Result<usize, SchemaError> {
    shape
        .checked_element_count()
        .and_then(|n| n.checked_mul(scalar_type.size()))
        .ok_or_else(|| SchemaError::SizeOverflow(tag.clone()))
}

fn align_up(offset: usize, align: usize) -> Option<usize> {
    Some(offset.checked_add(align - 1)? / align * align)
}

/// Immutable mapping from tag to descriptor for one segment.
#[derive(Debug, Clone)]
pub struct LayoutTable {
    segment_name: String,
    total_size: usize,
    fields: Vec<FieldDescriptor>,
    index: HashMap<FieldTag, usize>,
}

impl LayoutTable {
    pub fn builder(segment_name: impl Into<String>) -> LayoutBuilder {
        LayoutBuilder {
            segment_name: segment_name.into(),
            total_size: None,
            entries: Vec::new(),
        }
    }

    /// Validate descriptors computed elsewhere and index them.
    pub fn from_descriptors(
        segment_name: impl Into<String>,
        total_size: usize,
        descriptors: Vec<FieldDescriptor>,
    ) -> Result<Self, SchemaError> {
        let segment_name = segment_name.into();
        let mut index = HashMap::with_capacity(descriptors.len());
        for (i, descriptor) in descriptors.iter().enumerate() {
            descriptor.validate(total_size)?;
            if index.insert(descriptor.tag.clone(), i).is_some() {
                return Err(SchemaError::DuplicateTag(descriptor.tag.clone()));
            }
        }

        tracing::debug!(
            segment = %segment_name,
            total_size,
            fields = descriptors.len(),
            "built layout table"
        );

        Ok(Self {
            segment_name,
            total_size,
            fields: descriptors,
            index,
        })
    }

    /// Descriptor for `tag`.
    pub fn get(&self, tag: &str) -> Result<&FieldDescriptor> {
        self.index
            .get(tag)
            .map(|&i| &self.fields[i])
            .ok_or_else(|| FieldError::UnknownField(FieldTag::from(tag.to_owned())))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.index.contains_key(tag)
    }

    pub fn segment_name(&self) -> &str {
        &self.segment_name
    }

    /// Bytes the segment must provide for every field to fit.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Descriptors in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, FieldDescriptor> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Same fields, different segment name.
    pub fn with_segment_name(mut self, segment_name: impl Into<String>) -> Self {
        self.segment_name = segment_name.into();
        self
    }
}

impl<'a> IntoIterator for &'a LayoutTable {
    type Item = &'a FieldDescriptor;
    type IntoIter = std::slice::Iter<'a, FieldDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

struct Entry {
    tag: FieldTag,
    scalar_type: ScalarType,
    shape: Shape,
    offset: Option<usize>,
}

/// Places fields in declaration order.
///
/// A field without an explicit offset goes at the end of the previous
/// fields, rounded up to its scalar type's natural alignment.
pub struct LayoutBuilder {
    segment_name: String,
    total_size: Option<usize>,
    entries: Vec<Entry>,
}

impl LayoutBuilder {
    pub fn field(
        mut self,
        tag: impl Into<FieldTag>,
        scalar_type: ScalarType,
        shape: impl Into<Shape>,
    ) -> Self {
        self.entries.push(Entry {
            tag: tag.into(),
            scalar_type,
            shape: shape.into(),
            offset: None,
        });
        self
    }

    /// A rank-0 field.
    pub fn scalar(self, tag: impl Into<FieldTag>, scalar_type: ScalarType) -> Self {
        self.field(tag, scalar_type, Shape::scalar())
    }

    pub fn field_at(
        mut self,
        tag: impl Into<FieldTag>,
        scalar_type: ScalarType,
        shape: impl Into<Shape>,
        offset: usize,
    ) -> Self {
        self.entries.push(Entry {
            tag: tag.into(),
            scalar_type,
            shape: shape.into(),
            offset: Some(offset),
        });
        self
    }

    /// Declare the segment larger than its fields require.
    pub fn total_size(mut self, total_size: usize) -> Self {
        self.total_size = Some(total_size);
        self
    }

    pub fn build(self) -> Result<LayoutTable, SchemaError> {
        let mut cursor = 0usize;
        let mut descriptors = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            let offset = match entry.offset {
                Some(offset) => offset,
                None => align_up(cursor, entry.scalar_type.align())
                    .ok_or_else(|| SchemaError::SizeOverflow(entry.tag.clone()))?,
            };
            let descriptor =
                FieldDescriptor::new(entry.tag, entry.scalar_type, entry.shape, offset)?;
            let end = descriptor
                .offset
                .checked_add(descriptor.byte_size)
                .ok_or_else(|| SchemaError::SizeOverflow(descriptor.tag.clone()))?;
            cursor = cursor.max(end);
            descriptors.push(descriptor);
        }
        let total_size = self.total_size.unwrap_or(cursor);
        LayoutTable::from_descriptors(self.segment_name, total_size, descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_places_fields_contiguously() {
        let table = LayoutTable::builder("/grid")
            .scalar("myint", ScalarType::Int32)
            .field("myarr", ScalarType::Float32, [10, 10])
            .field("myarr2", ScalarType::Float32, [10, 10])
            .build()
            .unwrap();

        let int = table.get("myint").unwrap();
        let arr = table.get("myarr").unwrap();
        let arr2 = table.get("myarr2").unwrap();
        assert_eq!((int.offset, int.byte_size), (0, 4));
        assert_eq!((arr.offset, arr.byte_size), (4, 400));
        assert_eq!(arr2.offset, arr.offset + arr.byte_size);
        assert_eq!(table.total_size(), 804);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn builder_pads_to_natural_alignment() {
        let table = LayoutTable::builder("/pad")
            .scalar("flag", ScalarType::UInt8)
            .field("values", ScalarType::Float64, [3])
            .build()
            .unwrap();
        let values = table.get("values").unwrap();
        assert_eq!(values.offset, ScalarType::Float64.align());
        assert_eq!(table.total_size(), values.offset + 24);
    }

    #[test]
    fn unknown_tag() {
        let table = LayoutTable::builder("/s").build().unwrap();
        assert!(table.is_empty());
        match table.get("nope") {
            Err(FieldError::UnknownField(tag)) => assert_eq!(tag.as_str(), "nope"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn duplicate_tags_rejected() {
        let err = LayoutTable::builder("/s")
            .scalar("a", ScalarType::Int8)
            .scalar("a", ScalarType::Int8)
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateTag(tag) if tag.as_str() == "a"));
    }

    #[test]
    fn explicit_offsets_are_validated() {
        let err = LayoutTable::builder("/s")
            .field_at("x", ScalarType::Float32, [2], 2)
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::Misaligned { offset: 2, .. }));

        let err = LayoutTable::builder("/s")
            .field_at("x", ScalarType::Float32, [4], 0)
            .total_size(8)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::ExceedsSegment {
                end: 16,
                total_size: 8,
                ..
            }
        ));
    }

    #[test]
    fn explicit_offsets_may_alias() {
        let table = LayoutTable::builder("/s")
            .field_at("whole", ScalarType::UInt8, [8], 0)
            .field_at("half", ScalarType::UInt8, [4], 4)
            .build()
            .unwrap();
        assert_eq!(table.total_size(), 8);
    }

    #[test]
    fn descriptor_size_mismatch_rejected() {
        let mut descriptor = FieldDescriptor::new("x", ScalarType::Int16, [3], 0).unwrap();
        assert_eq!(descriptor.byte_size, 6);
        descriptor.byte_size = 8;
        let err = LayoutTable::from_descriptors("/s", 64, vec![descriptor]).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::SizeMismatch {
                declared: 8,
                computed: 6,
                ..
            }
        ));
    }

    #[test]
    fn overflowing_shape_rejected() {
        let err = FieldDescriptor::new("huge", ScalarType::Float64, [usize::MAX / 2, 2], 0)
            .unwrap_err();
        assert!(matches!(err, SchemaError::SizeOverflow(_)));
    }

    #[test]
    fn iteration_keeps_declaration_order() {
        let table = LayoutTable::builder("/s")
            .scalar("z", ScalarType::Int8)
            .scalar("a", ScalarType::Int8)
            .scalar("m", ScalarType::Int8)
            .build()
            .unwrap();
        let tags: Vec<_> = table.iter().map(|d| d.tag.as_str()).collect();
        assert_eq!(tags, ["z", "a", "m"]);
    }

    #[test]
    fn typed_tags() {
        const GRID: Field<f32> = Field::new("grid");
        assert_eq!(GRID.scalar_type(), ScalarType::Float32);
        assert_eq!(format!("{GRID:?}"), "Field<float32>(\"grid\")");
    }
}
