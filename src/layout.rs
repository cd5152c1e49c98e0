//! Fixed-layout GPU records
//!
//! A record is described once as an ordered list of fields, each with a byte
//! offset and a kind. [`RecordLayout::pack_into`] is the only place that turns
//! host values into bytes, so integer fields sharing a buffer with float fields
//! are written as integer bit patterns without callers juggling typed views.

use crate::error::LayoutError;
use glam::{Vec2, Vec3};

/// Semantic type of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    F32,
    U32,
    Vec2,
    Vec3,
}

impl FieldKind {
    /// Width of the field in bytes
    pub const fn size(self) -> usize {
        match self {
            FieldKind::F32 | FieldKind::U32 => 4,
            FieldKind::Vec2 => 8,
            FieldKind::Vec3 => 12,
        }
    }

    /// Required byte alignment under WGSL host-shareable layout rules
    pub const fn align(self) -> usize {
        match self {
            FieldKind::F32 | FieldKind::U32 => 4,
            FieldKind::Vec2 => 8,
            FieldKind::Vec3 => 16,
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldKind::F32 => "f32",
            FieldKind::U32 => "u32",
            FieldKind::Vec2 => "vec2<f32>",
            FieldKind::Vec3 => "vec3<f32>",
        }
    }
}

/// A host value destined for one field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    F32(f32),
    U32(u32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::F32(_) => FieldKind::F32,
            FieldValue::U32(_) => FieldKind::U32,
            FieldValue::Vec2(_) => FieldKind::Vec2,
            FieldValue::Vec3(_) => FieldKind::Vec3,
        }
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::F32(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::U32(v)
    }
}

impl From<Vec2> for FieldValue {
    fn from(v: Vec2) -> Self {
        FieldValue::Vec2(v.to_array())
    }
}

impl From<Vec3> for FieldValue {
    fn from(v: Vec3) -> Self {
        FieldValue::Vec3(v.to_array())
    }
}

/// One field of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, offset: usize, kind: FieldKind) -> Self {
        Self { name, offset, kind }
    }

    pub const fn end(&self) -> usize {
        self.offset + self.kind.size()
    }
}

/// Ordered field descriptors plus the record stride
#[derive(Debug, Clone, Copy)]
pub struct RecordLayout {
    pub name: &'static str,
    /// Size of one record in bytes, including trailing padding
    pub stride: usize,
    pub fields: &'static [Field],
}

impl RecordLayout {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Write `values` (one per field, in field order) into the first `stride`
    /// bytes of `out`. Padding bytes are left untouched.
    pub fn pack_into(&self, values: &[FieldValue], out: &mut [u8]) -> Result<(), LayoutError> {
        if values.len() != self.fields.len() {
            return Err(LayoutError::ValueCount {
                layout: self.name,
                expected: self.fields.len(),
                actual: values.len(),
            });
        }
        if out.len() < self.stride {
            return Err(LayoutError::OutputTooSmall {
                layout: self.name,
                expected: self.stride,
                actual: out.len(),
            });
        }

        for (field, value) in self.fields.iter().zip(values) {
            if field.kind != value.kind() {
                return Err(LayoutError::KindMismatch {
                    layout: self.name,
                    field: field.name,
                    expected: field.kind.name(),
                    actual: value.kind().name(),
                });
            }

            let dst = &mut out[field.offset..field.end()];
            match value {
                FieldValue::F32(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
                FieldValue::U32(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
                FieldValue::Vec2(v) => dst.copy_from_slice(bytemuck::cast_slice(v)),
                FieldValue::Vec3(v) => dst.copy_from_slice(bytemuck::cast_slice(v)),
            }
        }

        Ok(())
    }

    /// Pack a single zero-padded record.
    pub fn pack(&self, values: &[FieldValue]) -> Result<Vec<u8>, LayoutError> {
        let mut out = vec![0u8; self.stride];
        self.pack_into(values, &mut out)?;
        Ok(out)
    }

    /// Read back a `u32` field from a packed record.
    pub fn read_u32(&self, record: &[u8], name: &str) -> Option<u32> {
        let field = self.field(name).filter(|f| f.kind == FieldKind::U32)?;
        record
            .get(field.offset..field.end())
            .map(bytemuck::pod_read_unaligned::<u32>)
    }

    /// Read back an `f32` field from a packed record.
    pub fn read_f32(&self, record: &[u8], name: &str) -> Option<f32> {
        let field = self.field(name).filter(|f| f.kind == FieldKind::F32)?;
        record
            .get(field.offset..field.end())
            .map(bytemuck::pod_read_unaligned::<f32>)
    }
}

/// Fields are ordered, aligned, non-overlapping and fit inside the stride.
#[cfg(test)]
pub(crate) fn assert_well_formed(layout: &RecordLayout) {
    let mut cursor = 0;
    for field in layout.fields {
        assert!(
            field.offset >= cursor,
            "{}: field `{}` overlaps its predecessor",
            layout.name,
            field.name
        );
        assert_eq!(
            field.offset % field.kind.align(),
            0,
            "{}: field `{}` is misaligned",
            layout.name,
            field.name
        );
        cursor = field.end();
    }
    assert!(cursor <= layout.stride, "{}: fields exceed stride", layout.name);
    assert_eq!(layout.stride % 16, 0, "{}: stride not 16-byte aligned", layout.name);
}
