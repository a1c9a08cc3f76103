// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canonical byte encoding of an object's committed field values.

use bytes::Bytes;
use thiserror::Error;

use crate::document::{Document, DocumentError};
use crate::ident::{FieldIndex, FieldRef, ObjId, TypeId};

const DIGEST_BYTES: usize = 32;
const HEADER_BYTES: usize = DIGEST_BYTES + 2 + 2;
const SLOT_BYTES: usize = 1 + 8;

/// Errors raised while decoding stored field values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input shorter than the layout requires.
    #[error("truncated field record: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Required length.
        expected: usize,
        /// Provided length.
        actual: usize,
    },
    /// Record was written against a different compiled schema.
    #[error("schema digest mismatch")]
    DigestMismatch,
    /// Record belongs to an object of another type.
    #[error("type mismatch: record has {found:?}, object is {expected:?}")]
    TypeMismatch {
        /// Type of the target object.
        expected: TypeId,
        /// Type stored in the record.
        found: TypeId,
    },
    /// Slot count differs from the flattened type.
    #[error("slot count mismatch: record has {found}, type has {expected}")]
    SlotCountMismatch {
        /// Slots of the flattened type.
        expected: usize,
        /// Slots in the record.
        found: usize,
    },
    /// Presence flag other than 0 or 1.
    #[error("invalid presence flag {0} in field record")]
    InvalidFlag(u8),
}

/// Serialises the committed values of every field cell of `obj`.
///
/// Layout (little-endian):
/// - bytes 0..32: schema digest
/// - bytes 32..34: type id as `u16`
/// - bytes 34..36: slot count `n` as `u16`
/// - then `n` records of 9 bytes: presence flag `u8` followed by the value
///   as `f64` (zero when absent)
///
/// Pending interceptor deltas and in-flight values are not part of the
/// record.
pub fn encode_fields(doc: &Document, obj: ObjId) -> Result<Bytes, DocumentError> {
    let ty = doc.obj_type(obj)?;
    let rec = doc
        .objs
        .get(obj.index())
        .ok_or(DocumentError::UnknownObj(obj))?;
    let count = u16::try_from(rec.fields.len()).map_err(|_| crate::SchemaError::Capacity)?;

    let mut buf = Vec::with_capacity(HEADER_BYTES + rec.fields.len() * SLOT_BYTES);
    buf.extend_from_slice(doc.schema().digest());
    buf.extend_from_slice(&ty.0.to_le_bytes());
    buf.extend_from_slice(&count.to_le_bytes());
    for cell in &rec.fields {
        match cell {
            Some(field) => {
                buf.push(1);
                buf.extend_from_slice(&field.value().to_le_bytes());
            }
            None => {
                buf.push(0);
                buf.extend_from_slice(&0f64.to_le_bytes());
            }
        }
    }
    Ok(Bytes::from(buf))
}

/// Restores committed values written by [`encode_fields`] without
/// propagating them.
///
/// Present cells are created if needed and overwritten; absent cells are left
/// untouched. Call [`Document::init_fields`] afterwards to rebuild derived
/// fields from the restored inputs.
pub fn decode_fields(doc: &mut Document, obj: ObjId, bytes: &[u8]) -> Result<(), DocumentError> {
    if bytes.len() < HEADER_BYTES {
        return Err(CodecError::Truncated {
            expected: HEADER_BYTES,
            actual: bytes.len(),
        }
        .into());
    }
    let (digest, rest) = bytes.split_at(DIGEST_BYTES);
    if digest != doc.schema().digest() {
        return Err(CodecError::DigestMismatch.into());
    }
    let found = TypeId(u16::from_le_bytes([rest[0], rest[1]]));
    let count = usize::from(u16::from_le_bytes([rest[2], rest[3]]));
    let body = &rest[4..];

    let ty = doc.obj_type(obj)?;
    if found != ty {
        return Err(CodecError::TypeMismatch {
            expected: ty,
            found,
        }
        .into());
    }
    let expected = doc.schema().flattened(ty).map_or(0, |t| t.len());
    if count != expected {
        return Err(CodecError::SlotCountMismatch {
            expected,
            found: count,
        }
        .into());
    }
    if body.len() != count * SLOT_BYTES {
        return Err(CodecError::Truncated {
            expected: HEADER_BYTES + count * SLOT_BYTES,
            actual: bytes.len(),
        }
        .into());
    }

    let mut values = Vec::with_capacity(count);
    for chunk in body.chunks_exact(SLOT_BYTES) {
        let (flag, value) = chunk.split_at(1);
        let value = f64::from_le_bytes(value.try_into().map_err(|_| CodecError::Truncated {
            expected: SLOT_BYTES,
            actual: chunk.len(),
        })?);
        match flag[0] {
            0 => values.push(None),
            1 => values.push(Some(value)),
            other => return Err(CodecError::InvalidFlag(other).into()),
        }
    }

    for (slot, value) in (0u16..).map(FieldIndex).zip(values) {
        if let Some(value) = value {
            doc.get_or_create(FieldRef::new(obj, slot))?.restore(value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::float_cmp)]
    use super::*;
    use crate::function::Combinator;
    use crate::schema::TypeRegistry;

    fn doc() -> (Document, ObjId, crate::FieldDefId, crate::FieldDefId) {
        let mut reg = TypeRegistry::new();
        let node = reg.new_type("node", &[]).unwrap();
        let me = reg.self_relation();
        let a = reg.input_field(node, "a").unwrap();
        let b = reg.field(node, "b", Combinator::Sum).unwrap().input(me, a).id();
        reg.new_type("other", &[]).unwrap();
        reg.flatten_type_hierarchy().unwrap();
        let mut doc = Document::new(&reg).unwrap();
        let o = doc.instantiate(node).unwrap();
        (doc, o, a, b)
    }

    #[test]
    fn layout_is_header_plus_nine_bytes_per_slot() {
        let (mut doc, o, a, _) = doc();
        doc.set_field_value(o, a, 1.5).unwrap();
        let bytes = encode_fields(&doc, o).unwrap();
        assert_eq!(bytes.len(), HEADER_BYTES + 2 * SLOT_BYTES);
        assert_eq!(&bytes[..DIGEST_BYTES], doc.schema().digest());
        assert_eq!(bytes[HEADER_BYTES], 1);
    }

    #[test]
    fn decode_restores_without_propagating() {
        let (mut doc, o, a, b) = doc();
        doc.set_field_value(o, a, 4.0).unwrap();
        let bytes = encode_fields(&doc, o).unwrap();

        let p = doc.instantiate(doc.obj_type(o).unwrap()).unwrap();
        let mut record = bytes.to_vec();
        // Keep only the input cell.
        record[HEADER_BYTES + SLOT_BYTES] = 0;
        decode_fields(&mut doc, p, &record).unwrap();
        assert_eq!(doc.field_value(p, a).unwrap(), 4.0);
        assert!(doc.field(p, b).unwrap().is_none());

        doc.init_fields(p).unwrap();
        assert_eq!(doc.field_value(p, b).unwrap(), 4.0);
    }

    #[test]
    fn corrupt_records_are_rejected() {
        let (mut doc, o, ..) = doc();
        let mut bytes = encode_fields(&doc, o).unwrap().to_vec();
        assert_eq!(
            decode_fields(&mut doc, o, &bytes[..10]).unwrap_err(),
            DocumentError::Codec(CodecError::Truncated {
                expected: HEADER_BYTES,
                actual: 10
            })
        );
        bytes[HEADER_BYTES] = 7;
        assert_eq!(
            decode_fields(&mut doc, o, &bytes).unwrap_err(),
            DocumentError::Codec(CodecError::InvalidFlag(7))
        );
        bytes[0] ^= 0xff;
        assert_eq!(
            decode_fields(&mut doc, o, &bytes).unwrap_err(),
            DocumentError::Codec(CodecError::DigestMismatch)
        );
    }

    #[test]
    fn records_are_bound_to_their_type() {
        let (mut doc, o, ..) = doc();
        let other = doc.instantiate(TypeId(1)).unwrap();
        let bytes = encode_fields(&doc, o).unwrap();
        assert_eq!(
            decode_fields(&mut doc, other, &bytes).unwrap_err(),
            DocumentError::Codec(CodecError::TypeMismatch {
                expected: TypeId(1),
                found: TypeId(0)
            })
        );
    }
}
