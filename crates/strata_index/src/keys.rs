//! Order-preserving encoding of index entry keys and logical record
//! identifiers.
//!
//! The remote store sorts entries by raw key bytes, so every scalar payload
//! here is encoded big-endian with sign/ordering fixups. Entry keys carry the
//! owning row's record id as a trailing component so two entries with equal
//! key values but different owning rows stay distinguishable.

use anyhow::{anyhow, Result};
use datafusion::common::ScalarValue;

use crate::metadata::{IndexDescriptor, IndexKeyColumn, NullOrder, SortOrder};

const KEY_PREFIX_INDEX_ENTRY: u8 = 0x31;
const TUPLE_TAG_RECORD_ID: u8 = 0x02;
const KEY_MARKER_NULL_FIRST: u8 = 0x00;
const KEY_MARKER_NOT_NULL: u8 = 0x01;
const KEY_MARKER_NULL_LAST: u8 = 0x02;
const SIGN_FLIP_MASK: u64 = 1u64 << 63;

fn encode_i64_ordered(value: i64) -> [u8; 8] {
    (value as u64 ^ SIGN_FLIP_MASK).to_be_bytes()
}

/// Total-order encoding for floats: positive values flip the sign bit,
/// negative values flip every bit.
fn encode_f64_ordered(value: f64) -> [u8; 8] {
    let bits = value.to_bits();
    let ordered = if bits & SIGN_FLIP_MASK == 0 {
        bits ^ SIGN_FLIP_MASK
    } else {
        !bits
    };
    ordered.to_be_bytes()
}

/// `true` for any scalar this crate treats as SQL NULL.
pub fn scalar_is_null(value: &ScalarValue) -> bool {
    matches!(
        value,
        ScalarValue::Null
            | ScalarValue::Int8(None)
            | ScalarValue::Int16(None)
            | ScalarValue::Int32(None)
            | ScalarValue::Int64(None)
            | ScalarValue::UInt8(None)
            | ScalarValue::UInt16(None)
            | ScalarValue::UInt32(None)
            | ScalarValue::UInt64(None)
            | ScalarValue::Float32(None)
            | ScalarValue::Float64(None)
            | ScalarValue::Boolean(None)
            | ScalarValue::Utf8(None)
            | ScalarValue::LargeUtf8(None)
            | ScalarValue::TimestampNanosecond(None, _)
            | ScalarValue::TimestampMicrosecond(None, _)
            | ScalarValue::TimestampMillisecond(None, _)
            | ScalarValue::TimestampSecond(None, _)
    )
}

fn scalar_to_i64(value: &ScalarValue) -> Option<i64> {
    match value {
        ScalarValue::Int8(Some(v)) => Some(i64::from(*v)),
        ScalarValue::Int16(Some(v)) => Some(i64::from(*v)),
        ScalarValue::Int32(Some(v)) => Some(i64::from(*v)),
        ScalarValue::Int64(Some(v)) => Some(*v),
        _ => None,
    }
}

fn scalar_to_u64(value: &ScalarValue) -> Option<u64> {
    match value {
        ScalarValue::UInt8(Some(v)) => Some(u64::from(*v)),
        ScalarValue::UInt16(Some(v)) => Some(u64::from(*v)),
        ScalarValue::UInt32(Some(v)) => Some(u64::from(*v)),
        ScalarValue::UInt64(Some(v)) => Some(*v),
        _ => None,
    }
}

fn scalar_to_timestamp_ns(value: &ScalarValue) -> Option<i64> {
    match value {
        ScalarValue::TimestampNanosecond(Some(v), _) => Some(*v),
        ScalarValue::TimestampMicrosecond(Some(v), _) => Some(v.saturating_mul(1_000)),
        ScalarValue::TimestampMillisecond(Some(v), _) => Some(v.saturating_mul(1_000_000)),
        ScalarValue::TimestampSecond(Some(v), _) => Some(v.saturating_mul(1_000_000_000)),
        _ => None,
    }
}

/// Encodes one non-null scalar as an order-preserving payload, or `None`
/// when the scalar is null.
pub fn encode_scalar_key_payload(value: &ScalarValue) -> Result<Option<Vec<u8>>> {
    if scalar_is_null(value) {
        return Ok(None);
    }
    let payload = if let Some(v) = scalar_to_i64(value) {
        encode_i64_ordered(v).to_vec()
    } else if let Some(v) = scalar_to_u64(value) {
        v.to_be_bytes().to_vec()
    } else if let Some(ts) = scalar_to_timestamp_ns(value) {
        encode_i64_ordered(ts).to_vec()
    } else {
        match value {
            ScalarValue::Float32(Some(v)) => encode_f64_ordered(f64::from(*v)).to_vec(),
            ScalarValue::Float64(Some(v)) => encode_f64_ordered(*v).to_vec(),
            ScalarValue::Boolean(Some(v)) => vec![u8::from(*v)],
            ScalarValue::Utf8(Some(v)) | ScalarValue::LargeUtf8(Some(v)) => {
                v.as_bytes().to_vec()
            }
            other => {
                return Err(anyhow!(
                    "unsupported scalar type in index key: {}",
                    other.data_type()
                ));
            }
        }
    };
    Ok(Some(payload))
}

fn null_marker(nulls: NullOrder) -> u8 {
    match nulls {
        NullOrder::NullsFirst => KEY_MARKER_NULL_FIRST,
        NullOrder::NullsLast => KEY_MARKER_NULL_LAST,
    }
}

/// Appends one key component (marker, length, payload) honoring the column's
/// direction and null-ordering flags. Descending columns store the payload
/// bit-inverted so byte order reverses value order.
fn encode_key_component(out: &mut Vec<u8>, value: &ScalarValue, column: &IndexKeyColumn) -> Result<()> {
    let Some(mut payload) = encode_scalar_key_payload(value)? else {
        out.push(null_marker(column.nulls));
        return Ok(());
    };
    if column.order == SortOrder::Descending {
        for byte in payload.iter_mut() {
            *byte = !*byte;
        }
    }
    out.push(KEY_MARKER_NOT_NULL);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(())
}

/// Encodes a logical record identifier from primary-key values. Primary keys
/// are never null, and the encoding is direction-free so record ids order by
/// primary-key value.
pub fn encode_record_id_bytes(primary_key_values: &[ScalarValue]) -> Result<Vec<u8>> {
    if primary_key_values.is_empty() {
        return Err(anyhow!("record id requires at least one primary-key value"));
    }
    let mut out = Vec::new();
    for value in primary_key_values {
        let payload = encode_scalar_key_payload(value)?
            .ok_or_else(|| anyhow!("primary-key value must not be null"))?;
        out.push(KEY_MARKER_NOT_NULL);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&payload);
    }
    Ok(out)
}

/// Encodes the `(prefix, table, index)` head common to every entry key of one
/// index. Also the lower bound of the index's full key range.
pub fn encode_index_prefix(index: &IndexDescriptor) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 8 + 8);
    out.push(KEY_PREFIX_INDEX_ENTRY);
    out.extend_from_slice(&index.table_id.to_be_bytes());
    out.extend_from_slice(&index.index_id.to_be_bytes());
    out
}

/// Encodes a lookup prefix for an equality predicate over the index's leading
/// key columns. An empty value slice yields the whole-index prefix.
pub fn encode_lookup_prefix(index: &IndexDescriptor, key_values: &[ScalarValue]) -> Result<Vec<u8>> {
    if key_values.len() > index.key_columns.len() {
        return Err(anyhow!(
            "lookup prefix has {} values but index '{}' has {} key columns",
            key_values.len(),
            index.index_name,
            index.key_columns.len()
        ));
    }
    let mut out = encode_index_prefix(index);
    for (value, column) in key_values.iter().zip(index.key_columns.iter()) {
        encode_key_component(&mut out, value, column)?;
    }
    Ok(out)
}

/// Encodes the full key of one index entry: lookup prefix over all key
/// columns plus the owning row's record id as disambiguating suffix.
pub fn encode_entry_key(
    index: &IndexDescriptor,
    key_values: &[ScalarValue],
    record_id: &[u8],
) -> Result<Vec<u8>> {
    if key_values.len() != index.key_columns.len() {
        return Err(anyhow!(
            "entry key has {} values but index '{}' has {} key columns",
            key_values.len(),
            index.index_name,
            index.key_columns.len()
        ));
    }
    let mut out = encode_lookup_prefix(index, key_values)?;
    out.push(TUPLE_TAG_RECORD_ID);
    out.push(0);
    out.extend_from_slice(&(record_id.len() as u32).to_be_bytes());
    out.extend_from_slice(record_id);
    Ok(out)
}

/// Encodes the uniqueness-conflict prefix of an entry, or `None` when any key
/// component is null. Matches PostgreSQL default `NULLS DISTINCT` semantics:
/// rows with a null key component never conflict with each other.
pub fn encode_unique_conflict_prefix(
    index: &IndexDescriptor,
    key_values: &[ScalarValue],
) -> Result<Option<Vec<u8>>> {
    if key_values.iter().any(scalar_is_null) {
        return Ok(None);
    }
    if key_values.len() != index.key_columns.len() {
        return Err(anyhow!(
            "unique prefix has {} values but index '{}' has {} key columns",
            key_values.len(),
            index.index_name,
            index.key_columns.len()
        ));
    }
    encode_lookup_prefix(index, key_values).map(Some)
}

/// Computes the exclusive upper bound of a prefix range, or `None` when the
/// prefix has no successor (all 0xFF).
pub fn prefix_range_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < u8::MAX {
            *last += 1;
            return Some(end);
        }
        end.pop();
    }
    None
}
