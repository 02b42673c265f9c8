//! Binary layout for volume images.
//!
//! A volume image is written in host byte order and must be read on a host
//! of the same endianness:
//!
//! ```text
//! signature    : u64 length (4) + "=VOL"
//! endianness   : u32 (0 = little, 1 = big), must equal host
//! priority     : u32
//! root_node    : NODE
//! EOF          : reader must land exactly on the end of the buffer
//!
//! NODE  := name (u64 length + bytes)
//!          values_count (u64, patched after the value list is written)
//!          VALUE * values_count
//!          subnodes_count (u64, patched after the subnode list)
//!          NODE * subnodes_count          -- tombstoned children skipped
//!
//! VALUE := name (u64 length + bytes)
//!          kind (u64, 0=u32 1=u64 2=f32 3=f64 4=str 5=bin)
//!          payload (raw 4/8 bytes, or u64 length + bytes for str/bin)
//! ```
//!
//! Decoding enforces every store limit: name and payload byte bounds,
//! per-node value/subnode counts, and the volume tree depth. An image that
//! violates any of them is rejected as corrupt rather than clamped.

use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::node::{Node, MAX_NUM_SUBNODES, MAX_NUM_VALUES};
use crate::path::PATH_SEPARATOR;
use crate::value::{
    Value, ValueKind, MAX_BIN_VALUE_BYTES, MAX_STR_VALUE_BYTES, MAX_VALUE_NAME_BYTES,
};
use crate::volume::{Volume, MAX_TREE_DEPTH};

/// Magic bytes opening every volume image.
pub const SIGNATURE: &[u8; 4] = b"=VOL";

/// Endianness word: 0 = little, 1 = big.
#[cfg(target_endian = "little")]
const HOST_ENDIAN: u32 = 0;
#[cfg(target_endian = "big")]
const HOST_ENDIAN: u32 = 1;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn serialize_u32(value: u32, buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(&value.to_ne_bytes());
}

fn serialize_u64(value: u64, buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(&value.to_ne_bytes());
}

fn serialize_bytes(bytes: &[u8], buffer: &mut Vec<u8>) {
    serialize_u64(bytes.len() as u64, buffer);
    buffer.extend_from_slice(bytes);
}

fn serialize_payload(value: &Value, buffer: &mut Vec<u8>) {
    match value {
        Value::U32(v) => buffer.extend_from_slice(&v.to_ne_bytes()),
        Value::U64(v) => buffer.extend_from_slice(&v.to_ne_bytes()),
        Value::F32(v) => buffer.extend_from_slice(&v.to_ne_bytes()),
        Value::F64(v) => buffer.extend_from_slice(&v.to_ne_bytes()),
        Value::Str(v) => serialize_bytes(v.as_bytes(), buffer),
        Value::Bin(v) => serialize_bytes(v, buffer),
    }
}

fn patch_u64(value: u64, position: usize, buffer: &mut [u8]) {
    buffer[position..position + 8].copy_from_slice(&value.to_ne_bytes());
}

pub(crate) fn serialize_node(node: &Node, buffer: &mut Vec<u8>) {
    serialize_bytes(node.name().as_bytes(), buffer);

    let values_count_pos = buffer.len();
    serialize_u64(0, buffer);
    let mut num_values = 0u64;
    node.for_each_value(|attr| {
        serialize_bytes(attr.name().as_bytes(), buffer);
        serialize_u64(attr.kind() as u64, buffer);
        serialize_payload(attr.value(), buffer);
        num_values += 1;
    });
    patch_u64(num_values, values_count_pos, buffer);

    let subnodes_count_pos = buffer.len();
    serialize_u64(0, buffer);
    let mut num_subnodes = 0u64;
    node.for_each_subnode(|subnode| {
        if subnode.is_deleted() {
            return;
        }
        serialize_node(subnode, buffer);
        num_subnodes += 1;
    });
    patch_u64(num_subnodes, subnodes_count_pos, buffer);
}

pub(crate) fn serialize_volume(volume: &Volume, buffer: &mut Vec<u8>) {
    serialize_bytes(SIGNATURE, buffer);
    serialize_u32(HOST_ENDIAN, buffer);
    serialize_u32(volume.priority() as u32, buffer);
    serialize_node(volume.root(), buffer);
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

struct Reader<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buffer: &'a [u8]) -> Reader<'a> {
        Reader { buffer, pos: 0 }
    }

    fn corrupt(&self, reason: impl Into<String>) -> StoreError {
        StoreError::Corrupt {
            offset: self.pos as u64,
            reason: reason.into(),
        }
    }

    fn take(&mut self, count: usize) -> StoreResult<&'a [u8]> {
        if self.buffer.len() - self.pos < count {
            return Err(self.corrupt("truncated image"));
        }
        let buffer: &'a [u8] = self.buffer;
        let slice = &buffer[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn read_u32(&mut self) -> StoreResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_ne_bytes(bytes.try_into().expect("4-byte slice")))
    }

    fn read_u64(&mut self) -> StoreResult<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_ne_bytes(bytes.try_into().expect("8-byte slice")))
    }

    fn read_f32(&mut self) -> StoreResult<f32> {
        let bytes = self.take(4)?;
        Ok(f32::from_ne_bytes(bytes.try_into().expect("4-byte slice")))
    }

    fn read_f64(&mut self) -> StoreResult<f64> {
        let bytes = self.take(8)?;
        Ok(f64::from_ne_bytes(bytes.try_into().expect("8-byte slice")))
    }

    fn read_bytes(&mut self) -> StoreResult<&'a [u8]> {
        let len = self.read_u64()?;
        if len > self.buffer.len() as u64 {
            return Err(self.corrupt("length prefix exceeds image size"));
        }
        self.take(len as usize)
    }

    fn read_name(&mut self, what: &str) -> StoreResult<String> {
        let bytes = self.read_bytes()?;
        if bytes.len() > MAX_VALUE_NAME_BYTES {
            return Err(self.corrupt(format!("{} name exceeds {} bytes", what, MAX_VALUE_NAME_BYTES)));
        }
        let name = std::str::from_utf8(bytes)
            .map_err(|_| self.corrupt(format!("{} name is not valid UTF-8", what)))?;
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(self.corrupt(format!("{} name is not a valid path segment", what)));
        }
        Ok(name.to_string())
    }

    fn at_end(&self) -> bool {
        self.pos == self.buffer.len()
    }
}

fn deserialize_value(kind: ValueKind, reader: &mut Reader<'_>) -> StoreResult<Value> {
    match kind {
        ValueKind::U32 => Ok(Value::U32(reader.read_u32()?)),
        ValueKind::U64 => Ok(Value::U64(reader.read_u64()?)),
        ValueKind::F32 => Ok(Value::F32(reader.read_f32()?)),
        ValueKind::F64 => Ok(Value::F64(reader.read_f64()?)),
        ValueKind::Str => {
            let bytes = reader.read_bytes()?;
            if bytes.len() > MAX_STR_VALUE_BYTES {
                return Err(reader.corrupt("string payload exceeds limit"));
            }
            let s = std::str::from_utf8(bytes)
                .map_err(|_| reader.corrupt("string payload is not valid UTF-8"))?;
            Ok(Value::Str(s.to_string()))
        }
        ValueKind::Bin => {
            let bytes = reader.read_bytes()?;
            if bytes.len() > MAX_BIN_VALUE_BYTES {
                return Err(reader.corrupt("binary payload exceeds limit"));
            }
            Ok(Value::Bin(bytes.to_vec()))
        }
    }
}

fn deserialize_node(
    reader: &mut Reader<'_>,
    parent_path: &str,
    priority: u8,
    depth: usize,
) -> StoreResult<Node> {
    if depth > MAX_TREE_DEPTH {
        return Err(reader.corrupt("node depth exceeds volume limit"));
    }

    let name = reader.read_name("node")?;
    let path = if parent_path.is_empty() {
        name.clone()
    } else {
        format!("{}{}{}", parent_path, PATH_SEPARATOR, name)
    };
    let node = Node::new(name, path, priority, depth);

    let values_count = reader.read_u64()?;
    if values_count > MAX_NUM_VALUES as u64 {
        return Err(reader.corrupt("values count exceeds limit"));
    }
    for _ in 0..values_count {
        let value_name = reader.read_name("value")?;
        let tag = reader.read_u64()?;
        let kind = ValueKind::from_tag(tag)
            .ok_or_else(|| reader.corrupt(format!("unknown value kind {}", tag)))?;
        let value = deserialize_value(kind, reader)?;
        if !node.set_value(&value_name, value) {
            return Err(reader.corrupt("value rejected by node limits"));
        }
    }

    let subnodes_count = reader.read_u64()?;
    if subnodes_count > MAX_NUM_SUBNODES as u64 {
        return Err(reader.corrupt("subnodes count exceeds limit"));
    }
    for _ in 0..subnodes_count {
        let child = deserialize_node(reader, node.path(), priority, depth + 1)?;
        if !node.attach_subnode(Arc::new(child)) {
            return Err(reader.corrupt("subnode rejected by node limits"));
        }
    }

    Ok(node)
}

pub(crate) fn deserialize_volume(buffer: &[u8]) -> StoreResult<Volume> {
    let mut reader = Reader::new(buffer);

    let signature = reader.read_bytes()?;
    if signature != SIGNATURE {
        return Err(reader.corrupt("bad volume signature"));
    }

    let endianness = reader.read_u32()?;
    if endianness != HOST_ENDIAN {
        return Err(reader.corrupt("endianness does not match host"));
    }

    let priority = reader.read_u32()?;
    if priority > u8::MAX as u32 {
        return Err(reader.corrupt("priority out of range"));
    }

    let root = deserialize_node(&mut reader, "", priority as u8, 1)?;

    if !reader.at_end() {
        return Err(reader.corrupt("trailing bytes after root node"));
    }

    Ok(Volume::from_parts(priority as u8, Arc::new(root)))
}
