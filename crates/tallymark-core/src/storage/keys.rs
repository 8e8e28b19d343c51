//! Row key and value encodings
//!
//! Bitmap-scoped keys start with the length-prefixed namespace and bitmap
//! name, so every counter and bucket of one bitmap is contiguous. Integers are
//! big-endian so LMDB's byte order matches numeric order.

use roaring::RoaringBitmap;

use crate::types::{BitmapKey, BucketKey, CounterKey, IntId, StorageError};

use super::StorageResult;

/// Prefix shared by every row of one bitmap
pub fn bitmap_prefix(key: &BitmapKey) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + key.namespace.len() + key.bitmap.len() + 8);
    push_str(&mut out, &key.namespace);
    push_str(&mut out, &key.bitmap);
    out
}

/// Key of an event counter row
pub fn counter_key(key: &CounterKey) -> Vec<u8> {
    let mut out = bitmap_prefix(&key.bitmap);
    out.extend_from_slice(&key.id.get().to_be_bytes());
    out
}

/// Key of a bucket row
pub fn bucket_key(key: &BucketKey) -> Vec<u8> {
    let mut out = bitmap_prefix(&key.bitmap);
    out.extend_from_slice(&key.count.to_be_bytes());
    out
}

/// Recover the count from a bucket row key scanned under `prefix_len`
pub fn bucket_count(prefix_len: usize, key: &[u8]) -> StorageResult<u64> {
    let tail = key
        .get(prefix_len..)
        .ok_or_else(|| StorageError::corruption("bucket key shorter than its prefix"))?;
    let bytes: [u8; 8] = tail
        .try_into()
        .map_err(|_| StorageError::corruption(format!("bucket key suffix is {} bytes", tail.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Key of a reverse id mapping row
pub fn int_id_key(id: IntId) -> [u8; 4] {
    id.get().to_be_bytes()
}

/// Encode a u64 value
pub fn encode_u64(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Decode a u64 value
pub fn decode_u64(bytes: &[u8]) -> StorageResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::corruption(format!("expected 8-byte integer, got {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

/// Decode a stored integer id
pub fn decode_int_id(bytes: &[u8]) -> StorageResult<IntId> {
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| StorageError::corruption(format!("expected 4-byte id, got {} bytes", bytes.len())))?;
    Ok(IntId(u32::from_be_bytes(arr)))
}

/// Serialize a bucket bitmap
pub fn encode_bitmap(bitmap: &RoaringBitmap) -> StorageResult<Vec<u8>> {
    let mut out = Vec::with_capacity(bitmap.serialized_size());
    bitmap.serialize_into(&mut out)?;
    Ok(out)
}

/// Deserialize a bucket bitmap
pub fn decode_bitmap(bytes: &[u8]) -> StorageResult<RoaringBitmap> {
    RoaringBitmap::deserialize_from(bytes)
        .map_err(|e| StorageError::corruption(format!("invalid bitmap: {e}")))
}

fn push_str(out: &mut Vec<u8>, s: &str) {
    // Field lengths are validated well below u16::MAX before reaching here.
    let len = u16::try_from(s.len()).unwrap_or(u16::MAX);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&s.as_bytes()[..usize::from(len)]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_do_not_collide_across_split_points() {
        let a = bitmap_prefix(&BitmapKey::new("ab", "c"));
        let b = bitmap_prefix(&BitmapKey::new("a", "bc"));
        assert_ne!(a, b);
    }

    #[test]
    fn buckets_sort_by_count() {
        let bm = BitmapKey::new("ns", "clicks");
        let k2 = bucket_key(&bm.bucket(2));
        let k10 = bucket_key(&bm.bucket(10));
        assert!(k2 < k10);
        assert!(k2.starts_with(&bitmap_prefix(&bm)));
    }

    #[test]
    fn bucket_count_recovers_suffix() {
        let bm = BitmapKey::new("ns", "clicks");
        let prefix = bitmap_prefix(&bm);
        let key = bucket_key(&bm.bucket(77));
        assert_eq!(bucket_count(prefix.len(), &key).unwrap(), 77);
        assert!(bucket_count(prefix.len(), &prefix).is_err());
    }

    #[test]
    fn corrupt_values_are_reported() {
        assert!(matches!(decode_u64(&[1, 2, 3]), Err(StorageError::Corruption(_))));
        assert!(matches!(decode_int_id(&[]), Err(StorageError::Corruption(_))));
        assert!(matches!(decode_bitmap(b"not a bitmap"), Err(StorageError::Corruption(_))));
    }

    #[test]
    fn bitmap_bytes_decode_to_same_members() {
        let bitmap: RoaringBitmap = [1u32, 5, 1_000_000].into_iter().collect();
        let decoded = decode_bitmap(&encode_bitmap(&bitmap).unwrap()).unwrap();
        assert_eq!(decoded.iter().collect::<Vec<_>>(), vec![1, 5, 1_000_000]);
    }
}
