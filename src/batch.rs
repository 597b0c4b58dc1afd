//! Length-prefixed concatenation of N opaque byte chunks into a single wire
//! message, and its inverse. The same rules apply at every nesting — this
//! framing is used both for the wire-level batch and for any internal
//! multi-frame grouping.

use byteorder::{BigEndian, ByteOrder};

use crate::error::BatchError;

/// `pack(chunks) -> bytes`: 4-byte big-endian count, then each chunk as a
/// 4-byte big-endian length followed by its bytes.
pub fn pack(chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + chunks.iter().map(|c| 4 + c.len()).sum::<usize>());
    let mut count_buf = [0u8; 4];
    BigEndian::write_u32(&mut count_buf, chunks.len() as u32);
    out.extend_from_slice(&count_buf);

    for chunk in chunks {
        let mut len_buf = [0u8; 4];
        BigEndian::write_u32(&mut len_buf, chunk.len() as u32);
        out.extend_from_slice(&len_buf);
        out.extend_from_slice(chunk);
    }
    out
}

/// Reverse of `pack`. Fails with `MalformedBatch` when the header is
/// missing, a length field overflows the buffer, or a chunk length exceeds
/// remaining bytes. Never reads past the buffer end.
pub fn unpack(data: &[u8]) -> Result<Vec<Vec<u8>>, BatchError> {
    if data.len() < 4 {
        return Err(BatchError::MalformedBatch("missing count header"));
    }
    let count = BigEndian::read_u32(&data[0..4]) as usize;
    let mut pos = 4usize;
    let mut chunks = Vec::with_capacity(count.min(1 << 16));

    for _ in 0..count {
        if pos + 4 > data.len() {
            return Err(BatchError::MalformedBatch("length field overflows buffer"));
        }
        let len = BigEndian::read_u32(&data[pos..pos + 4]) as usize;
        pos += 4;
        if pos + len > data.len() {
            return Err(BatchError::MalformedBatch("chunk length exceeds remaining bytes"));
        }
        chunks.push(data[pos..pos + len].to_vec());
        pos += len;
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_batch_of_8() {
        let lens = [10usize, 0, 1, 500, 32768, 7, 3, 4000];
        let chunks: Vec<Vec<u8>> = lens
            .iter()
            .enumerate()
            .map(|(i, &l)| vec![i as u8; l])
            .collect();
        let packed = pack(&chunks);
        let unpacked = unpack(&packed).unwrap();
        assert_eq!(unpacked, chunks);
    }

    #[test]
    fn empty_batch_round_trips() {
        let packed = pack(&[]);
        let unpacked = unpack(&packed).unwrap();
        assert!(unpacked.is_empty());
    }

    #[test]
    fn truncated_header_is_malformed() {
        assert!(unpack(&[0, 0, 0]).is_err());
    }

    #[test]
    fn truncated_length_field_is_malformed() {
        let mut data = vec![0u8, 0, 0, 1]; // count = 1
        data.extend_from_slice(&[0, 0]); // incomplete length field
        assert!(unpack(&data).is_err());
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let mut data = vec![0u8, 0, 0, 1]; // count = 1
        data.extend_from_slice(&[0, 0, 0, 10]); // claims 10 bytes
        data.extend_from_slice(&[1, 2, 3]); // only 3 present
        assert!(unpack(&data).is_err());
    }

    #[test]
    fn any_truncation_of_a_valid_batch_is_malformed_or_shorter() {
        let chunks: Vec<Vec<u8>> = vec![vec![1, 2, 3], vec![], vec![9; 50]];
        let packed = pack(&chunks);
        for cut in 0..packed.len() {
            let truncated = &packed[..cut];
            // Either it errors, or (only possible at cut == packed.len())
            // it matches; no panic, no out-of-bounds read either way.
            let _ = unpack(truncated);
        }
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::collection::vec as pvec;
    use proptest::prelude::*;

    proptest! {
        /// pack/unpack round-trips for any list of byte blobs, any length.
        #[test]
        fn round_trips_for_any_list_of_blobs(
            chunks in pvec(pvec(any::<u8>(), 0..200), 0..32)
        ) {
            let packed = pack(&chunks);
            let unpacked = unpack(&packed).unwrap();
            prop_assert_eq!(unpacked, chunks);
        }

        /// Any truncation of a packed batch either reports MalformedBatch or
        /// round-trips the original chunks (only possible at the
        /// untruncated length); it never panics or reads out of bounds.
        #[test]
        fn any_truncation_never_panics(
            chunks in pvec(pvec(any::<u8>(), 0..64), 0..16),
            cut_fraction in 0.0f64..=1.0
        ) {
            let packed = pack(&chunks);
            let cut = (((packed.len() as f64) * cut_fraction) as usize).min(packed.len());
            let truncated = &packed[..cut];
            if let Ok(unpacked) = unpack(truncated) {
                if cut == packed.len() {
                    prop_assert_eq!(unpacked, chunks);
                }
            }
        }
    }
}
