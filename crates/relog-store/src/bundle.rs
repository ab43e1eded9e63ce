use relog_crypto::ContentHasher;
use relog_types::Cid;
use tracing::{debug, warn};

use crate::block::BlockMap;
use crate::error::{StoreError, StoreResult};

/// Magic prefix identifying a block bundle.
const MAGIC: &[u8; 4] = b"RLB1";

/// Per-entry header: 4 bytes length + 4 bytes CRC + 32 bytes CID.
const ENTRY_HEADER_SIZE: usize = 40;

/// Serialized bundle of blocks shipped inside a commit event.
///
/// On-wire format:
/// ```text
/// [4 bytes: magic "RLB1"]
/// [4 bytes: root count (little-endian u32)]
/// [32 bytes × root count: root CIDs]
/// repeated:
///   [4 bytes: payload length (little-endian u32)]
///   [4 bytes: CRC32 of payload (little-endian u32)]
///   [32 bytes: block CID]
///   [N bytes: payload]
/// ```
///
/// Decoding is lenient past the header: entries that fail the CRC or whose
/// CID does not match their payload are skipped, and a truncated tail ends
/// the read. Only a malformed header fails the whole bundle.
pub struct BlockBundle;

/// Result of decoding a bundle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodedBundle {
    pub roots: Vec<Cid>,
    pub blocks: BlockMap,
    /// Entries that were present but unusable (bad CRC, CID mismatch, torn tail).
    pub skipped: usize,
}

impl BlockBundle {
    /// Encode roots and blocks into bundle bytes.
    pub fn encode(roots: &[Cid], blocks: &BlockMap) -> Vec<u8> {
        let capacity = 8
            + roots.len() * 32
            + blocks.len() * ENTRY_HEADER_SIZE
            + blocks.byte_size() as usize;
        let mut out = Vec::with_capacity(capacity);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(roots.len() as u32).to_le_bytes());
        for root in roots {
            out.extend_from_slice(root.as_bytes());
        }
        for (cid, bytes) in blocks.iter() {
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&crc32fast::hash(bytes).to_le_bytes());
            out.extend_from_slice(cid.as_bytes());
            out.extend_from_slice(bytes);
        }
        out
    }

    /// Decode bundle bytes into roots and a verified block map.
    pub fn decode(data: &[u8]) -> StoreResult<DecodedBundle> {
        if data.len() < 8 || &data[..4] != MAGIC {
            return Err(StoreError::MalformedBundle("missing bundle header".into()));
        }
        let root_count = read_u32(data, 4) as usize;
        let roots_end = root_count
            .checked_mul(32)
            .and_then(|n| n.checked_add(8))
            .filter(|end| *end <= data.len())
            .ok_or_else(|| {
                StoreError::MalformedBundle(format!("root count {root_count} exceeds bundle"))
            })?;

        let roots = data[8..roots_end]
            .chunks_exact(32)
            .map(|chunk| Cid::from_hash(to_hash(chunk)))
            .collect();

        let mut blocks = BlockMap::new();
        let mut skipped = 0usize;
        let mut offset = roots_end;

        while offset < data.len() {
            if offset + ENTRY_HEADER_SIZE > data.len() {
                warn!(offset, "truncated bundle entry header; stopping decode");
                skipped += 1;
                break;
            }
            let length = read_u32(data, offset) as usize;
            let expected_crc = read_u32(data, offset + 4);
            let cid = Cid::from_hash(to_hash(&data[offset + 8..offset + ENTRY_HEADER_SIZE]));
            let payload_start = offset + ENTRY_HEADER_SIZE;
            let payload_end = payload_start + length;

            if payload_end > data.len() {
                warn!(offset, length, "truncated bundle entry; stopping decode");
                skipped += 1;
                break;
            }
            offset = payload_end;

            let payload = &data[payload_start..payload_end];
            let actual_crc = crc32fast::hash(payload);
            if actual_crc != expected_crc {
                warn!(%cid, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping block");
                skipped += 1;
                continue;
            }
            if !ContentHasher::BLOCK.verify(payload, &cid) {
                warn!(%cid, "block bytes do not match CID; skipping block");
                skipped += 1;
                continue;
            }
            blocks.add(payload.to_vec());
        }

        debug!(blocks = blocks.len(), skipped, "decoded block bundle");
        Ok(DecodedBundle {
            roots,
            blocks,
            skipped,
        })
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn to_hash(chunk: &[u8]) -> [u8; 32] {
    let mut arr = [0u8; 32];
    arr.copy_from_slice(chunk);
    arr
}
