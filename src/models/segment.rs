//! Segments and the remote pieces they are erasure-coded into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Position of a segment inside its stream.
///
/// Ordering by `(part, index)` yields the object's byte layout. The packed
/// `u64` form (`part << 32 | index`) preserves that order and is what the
/// store keeps.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentPosition {
    pub part: u32,
    pub index: u32,
}

impl SegmentPosition {
    pub fn encode(self) -> u64 {
        (u64::from(self.part) << 32) | u64::from(self.index)
    }

    pub fn decode(value: u64) -> Self {
        Self {
            part: (value >> 32) as u32,
            index: value as u32,
        }
    }
}

impl fmt::Display for SegmentPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.part, self.index)
    }
}

/// Identity of a storage node.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(#[serde(with = "hex")] pub [u8; 32]);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Root piece ID of a segment; per-node piece IDs are derived from it.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PieceId(#[serde(with = "hex")] pub [u8; 32]);

impl PieceId {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// One erasure-coded fragment of a segment, held by one node.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Piece {
    pub number: u16,
    pub storage_node: NodeId,
}

/// Pieces of a segment, kept sorted by piece number.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Pieces(pub Vec<Piece>);

impl Pieces {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Piece> {
        self.0.iter()
    }
}

impl From<Vec<Piece>> for Pieces {
    fn from(mut pieces: Vec<Piece>) -> Self {
        pieces.sort();
        Self(pieces)
    }
}

/// Erasure coding parameters of a segment.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RedundancyScheme {
    pub algorithm: u8,
    pub share_size: i32,
    pub required_shares: i16,
    pub repair_shares: i16,
    pub optimal_shares: i16,
    pub total_shares: i16,
}

/// Full segment row as stored in the metabase.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RawSegment {
    pub stream_id: Uuid,
    pub position: SegmentPosition,
    pub created_at: DateTime<Utc>,

    pub root_piece_id: PieceId,
    pub encrypted_key_nonce: Vec<u8>,
    pub encrypted_key: Vec<u8>,
    pub encrypted_etag: Option<Vec<u8>>,

    pub encrypted_size: i32,
    pub plain_offset: i64,
    pub plain_size: i32,

    pub redundancy: RedundancyScheme,
    pub pieces: Pieces,
}

/// What the piece-deletion hook receives for every removed segment.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DeletedSegmentInfo {
    pub stream_id: Uuid,
    pub position: SegmentPosition,
    pub root_piece_id: PieceId,
    pub pieces: Pieces,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_encoding_preserves_order() {
        let positions = [
            SegmentPosition { part: 0, index: 0 },
            SegmentPosition { part: 0, index: 1 },
            SegmentPosition { part: 0, index: u32::MAX },
            SegmentPosition { part: 1, index: 0 },
            SegmentPosition { part: 7, index: 3 },
        ];
        for pair in positions.windows(2) {
            assert!(pair[0].encode() < pair[1].encode());
        }
        for position in positions {
            assert_eq!(SegmentPosition::decode(position.encode()), position);
        }
    }

    #[test]
    fn pieces_serialize_with_hex_node_ids() {
        let pieces = Pieces::from(vec![
            Piece {
                number: 3,
                storage_node: NodeId([0xab; 32]),
            },
            Piece {
                number: 1,
                storage_node: NodeId([0x01; 32]),
            },
        ]);
        assert_eq!(pieces.0[0].number, 1);

        let encoded = serde_json::to_string(&pieces).unwrap();
        assert!(encoded.starts_with("[{\"number\":1,\"storage_node\":\"0101"));

        let decoded: Pieces = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, pieces);
    }

    #[test]
    fn piece_id_from_slice_checks_length() {
        assert_eq!(PieceId::from_slice(&[7; 32]), Some(PieceId([7; 32])));
        assert_eq!(PieceId::from_slice(&[7; 31]), None);
    }
}
