use std::convert::TryInto;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    consts::PAGE_SIZE,
    error::DbError,
    storage::page::Page,
    types::{Lsn, Pgno, TxnId},
};

/// Fixed part of every record: type tag, record LSN, transaction id,
/// previous LSN of the same transaction.
pub const WAL_HEADER_LEN: usize = 1 + 8 + 8 + 8;

const TAG_BEGIN: u8 = 1;
const TAG_UPDATE: u8 = 2;
const TAG_COMPENSATION: u8 = 3;
const TAG_COMMIT: u8 = 4;
const TAG_END: u8 = 5;
const TAG_CHECKPOINT_BEGIN: u8 = 6;
const TAG_CHECKPOINT_END: u8 = 7;

/// Payload of one WAL record. Updates carry physical full-page
/// before/after images; compensation records carry the restored image
/// plus the next LSN to undo.
pub enum RecordBody {
    Begin,
    Update {
        pg: Pgno,
        before: Page,
        after: Page,
    },
    Compensation {
        pg: Pgno,
        undo_next_lsn: Lsn,
        after: Page,
    },
    Commit,
    End,
    CheckpointBegin,
    CheckpointEnd {
        payload: Bytes,
    },
}

impl RecordBody {
    pub fn tag(&self) -> u8 {
        match self {
            RecordBody::Begin => TAG_BEGIN,
            RecordBody::Update { .. } => TAG_UPDATE,
            RecordBody::Compensation { .. } => TAG_COMPENSATION,
            RecordBody::Commit => TAG_COMMIT,
            RecordBody::End => TAG_END,
            RecordBody::CheckpointBegin => TAG_CHECKPOINT_BEGIN,
            RecordBody::CheckpointEnd { .. } => TAG_CHECKPOINT_END,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RecordBody::Begin => "BEGIN",
            RecordBody::Update { .. } => "UPDATE",
            RecordBody::Compensation { .. } => "COMPENSATION",
            RecordBody::Commit => "COMMIT",
            RecordBody::End => "END",
            RecordBody::CheckpointBegin => "CHECKPOINT_BEGIN",
            RecordBody::CheckpointEnd { .. } => "CHECKPOINT_END",
        }
    }

    /// Payload size on disk, excluding header and trailing checksum.
    /// For fixed-size payloads this is known from the tag alone.
    pub fn fixed_payload_len(tag: u8) -> Option<usize> {
        match tag {
            TAG_BEGIN | TAG_COMMIT | TAG_END | TAG_CHECKPOINT_BEGIN => Some(0),
            TAG_UPDATE => Some(8 + 2 * PAGE_SIZE),
            TAG_COMPENSATION => Some(8 + 8 + PAGE_SIZE),
            TAG_CHECKPOINT_END => None,
            _ => None,
        }
    }

    pub fn is_known_tag(tag: u8) -> bool {
        (TAG_BEGIN..=TAG_CHECKPOINT_END).contains(&tag)
    }
}

pub struct WalRecord {
    pub lsn: Lsn,
    pub tid: TxnId,
    pub prev_lsn: Lsn,
    pub body: RecordBody,
}

impl WalRecord {
    /// Serialize header, payload and trailing CRC-32C (computed over
    /// all preceding bytes of the record).
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(self.body.tag());
        buf.put_u64_le(self.lsn);
        buf.put_u64_le(self.tid);
        buf.put_u64_le(self.prev_lsn);

        match &self.body {
            RecordBody::Begin
            | RecordBody::Commit
            | RecordBody::End
            | RecordBody::CheckpointBegin => {}
            RecordBody::Update { pg, before, after } => {
                buf.put_u64_le(*pg);
                buf.put_slice(before.raw().as_ref());
                buf.put_slice(after.raw().as_ref());
            }
            RecordBody::Compensation {
                pg,
                undo_next_lsn,
                after,
            } => {
                buf.put_u64_le(*pg);
                buf.put_u64_le(*undo_next_lsn);
                buf.put_slice(after.raw().as_ref());
            }
            RecordBody::CheckpointEnd { payload } => {
                buf.put_u32_le(payload.len() as u32);
                buf.put_slice(payload);
            }
        }

        let crc = crc32c::crc32c(&buf);
        buf.put_u32_le(crc);
        buf.freeze()
    }

    /// Deserialize one full record image (header + payload + crc) as
    /// framed by the reader. `at` is the file offset the image was
    /// read from; the self-identifying LSN must match it.
    pub fn decode(image: &[u8], at: Lsn) -> Result<WalRecord, DbError> {
        if image.len() < WAL_HEADER_LEN + 4 {
            return Err(DbError::corrupt("wal record too short"));
        }

        let body_end = image.len() - 4;
        let stored_crc = u32::from_le_bytes(image[body_end..].try_into().unwrap());
        let computed = crc32c::crc32c(&image[..body_end]);
        if stored_crc != computed {
            return Err(DbError::corrupt(&format!(
                "wal record crc mismatch at lsn {}",
                at
            )));
        }

        let tag = image[0];
        let lsn = u64::from_le_bytes(image[1..9].try_into().unwrap());
        let tid = u64::from_le_bytes(image[9..17].try_into().unwrap());
        let prev_lsn = u64::from_le_bytes(image[17..25].try_into().unwrap());

        if lsn != at {
            return Err(DbError::corrupt(&format!(
                "wal record claims lsn {} but sits at {}",
                lsn, at
            )));
        }

        let payload = &image[WAL_HEADER_LEN..body_end];
        let body = match tag {
            TAG_BEGIN => RecordBody::Begin,
            TAG_COMMIT => RecordBody::Commit,
            TAG_END => RecordBody::End,
            TAG_CHECKPOINT_BEGIN => RecordBody::CheckpointBegin,
            TAG_UPDATE => {
                let pg = u64::from_le_bytes(payload[..8].try_into().unwrap());
                let before = Page::from_bytes(&payload[8..8 + PAGE_SIZE]);
                let after = Page::from_bytes(&payload[8 + PAGE_SIZE..8 + 2 * PAGE_SIZE]);
                RecordBody::Update { pg, before, after }
            }
            TAG_COMPENSATION => {
                let pg = u64::from_le_bytes(payload[..8].try_into().unwrap());
                let undo_next_lsn = u64::from_le_bytes(payload[8..16].try_into().unwrap());
                let after = Page::from_bytes(&payload[16..16 + PAGE_SIZE]);
                RecordBody::Compensation {
                    pg,
                    undo_next_lsn,
                    after,
                }
            }
            TAG_CHECKPOINT_END => {
                let plen = u32::from_le_bytes(payload[..4].try_into().unwrap()) as usize;
                if 4 + plen != payload.len() {
                    return Err(DbError::corrupt("checkpoint payload length mismatch"));
                }
                RecordBody::CheckpointEnd {
                    payload: Bytes::copy_from_slice(&payload[4..]),
                }
            }
            _ => {
                return Err(DbError::corrupt(&format!("unknown wal record tag {}", tag)));
            }
        };

        Ok(WalRecord {
            lsn,
            tid,
            prev_lsn,
            body,
        })
    }

    pub fn depiction(&self) -> String {
        match &self.body {
            RecordBody::Update { pg, .. } => format!(
                "{}-[lsn {}]-[tid {}]-[prev {}]-[pg {}]",
                self.body.name(),
                self.lsn,
                self.tid,
                self.prev_lsn,
                pg
            ),
            RecordBody::Compensation {
                pg, undo_next_lsn, ..
            } => format!(
                "{}-[lsn {}]-[tid {}]-[prev {}]-[pg {}]-[undo_next {}]",
                self.body.name(),
                self.lsn,
                self.tid,
                self.prev_lsn,
                pg,
                undo_next_lsn
            ),
            _ => format!(
                "{}-[lsn {}]-[tid {}]-[prev {}]",
                self.body.name(),
                self.lsn,
                self.tid,
                self.prev_lsn
            ),
        }
    }
}
