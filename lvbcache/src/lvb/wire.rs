//! LVB record in glimpse replies.
//!
//! The reply is unpacked by the transport into indexed buffers; the sender's
//! byte order travels with it. Incoming records carry `size, mtime, atime,
//! ctime` as 64-bit words; outgoing records append `blocks`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{Lvb, LvbAttrs};

/// Length of the record read from a reply.
pub const LVB_ATTRS_LEN: usize = 4 * 8;
/// Length of the record written into a glimpse reply.
pub const LVB_WIRE_LEN: usize = 5 * 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("reply has no buffer {index} ({count} buffers)")]
    MissingBuffer { index: usize, count: usize },

    #[error("reply buffer {index} too short for lvb: {len} < {need}")]
    ShortBuffer { index: usize, len: usize, need: usize },
}

/// A reply already split into its buffers by the transport.
#[derive(Clone, Debug, Default)]
pub struct ReplyBuffers {
    order: ByteOrder,
    bufs: Vec<Bytes>,
}

impl ReplyBuffers {
    pub fn new(order: ByteOrder) -> Self {
        Self {
            order,
            bufs: Vec::new(),
        }
    }

    pub fn with_buffers(order: ByteOrder, bufs: Vec<Bytes>) -> Self {
        Self { order, bufs }
    }

    pub fn push(&mut self, buf: impl Into<Bytes>) -> usize {
        self.bufs.push(buf.into());
        self.bufs.len() - 1
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn buffer(&self, index: usize) -> Option<&Bytes> {
        self.bufs.get(index)
    }

    pub fn len(&self) -> usize {
        self.bufs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }
}

/// Decode the LVB record at `index`, normalizing the sender's byte order.
pub fn decode_lvb(reply: &ReplyBuffers, index: usize) -> Result<LvbAttrs, DecodeError> {
    let buf = reply.buffer(index).ok_or(DecodeError::MissingBuffer {
        index,
        count: reply.len(),
    })?;
    if buf.len() < LVB_ATTRS_LEN {
        return Err(DecodeError::ShortBuffer {
            index,
            len: buf.len(),
            need: LVB_ATTRS_LEN,
        });
    }

    let mut cur = &buf[..LVB_ATTRS_LEN];
    let mut next = || match reply.order {
        ByteOrder::Little => cur.get_u64_le(),
        ByteOrder::Big => cur.get_u64(),
    };
    Ok(LvbAttrs {
        size: next(),
        mtime: next(),
        atime: next(),
        ctime: next(),
    })
}

/// Pack the block for a glimpse reply. `blocks` carries the error sentinel
/// when init failed.
pub fn encode_lvb(lvb: &Lvb, order: ByteOrder) -> Bytes {
    let mut out = BytesMut::with_capacity(LVB_WIRE_LEN);
    for v in [lvb.size, lvb.mtime, lvb.atime, lvb.ctime, lvb.wire_blocks()] {
        match order {
            ByteOrder::Little => out.put_u64_le(v),
            ByteOrder::Big => out.put_u64(v),
        }
    }
    out.freeze()
}
