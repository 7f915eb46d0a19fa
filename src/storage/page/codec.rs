//! Fixed-width binary encoding for values stored inside page layouts.
//!
//! Every implementor occupies exactly `ENCODED_SIZE` bytes, so page views can
//! compute slot offsets and capacities at compile time.

use bytes::{Buf, BufMut};

use crate::common::{PageId, RecordId, SlotId};

/// A value with a fixed-size little-endian encoding.
pub trait FixedCodec: Sized {
    /// Number of bytes `encode` writes and `decode` consumes.
    const ENCODED_SIZE: usize;

    /// Writes the value into `buf`, which is exactly `ENCODED_SIZE` bytes long.
    fn encode(&self, buf: &mut [u8]);

    /// Reads a value back from `buf`, which is exactly `ENCODED_SIZE` bytes long.
    fn decode(buf: &[u8]) -> Self;
}

macro_rules! impl_fixed_codec_for_int {
    ($($ty:ty => $put:ident, $get:ident);* $(;)?) => {
        $(
            impl FixedCodec for $ty {
                const ENCODED_SIZE: usize = std::mem::size_of::<$ty>();

                fn encode(&self, mut buf: &mut [u8]) {
                    buf.$put(*self);
                }

                fn decode(mut buf: &[u8]) -> Self {
                    buf.$get()
                }
            }
        )*
    };
}

impl_fixed_codec_for_int! {
    u8 => put_u8, get_u8;
    u16 => put_u16_le, get_u16_le;
    u32 => put_u32_le, get_u32_le;
    u64 => put_u64_le, get_u64_le;
    i8 => put_i8, get_i8;
    i16 => put_i16_le, get_i16_le;
    i32 => put_i32_le, get_i32_le;
    i64 => put_i64_le, get_i64_le;
}

impl FixedCodec for PageId {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        self.as_u32().encode(buf);
    }

    fn decode(buf: &[u8]) -> Self {
        PageId::new(u32::decode(buf))
    }
}

impl FixedCodec for RecordId {
    const ENCODED_SIZE: usize = 6;

    fn encode(&self, mut buf: &mut [u8]) {
        buf.put_u32_le(self.page_id.as_u32());
        buf.put_u16_le(self.slot_id.as_u16());
    }

    fn decode(mut buf: &[u8]) -> Self {
        let page_id = PageId::new(buf.get_u32_le());
        let slot_id = SlotId::new(buf.get_u16_le());
        RecordId::new(page_id, slot_id)
    }
}

/// Fixed-length byte keys, e.g. padded strings.
impl<const N: usize> FixedCodec for [u8; N] {
    const ENCODED_SIZE: usize = N;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(self);
    }

    fn decode(buf: &[u8]) -> Self {
        let mut out = [0u8; N];
        out.copy_from_slice(buf);
        out
    }
}
