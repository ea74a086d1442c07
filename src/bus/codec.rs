// Typed value <-> fixed-size bus payload conversion
//
// Every value is written field by field in host-native byte order. The
// layout passed to `encode` / `decode` decides, per field, whether those
// bytes are reversed on the wire. Layouts live next to the frame ids that
// use them, not on the value types.

use crate::error::{Error, Result};

/// Byte order of one field on the wire relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOrder {
    Native,
    Reversed,
}

/// Field ordering for a whole payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Same order for every field
    Uniform(FieldOrder),
    /// One entry per field, missing entries are native
    PerField(&'static [FieldOrder]),
}

impl Layout {
    pub const NATIVE: Layout = Layout::Uniform(FieldOrder::Native);
    pub const REVERSED: Layout = Layout::Uniform(FieldOrder::Reversed);

    fn order_of(&self, field: usize) -> FieldOrder {
        match self {
            Layout::Uniform(order) => *order,
            Layout::PerField(orders) => orders.get(field).copied().unwrap_or(FieldOrder::Native),
        }
    }
}

/// Reverse a byte buffer in place. Applying it twice is the identity.
pub fn reverse_bytes(bytes: &mut [u8]) {
    bytes.reverse();
}

/// Largest scalar the codec handles (f64 / u64)
const MAX_SCALAR: usize = 8;

/// Fixed-width numeric field
pub trait Scalar: Copy {
    const WIDTH: usize;

    fn put_native(self, out: &mut Vec<u8>);

    /// `bytes` is exactly `WIDTH` long
    fn from_native(bytes: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();

                fn put_native(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_ne_bytes());
                }

                fn from_native(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

impl_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Writes fields in declaration order, applying the layout's byte order
pub struct Encoder {
    buf: Vec<u8>,
    layout: Layout,
    field: usize,
}

impl Encoder {
    fn new(layout: Layout, capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            layout,
            field: 0,
        }
    }

    pub fn field<S: Scalar>(&mut self, value: S) -> &mut Self {
        let start = self.buf.len();
        value.put_native(&mut self.buf);
        if self.layout.order_of(self.field) == FieldOrder::Reversed {
            reverse_bytes(&mut self.buf[start..]);
        }
        self.field += 1;
        self
    }
}

/// Reads fields in declaration order, undoing the layout's byte order
pub struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    layout: Layout,
    field: usize,
}

impl<'a> Decoder<'a> {
    fn new(bytes: &'a [u8], layout: Layout) -> Self {
        Self {
            bytes,
            pos: 0,
            layout,
            field: 0,
        }
    }

    pub fn field<S: Scalar>(&mut self) -> S {
        let mut scratch = [0u8; MAX_SCALAR];
        let chunk = &mut scratch[..S::WIDTH];
        chunk.copy_from_slice(&self.bytes[self.pos..self.pos + S::WIDTH]);
        if self.layout.order_of(self.field) == FieldOrder::Reversed {
            reverse_bytes(chunk);
        }
        self.pos += S::WIDTH;
        self.field += 1;
        S::from_native(chunk)
    }
}

/// A record with a statically known wire size.
///
/// `SIZE` must equal the sum of the scalar sizes written by `write`,
/// and `read` must consume the same fields in the same order.
pub trait WireValue: Sized {
    const SIZE: usize;

    fn write(&self, enc: &mut Encoder);

    fn read(dec: &mut Decoder<'_>) -> Self;
}

impl<S: Scalar> WireValue for S {
    const SIZE: usize = S::WIDTH;

    fn write(&self, enc: &mut Encoder) {
        enc.field(*self);
    }

    fn read(dec: &mut Decoder<'_>) -> Self {
        dec.field()
    }
}

/// Data field of one bus frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePayload(Vec<u8>);

impl WirePayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reverse the whole payload in place
    pub fn reverse(&mut self) {
        reverse_bytes(&mut self.0);
    }
}

impl From<Vec<u8>> for WirePayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

pub fn encode<V: WireValue>(value: &V, layout: Layout) -> WirePayload {
    let mut enc = Encoder::new(layout, V::SIZE);
    value.write(&mut enc);
    debug_assert_eq!(enc.buf.len(), V::SIZE);
    WirePayload(enc.buf)
}

/// Decode a payload, rejecting any size other than `V::SIZE`
pub fn decode<V: WireValue>(bytes: &[u8], layout: Layout) -> Result<V> {
    if bytes.len() != V::SIZE {
        return Err(Error::MalformedFrame {
            expected: V::SIZE,
            actual: bytes.len(),
        });
    }
    let mut dec = Decoder::new(bytes, layout);
    Ok(V::read(&mut dec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vec2;
    use crate::messages::PoseEstimate;

    fn pose() -> PoseEstimate {
        PoseEstimate {
            position: Vec2::new(1.25, -3.5),
            heading: 0.785,
        }
    }

    #[test]
    fn test_pose_round_trip() {
        for layout in [Layout::NATIVE, Layout::REVERSED] {
            let payload = encode(&pose(), layout);
            assert_eq!(payload.len(), 12);
            let back: PoseEstimate = decode(payload.as_bytes(), layout).unwrap();
            assert_eq!(back, pose());
        }
    }

    #[test]
    fn test_float_edges_round_trip() {
        let edges = [
            f32::MIN,
            f32::MAX,
            -0.0,
            0.0,
            f32::MIN_POSITIVE,
            f32::INFINITY,
            f32::NEG_INFINITY,
            f32::NAN,
        ];
        for layout in [Layout::NATIVE, Layout::REVERSED] {
            for v in edges {
                let payload = encode(&v, layout);
                let back: f32 = decode(payload.as_bytes(), layout).unwrap();
                // bit equality keeps -0.0 apart from 0.0 and NaN equal to itself
                assert_eq!(back.to_bits(), v.to_bits(), "{v} under {layout:?}");
            }

            let pose = PoseEstimate {
                position: Vec2::new(f32::MIN, f32::MAX),
                heading: -0.0,
            };
            let back: PoseEstimate = decode(encode(&pose, layout).as_bytes(), layout).unwrap();
            assert_eq!(back.position, pose.position);
            assert_eq!(back.heading.to_bits(), (-0.0f32).to_bits());
        }
    }

    #[test]
    fn test_reversed_field_bytes() {
        let native = encode(&1.5f32, Layout::NATIVE);
        let reversed = encode(&1.5f32, Layout::REVERSED);
        let mut expected = native.as_bytes().to_vec();
        expected.reverse();
        assert_eq!(reversed.as_bytes(), expected.as_slice());
    }

    #[test]
    fn test_per_field_layout() {
        const ORDERS: &[FieldOrder] = &[FieldOrder::Native, FieldOrder::Reversed];
        let payload = encode(&pose(), Layout::PerField(ORDERS));
        let bytes = payload.as_bytes();
        assert_eq!(&bytes[0..4], &1.25f32.to_ne_bytes());
        let mut y = (-3.5f32).to_ne_bytes();
        y.reverse();
        assert_eq!(&bytes[4..8], &y);
        // missing entry falls back to native
        assert_eq!(&bytes[8..12], &0.785f32.to_ne_bytes());

        let back: PoseEstimate = decode(bytes, Layout::PerField(ORDERS)).unwrap();
        assert_eq!(back, pose());
    }

    #[test]
    fn test_reverse_twice_is_identity() {
        let mut payload = encode(&pose(), Layout::NATIVE);
        let original = payload.clone();
        payload.reverse();
        assert_ne!(payload, original);
        payload.reverse();
        assert_eq!(payload, original);
    }

    #[test]
    fn test_wrong_length_is_malformed() {
        for len in [0usize, 4, 11, 13, 16] {
            let bytes = vec![0u8; len];
            let result = decode::<PoseEstimate>(&bytes, Layout::REVERSED);
            match result {
                Err(Error::MalformedFrame { expected, actual }) => {
                    assert_eq!(expected, 12);
                    assert_eq!(actual, len);
                }
                other => panic!("expected MalformedFrame, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_integer_extremes_round_trip() {
        for v in [i16::MIN, -1, 0, 1, i16::MAX] {
            let payload = encode(&v, Layout::REVERSED);
            assert_eq!(decode::<i16>(payload.as_bytes(), Layout::REVERSED).unwrap(), v);
        }
        let payload = encode(&u8::MAX, Layout::NATIVE);
        assert_eq!(payload.as_bytes(), &[0xFF]);
    }
}
