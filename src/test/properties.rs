//! Property-based round trips over the primitive codec.

use proptest::collection::vec;
use proptest::prelude::*;

use crate::decoding::ReadBuffer;
use crate::encoding::WriteBuffer;

proptest! {
    #[test]
    fn i32_sequences_roundtrip(values in vec(any::<i32>(), 0..64)) {
        let mut writer = WriteBuffer::new();
        for v in &values {
            writer.write(*v).unwrap();
        }
        let mut reader = writer.into_reader();
        for v in &values {
            prop_assert_eq!(reader.read::<i32>().unwrap(), *v);
        }
        prop_assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn f64_bit_patterns_roundtrip(bits in any::<u64>()) {
        let mut writer = WriteBuffer::new();
        writer.write(f64::from_bits(bits)).unwrap();
        let mut reader = writer.into_reader();
        prop_assert_eq!(reader.read::<f64>().unwrap().to_bits(), bits);
    }

    #[test]
    fn u16_arrays_roundtrip(values in vec(any::<u16>(), 0..128)) {
        let mut writer = WriteBuffer::new();
        writer.write_array(&values).unwrap();
        let mut reader = writer.into_reader();
        prop_assert_eq!(reader.read_array::<u16>().unwrap(), values);
        prop_assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn byte_arrays_roundtrip(values in vec(any::<u8>(), 0..256)) {
        let mut writer = WriteBuffer::new();
        writer.write_fast_array(&values).unwrap();
        let mut reader = writer.into_reader();
        let mut dst = vec![0u8; values.len()];
        reader.read_fast_array(&mut dst).unwrap();
        prop_assert_eq!(dst, values);
    }

    #[test]
    fn strings_roundtrip(s in "[a-zA-Z0-9 ._-]{0,48}") {
        let mut writer = WriteBuffer::new();
        writer.write_string(&s).unwrap();
        let mut reader = writer.into_reader();
        prop_assert_eq!(reader.read_string(None).unwrap(), s);
        prop_assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn mixed_sequences_keep_cursor_parity(
        a in any::<bool>(),
        b in any::<i8>(),
        c in any::<u16>(),
        d in any::<i32>(),
        e in any::<f32>(),
    ) {
        let mut writer = WriteBuffer::new();
        writer.write(a).unwrap();
        writer.write(b).unwrap();
        writer.write(c).unwrap();
        writer.write(d).unwrap();
        writer.write(e).unwrap();
        let written = writer.len();

        let mut reader = writer.into_reader();
        prop_assert_eq!(reader.read::<bool>().unwrap(), a);
        prop_assert_eq!(reader.read::<i8>().unwrap(), b);
        prop_assert_eq!(reader.read::<u16>().unwrap(), c);
        prop_assert_eq!(reader.read::<i32>().unwrap(), d);
        prop_assert_eq!(reader.read::<f32>().unwrap().to_bits(), e.to_bits());
        prop_assert_eq!(reader.len(), written);
    }

    #[test]
    fn wide_arrays_roundtrip_in_the_modern_form(values in vec(-2_000_000_000i64..2_000_000_000, 0..32)) {
        let mut writer = WriteBuffer::new();
        writer.write_array_wide(&values).unwrap();
        let mut reader = writer.into_reader();
        prop_assert_eq!(reader.read_array_wide().unwrap(), values);
    }
}

#[test]
fn slice_readers_see_the_same_bytes() {
    let mut writer = WriteBuffer::new();
    writer.write(0x0102_0304u32).unwrap();
    let mut reader = ReadBuffer::from_slice(writer.as_bytes());
    assert_eq!(reader.read::<u32>().unwrap(), 0x0102_0304);
}
