//! Helpers for the JSON representation, hex strings are used for addresses and colors
//! so they read the same as in a debugger.

use serde::{ser::SerializeSeq, Serializer};

pub(crate) fn color_to_hex(color: u32) -> String {
    format!("0x{:06x}", color & 0xFFFFFF)
}

pub(crate) fn u32_to_hex(value: u32) -> String {
    format!("0x{:08x}", value)
}

pub(crate) fn serialize_hex_u32<S: Serializer>(value: &u32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&u32_to_hex(*value))
}

pub(crate) fn serialize_hex_words<W, S>(words: &W, serializer: S) -> Result<S::Ok, S::Error>
where
    W: AsRef<[u32]> + ?Sized,
    S: Serializer,
{
    let words = words.as_ref();
    let mut seq = serializer.serialize_seq(Some(words.len()))?;
    for word in words {
        seq.serialize_element(&u32_to_hex(*word))?;
    }
    seq.end()
}

#[test]
fn hex_formatting() {
    assert_eq!(color_to_hex(0x112233), "0x112233");
    assert_eq!(color_to_hex(0xFF00000F), "0x00000f");
    assert_eq!(u32_to_hex(0x80010000), "0x80010000");
}
