//! Size-prefixed framing: 8-byte little-endian length, then the payload.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

pub fn write_frame<W: Write>(mut writer: W, payload: &[u8]) -> io::Result<()> {
    writer.write_u64::<LittleEndian>(payload.len() as u64)?;
    writer.write_all(payload)?;
    writer.flush()
}

pub fn read_frame<R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
    let len = reader.read_u64::<LittleEndian>()?;
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frame_roundtrip() {
        let mut buf = Cursor::new(Vec::new());
        write_frame(&mut buf, b"answer bytes").unwrap();
        buf.set_position(0);
        assert_eq!(read_frame(&mut buf).unwrap(), b"answer bytes");
    }

    #[test]
    fn test_frame_header_is_le64() {
        let mut buf = Cursor::new(Vec::new());
        write_frame(&mut buf, &[0xab; 3]).unwrap();
        let raw = buf.into_inner();
        assert_eq!(&raw[..8], &3u64.to_le_bytes());
        assert_eq!(raw.len(), 11);
    }
}
