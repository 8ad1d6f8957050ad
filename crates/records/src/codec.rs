//! Binary encoding of device and session records
//!
//! All integers are little-endian and fields are written in native order.
//!
//! # Device record layout
//!
//! ```text
//! [path_len: u16][path: utf8]
//! [vendor_id: u16][product_id: u16]
//! [serial_len: u16][serial: utf8]
//! [release_number: u16]
//! [manufacturer_len: u16][manufacturer: utf8]
//! [product_len: u16][product: utf8]
//! [usage_page: u16][usage: u16]
//! [interface_number: i32][bus_type: u32]
//! ```
//!
//! A listing is `[count: u32]` followed by `count` device records.

use crate::error::{RecordError, Result};
use crate::types::{BusType, DeviceRecord, SessionRecord};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

fn eof_as_truncated(field: &'static str) -> impl FnOnce(std::io::Error) -> RecordError {
    move |e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            RecordError::Truncated(field)
        } else {
            RecordError::Io(e)
        }
    }
}

fn read_u16<R: Read>(r: &mut R, field: &'static str) -> Result<u16> {
    r.read_u16::<LittleEndian>().map_err(eof_as_truncated(field))
}

fn read_i32<R: Read>(r: &mut R, field: &'static str) -> Result<i32> {
    r.read_i32::<LittleEndian>().map_err(eof_as_truncated(field))
}

fn read_u32<R: Read>(r: &mut R, field: &'static str) -> Result<u32> {
    r.read_u32::<LittleEndian>().map_err(eof_as_truncated(field))
}

fn read_string<R: Read>(r: &mut R, field: &'static str) -> Result<String> {
    let len = read_u16(r, field)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(eof_as_truncated(field))?;
    String::from_utf8(buf).map_err(|_| RecordError::InvalidString { field })
}

fn write_string<W: Write>(w: &mut W, value: &str, field: &'static str) -> Result<()> {
    let len = value.len();
    if len > u16::MAX as usize {
        return Err(RecordError::FieldTooLong {
            field,
            len,
            max: u16::MAX as usize,
        });
    }
    w.write_u16::<LittleEndian>(len as u16)?;
    w.write_all(value.as_bytes())?;
    Ok(())
}

/// Write one device record
pub fn encode_device_record<W: Write>(w: &mut W, record: &DeviceRecord) -> Result<()> {
    write_string(w, &record.path, "path")?;
    w.write_u16::<LittleEndian>(record.vendor_id)?;
    w.write_u16::<LittleEndian>(record.product_id)?;
    write_string(w, &record.serial_number, "serial_number")?;
    w.write_u16::<LittleEndian>(record.release_number)?;
    write_string(w, &record.manufacturer_string, "manufacturer_string")?;
    write_string(w, &record.product_string, "product_string")?;
    w.write_u16::<LittleEndian>(record.usage_page)?;
    w.write_u16::<LittleEndian>(record.usage)?;
    w.write_i32::<LittleEndian>(record.interface_number)?;
    w.write_u32::<LittleEndian>(record.bus_type.as_raw())?;
    Ok(())
}

/// Read one device record
pub fn decode_device_record<R: Read>(r: &mut R) -> Result<DeviceRecord> {
    Ok(DeviceRecord {
        path: read_string(r, "path")?,
        vendor_id: read_u16(r, "vendor_id")?,
        product_id: read_u16(r, "product_id")?,
        serial_number: read_string(r, "serial_number")?,
        release_number: read_u16(r, "release_number")?,
        manufacturer_string: read_string(r, "manufacturer_string")?,
        product_string: read_string(r, "product_string")?,
        usage_page: read_u16(r, "usage_page")?,
        usage: read_u16(r, "usage")?,
        interface_number: read_i32(r, "interface_number")?,
        bus_type: BusType::from_raw(read_u32(r, "bus_type")?),
    })
}

/// Encode a complete listing with its count prefix
pub fn encode_listing(records: &[DeviceRecord]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(records.len() as u32)?;
    for record in records {
        encode_device_record(&mut out, record)?;
    }
    Ok(out)
}

/// Decode a complete listing, rejecting trailing bytes
pub fn decode_listing(bytes: &[u8]) -> Result<Vec<DeviceRecord>> {
    let mut cursor = Cursor::new(bytes);
    let count = read_u32(&mut cursor, "count")?;

    // The count comes from the wire, so grow as records actually decode.
    let mut records = Vec::new();
    for _ in 0..count {
        records.push(decode_device_record(&mut cursor)?);
    }

    let remaining = bytes.len() - cursor.position() as usize;
    if remaining != 0 {
        return Err(RecordError::TrailingData(remaining));
    }
    Ok(records)
}

/// Write a session record (fixed `SessionRecord::ENCODED_LEN` bytes)
pub fn encode_session_record<W: Write>(w: &mut W, record: &SessionRecord) -> Result<()> {
    w.write_i32::<LittleEndian>(record.config_number)?;
    w.write_i32::<LittleEndian>(record.interface)?;
    w.write_u16::<LittleEndian>(record.report_descriptor_size)?;
    w.write_i32::<LittleEndian>(record.input_endpoint)?;
    w.write_i32::<LittleEndian>(record.output_endpoint)?;
    w.write_i32::<LittleEndian>(record.input_ep_max_packet_size)?;
    w.write_i32::<LittleEndian>(record.manufacturer_index)?;
    w.write_i32::<LittleEndian>(record.product_index)?;
    w.write_i32::<LittleEndian>(record.serial_index)?;
    Ok(())
}

/// Read a session record
pub fn decode_session_record<R: Read>(r: &mut R) -> Result<SessionRecord> {
    Ok(SessionRecord {
        config_number: read_i32(r, "config_number")?,
        interface: read_i32(r, "interface")?,
        report_descriptor_size: read_u16(r, "report_descriptor_size")?,
        input_endpoint: read_i32(r, "input_endpoint")?,
        output_endpoint: read_i32(r, "output_endpoint")?,
        input_ep_max_packet_size: read_i32(r, "input_ep_max_packet_size")?,
        manufacturer_index: read_i32(r, "manufacturer_index")?,
        product_index: read_i32(r, "product_index")?,
        serial_index: read_i32(r, "serial_index")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> DeviceRecord {
        DeviceRecord {
            path: "3-1.2:1.0".to_string(),
            vendor_id: 0x046d,
            product_id: 0xc077,
            serial_number: "ABC123".to_string(),
            release_number: 0x0110,
            manufacturer_string: "Logitech".to_string(),
            product_string: "USB Optical Mouse".to_string(),
            usage_page: 0x0001,
            usage: 0x0002,
            interface_number: 0,
            bus_type: BusType::Usb,
        }
    }

    #[test]
    fn test_device_record_field_order() {
        let mut bytes = Vec::new();
        encode_device_record(&mut bytes, &sample_record()).unwrap();

        // path length prefix, then the path itself, then VID/PID
        assert_eq!(&bytes[0..2], &[9, 0]);
        assert_eq!(&bytes[2..11], b"3-1.2:1.0");
        assert_eq!(&bytes[11..13], &[0x6d, 0x04]);
        assert_eq!(&bytes[13..15], &[0x77, 0xc0]);

        // bus type is the trailing u32
        assert_eq!(&bytes[bytes.len() - 4..], &[1, 0, 0, 0]);
    }

    #[test]
    fn test_session_record_is_fixed_size() {
        let mut bytes = Vec::new();
        encode_session_record(&mut bytes, &SessionRecord::default()).unwrap();
        assert_eq!(bytes.len(), SessionRecord::ENCODED_LEN);
    }

    #[test]
    fn test_truncated_record_names_field() {
        let mut bytes = Vec::new();
        encode_device_record(&mut bytes, &sample_record()).unwrap();
        bytes.truncate(12);

        let err = decode_device_record(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, RecordError::Truncated("vendor_id")));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let bytes = [2u8, 0, 0xff, 0xfe];
        let err = decode_device_record(&mut Cursor::new(&bytes[..])).unwrap_err();
        assert!(matches!(err, RecordError::InvalidString { field: "path" }));
    }

    #[test]
    fn test_listing_trailing_data() {
        let mut bytes = encode_listing(&[sample_record()]).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_listing(&bytes),
            Err(RecordError::TrailingData(1))
        ));
    }

    #[test]
    fn test_listing_count_larger_than_input() {
        let bytes = [0xff, 0xff, 0xff, 0xff];
        assert!(matches!(
            decode_listing(&bytes),
            Err(RecordError::Truncated("path"))
        ));
    }

    #[test]
    fn test_oversized_field_rejected() {
        let record = DeviceRecord {
            path: "x".repeat(u16::MAX as usize + 1),
            ..Default::default()
        };
        let mut bytes = Vec::new();
        assert!(matches!(
            encode_device_record(&mut bytes, &record),
            Err(RecordError::FieldTooLong { field: "path", .. })
        ));
    }
}
