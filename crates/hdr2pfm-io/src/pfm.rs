//! Portable Float Map (PFM) format support.
//!
//! Three ASCII header lines (magic, dimensions, scale) followed by raw
//! 32-bit floats with the bottom scanline first. The sign of the scale line
//! records the payload byte order: negative means little-endian.

use crate::{ImageData, IoError, IoResult, Metadata};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

const MAGIC_COLOR: &str = "PF";
const MAGIC_GRAY: &str = "Pf";

/// Writes a color PFM file.
///
/// Pixels are emitted in the host's native byte order with the scale line
/// sign set to match; rows come out bottom-to-top per the PFM convention.
/// A partially-written file is left in place if a write fails.
pub fn write<P: AsRef<Path>>(path: P, image: &ImageData) -> IoResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_to(&mut writer, image)?;
    writer.flush()?;
    Ok(())
}

/// Reads a PFM file (color or grayscale).
///
/// Rows are flipped back to top-down order so the container keeps one
/// orientation convention across formats.
pub fn read<P: AsRef<Path>>(path: P) -> IoResult<ImageData> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_from(&mut reader)
}

fn write_to<W: Write>(writer: &mut W, image: &ImageData) -> IoResult<()> {
    if image.channels != 3 {
        return Err(IoError::UnsupportedFormat(format!(
            "color PFM output needs 3 channels, image has {}",
            image.channels
        )));
    }

    writeln!(writer, "{MAGIC_COLOR}")?;
    writeln!(writer, "{} {}", image.width, image.height)?;
    writeln!(writer, "{}", if host_is_little_endian() { "-1.0" } else { "1.0" })?;

    let row_len = image.width as usize * 3;
    for row in image.data.chunks_exact(row_len).rev() {
        // one 4-byte write per channel; no struct padding can leak in
        for sample in row {
            writer.write_all(&sample.to_ne_bytes())?;
        }
    }
    Ok(())
}

fn read_from<R: BufRead>(reader: &mut R) -> IoResult<ImageData> {
    let magic = read_header_line(reader)?;
    let channels: u32 = match magic.as_str() {
        MAGIC_COLOR => 3,
        MAGIC_GRAY => 1,
        _ => {
            return Err(IoError::InvalidFile(format!(
                "not a PFM file (magic {magic:?})"
            )));
        }
    };

    let dims = read_header_line(reader)?;
    let mut tokens = dims.split_whitespace();
    let width = parse_dimension(tokens.next(), &dims)?;
    let height = parse_dimension(tokens.next(), &dims)?;
    if tokens.next().is_some() {
        return Err(IoError::InvalidFile(format!("bad dimensions line: {dims:?}")));
    }

    let scale_line = read_header_line(reader)?;
    let scale: f32 = scale_line
        .trim()
        .parse()
        .map_err(|_| IoError::InvalidFile(format!("bad scale line: {scale_line:?}")))?;
    if scale == 0.0 {
        return Err(IoError::InvalidFile("PFM scale must be nonzero".into()));
    }
    let little_endian = scale < 0.0;

    let samples = (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(channels as usize))
        .filter(|&n| n.checked_mul(4).is_some())
        .ok_or(IoError::Allocation { width, height })?;

    let mut payload = vec![0u8; samples * 4];
    reader.read_exact(&mut payload).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            IoError::Format("PFM payload shorter than the header promises".into())
        } else {
            IoError::Io(e)
        }
    })?;

    let mut floats = vec![0.0f32; samples];
    if little_endian {
        LittleEndian::read_f32_into(&payload, &mut floats);
    } else {
        BigEndian::read_f32_into(&payload, &mut floats);
    }

    // payload rows are bottom-up; the container is top-down
    let row_len = width as usize * channels as usize;
    let mut data = Vec::with_capacity(samples);
    for row in floats.chunks_exact(row_len).rev() {
        data.extend_from_slice(row);
    }

    let mut metadata = Metadata::default();
    if (scale.abs() - 1.0).abs() > f32::EPSILON {
        metadata.attrs.push(("Scale".to_string(), scale.abs().to_string()));
    }

    Ok(ImageData {
        width,
        height,
        channels,
        data,
        metadata,
    })
}

fn parse_dimension(token: Option<&str>, line: &str) -> IoResult<u32> {
    token
        .and_then(|t| t.parse::<u32>().ok())
        .filter(|&v| v > 0)
        .ok_or_else(|| IoError::InvalidFile(format!("bad dimensions line: {line:?}")))
}

fn read_header_line<R: BufRead>(reader: &mut R) -> IoResult<String> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(IoError::InvalidFile("truncated PFM header".into()));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Runtime byte-order probe.
///
/// Looks at how a known 16-bit value lays out in memory instead of trusting
/// compile-time configuration, so the branch stays testable as a plain value.
fn host_is_little_endian() -> bool {
    1u16.to_ne_bytes()[0] == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn scale_line() -> &'static str {
        if host_is_little_endian() { "-1.0" } else { "1.0" }
    }

    #[test]
    fn endianness_probe_matches_target() {
        assert_eq!(host_is_little_endian(), cfg!(target_endian = "little"));
    }

    #[test]
    fn writer_emits_header_and_bottom_up_rows() {
        // 2x2: top row (1,2,3)(4,5,6), bottom row (7,8,9)(10,11,12)
        let data: Vec<f32> = (1..=12).map(|i| i as f32).collect();
        let image = ImageData::from_f32(2, 2, 3, data);

        let mut out = Vec::new();
        write_to(&mut out, &image).unwrap();

        let header = format!("PF\n2 2\n{}\n", scale_line());
        assert!(out.starts_with(header.as_bytes()));

        let payload = &out[header.len()..];
        assert_eq!(payload.len(), 12 * 4);
        let floats: Vec<f32> = payload
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        // bottom image row first, left-to-right
        let expected: Vec<f32> = vec![
            7.0, 8.0, 9.0, 10.0, 11.0, 12.0, // image row 1
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, // image row 0
        ];
        assert_eq!(floats, expected);
    }

    #[test]
    fn pixel_lands_in_inverted_scanline() {
        // mark pixel (x=1, y=0) in a 2x3 image and find it in the payload
        let mut data = vec![0.0f32; 2 * 3 * 3];
        data[3] = 42.0; // red sample of pixel (1, 0)
        let image = ImageData::from_f32(2, 3, 3, data);

        let mut out = Vec::new();
        write_to(&mut out, &image).unwrap();
        let header_len = format!("PF\n2 3\n{}\n", scale_line()).len();
        let floats: Vec<f32> = out[header_len..]
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        // y=0 with height 3 lands in payload scanline 2
        let scanline = 2;
        assert_eq!(floats[(scanline * 2 + 1) * 3], 42.0);
        assert_eq!(floats.iter().filter(|&&v| v == 42.0).count(), 1);
    }

    #[test]
    fn writer_rejects_non_rgb() {
        let image = ImageData::from_f32(2, 1, 1, vec![0.0, 0.0]);
        let err = write_to(&mut Vec::new(), &image).unwrap_err();
        assert!(matches!(err, IoError::UnsupportedFormat(_)), "{err}");
    }

    #[test]
    fn reader_rejects_bad_magic() {
        let err = read_from(&mut Cursor::new(b"P6\n2 1\n-1.0\n")).unwrap_err();
        assert!(matches!(err, IoError::InvalidFile(_)), "{err}");
    }

    #[test]
    fn reader_rejects_bad_dimensions() {
        for dims in ["2", "2 0", "a b", "2 1 5"] {
            let text = format!("PF\n{dims}\n-1.0\n");
            let err = read_from(&mut Cursor::new(text.into_bytes())).unwrap_err();
            assert!(matches!(err, IoError::InvalidFile(_)), "{dims}");
        }
    }

    #[test]
    fn reader_rejects_short_payload() {
        let mut bytes = format!("PF\n2 1\n{}\n", scale_line()).into_bytes();
        bytes.extend_from_slice(&[0u8; 10]); // needs 24
        let err = read_from(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, IoError::Format(_)), "{err}");
    }

    #[test]
    fn roundtrip_is_exact() {
        let data: Vec<f32> = (0..2 * 4 * 3).map(|i| i as f32 * 0.3).collect();
        let image = ImageData::from_f32(2, 4, 3, data);

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("roundtrip.pfm");
        write(&path, &image).expect("PFM write failed");
        let loaded = read(&path).expect("PFM read failed");

        assert_eq!(loaded.width, 2);
        assert_eq!(loaded.height, 4);
        assert_eq!(loaded.channels, 3);
        assert_eq!(loaded.data, image.data);
    }

    #[test]
    fn reads_opposite_endian_payload() {
        // hand-build a big-endian 1x1 file regardless of host order
        let mut bytes = b"PF\n1 1\n1.0\n".to_vec();
        for v in [0.5f32, 1.0, 2.0] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        let image = read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(image.data, vec![0.5, 1.0, 2.0]);
    }
}
