//! Radiance HDR (RGBE) format support.
//!
//! Pixels are 4-byte quadruples: three 8-bit mantissas sharing one exponent
//! byte. Scanlines are either stored flat or run-length coded per channel
//! plane. The reader accepts both; the writer emits RLE whenever the width
//! allows it.

use crate::{ImageData, IoError, IoResult, Metadata};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

const HDR_MAGIC: &str = "#?";

/// Widths outside this range cannot carry the RLE scanline sentinel.
const MIN_RLE_WIDTH: usize = 8;
const MAX_RLE_WIDTH: usize = 0x7fff;

/// Shortest repeat worth a run packet when encoding.
const MIN_RUN: usize = 4;

/// Reads an HDR (Radiance RGBE) file.
pub fn read<P: AsRef<Path>>(path: P) -> IoResult<ImageData> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let header = read_header(&mut reader)?;
    tracing::debug!(width = header.width, height = header.height, "decoding RGBE pixels");
    let data = read_pixels(&mut reader, header.width, header.height)?;

    Ok(ImageData {
        width: header.width,
        height: header.height,
        channels: 3,
        data,
        metadata: header.metadata,
    })
}

/// Writes an HDR (Radiance RGBE) file.
///
/// Scanlines are RLE-coded when the width fits the sentinel range, flat
/// otherwise.
pub fn write<P: AsRef<Path>>(path: P, image: &ImageData) -> IoResult<()> {
    if image.channels != 3 {
        return Err(IoError::UnsupportedFormat(format!(
            "RGBE holds RGB triples, image has {} channels",
            image.channels
        )));
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let xyz = image
        .metadata
        .colorspace
        .as_deref()
        .is_some_and(|cs| cs.eq_ignore_ascii_case("xyz"));

    writeln!(writer, "{HDR_MAGIC}RADIANCE")?;
    writeln!(
        writer,
        "FORMAT={}",
        if xyz { "32-bit_rle_xyze" } else { "32-bit_rle_rgbe" }
    )?;
    if let Some(software) = &image.metadata.software {
        writeln!(writer, "SOFTWARE={software}")?;
    }
    if let Some(exposure) = image.metadata.exposure {
        writeln!(writer, "EXPOSURE={exposure}")?;
    }
    if let Some(gamma) = image.metadata.gamma {
        writeln!(writer, "GAMMA={gamma}")?;
    }
    if let Some(pixaspect) = image.metadata.pixaspect {
        writeln!(writer, "PIXASPECT={pixaspect}")?;
    }
    for (key, value) in &image.metadata.attrs {
        writeln!(writer, "{key}={value}")?;
    }
    writeln!(writer)?;
    writeln!(writer, "-Y {} +X {}", image.height, image.width)?;

    write_pixels(&mut writer, image)?;
    writer.flush()?;
    Ok(())
}

#[derive(Debug)]
struct Header {
    width: u32,
    height: u32,
    metadata: Metadata,
}

fn read_header<R: BufRead>(reader: &mut R) -> IoResult<Header> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(IoError::InvalidFile("empty file".into()));
    }
    if !trim_line(&line).starts_with(HDR_MAGIC) {
        return Err(IoError::InvalidFile("missing #? identification line".into()));
    }

    let mut metadata = Metadata::default();
    let mut format = String::from("32-bit_rle_rgbe");

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(IoError::InvalidFile("missing resolution line".into()));
        }
        let text = trim_line(&line);

        // Blank lines separate the variable block from the resolution line;
        // '#' starts a comment.
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        if text.starts_with('+') || text.starts_with('-') {
            let (width, height) = parse_resolution(text).ok_or_else(|| {
                IoError::InvalidFile(format!("bad resolution line: {text:?}"))
            })?;
            let colorspace = if format.to_lowercase().contains("xyze") { "xyz" } else { "linear" };
            metadata.colorspace = Some(colorspace.to_string());
            return Ok(Header { width, height, metadata });
        }

        let Some((key, value)) = text.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key.to_uppercase().as_str() {
            "FORMAT" => format = value.to_string(),
            // Repeated EXPOSURE lines compound.
            "EXPOSURE" => match value.parse::<f32>() {
                Ok(v) => {
                    let prior = metadata.exposure.unwrap_or(1.0);
                    metadata.exposure = Some(prior * v);
                }
                Err(_) => metadata.attrs.push((key.to_string(), value.to_string())),
            },
            "GAMMA" => match value.parse::<f32>() {
                Ok(v) => metadata.gamma = Some(v),
                Err(_) => metadata.attrs.push((key.to_string(), value.to_string())),
            },
            "PIXASPECT" => match value.parse::<f32>() {
                Ok(v) => metadata.pixaspect = Some(v),
                Err(_) => metadata.attrs.push((key.to_string(), value.to_string())),
            },
            "SOFTWARE" => metadata.software = Some(value.to_string()),
            _ => metadata.attrs.push((key.to_string(), value.to_string())),
        }
    }
}

fn read_pixels<R: Read>(reader: &mut R, width: u32, height: u32) -> IoResult<Vec<f32>> {
    let w = width as usize;
    let h = height as usize;
    let quad_bytes = w
        .checked_mul(h)
        .and_then(|px| px.checked_mul(4))
        .ok_or(IoError::Allocation { width, height })?;

    let mut first = [0u8; 4];
    fill(reader, &mut first, "pixel data")?;

    let mut rgbe = vec![0u8; quad_bytes];

    if is_rle_sentinel(&first, w) {
        let mut scanline = vec![0u8; w * 4];
        let mut plane = vec![0u8; w];
        let mut sentinel = first;
        for y in 0..h {
            if y > 0 {
                fill(reader, &mut sentinel, "scanline header")?;
                if !is_rle_sentinel(&sentinel, w) {
                    return Err(IoError::Format(format!(
                        "scanline {y} header {sentinel:?} does not match width {w}"
                    )));
                }
            }
            for channel in 0..4 {
                read_rle_component(reader, &mut plane)?;
                for (x, &value) in plane.iter().enumerate() {
                    scanline[x * 4 + channel] = value;
                }
            }
            rgbe[y * w * 4..(y + 1) * w * 4].copy_from_slice(&scanline);
        }
    } else {
        rgbe[..4].copy_from_slice(&first);
        fill(reader, &mut rgbe[4..], "pixel data")?;
    }

    let mut data = Vec::with_capacity(w * h * 3);
    for quad in rgbe.chunks_exact(4) {
        data.extend_from_slice(&rgbe_to_f32(quad[0], quad[1], quad[2], quad[3]));
    }
    Ok(data)
}

fn is_rle_sentinel(bytes: &[u8; 4], width: usize) -> bool {
    (MIN_RLE_WIDTH..=MAX_RLE_WIDTH).contains(&width)
        && bytes[0] == 2
        && bytes[1] == 2
        && (((bytes[2] as usize) << 8) | (bytes[3] as usize)) == width
}

/// Decodes one run-length-coded channel plane of exactly `out.len()` bytes.
fn read_rle_component<R: Read>(reader: &mut R, out: &mut [u8]) -> IoResult<()> {
    let width = out.len();
    let mut filled = 0usize;
    while filled < width {
        let mut packet = [0u8; 1];
        fill(reader, &mut packet, "RLE scanline")?;
        let count = packet[0] as usize;
        if count > 128 {
            let run = count - 128;
            if filled + run > width {
                return Err(IoError::Format(format!(
                    "RLE run of {run} overflows scanline of {width}"
                )));
            }
            let mut value = [0u8; 1];
            fill(reader, &mut value, "RLE scanline")?;
            out[filled..filled + run].fill(value[0]);
            filled += run;
        } else {
            if count == 0 {
                return Err(IoError::Format("RLE literal packet of length zero".into()));
            }
            if filled + count > width {
                return Err(IoError::Format(format!(
                    "RLE literal of {count} overflows scanline of {width}"
                )));
            }
            fill(reader, &mut out[filled..filled + count], "RLE scanline")?;
            filled += count;
        }
    }
    Ok(())
}

/// `read_exact` with mid-stream EOF reported as a malformed file, not an
/// environment failure.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> IoResult<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            IoError::Format(format!("unexpected end of file in {what}"))
        } else {
            IoError::Io(e)
        }
    })
}

fn write_pixels<W: Write>(writer: &mut W, image: &ImageData) -> IoResult<()> {
    let width = image.width as usize;
    let use_rle = (MIN_RLE_WIDTH..=MAX_RLE_WIDTH).contains(&width);

    let mut scanline = vec![0u8; width * 4];
    let mut plane = vec![0u8; width];
    for row in image.data.chunks_exact(width * 3) {
        for (x, pixel) in row.chunks_exact(3).enumerate() {
            let quad = f32_to_rgbe(pixel[0], pixel[1], pixel[2]);
            scanline[x * 4..x * 4 + 4].copy_from_slice(&quad);
        }

        if use_rle {
            writer.write_all(&[2, 2, (width >> 8) as u8, (width & 0xff) as u8])?;
            for channel in 0..4 {
                for x in 0..width {
                    plane[x] = scanline[x * 4 + channel];
                }
                write_rle_component(writer, &plane)?;
            }
        } else {
            writer.write_all(&scanline)?;
        }
    }
    Ok(())
}

/// Length of the identical-byte run starting at `at`, capped at 127 so a run
/// always fits one packet.
fn run_length_at(plane: &[u8], at: usize) -> usize {
    let limit = (plane.len() - at).min(127);
    let mut n = 1;
    while n < limit && plane[at + n] == plane[at] {
        n += 1;
    }
    n
}

fn write_rle_component<W: Write>(writer: &mut W, plane: &[u8]) -> IoResult<()> {
    let mut i = 0;
    while i < plane.len() {
        let run = run_length_at(plane, i);
        if run >= MIN_RUN {
            writer.write_all(&[(128 + run) as u8, plane[i]])?;
            i += run;
            continue;
        }

        let start = i;
        let mut literal = 0usize;
        while i < plane.len() && literal < 128 && run_length_at(plane, i) < MIN_RUN {
            i += 1;
            literal += 1;
        }
        writer.write_all(&[literal as u8])?;
        writer.write_all(&plane[start..start + literal])?;
    }
    Ok(())
}

fn rgbe_to_f32(r: u8, g: u8, b: u8, e: u8) -> [f32; 3] {
    if e == 0 {
        return [0.0; 3];
    }
    // mantissa/256 * 2^(e-128), folded into one scale factor
    let scale = 2.0f32.powi(e as i32 - 136);
    [r as f32 * scale, g as f32 * scale, b as f32 * scale]
}

fn f32_to_rgbe(r: f32, g: f32, b: f32) -> [u8; 4] {
    let r = r.max(0.0);
    let g = g.max(0.0);
    let b = b.max(0.0);
    let max = r.max(g).max(b);
    if max < 1.0e-32 {
        return [0; 4];
    }

    let (mantissa, exponent) = frexp(max);
    let scale = mantissa * 256.0 / max;
    [
        (r * scale).clamp(0.0, 255.0) as u8,
        (g * scale).clamp(0.0, 255.0) as u8,
        (b * scale).clamp(0.0, 255.0) as u8,
        (exponent + 128) as u8,
    ]
}

/// Splits a positive float into mantissa in [0.5, 1) and power-of-two
/// exponent.
fn frexp(x: f32) -> (f32, i32) {
    if x == 0.0 {
        return (0.0, 0);
    }
    let exponent = x.abs().log2().floor() as i32 + 1;
    (x / 2.0f32.powi(exponent), exponent)
}

fn parse_resolution(line: &str) -> Option<(u32, u32)> {
    let mut width = None;
    let mut height = None;
    let mut tokens = line.split_whitespace();
    for _ in 0..2 {
        let axis = tokens.next()?;
        let value: u32 = tokens.next()?.parse().ok()?;
        match axis {
            "+X" | "-X" => width = Some(value),
            "+Y" | "-Y" => height = Some(value),
            _ => return None,
        }
    }
    if tokens.next().is_some() {
        return None;
    }
    match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
        _ => None,
    }
}

fn trim_line(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}
