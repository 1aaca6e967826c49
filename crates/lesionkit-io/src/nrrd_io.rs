//! 3D Slicer segmentation files (`.seg.nrrd`) holding two expert
//! annotations, one drawn on FLAIR and one on DWI.
//!
//! Slicer stores segments as `(layer, label value)` pairs of a 4D volume
//! `[layers, nx, ny, nz]` (first axis fastest on disk), or a plain 3D volume
//! when every segment shares one layer. Segment metadata lives in
//! `key:=value` pairs such as `Segment0_Name:=FLAIR lesion`.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, bail, ensure, Context, Result};
use burn::tensor::backend::Backend;
use flate2::read::GzDecoder;
use lesionkit_core::image::{CoordinateConvention, Frame, LabelImage};
use nalgebra::Matrix4;
use tracing::debug;

/// The two annotations of one subject, on a shared LPS grid.
#[derive(Debug, Clone)]
pub struct DualAnnotation<B: Backend> {
    pub flair: LabelImage<B>,
    pub dwi: LabelImage<B>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ElementType {
    fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "signed char" | "int8" | "int8_t" => Self::I8,
            "uchar" | "unsigned char" | "uint8" | "uint8_t" => Self::U8,
            "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => Self::I16,
            "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => Self::U16,
            "int" | "signed int" | "int32" | "int32_t" => Self::I32,
            "uint" | "unsigned int" | "uint32" | "uint32_t" => Self::U32,
            "longlong" | "long long" | "long long int" | "signed long long" | "int64" | "int64_t" => Self::I64,
            "ulonglong" | "unsigned long long" | "unsigned long long int" | "uint64" | "uint64_t" => Self::U64,
            "float" => Self::F32,
            "double" => Self::F64,
            other => bail!("Unsupported NRRD type '{other}'"),
        })
    }

    fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    fn decode(self, bytes: &[u8], big_endian: bool) -> f64 {
        macro_rules! num {
            ($t:ty) => {{
                let raw: [u8; std::mem::size_of::<$t>()] = bytes.try_into().unwrap_or_default();
                if big_endian {
                    <$t>::from_be_bytes(raw) as f64
                } else {
                    <$t>::from_le_bytes(raw) as f64
                }
            }};
        }
        match self {
            Self::I8 => bytes[0] as i8 as f64,
            Self::U8 => bytes[0] as f64,
            Self::I16 => num!(i16),
            Self::U16 => num!(u16),
            Self::I32 => num!(i32),
            Self::U32 => num!(u32),
            Self::I64 => num!(i64),
            Self::U64 => num!(u64),
            Self::F32 => num!(f32),
            Self::F64 => num!(f64),
        }
    }
}

/// Parsed header: basic fields and `key:=value` pairs.
#[derive(Debug, Default)]
struct NrrdHeader {
    fields: BTreeMap<String, String>,
    key_values: Vec<(String, String)>,
}

impl NrrdHeader {
    fn field(&self, name: &str) -> Result<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("NRRD header has no '{name}' field"))
    }

    fn value(&self, key: &str) -> Result<&str> {
        self.key_values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| anyhow!("NRRD header has no '{key}' entry"))
    }
}

/// Split the file into header and attached data.
fn parse_header(bytes: &[u8]) -> Result<(NrrdHeader, &[u8])> {
    ensure!(bytes.starts_with(b"NRRD"), "Missing NRRD magic");

    let mut header = NrrdHeader::default();
    let mut offset = 0;
    let mut first = true;
    loop {
        let rest = &bytes[offset..];
        let end = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| anyhow!("NRRD header is not terminated by a blank line"))?;
        let line = std::str::from_utf8(&rest[..end])
            .context("NRRD header is not UTF-8")?
            .trim_end_matches('\r');
        offset += end + 1;

        if first {
            first = false;
            continue;
        }
        if line.is_empty() {
            break;
        }
        if line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once(":=") {
            header.key_values.push((key.to_string(), value.to_string()));
        } else if let Some((key, value)) = line.split_once(": ") {
            header.fields.insert(key.trim().to_string(), value.trim().to_string());
        } else {
            bail!("Malformed NRRD header line '{line}'");
        }
    }
    Ok((header, &bytes[offset..]))
}

fn parse_vector(token: &str) -> Result<[f64; 3]> {
    let inner = token.trim().trim_start_matches('(').trim_end_matches(')');
    let parts = inner
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Bad NRRD vector '{token}'"))?;
    ensure!(parts.len() == 3, "NRRD vector '{token}' is not 3D");
    Ok([parts[0], parts[1], parts[2]])
}

/// Voxel grid from `sizes`, `space directions` and `space origin`.
fn parse_frame(header: &NrrdHeader, spatial_sizes: [usize; 3]) -> Result<Frame> {
    let space = header.field("space")?;
    ensure!(
        space == "left-posterior-superior",
        "Space should be 'left-posterior-superior', but it is '{space}'"
    );

    let directions = header
        .field("space directions")?
        .split_whitespace()
        .filter(|t| *t != "none")
        .map(parse_vector)
        .collect::<Result<Vec<_>>>()?;
    ensure!(directions.len() == 3, "Expected 3 spatial directions, found {}", directions.len());
    let origin = parse_vector(header.field("space origin")?)?;

    let mut affine = Matrix4::identity();
    for (c, column) in directions.iter().enumerate() {
        for r in 0..3 {
            affine[(r, c)] = column[r];
        }
    }
    for r in 0..3 {
        affine[(r, 3)] = origin[r];
    }
    Ok(Frame::from_affine(spatial_sizes, &affine, CoordinateConvention::Lps)?)
}

fn decode_data(header: &NrrdHeader, payload: &[u8], count: usize) -> Result<Vec<f64>> {
    let element = ElementType::parse(header.field("type")?)?;
    let big_endian = match header.fields.get("endian").map(String::as_str) {
        Some("big") => true,
        Some("little") | None => false,
        Some(other) => bail!("Unknown NRRD endianness '{other}'"),
    };

    let raw = match header.field("encoding")? {
        "raw" => payload.to_vec(),
        "gzip" | "gz" => {
            let mut out = Vec::with_capacity(count * element.size());
            GzDecoder::new(payload)
                .read_to_end(&mut out)
                .context("Failed to decompress NRRD data")?;
            out
        }
        other => bail!("Unsupported NRRD encoding '{other}'"),
    };

    let expected = count * element.size();
    ensure!(
        raw.len() >= expected,
        "NRRD data holds {} bytes, expected {expected}",
        raw.len()
    );
    Ok(raw[..expected]
        .chunks_exact(element.size())
        .map(|chunk| element.decode(chunk, big_endian))
        .collect())
}

/// Segment id (`Segment3`) of the single segment whose metadata mentions
/// `modality`, case-insensitively.
fn find_segment(header: &NrrdHeader, modality: &str) -> Result<(String, usize)> {
    let needle = modality.to_uppercase();
    let mut segment = None;
    let mut count = 0;
    for (key, value) in &header.key_values {
        if value.to_uppercase().contains(&needle) {
            count += 1;
            segment = key.split('_').next().map(str::to_string);
        }
    }
    Ok((segment.unwrap_or_default(), count))
}

fn segment_mask(
    header: &NrrdHeader,
    data: &[f64],
    segment: &str,
    layers: usize,
) -> Result<Vec<i64>> {
    let layer: usize = header
        .value(&format!("{segment}_Layer"))
        .unwrap_or("0")
        .trim()
        .parse()
        .with_context(|| format!("Bad layer index for {segment}"))?;
    let value: f64 = header
        .value(&format!("{segment}_LabelValue"))?
        .trim()
        .parse()
        .with_context(|| format!("Bad label value for {segment}"))?;
    ensure!(layer < layers, "{segment} refers to layer {layer} of {layers}");

    Ok(data
        .iter()
        .skip(layer)
        .step_by(layers)
        .map(|&v| (v == value) as i64)
        .collect())
}

/// Read the FLAIR and DWI annotations of a dual-annotation segmentation.
///
/// Fails unless the file is in LPS space and exactly one segment mentions
/// FLAIR and exactly one mentions DWI.
pub fn read_dual_annotation<B: Backend, P: AsRef<Path>>(
    path: P,
    device: &B::Device,
) -> Result<DualAnnotation<B>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let (header, payload) = parse_header(&bytes).with_context(|| format!("Failed to parse {}", path.display()))?;

    let (flair_segment, flair_count) = find_segment(&header, "FLAIR")?;
    let (dwi_segment, dwi_count) = find_segment(&header, "DWI")?;
    ensure!(
        flair_count == 1 && dwi_count == 1,
        "{}: There should be exactly one FLAIR and one DWI segmentation, but there are {flair_count} FLAIR segmentations and {dwi_count} DWI segmentations",
        path.display()
    );

    let sizes = header
        .field("sizes")?
        .split_whitespace()
        .map(|s| s.parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Bad NRRD sizes")?;
    let (layers, spatial) = match sizes.as_slice() {
        [l, x, y, z] => (*l, [*x, *y, *z]),
        [x, y, z] => (1, [*x, *y, *z]),
        other => bail!("Expected a 3D or 4D NRRD, found sizes {other:?}"),
    };

    let frame = parse_frame(&header, spatial)?;
    let data = decode_data(&header, payload, layers * frame.num_voxels())?;

    let flair = segment_mask(&header, &data, &flair_segment, layers)?;
    let dwi = segment_mask(&header, &data, &dwi_segment, layers)?;
    debug!(path = %path.display(), layers, size = ?spatial, "read dual annotation");

    Ok(DualAnnotation {
        flair: LabelImage::from_labels(flair, &frame, device)?,
        dwi: LabelImage::from_labels(dwi, &frame, device)?,
    })
}
