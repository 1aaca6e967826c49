//! ITK affine transforms in MATLAB v4 `.mat` files.
//!
//! This is the `0GenericAffine.mat` format ANTs writes. Each variable is a
//! header of five `i32` (type, rows, columns, imaginary flag, name length),
//! the null-terminated name, then column-major data. The type code is
//! `M·1000 + O·100 + P·10 + T` where `M` gives the byte order and `P` the
//! element type. Parameters are the 3×3 matrix in row-major order followed
//! by the translation; the `fixed` variable holds the centre. All values
//! are LPS.

use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use byteordered::{ByteOrdered, Endianness};
use lesionkit_core::spatial::Point;
use lesionkit_core::transform::AffineTransform;
use nalgebra::{Matrix3, Vector3};
use tracing::debug;

const PARAMETERS_NAME: &str = "AffineTransform_double_3_3";
const FIXED_NAME: &str = "fixed";

struct MatVariable {
    name: String,
    values: Vec<f64>,
}

fn detect_endianness(head: [u8; 4]) -> Result<Endianness> {
    let le = i32::from_le_bytes(head);
    if (0..1000).contains(&le) {
        return Ok(Endianness::Little);
    }
    let be = i32::from_be_bytes(head);
    if (1000..2000).contains(&be) {
        return Ok(Endianness::Big);
    }
    bail!("Not a MATLAB v4 variable header (type {le})")
}

fn read_variable(cursor: &mut Cursor<&[u8]>) -> Result<MatVariable> {
    let mut head = [0u8; 4];
    let start = cursor.position();
    cursor.read_exact(&mut head)?;
    cursor.set_position(start);
    let endianness = detect_endianness(head)?;

    let mut input = ByteOrdered::runtime(&mut *cursor, endianness);
    let type_code = input.read_i32()? % 1000;
    let rows = input.read_i32()?;
    let cols = input.read_i32()?;
    let imaginary = input.read_i32()?;
    let name_len = input.read_i32()?;
    if rows < 0 || cols < 0 || name_len <= 0 {
        bail!("Corrupt MATLAB v4 header: {rows}x{cols}, name length {name_len}");
    }
    if imaginary != 0 {
        bail!("Complex MATLAB variables are not supported");
    }

    let mut name = vec![0u8; name_len as usize];
    input.read_exact(&mut name)?;
    let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    let name = String::from_utf8_lossy(&name[..end]).into_owned();

    let count = rows as usize * cols as usize;
    let precision = (type_code / 10) % 10;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let v = match precision {
            0 => input.read_f64()?,
            1 => input.read_f32()? as f64,
            2 => input.read_i32()? as f64,
            3 => input.read_i16()? as f64,
            4 => input.read_u16()? as f64,
            5 => input.read_u8()? as f64,
            p => bail!("Unsupported MATLAB element type {p} in variable {name}"),
        };
        values.push(v);
    }
    Ok(MatVariable { name, values })
}

fn read_variables(bytes: &[u8]) -> Result<Vec<MatVariable>> {
    let mut cursor = Cursor::new(bytes);
    let mut variables = Vec::new();
    while (cursor.position() as usize) + 20 <= bytes.len() {
        variables.push(read_variable(&mut cursor)?);
    }
    Ok(variables)
}

/// Read an affine transform written by ITK or ANTs.
pub fn read_itk_affine<P: AsRef<Path>>(path: P) -> Result<AffineTransform> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let variables = read_variables(&bytes).with_context(|| format!("Failed to parse {}", path.display()))?;

    let parameters = variables
        .iter()
        .find(|v| v.name != FIXED_NAME && v.values.len() == 12)
        .with_context(|| format!("{} holds no 3D affine parameters", path.display()))?;
    let center = match variables.iter().find(|v| v.name == FIXED_NAME) {
        Some(fixed) if fixed.values.len() == 3 => Point::new([fixed.values[0], fixed.values[1], fixed.values[2]]),
        Some(fixed) => bail!("Fixed parameters have {} values, expected 3", fixed.values.len()),
        None => Point::origin(),
    };

    let p = &parameters.values;
    let matrix = Matrix3::new(p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7], p[8]);
    let translation = Vector3::new(p[9], p[10], p[11]);
    debug!(path = %path.display(), name = %parameters.name, "read affine transform");
    Ok(AffineTransform::new(matrix, translation, center))
}

fn write_variable<W: Write>(output: &mut ByteOrdered<W, Endianness>, name: &str, values: &[f64]) -> Result<()> {
    output.write_i32(0)?; // little endian, double, full numeric matrix
    output.write_i32(values.len() as i32)?;
    output.write_i32(1)?;
    output.write_i32(0)?;
    output.write_i32(name.len() as i32 + 1)?;
    output.write_all(name.as_bytes())?;
    output.write_all(&[0])?;
    for &v in values {
        output.write_f64(v)?;
    }
    Ok(())
}

/// Write `transform` as a little-endian double-precision ITK `.mat`.
pub fn write_itk_affine<P: AsRef<Path>>(path: P, transform: &AffineTransform) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut output = ByteOrdered::runtime(BufWriter::new(file), Endianness::Little);

    let m = transform.matrix();
    let t = transform.translation();
    let mut parameters = Vec::with_capacity(12);
    for r in 0..3 {
        for c in 0..3 {
            parameters.push(m[(r, c)]);
        }
    }
    parameters.extend_from_slice(&[t[0], t[1], t[2]]);

    write_variable(&mut output, PARAMETERS_NAME, &parameters)?;
    write_variable(&mut output, FIXED_NAME, &transform.center().to_array())?;
    output.flush()?;
    Ok(())
}
