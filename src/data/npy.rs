//! NumPy `.npy` reading and writing
//!
//! Target vertex offsets arrive as one `.npy` file per animation frame, and
//! preview mode writes its predictions in the same format. Only the v1.0
//! little-endian layout is needed here.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Raw NPY array: shape, dtype string and data bytes
#[derive(Debug, Clone)]
pub struct NpyArray {
    /// Shape of the array
    pub shape: Vec<usize>,
    /// Data type string (e.g., "<f4")
    pub dtype: String,
    /// Raw data bytes
    pub data: Vec<u8>,
}

impl NpyArray {
    /// Total number of elements
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// True when the array holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interpret the data as little-endian f32
    pub fn as_f32(&self) -> Result<Vec<f32>> {
        if !self.dtype.contains("f4") && !self.dtype.contains("float32") {
            anyhow::bail!("expected float32 data, got {}", self.dtype);
        }

        let floats: Vec<f32> = self
            .data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(floats)
    }
}

/// Load an NPY file
pub fn load_npy<P: AsRef<Path>>(path: P) -> Result<NpyArray> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("failed to open npy file: {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic[..] != b"\x93NUMPY" {
        anyhow::bail!("invalid npy magic number: {}", path.display());
    }

    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;

    let header_len = if version[0] == 1 {
        let mut len_bytes = [0u8; 2];
        reader.read_exact(&mut len_bytes)?;
        u16::from_le_bytes(len_bytes) as usize
    } else {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        u32::from_le_bytes(len_bytes) as usize
    };

    let mut header_bytes = vec![0u8; header_len];
    reader.read_exact(&mut header_bytes)?;
    let header = String::from_utf8_lossy(&header_bytes);

    let dtype = parse_dtype(&header)?;
    let shape = parse_shape(&header)?;

    let elem_size = match dtype.as_str() {
        s if s.contains("f4") => 4,
        s if s.contains("f8") => 8,
        s if s.contains("i4") => 4,
        s if s.contains("i8") => 8,
        _ => anyhow::bail!("unsupported npy dtype {} in {}", dtype, path.display()),
    };
    let data_size = shape.iter().product::<usize>() * elem_size;

    let mut data = vec![0u8; data_size];
    reader
        .read_exact(&mut data)
        .with_context(|| format!("truncated npy data in {}", path.display()))?;

    Ok(NpyArray { shape, dtype, data })
}

/// Load an NPY file as an f32 vector plus its shape
pub fn load_npy_f32<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, Vec<usize>)> {
    let arr = load_npy(path)?;
    let data = arr.as_f32()?;
    Ok((data, arr.shape))
}

/// Write an f32 array as a v1.0 NPY file
pub fn write_npy_f32<P: AsRef<Path>>(path: P, data: &[f32], shape: &[usize]) -> Result<()> {
    let path = path.as_ref();
    let count: usize = shape.iter().product();
    if count != data.len() {
        anyhow::bail!(
            "shape {:?} does not match {} data elements",
            shape,
            data.len()
        );
    }

    let shape_str = if shape.len() == 1 {
        format!("({},)", shape[0])
    } else {
        let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
        format!("({})", dims.join(", "))
    };
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': {}, }}",
        shape_str
    );
    // Pad so the data section starts on a 64-byte boundary
    let unpadded = 6 + 2 + 2 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    let file = File::create(path)
        .with_context(|| format!("failed to create npy file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(b"\x93NUMPY")?;
    writer.write_all(&[1u8, 0u8])?;
    writer.write_all(&(header.len() as u16).to_le_bytes())?;
    writer.write_all(header.as_bytes())?;
    for v in data {
        writer.write_all(&v.to_le_bytes())?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write npy file: {}", path.display()))?;
    Ok(())
}

/// Parse dtype from an NPY header
fn parse_dtype(header: &str) -> Result<String> {
    let start = header
        .find("'descr'")
        .or_else(|| header.find("\"descr\""))
        .ok_or_else(|| anyhow::anyhow!("no descr in npy header"))?;

    let rest = &header[start..];
    let colon = rest
        .find(':')
        .ok_or_else(|| anyhow::anyhow!("no colon after descr"))?;
    let after_colon = &rest[colon + 1..];

    let quote_start = after_colon
        .find(['\'', '"'])
        .ok_or_else(|| anyhow::anyhow!("no dtype string"))?;
    let quote_char = after_colon[quote_start..]
        .chars()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no dtype string"))?;
    let dtype_start = quote_start + 1;
    let dtype_end = after_colon[dtype_start..]
        .find(quote_char)
        .ok_or_else(|| anyhow::anyhow!("unclosed dtype string"))?;

    Ok(after_colon[dtype_start..dtype_start + dtype_end].to_string())
}

/// Parse shape from an NPY header
fn parse_shape(header: &str) -> Result<Vec<usize>> {
    let start = header
        .find("'shape'")
        .or_else(|| header.find("\"shape\""))
        .ok_or_else(|| anyhow::anyhow!("no shape in npy header"))?;

    let rest = &header[start..];
    let paren_start = rest
        .find('(')
        .ok_or_else(|| anyhow::anyhow!("no shape tuple"))?;
    let paren_end = rest
        .find(')')
        .ok_or_else(|| anyhow::anyhow!("unclosed shape tuple"))?;

    let shape_str = &rest[paren_start + 1..paren_end];
    shape_str
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse::<usize>()
                .map_err(|e| anyhow::anyhow!("invalid shape element: {}", e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dtype() {
        let header = "{'descr': '<f4', 'fortran_order': False, 'shape': (1, 2, 3)}";
        assert_eq!(parse_dtype(header).unwrap(), "<f4");
    }

    #[test]
    fn test_parse_shape() {
        let header = "{'descr': '<f4', 'fortran_order': False, 'shape': (1, 2, 3)}";
        assert_eq!(parse_shape(header).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_shape_1d() {
        let header = "{'descr': '<f4', 'fortran_order': False, 'shape': (100,)}";
        assert_eq!(parse_shape(header).unwrap(), vec![100]);
    }

    #[test]
    fn test_as_f32() {
        let data: Vec<u8> = [0.0f32, 1.0, 2.0]
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();
        let arr = NpyArray {
            shape: vec![3],
            dtype: "<f4".to_string(),
            data,
        };
        assert_eq!(arr.as_f32().unwrap(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offsets.npy");
        let data: Vec<f32> = (0..12).map(|i| i as f32 * 0.25 - 1.0).collect();
        write_npy_f32(&path, &data, &[12]).unwrap();

        let (loaded, shape) = load_npy_f32(&path).unwrap();
        assert_eq!(shape, vec![12]);
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_write_read_2d() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.npy");
        let data: Vec<f32> = (0..6).map(|i| i as f32).collect();
        write_npy_f32(&path, &data, &[2, 3]).unwrap();

        let arr = load_npy(&path).unwrap();
        assert_eq!(arr.shape, vec![2, 3]);
        assert_eq!(arr.dtype, "<f4");
        assert_eq!(arr.as_f32().unwrap(), data);
    }

    #[test]
    fn test_write_rejects_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.npy");
        assert!(write_npy_f32(&path, &[1.0, 2.0], &[3]).is_err());
    }

    #[test]
    fn test_header_alignment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aligned.npy");
        write_npy_f32(&path, &[1.0f32], &[1]).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        // Data section must start on a 64-byte boundary
        assert_eq!((bytes.len() - 4) % 64, 0);
    }
}
