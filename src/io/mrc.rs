//! Reader for the first section of MRC/CCP4 micrographs.

use std::fs;
use std::path::Path;

use crate::error::{RepickError, RepickResult};
use crate::processing::filters::ImageF32;

const HEADER_LEN: usize = 1024;

/// First image section of an MRC file plus the header pixel size.
#[derive(Debug, Clone)]
pub struct MrcImage {
    pub image: ImageF32,
    /// Å/px along x, when the header carries a usable cell size.
    pub psize: Option<f64>,
}

struct Header<'a> {
    bytes: &'a [u8],
    big_endian: bool,
}

impl Header<'_> {
    fn word(&self, index: usize) -> [u8; 4] {
        let o = 4 * index;
        [
            self.bytes[o],
            self.bytes[o + 1],
            self.bytes[o + 2],
            self.bytes[o + 3],
        ]
    }

    fn int(&self, index: usize) -> i32 {
        if self.big_endian {
            i32::from_be_bytes(self.word(index))
        } else {
            i32::from_le_bytes(self.word(index))
        }
    }

    fn float(&self, index: usize) -> f32 {
        if self.big_endian {
            f32::from_be_bytes(self.word(index))
        } else {
            f32::from_le_bytes(self.word(index))
        }
    }
}

pub fn read_mrc<P: AsRef<Path>>(path: P) -> RepickResult<MrcImage> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| RepickError::Mrc {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_mrc(&bytes).map_err(|message| RepickError::Mrc {
        path: path.to_path_buf(),
        message,
    })
}

fn parse_mrc(bytes: &[u8]) -> Result<MrcImage, String> {
    if bytes.len() < HEADER_LEN {
        return Err(format!("file is {} bytes, shorter than the header", bytes.len()));
    }
    // Machine stamp 0x11 0x11 marks big-endian data.
    let header = Header {
        bytes: &bytes[..HEADER_LEN],
        big_endian: bytes[212] == 0x11,
    };

    let (nx, ny) = (header.int(0), header.int(1));
    if nx <= 0 || ny <= 0 {
        return Err(format!("invalid dimensions {} x {}", nx, ny));
    }
    let (w, h) = (nx as usize, ny as usize);
    let mode = header.int(3);
    let extended = header.int(23).max(0) as usize;

    let elem = match mode {
        0 => 1,
        1 | 6 => 2,
        2 => 4,
        m => return Err(format!("unsupported mode {}", m)),
    };
    let start = HEADER_LEN
        .checked_add(extended)
        .ok_or("extended header too large")?;
    let end = w
        .checked_mul(h)
        .and_then(|n| n.checked_mul(elem))
        .and_then(|n| n.checked_add(start))
        .ok_or_else(|| format!("section {} x {} is too large", w, h))?;
    let section = bytes
        .get(start..end)
        .ok_or_else(|| format!("data shorter than one {} x {} section", w, h))?;

    let be = header.big_endian;
    let data: Vec<f32> = section
        .chunks_exact(elem)
        .map(|b| match (mode, be) {
            (0, _) => b[0] as i8 as f32,
            (1, false) => i16::from_le_bytes([b[0], b[1]]) as f32,
            (1, true) => i16::from_be_bytes([b[0], b[1]]) as f32,
            (6, false) => u16::from_le_bytes([b[0], b[1]]) as f32,
            (6, true) => u16::from_be_bytes([b[0], b[1]]) as f32,
            (_, false) => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            (_, true) => f32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        })
        .collect();

    let mx = header.int(7);
    let xlen = header.float(10) as f64;
    let psize = (mx > 0 && xlen > 0.0).then(|| xlen / mx as f64);

    let image = ImageF32::from_vec(w, h, data).ok_or("section size mismatch")?;
    Ok(MrcImage { image, psize })
}
