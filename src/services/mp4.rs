//! MP4 fast-start probing for progressive streaming
//!
//! A file is "fast-start" when the moov box (the index) precedes the mdat
//! box (the media data), so playback can begin before the whole file has
//! downloaded. Only the first chunk of a file is ever inspected.

/// Only the first 1 MiB of a file is scanned.
pub const MAX_SCAN_BYTES: usize = 1024 * 1024;

/// Top-level ISO-BMFF box header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mp4Box {
    pub box_type: String,
    pub size: u32,
    pub offset: usize,
}

/// Walk top-level box headers in `data`, up to `MAX_SCAN_BYTES`.
///
/// Each step reads a 4-byte big-endian size and a 4-byte ASCII type tag and
/// advances by the declared size. The walk stops at the buffer end, at a
/// box with declared size 0 (extends to end of file), or at the 64-bit
/// extended-size escape (size field 1), which is not resolved.
pub fn read_boxes(data: &[u8]) -> Vec<Mp4Box> {
    let mut boxes = Vec::new();
    let limit = data.len().min(MAX_SCAN_BYTES);
    let mut offset = 0usize;

    while offset + 8 <= limit {
        let size = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]);
        let box_type = String::from_utf8_lossy(&data[offset + 4..offset + 8]).into_owned();

        boxes.push(Mp4Box {
            box_type,
            size,
            offset,
        });

        // size 0: box extends to end of file; size 1: 64-bit escape.
        // Anything below the 8-byte header cannot advance the walk.
        if size < 8 {
            break;
        }

        offset += size as usize;
    }

    boxes
}

/// Decide whether the scanned prefix indicates a fast-start layout.
///
/// Both boxes found: fast-start iff moov comes first. Only moov: assume
/// fast-start. Only mdat, or neither: assume not — never promise
/// progressive playback the file cannot deliver.
pub fn is_fast_start(data: &[u8]) -> bool {
    let boxes = read_boxes(data);

    let moov = boxes.iter().position(|b| b.box_type == "moov");
    let mdat = boxes.iter().position(|b| b.box_type == "mdat");

    match (moov, mdat) {
        (Some(moov), Some(mdat)) => moov < mdat,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Debug summary of the scanned prefix.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Mp4Info {
    pub fast_start: bool,
    pub boxes: Vec<String>,
}

pub fn mp4_info(data: &[u8]) -> Mp4Info {
    let boxes = read_boxes(data);
    Mp4Info {
        fast_start: is_fast_start(data),
        boxes: boxes
            .iter()
            .map(|b| format!("{} ({} bytes at {})", b.box_type, b.size, b.offset))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(box_type: &[u8; 4], size: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(size as usize);
        data.extend_from_slice(&size.to_be_bytes());
        data.extend_from_slice(box_type);
        data.resize(size as usize, 0);
        data
    }

    #[test]
    fn test_moov_before_mdat_is_fast_start() {
        let mut data = make_box(b"moov", 200);
        data.extend(make_box(b"mdat", 64));
        assert!(is_fast_start(&data));
    }

    #[test]
    fn test_mdat_before_moov_is_not_fast_start() {
        let mut data = make_box(b"mdat", 64);
        data.extend(make_box(b"moov", 200));
        assert!(!is_fast_start(&data));
    }

    #[test]
    fn test_only_moov_assumes_fast_start() {
        let mut data = make_box(b"ftyp", 16);
        data.extend(make_box(b"moov", 200));
        assert!(is_fast_start(&data));
    }

    #[test]
    fn test_only_mdat_is_not_fast_start() {
        let data = make_box(b"mdat", 64);
        assert!(!is_fast_start(&data));
    }

    #[test]
    fn test_neither_box_is_not_fast_start() {
        let data = make_box(b"ftyp", 16);
        assert!(!is_fast_start(&data));
        assert!(!is_fast_start(&[]));
    }

    #[test]
    fn test_truncated_header_ignored() {
        // 6 bytes cannot hold a box header
        assert!(read_boxes(&[0, 0, 0, 16, b'f', b't']).is_empty());
    }

    #[test]
    fn test_size_zero_terminates_walk() {
        // Declared size 0 means "extends to EOF"; nothing after it is read
        let mut data = make_box(b"moov", 16);
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend(make_box(b"free", 16));

        let boxes = read_boxes(&data);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[1].box_type, "mdat");
        assert_eq!(boxes[1].size, 0);
        // moov first, mdat (unbounded) second
        assert!(is_fast_start(&data));
    }

    #[test]
    fn test_extended_size_escape_terminates_walk() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&64u64.to_be_bytes());
        data.extend(make_box(b"moov", 200));

        // The 64-bit size is not resolved; the walk stops at the escape
        let boxes = read_boxes(&data);
        assert_eq!(boxes.len(), 1);
        assert!(!is_fast_start(&data));
    }

    #[test]
    fn test_scan_is_bounded() {
        // A box that claims to extend past the scan window ends the walk
        let mut data = make_box(b"ftyp", 16);
        data.extend_from_slice(&(MAX_SCAN_BYTES as u32 * 2).to_be_bytes());
        data.extend_from_slice(b"mdat");

        let boxes = read_boxes(&data);
        assert_eq!(boxes.len(), 2);
    }
}
