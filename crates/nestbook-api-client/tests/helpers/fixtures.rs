use nestbook_core::CandidateFile;

/// Minimal JPEG-looking payload of `size` bytes.
pub fn jpeg(name: &str, size: usize) -> CandidateFile {
    let mut data = vec![0u8; size.max(4)];
    data[..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    data.truncate(size);
    CandidateFile::new(name, "image/jpeg", data)
}

pub fn pdf(name: &str, size: usize) -> CandidateFile {
    CandidateFile::new(name, "application/pdf", vec![b'%'; size])
}

/// `count` small JPEGs named `0.jpg`, `1.jpg`, ...
pub fn jpeg_batch(count: usize) -> Vec<CandidateFile> {
    (0..count).map(|i| jpeg(&format!("{}.jpg", i), 128)).collect()
}
