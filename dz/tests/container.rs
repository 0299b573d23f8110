//! Round-trip tests for dictzip containers on disk

use std::io::Read;

use dictzip::{DictZipError, DictZipOptions, DictZipReader, DictZipWriter, Staging};
use proptest::prelude::*;
use tempfile::TempDir;

fn write_container(data: &[u8], chunk_len: usize, staging: Staging) -> Vec<u8> {
    let mut writer = DictZipWriter::with_options(
        Vec::new(),
        DictZipOptions {
            chunk_len,
            staging,
            ..Default::default()
        },
    )
    .expect("Failed to create writer");
    writer.write(data).expect("Failed to write");
    writer.finish().expect("Failed to finish")
}

#[test]
fn test_large_stream_with_default_chunk_len() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let path = temp.path().join("large.data.dz");

    // Pseudo-random bytes compress poorly, which exercises the chunk size bound
    let mut state = 0x2545_f491_u32;
    let data: Vec<u8> = (0..200_000)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect();

    let mut writer = DictZipWriter::create(&path).expect("Failed to create writer");
    for piece in data.chunks(7777) {
        writer.write(piece).expect("Failed to write");
    }
    writer.finish().expect("Failed to finish");

    let mut reader = DictZipReader::open(&path).expect("Failed to open");
    assert_eq!(reader.chunk_count(), 4);
    reader.verify().expect("Container should verify");

    let offset = dictzip::DEFAULT_CHUNK_LEN as u64 - 5;
    reader.seek(offset).expect("Failed to seek");
    let mut buf = vec![0u8; 10];
    assert_eq!(reader.read(&mut buf).expect("Failed to read"), 10);
    assert_eq!(&buf[..], &data[offset as usize..offset as usize + 10]);
}

#[test]
fn test_magic_corruption_on_disk() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let path = temp.path().join("bad.data.dz");

    let mut bytes = write_container(b"<a/>", 64, Staging::Memory);
    bytes[0] = b'P';
    std::fs::write(&path, bytes).expect("Failed to write file");

    let err = DictZipReader::open(&path).err().expect("Open should fail");
    assert!(matches!(err, DictZipError::NotGzip));
}

#[test]
fn test_missing_file() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let err = DictZipReader::open(temp.path().join("nope.data.dz"))
        .err()
        .expect("Open should fail");
    assert!(matches!(err, DictZipError::Io(_)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn read_all_roundtrip(
        data in proptest::collection::vec(any::<u8>(), 0..4096),
        chunk_len in 1usize..600,
    ) {
        let bytes = write_container(&data, chunk_len, Staging::TempFile);
        let mut reader = DictZipReader::new(std::io::Cursor::new(bytes)).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        prop_assert_eq!(out, data);
        prop_assert!(reader.verify().is_ok());
    }

    #[test]
    fn seek_reads_exact_ranges(
        data in proptest::collection::vec(any::<u8>(), 1..4096),
        chunk_len in 1usize..600,
        start_frac in 0.0f64..1.0,
        len in 0usize..1500,
    ) {
        let bytes = write_container(&data, chunk_len, Staging::Memory);
        let mut reader = DictZipReader::new(std::io::Cursor::new(bytes)).unwrap();

        let start = ((data.len() as f64) * start_frac) as usize % data.len();
        let end = (start + len).min(data.len());
        reader.seek(start as u64).unwrap();
        let mut buf = vec![0u8; len];
        let n = reader.read(&mut buf).unwrap();
        prop_assert_eq!(n, end - start);
        prop_assert_eq!(&buf[..n], &data[start..end]);
    }
}
