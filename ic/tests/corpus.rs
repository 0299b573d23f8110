//! Indexed corpus round trips on disk

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use indexedcorpus::{
    Config, CorpusError, CorpusReader, IndexedCorpusReader, IndexedCorpusWriter, SortOrder,
    config::StagingMode,
};
use proptest::prelude::*;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn small_chunks(chunk_len: usize) -> Config {
    Config {
        chunk_len,
        ..Default::default()
    }
}

fn write_corpus(base: &Path, entries: &[(&str, &[u8])], config: &Config) {
    let writer =
        IndexedCorpusWriter::create_with_config(base, config).expect("Failed to create writer");
    for (name, payload) in entries {
        writer.write(name, payload).expect("Failed to write entry");
    }
    writer.finish().expect("Failed to finish corpus");
}

#[test]
fn test_two_entry_scenario() {
    init_tracing();
    let temp = TempDir::new().expect("Failed to create temp dir");
    let base = temp.path().join("scenario");

    write_corpus(
        &base,
        &[("a.xml", b"<a/>"), ("b/c.xml", b"<b><c/></b>")],
        &Config::default(),
    );
    assert!(base.with_extension("data.dz").exists());
    assert!(base.with_extension("index").exists());

    let reader = IndexedCorpusReader::open(base.with_extension("index")).expect("Failed to open");
    assert_eq!(reader.entries().collect::<Vec<_>>(), vec!["a.xml", "b/c.xml"]);
    assert_eq!(reader.read("a.xml").expect("Failed to read"), b"<a/>");
    assert_eq!(reader.read_to_string("b/c.xml").expect("Failed to read"), "<b><c/></b>");
    assert_eq!(reader.size(), 2);
    assert_eq!(reader.name(), base.display().to_string());
    reader.verify().expect("Corpus should verify");

    // Opening through the data file gives the same corpus
    let reader = IndexedCorpusReader::open(base.with_extension("data.dz")).expect("Failed to open");
    assert_eq!(reader.size(), 2);
}

#[test]
fn test_open_pair() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let base = temp.path().join("pair");
    write_corpus(&base, &[("x.xml", b"<x/>")], &Config::default());

    let data = temp.path().join("renamed.dz");
    let index = temp.path().join("renamed.idx");
    fs::rename(base.with_extension("data.dz"), &data).expect("Failed to rename");
    fs::rename(base.with_extension("index"), &index).expect("Failed to rename");

    let reader = IndexedCorpusReader::open_pair(&data, &index).expect("Failed to open pair");
    assert_eq!(reader.read("x.xml").expect("Failed to read"), b"<x/>");
}

#[test]
fn test_open_errors() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let err = IndexedCorpusReader::open(temp.path().join("corpus.dact"))
        .err()
        .expect("Open should fail");
    assert!(err.is_open_error());
    assert!(err.to_string().contains("not an indexed (.dz) corpus file"));

    let err = IndexedCorpusReader::open(temp.path().join("missing.index"))
        .err()
        .expect("Open should fail");
    assert!(err.is_open_error());

    // Index present, data missing
    let base = temp.path().join("half");
    write_corpus(&base, &[("a.xml", b"<a/>")], &Config::default());
    fs::remove_file(base.with_extension("data.dz")).expect("Failed to remove");
    let err = IndexedCorpusReader::open(base.with_extension("index"))
        .err()
        .expect("Open should fail");
    assert!(err.is_open_error());
}

#[test]
fn test_corrupted_magic() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let base = temp.path().join("corrupt");
    write_corpus(&base, &[("a.xml", b"<a/>")], &Config::default());

    let data_path = base.with_extension("data.dz");
    let mut bytes = fs::read(&data_path).expect("Failed to read");
    bytes[0] ^= 0xff;
    fs::write(&data_path, bytes).expect("Failed to write");

    let err = IndexedCorpusReader::open(&data_path).err().expect("Open should fail");
    assert!(err.is_open_error());
    assert!(err.to_string().starts_with("Cannot open \""));
}

#[test]
fn test_malformed_index_line() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let base = temp.path().join("malformed");
    write_corpus(&base, &[("a.xml", b"<a/>")], &Config::default());
    fs::write(base.with_extension("index"), "a.xml\tA\n").expect("Failed to write");

    let err = IndexedCorpusReader::open(base.with_extension("index"))
        .err()
        .expect("Open should fail");
    assert!(err.is_open_error());
}

#[test]
fn test_missing_entry() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let base = temp.path().join("lookup");
    write_corpus(&base, &[("a.xml", b"<a/>")], &Config::default());

    let reader = IndexedCorpusReader::open(base.with_extension("index")).expect("Failed to open");
    let err = reader.read("missing").unwrap_err();
    assert!(err.is_lookup_error());
    assert!(matches!(err, CorpusError::UnknownEntry(name) if name == "missing"));
}

#[test]
fn test_filename_with_spaces() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let base = temp.path().join("with spaces");
    write_corpus(&base, &[("filename with spaces.xml", b"<s/>")], &Config::default());

    let reader = IndexedCorpusReader::open(base.with_extension("index")).expect("Failed to open");
    assert_eq!(reader.entries().next(), Some("filename with spaces.xml"));
    assert_eq!(reader.read("filename with spaces.xml").expect("Failed to read"), b"<s/>");
}

#[test]
fn test_entries_span_chunks() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let base = temp.path().join("spanning");

    let big: Vec<u8> = (0..1000).flat_map(|i| format!("<w i=\"{}\"/>", i).into_bytes()).collect();
    let small = b"<s/>".to_vec();
    let entries: Vec<(&str, &[u8])> = vec![
        ("small1.xml", &small[..]),
        ("big.xml", &big[..]),
        ("small2.xml", &small[..]),
    ];
    write_corpus(&base, &entries, &small_chunks(100));

    let reader = IndexedCorpusReader::open(base.with_extension("index")).expect("Failed to open");
    let big_entry = reader.get("big.xml").expect("Entry should exist");
    assert!(big_entry.length > 3 * 100);

    // Reads in reverse order force backwards seeks
    for (name, payload) in entries.iter().rev() {
        assert_eq!(&reader.read(name).expect("Failed to read")[..], *payload);
    }
}

#[test]
fn test_entry_boundaries_do_not_bleed() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let base = temp.path().join("boundaries");

    let payloads: Vec<String> = (0..50)
        .map(|i| format!("<e n=\"{}\">{}</e>", i, "x".repeat(i % 13)))
        .collect();
    let names: Vec<String> = (0..50).map(|i| format!("{}.xml", i)).collect();
    let entries: Vec<(&str, &[u8])> = names
        .iter()
        .zip(&payloads)
        .map(|(n, p)| (n.as_str(), p.as_bytes()))
        .collect();
    write_corpus(&base, &entries, &small_chunks(7));

    let reader = IndexedCorpusReader::open(base.with_extension("index")).expect("Failed to open");
    let index = reader.index_entries();
    for pair in index.windows(2) {
        assert_eq!(pair[0].offset + pair[0].length, pair[1].offset);
    }
    for (name, payload) in &entries {
        assert_eq!(&reader.read(name).expect("Failed to read")[..], *payload);
    }
}

#[test]
fn test_numerical_order() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let base = temp.path().join("ordered");
    write_corpus(
        &base,
        &[("s10.xml", b"<a/>"), ("s9.xml", b"<b/>"), ("s1.xml", b"<c/>")],
        &Config::default(),
    );

    let reader = IndexedCorpusReader::open(base.with_extension("index")).expect("Failed to open");
    assert_eq!(
        reader.entries_ordered(SortOrder::Natural).collect::<Vec<_>>(),
        vec!["s10.xml", "s9.xml", "s1.xml"]
    );
    assert_eq!(
        reader.entries_ordered(SortOrder::Numerical).collect::<Vec<_>>(),
        vec!["s1.xml", "s9.xml", "s10.xml"]
    );
}

#[test]
fn test_fail_safe_copy_collects_errors() {
    init_tracing();
    let temp = TempDir::new().expect("Failed to create temp dir");
    let source_base = temp.path().join("source");
    write_corpus(
        &source_base,
        &[("1.xml", b"<one/>"), ("2.xml", b"<two/>"), ("3.xml", b"<three/>")],
        &Config::default(),
    );

    // Claim entry 2 runs far past the end of the data
    let index_path = source_base.with_extension("index");
    let index = fs::read_to_string(&index_path).expect("Failed to read index");
    let corrupted: String = index
        .lines()
        .map(|line| {
            if line.starts_with("2.xml\t") {
                let offset = line.split('\t').nth(1).expect("offset field");
                format!("2.xml\t{}\t{}\n", offset, indexedcorpus::b64::encode(1_000_000))
            } else {
                format!("{}\n", line)
            }
        })
        .collect();
    fs::write(&index_path, corrupted).expect("Failed to write index");

    let source = IndexedCorpusReader::open(&index_path).expect("Failed to open source");
    let target_base = temp.path().join("target");
    let target = IndexedCorpusWriter::create(&target_base).expect("Failed to create target");

    let err = target.write_corpus(&source, false).unwrap_err();
    let CorpusError::Batch(batch) = &err else {
        panic!("Expected a batch error, got {:?}", err);
    };
    assert_eq!(batch.len(), 1);
    assert_eq!(batch.names().collect::<Vec<_>>(), vec!["2.xml"]);
    assert!(err.to_string().starts_with("Errors in batch conversion:\n"));
    assert_eq!(err.to_string().lines().count(), 2);

    assert_eq!(target.len(), 2);
    target.finish().expect("Failed to finish target");

    let copy = IndexedCorpusReader::open(target_base.with_extension("index"))
        .expect("Failed to open copy");
    assert_eq!(copy.entries().collect::<Vec<_>>(), vec!["1.xml", "3.xml"]);
    assert_eq!(copy.read("1.xml").expect("Failed to read"), b"<one/>");
    assert_eq!(copy.read("3.xml").expect("Failed to read"), b"<three/>");
}

#[test]
fn test_fail_first_copy_stops() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let source_base = temp.path().join("source");
    write_corpus(
        &source_base,
        &[("1.xml", b"<one/>"), ("2.xml", b"<two/>"), ("3.xml", b"<three/>")],
        &Config::default(),
    );
    let index_path = source_base.with_extension("index");
    let index = fs::read_to_string(&index_path).expect("Failed to read index");
    let corrupted = index.replace("2.xml\tG\t", "2.xml\tG/\t");
    fs::write(&index_path, corrupted).expect("Failed to write index");

    let source = IndexedCorpusReader::open(&index_path).expect("Failed to open source");
    let target =
        IndexedCorpusWriter::create(temp.path().join("target")).expect("Failed to create target");

    let err = target.write_corpus(&source, true).unwrap_err();
    assert!(!matches!(err, CorpusError::Batch(_)));
    assert!(err.is_codec_error());
    assert_eq!(target.len(), 1);
}

#[test]
fn test_concurrent_reads() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let base = temp.path().join("shared");

    let payloads: Vec<Vec<u8>> = (0..40)
        .map(|i| format!("<doc id=\"{}\">{}</doc>", i, "w ".repeat(i * 3)).into_bytes())
        .collect();
    let names: Vec<String> = (0..40).map(|i| format!("doc{}.xml", i)).collect();
    let entries: Vec<(&str, &[u8])> = names
        .iter()
        .zip(&payloads)
        .map(|(n, p)| (n.as_str(), &p[..]))
        .collect();
    write_corpus(&base, &entries, &small_chunks(64));

    let reader =
        IndexedCorpusReader::open(base.with_extension("index")).expect("Failed to open");
    let reader = Arc::new(reader);
    let expected = Arc::new(payloads);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let reader = Arc::clone(&reader);
            let expected = Arc::clone(&expected);
            thread::spawn(move || {
                for round in 0..10 {
                    for i in (0..40).filter(|i| (i + t + round) % 3 == 0) {
                        let payload =
                            reader.read(&format!("doc{}.xml", i)).expect("Failed to read");
                        assert_eq!(payload, expected[i]);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Reader thread panicked");
    }
}

#[test]
fn test_concurrent_writes_stay_whole() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let base = temp.path().join("parallel");

    let writer = IndexedCorpusWriter::create_with_config(&base, &small_chunks(32))
        .expect("Failed to create");
    let writer = Arc::new(writer);
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || {
                for i in 0..25 {
                    let name = format!("t{}-{}.xml", t, i);
                    let payload = format!("<e t=\"{}\" i=\"{}\"/>", t, i);
                    writer.write(&name, payload.as_bytes()).expect("Failed to write");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Writer thread panicked");
    }

    let writer = Arc::try_unwrap(writer).ok().expect("Writer still shared");
    assert_eq!(writer.len(), 100);
    writer.finish().expect("Failed to finish");

    let reader = IndexedCorpusReader::open(base.with_extension("index")).expect("Failed to open");
    assert_eq!(reader.size(), 100);
    for name in reader.entries() {
        let (t, i) = name
            .trim_end_matches(".xml")
            .trim_start_matches('t')
            .split_once('-')
            .expect("name format");
        let expected = format!("<e t=\"{}\" i=\"{}\"/>", t, i);
        assert_eq!(reader.read_to_string(name).expect("Failed to read"), expected);
    }
}

#[test]
fn test_memory_staging_matches_temp_file() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let entries: &[(&str, &[u8])] = &[("a.xml", b"<a/>"), ("b.xml", b"<b>text</b>")];

    let mut config = small_chunks(8);
    write_corpus(&temp.path().join("file"), entries, &config);
    config.staging = StagingMode::Memory;
    write_corpus(&temp.path().join("memory"), entries, &config);

    for base in ["file", "memory"] {
        let path = temp.path().join(format!("{}.index", base));
        let reader = IndexedCorpusReader::open(path).expect("Failed to open");
        assert_eq!(reader.read("b.xml").expect("Failed to read"), b"<b>text</b>");
    }

    let a = fs::read(temp.path().join("file.index")).expect("Failed to read");
    let b = fs::read(temp.path().join("memory.index")).expect("Failed to read");
    assert_eq!(a, b);
}

#[test]
fn test_drop_finishes_corpus() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let base = temp.path().join("dropped");
    {
        let writer = IndexedCorpusWriter::create(&base).expect("Failed to create writer");
        writer.write("a.xml", b"<a/>").expect("Failed to write");
    }

    let reader = IndexedCorpusReader::open(base.with_extension("index")).expect("Failed to open");
    assert_eq!(reader.read("a.xml").expect("Failed to read"), b"<a/>");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn roundtrip_unique_names(
        payloads in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..300),
            0..20,
        ),
        chunk_len in 1usize..256,
    ) {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let base = temp.path().join("prop");
        let names: Vec<String> = (0..payloads.len()).map(|i| format!("entry {}.xml", i)).collect();
        let entries: Vec<(&str, &[u8])> = names
            .iter()
            .zip(&payloads)
            .map(|(n, p)| (n.as_str(), &p[..]))
            .collect();
        write_corpus(&base, &entries, &small_chunks(chunk_len));

        let reader =
            IndexedCorpusReader::open(base.with_extension("index")).expect("Failed to open");
        prop_assert_eq!(reader.size(), entries.len());
        let expected: Vec<&str> = names.iter().map(String::as_str).collect();
        prop_assert_eq!(reader.entries().collect::<Vec<_>>(), expected);
        for (name, payload) in &entries {
            prop_assert_eq!(&reader.read(name).expect("Failed to read")[..], *payload);
        }
    }
}
