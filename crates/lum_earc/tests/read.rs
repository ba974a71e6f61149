use binrw::BinRead;
use lum_earc::{
    cipher::{self, MaskState},
    error::Error,
    hash,
    types::{EarcHeader, EarcRecord},
    EarcArchive, EarcWriter, EarcWriterOptions, FileFlags, HeaderFlags, PayloadCipher,
};
use miette::Result;
use pretty_assertions::assert_eq;
use std::io::{Cursor, Write};
use std::sync::Arc;
use tracing::info;
use tracing_test::traced_test;

/// Reverses the bytes and flips every bit, enough to tell stored and plain data apart
#[derive(Debug)]
struct ReverseCipher;

impl PayloadCipher for ReverseCipher {
    fn encrypt(&self, data: &[u8]) -> lum_earc::error::Result<Vec<u8>> {
        Ok(data.iter().rev().map(|b| !b).collect())
    }

    fn decrypt(&self, data: &[u8]) -> lum_earc::error::Result<Vec<u8>> {
        Ok(data.iter().rev().map(|b| !b).collect())
    }
}

fn sample(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 7 % 253) as u8).collect()
}

fn open(bytes: Vec<u8>) -> Result<EarcArchive<Cursor<Vec<u8>>>> {
    Ok(EarcArchive::new(Cursor::new(bytes))?)
}

#[traced_test]
#[test]
fn write_then_read_back() -> Result<()> {
    let mut writer = EarcWriter::default();
    writer.add_file("data://test/a.txt", b"hello".to_vec())?;
    writer.add_reference("data://test/b.txt", false)?;

    let mut archive = open(writer.to_bytes()?)?;
    assert_eq!(archive.len(), 2);
    assert!(archive.hash_matches());

    let a = archive.by_name("data://test/a.txt")?.clone();
    assert_eq!(a.size, 5);
    assert_eq!(a.processed_size, 5);
    assert_eq!(a.relative_path.as_ref(), "test/a.txt");
    assert_eq!(a.data_offset % 512, 0);
    assert_eq!(archive.read_by_name("data://test/a.txt")?, b"hello".to_vec());

    let b = archive.by_name("data://test/b.txt")?.clone();
    assert!(b.is_reference());
    assert_eq!(b.size, 0);
    assert!(matches!(
        archive.read_by_name("data://test/b.txt"),
        Err(Error::PayloadNotLoaded(_))
    ));

    Ok(())
}

#[traced_test]
#[test]
fn compressed_files_span_chunks() -> Result<()> {
    let data = sample(5 * 1024 + 3);
    let mut writer = EarcWriter::new(EarcWriterOptions::builder().chunk_size_kib(1).build());
    writer.add_file("data://first.bin", vec![1; 3])?;
    writer.add_compressed_file("data://level/map.bin", data.clone(), false)?;
    writer.add_compressed_file("data://level/exact.bin", sample(2048), false)?;

    let mut archive = open(writer.to_bytes()?)?;
    assert_eq!(archive.header().chunk_size, 1);

    let file = archive.by_name("data://level/map.bin")?.clone();
    assert!(file.is_compressed());
    assert_eq!(file.size as usize, data.len());
    assert!((file.processed_size as usize) < data.len());

    assert_eq!(archive.read_by_name("data://level/map.bin")?, data);
    assert_eq!(archive.read_by_name("data://level/exact.bin")?, sample(2048));
    Ok(())
}

#[traced_test]
#[test]
fn query_lookups() -> Result<()> {
    let mut writer = EarcWriter::default();
    writer.add_file("data://menu/title.txt", b"title".to_vec())?;
    writer.add_file("data://menu/credits.txt", b"credits".to_vec())?;
    writer.add_file("data://level/map.bin", b"map".to_vec())?;
    writer.add_reference("data://menu/remote.txt", false)?;

    let mut archive = open(writer.to_bytes()?)?;

    let (uri, data) = archive.by_query("MENU/TITLE")?;
    assert_eq!(uri, "data://menu/title.txt");
    assert_eq!(data, b"title".to_vec());

    assert!(matches!(
        archive.by_query("missing"),
        Err(Error::FileNotFound(_))
    ));

    let menu = archive.files_by_query("menu/")?;
    assert_eq!(menu.len(), 2);
    assert_eq!(menu["data://menu/credits.txt"], b"credits".to_vec());
    assert!(!menu.contains_key("data://menu/remote.txt"));
    assert!(archive.files_by_query("MENU/")?.is_empty());

    assert_eq!(archive.uri_by_query("map.bin"), Some("data://level/map.bin"));
    Ok(())
}

#[traced_test]
#[test]
fn read_file_by_query_from_disk() -> Result<()> {
    let mut writer = EarcWriter::default();
    writer.add_file("data://menu/title.txt", b"title".to_vec())?;

    let path = std::env::temp_dir().join(format!("lum_earc_query_{}.earc", std::process::id()));
    writer.write_to_file(&path)?;
    info!("wrote {}", path.display());

    let data = lum_earc::read_file_by_query(&path, "title")?;
    let missing = lum_earc::read_file_by_query(&path, "credits");
    std::fs::remove_file(&path).ok();

    assert_eq!(data, b"title".to_vec());
    assert!(matches!(missing, Err(Error::FileNotFound(_))));
    Ok(())
}

#[traced_test]
#[test]
fn copyguard_round_trip() -> Result<()> {
    let mut writer = EarcWriter::new(
        EarcWriterOptions::builder()
            .flags(HeaderFlags::COPYGUARD)
            .build(),
    );
    writer.add_compressed_file("data://secret/model.gmdl", sample(9000), false)?;
    writer.add_file("data://secret/readme.txt", b"plain".to_vec())?;

    let mut archive = open(writer.to_bytes()?)?;
    assert!(archive.header().is_protected());
    assert!(archive.header().is_copyguarded());

    let model = archive.by_name("data://secret/model.gmdl")?.clone();
    assert_eq!(model.key, cipher::derive_key("data://secret/model.gmdl"));
    assert_eq!(model.relative_path.as_ref(), "secret/model.gmdl.gfxbin");
    assert_eq!(archive.read_by_name("data://secret/model.gmdl")?, sample(9000));
    assert_eq!(archive.by_name("data://secret/readme.txt")?.key, 0);
    assert_eq!(archive.read_by_name("data://secret/readme.txt")?, b"plain".to_vec());
    Ok(())
}

#[traced_test]
#[test]
fn keystream_covers_stored_bytes() -> Result<()> {
    let mut writer = EarcWriter::default();
    writer.add_compressed_file("data://keyed.bin", sample(100), false)?;
    writer.entry_mut("data://keyed.bin")?.set_key(0x4242);

    let mut archive = open(writer.to_bytes()?)?;
    let index = archive
        .index_for_name("data://keyed.bin")
        .ok_or(Error::CustomError("missing entry".into()))?;

    let raw = archive.read_raw(index)?;
    let mut stored = lum_earc::compression::compress(
        &sample(100),
        archive.header().chunk_size_bytes(),
        archive.header().data_offset as u64,
        flate2::Compression::default(),
    )?;
    cipher::apply_keystream(0x4242, &mut stored);

    assert_eq!(raw, stored);
    assert_eq!(archive.materialize(index)?, sample(100));
    Ok(())
}

#[traced_test]
#[test]
fn encrypted_files_need_a_cipher() -> Result<()> {
    let cipher: Arc<dyn PayloadCipher> = Arc::new(ReverseCipher);

    let mut writer = EarcWriter::default();
    writer.add_entry(
        lum_earc::EarcEntry::builder()
            .uri("data://locked/save.bin")
            .flags(FileFlags::ENCRYPTED)
            .payload(lum_earc::Payload::Owned(b"locked content".to_vec()))
            .build(),
    )?;

    assert!(matches!(
        writer.to_bytes(),
        Err(Error::CipherUnavailable(uri)) if uri == "data://locked/save.bin"
    ));

    let writer = writer.with_cipher(cipher.clone());
    let bytes = writer.to_bytes()?;

    let mut locked = open(bytes.clone())?;
    assert!(matches!(
        locked.read_by_name("data://locked/save.bin"),
        Err(Error::CipherUnavailable(_))
    ));

    let mut unlocked = open(bytes)?.with_cipher(cipher);
    assert_eq!(
        unlocked.read_by_name("data://locked/save.bin")?,
        b"locked content".to_vec()
    );
    Ok(())
}

#[traced_test]
#[test]
fn records_are_masked_on_disk() -> Result<()> {
    let mut writer = EarcWriter::default();
    writer.add_file("data://a.bin", sample(10))?;
    writer.add_file("data://b.bin", sample(20))?;
    let bytes = writer.to_bytes()?;

    let mut cursor = Cursor::new(&bytes);
    let header = EarcHeader::read(&mut cursor).map_err(Error::from)?;
    let stored = (0..header.file_count)
        .map(|_| EarcRecord::read(&mut cursor))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)?;

    let (_, unmasked) = cipher::apply_mask(MaskState::new(&header), stored.clone());
    assert_ne!(stored, unmasked);

    let archive = open(bytes)?;
    for (record, file) in unmasked.iter().zip(archive.files()) {
        assert_eq!(record.size, file.size);
        assert_eq!(record.processed_size, file.processed_size);
        assert_eq!(record.data_offset, file.data_offset);
        assert_eq!(record.uri_type_hash, hash::uri_type_hash(&file.uri));
    }
    Ok(())
}

#[traced_test]
#[test]
fn mask_protected_records_are_stored_plain() -> Result<()> {
    let mut writer = EarcWriter::default();
    writer.add_entry(
        lum_earc::EarcEntry::builder()
            .uri("data://open.bin")
            .flags(FileFlags::MASK_PROTECTED)
            .payload(lum_earc::Payload::Owned(sample(33)))
            .build(),
    )?;
    writer.add_file("data://other.bin", sample(12))?;

    let bytes = writer.to_bytes()?;
    let mut cursor = Cursor::new(&bytes);
    let header = EarcHeader::read(&mut cursor).map_err(Error::from)?;
    let records = (0..header.file_count)
        .map(|_| EarcRecord::read(&mut cursor))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)?;

    let open_record = records
        .iter()
        .find(|r| r.uri_type_hash == hash::uri_type_hash("data://open.bin"))
        .ok_or(Error::CustomError("missing record".into()))?;
    assert_eq!(open_record.size, 33);
    assert_eq!(open_record.processed_size, 33);

    let mut archive = open(bytes)?;
    assert_eq!(archive.read_by_name("data://open.bin")?, sample(33));
    assert_eq!(archive.read_by_name("data://other.bin")?, sample(12));
    Ok(())
}

#[traced_test]
#[test]
fn tampered_header_hash_still_reads() -> Result<()> {
    let mut writer = EarcWriter::default();
    writer.add_file("data://a.bin", sample(10))?;
    let mut bytes = writer.to_bytes()?;

    // flip the chunk size, which is covered by the hash but not used by stored files
    bytes[0x24] ^= 0x01;
    let archive = open(bytes)?;
    assert!(!archive.hash_matches());
    assert!(logs_contain("hash"));
    Ok(())
}

#[traced_test]
#[test]
fn truncated_archive_fails() -> Result<()> {
    let mut writer = EarcWriter::default();
    writer.add_file("data://a.bin", sample(10))?;
    let bytes = writer.to_bytes()?;

    assert!(matches!(
        EarcArchive::new(Cursor::new(bytes[..40].to_vec())),
        Err(Error::MalformedHeader(_))
    ));

    let mut not_earc = Vec::new();
    not_earc.write_all(b"RIFF").map_err(Error::from)?;
    not_earc.extend_from_slice(&bytes[4..]);
    assert!(matches!(
        EarcArchive::new(Cursor::new(not_earc)),
        Err(Error::InvalidArchive)
    ));
    Ok(())
}
