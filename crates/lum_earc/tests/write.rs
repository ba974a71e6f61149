use lum_earc::{
    error::Error, EarcArchive, EarcEntry, EarcWriter, EarcWriterOptions, FileFlags, HeaderFlags,
    Payload, PayloadCipher,
};
use miette::Result;
use pretty_assertions::assert_eq;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{info, instrument};
use tracing_test::traced_test;

#[derive(Debug)]
struct XorCipher(u8);

impl PayloadCipher for XorCipher {
    fn encrypt(&self, data: &[u8]) -> lum_earc::error::Result<Vec<u8>> {
        Ok(data.iter().map(|b| b ^ self.0).collect())
    }

    fn decrypt(&self, data: &[u8]) -> lum_earc::error::Result<Vec<u8>> {
        self.encrypt(data)
    }
}

fn sample(size: usize, seed: u8) -> Vec<u8> {
    (0..size)
        .map(|i| (i as u8).wrapping_mul(13).wrapping_add(seed))
        .collect()
}

fn open(bytes: Vec<u8>) -> Result<EarcArchive<Cursor<Vec<u8>>>> {
    Ok(EarcArchive::new(Cursor::new(bytes))?)
}

/// An archive exercising every kind of entry
fn populated(flags: HeaderFlags) -> Result<EarcWriter> {
    let mut writer = EarcWriter::new(
        EarcWriterOptions::builder()
            .flags(flags)
            .chunk_size_kib(2)
            .build(),
    )
    .with_cipher(Arc::new(XorCipher(0x5A)));

    writer.add_file("data://text/readme.txt", b"read me".to_vec())?;
    writer.add_compressed_file("data://chr/nh00.gmdl", sample(10_000, 1), false)?;
    writer.add_compressed_file("data://chr/nh00.autoext", sample(100, 2), true)?;
    writer.add_autoload_file("data://boot/init.exml", sample(600, 3))?;
    writer.add_reference("data://shared/common.btex", false)?;
    writer.add_reference("data://shared/boot.btex", true)?;
    writer.add_entry(
        EarcEntry::builder()
            .uri("data://text/us/menu.txt")
            .localization_type(1)
            .locale(3)
            .payload(Payload::Owned(b"menu".to_vec()))
            .build(),
    )?;
    writer.add_entry(
        EarcEntry::builder()
            .uri("data://save/slot.bin")
            .flags(FileFlags::ENCRYPTED)
            .payload(Payload::Owned(sample(40, 4)))
            .build(),
    )?;

    Ok(writer)
}

#[instrument(skip(writer))]
fn assert_contents(writer: &EarcWriter) -> Result<()> {
    let mut archive =
        open(writer.to_bytes()?)?.with_cipher(Arc::new(XorCipher(0x5A)) as Arc<dyn PayloadCipher>);
    assert_eq!(archive.len(), writer.len());

    for entry in writer.entries() {
        info!("checking {}", entry.uri());
        let file = archive.by_name(entry.uri())?.clone();
        assert_eq!(file.flags, entry.flags());
        assert_eq!(file.relative_path.as_ref(), entry.relative_path());
        assert_eq!(file.localization_type, entry.localization_type());
        assert_eq!(file.locale, entry.locale());
        assert_eq!(u64::from(file.size), entry.size());

        match entry.payload() {
            Payload::Owned(data) => assert_eq!(&archive.read_by_name(entry.uri())?, data),
            Payload::Reference => assert!(file.is_reference()),
            Payload::Processed { .. } => {}
        }
    }

    Ok(())
}

#[traced_test]
#[test]
fn every_entry_kind_round_trips() -> Result<()> {
    assert_contents(&populated(HeaderFlags::empty())?)?;
    assert_contents(&populated(HeaderFlags::COPYGUARD | HeaderFlags::HAS_LOCALE_DATA)?)
}

#[traced_test]
#[test]
fn storage_order_is_independent_of_insertion() -> Result<()> {
    let uris = ["data://x.bin", "data://y.bin", "data://z.bin"];
    let insertions: [[usize; 3]; 3] = [[0, 1, 2], [2, 1, 0], [1, 0, 2]];

    let mut outputs = Vec::new();
    for order in insertions {
        let mut writer = EarcWriter::default();
        for index in order {
            match index {
                0 => writer.add_autoload_file(uris[0], b"autoload".to_vec())?,
                1 => writer.add_reference(uris[1], false)?,
                _ => writer.add_file(uris[2], b"regular".to_vec())?,
            }
        }

        let bytes = writer.to_bytes()?;
        let archive = open(bytes.clone())?;

        // regular files first, then references, autoload files last
        let names = archive.file_names().collect::<Vec<_>>();
        assert_eq!(names, vec![uris[2], uris[1], uris[0]]);

        let files = archive.files().collect::<Vec<_>>();
        assert!(files.windows(2).all(|w| w[0].uri_offset < w[1].uri_offset));
        assert!(files.windows(2).all(|w| w[0].data_offset <= w[1].data_offset));

        let first = files[0].uri_offset as usize;
        assert_eq!(&bytes[first..first + uris[2].len()], uris[2].as_bytes());

        outputs.push(bytes);
    }

    assert!(outputs.windows(2).all(|w| w[0] == w[1]));
    Ok(())
}

#[traced_test]
#[test]
fn autoext_files_precede_autoload_files() -> Result<()> {
    let mut writer = EarcWriter::default();
    writer.add_autoload_file("data://a/first.exml", b"autoload".to_vec())?;
    writer.add_file("data://a/packed.autoext", b"ext".to_vec())?;
    writer.add_file("data://a/plain.bin", b"plain".to_vec())?;

    let archive = open(writer.to_bytes()?)?;
    assert_eq!(
        archive.file_names().collect::<Vec<_>>(),
        vec!["data://a/plain.bin", "data://a/packed.autoext", "data://a/first.exml"]
    );
    Ok(())
}

#[traced_test]
#[test]
fn serialization_is_deterministic() -> Result<()> {
    let first = populated(HeaderFlags::COPYGUARD)?.to_bytes()?;
    let second = populated(HeaderFlags::COPYGUARD)?.to_bytes()?;
    assert_eq!(first, second);

    let other = populated(HeaderFlags::empty())?.to_bytes()?;
    assert_ne!(first, other);
    Ok(())
}

#[traced_test]
#[test]
fn repacking_reproduces_the_archive() -> Result<()> {
    for flags in [HeaderFlags::empty(), HeaderFlags::COPYGUARD] {
        let original = populated(flags)?.to_bytes()?;

        let cipher: Arc<dyn PayloadCipher> = Arc::new(XorCipher(0x5A));
        let with_cipher = open(original.clone())?.with_cipher(cipher).into_writer()?;
        assert_eq!(with_cipher.to_bytes()?, original);

        // encrypted files stay in their stored form without a cipher
        let without_cipher = open(original.clone())?.into_writer()?;
        assert!(matches!(
            without_cipher.entry("data://save/slot.bin")?.payload(),
            Payload::Processed { size: 40, .. }
        ));
        assert_eq!(without_cipher.to_bytes()?, original);
    }
    Ok(())
}

#[traced_test]
#[test]
fn modifications_show_up_in_the_next_serialization() -> Result<()> {
    let mut writer = populated(HeaderFlags::empty())?;
    let before = writer.to_bytes()?;

    writer.update_file("readme.txt", b"updated".to_vec())?;
    writer.remove_file("DATA://SHARED/COMMON.BTEX")?;
    writer.entry_mut("data://shared/boot.btex")?.set_data(b"now local".to_vec());
    let stored = vec![0x5A ^ 1, 0x5A ^ 2, 0x5A ^ 3];
    writer.update_file_with_processed_data("data://save/slot.bin", 3, stored)?;

    let after = writer.to_bytes()?;
    assert_ne!(before, after);

    let mut archive =
        open(after)?.with_cipher(Arc::new(XorCipher(0x5A)) as Arc<dyn PayloadCipher>);
    assert_eq!(archive.len(), 7);
    assert!(!archive.has_file("data://shared/common.btex"));
    assert_eq!(archive.read_by_name("data://text/readme.txt")?, b"updated".to_vec());
    assert_eq!(archive.read_by_name("data://shared/boot.btex")?, b"now local".to_vec());
    assert!(!archive.by_name("data://shared/boot.btex")?.is_reference());
    assert_eq!(archive.read_by_name("data://save/slot.bin")?, vec![1, 2, 3]);
    Ok(())
}

#[traced_test]
#[test]
fn writer_errors() -> Result<()> {
    let mut writer = populated(HeaderFlags::empty())?;

    assert!(matches!(
        writer.add_file("data://text/readme.txt", Vec::new()),
        Err(Error::DuplicateEntry(_))
    ));
    assert!(matches!(
        writer.update_file("not/there.txt", Vec::new()),
        Err(Error::FileNotFound(_))
    ));
    assert!(matches!(
        writer.remove_file("data://not/there.txt"),
        Err(Error::FileNotFound(_))
    ));

    let mut zero_chunks = EarcWriter::new(EarcWriterOptions::builder().chunk_size_kib(0).build());
    zero_chunks.add_compressed_file("data://a.bin", vec![1; 16], false)?;
    assert!(zero_chunks.to_bytes().is_err());
    Ok(())
}
