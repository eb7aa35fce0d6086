//! Archive entry extraction for vendor dataset downloads.

use std::ffi::OsStr;
use std::fs::File;
use std::io;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::{GeoError, Result};

/// Streams the first regular tar.gz entry whose name ends in `extension`
/// into `dest`. The archive is read sequentially; nothing besides the
/// matching entry is written anywhere.
pub fn extract_archive_entry(archive: &Path, extension: &str, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .map(|path| path.extension() == Some(OsStr::new(extension)))
            .unwrap_or(false);
        if !matches {
            continue;
        }
        let mut out = File::create(dest)?;
        io::copy(&mut entry, &mut out)?;
        return Ok(());
    }

    Err(GeoError::ArchiveFormat {
        extension: extension.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_extracts_first_matching_entry() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("bundle.tar.gz");
        let bytes = build_archive(&[
            ("GeoData_20260801/COPYRIGHT.txt", b"copyright"),
            ("GeoData_20260801/GeoData-City.mmdb", b"city-bytes"),
            ("GeoData_20260801/other.mmdb", b"other-bytes"),
        ]);
        std::fs::File::create(&archive_path)
            .unwrap()
            .write_all(&bytes)
            .unwrap();

        let dest = dir.path().join("city.mmdb");
        extract_archive_entry(&archive_path, "mmdb", &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"city-bytes");
    }

    #[test]
    fn test_missing_entry_is_an_archive_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("bundle.tar.gz");
        let bytes = build_archive(&[("readme.txt", b"nothing to see")]);
        std::fs::File::create(&archive_path)
            .unwrap()
            .write_all(&bytes)
            .unwrap();

        let dest = dir.path().join("city.mmdb");
        let err = extract_archive_entry(&archive_path, "mmdb", &dest).unwrap_err();
        assert!(matches!(err, GeoError::ArchiveFormat { .. }));
        assert!(!dest.exists());
    }
}
