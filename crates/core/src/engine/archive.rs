//! Zip packaging for multi-output conversions.

use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Packs `(name, bytes)` entries into a zip archive, in order.
pub fn zip_entries<N, B>(entries: impl IntoIterator<Item = (N, B)>) -> std::io::Result<Vec<u8>>
where
    N: Into<String>,
    B: AsRef<[u8]>,
{
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in entries {
        writer.start_file(name.into(), options).map_err(to_io)?;
        writer.write_all(bytes.as_ref())?;
    }

    let cursor = writer.finish().map_err(to_io)?;
    Ok(cursor.into_inner())
}

/// Entry name for frame `index` of a multi-frame conversion.
pub fn frame_entry_name(index: usize, extension: &str) -> String {
    format!("image{}.{}", index, extension.trim_start_matches('.'))
}

fn to_io(err: zip::result::ZipError) -> std::io::Error {
    std::io::Error::other(err)
}
