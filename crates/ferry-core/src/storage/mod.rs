//! Local file I/O for chunked transfers.
//!
//! A download owns `<destination>.part`: preallocated to the object size,
//! written chunk by chunk at each chunk's start offset, then synced and
//! renamed onto the destination. Uploads read chunk spans positionally
//! from one shared handle.

mod builder;
mod reader;
mod writer;

pub use builder::PartFileBuilder;
pub use reader::ChunkReader;
pub use writer::PartFileWriter;

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `model.obj` → `model.obj.part`).
pub fn temp_path(final_path: &std::path::Path) -> std::path::PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    std::path::PathBuf::from(o)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn temp_path_appends_part() {
        let p = temp_path(Path::new("model.obj"));
        assert_eq!(p.to_string_lossy(), "model.obj.part");
        let p2 = temp_path(Path::new("/tmp/conversions/alice/model.obj"));
        assert_eq!(p2.to_string_lossy(), "/tmp/conversions/alice/model.obj.part");
    }

    #[test]
    fn out_of_order_writes_commit_in_offset_order() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("alice").join("output.bin");

        let mut builder = PartFileBuilder::create(&final_path).unwrap();
        builder.preallocate(12).unwrap();
        let tp = builder.temp_path().to_path_buf();
        assert_eq!(tp, temp_path(&final_path));
        assert_eq!(std::fs::metadata(&tp).unwrap().len(), 12);

        let writer = builder.build();
        let w2 = writer.clone();
        w2.write_at(8, b"CCCC").unwrap();
        writer.write_at(0, b"AAAA").unwrap();
        w2.write_at(4, b"BBBB").unwrap();
        drop(w2);
        assert_eq!(writer.commit().unwrap(), final_path);

        assert!(!tp.exists());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"AAAABBBBCCCC");
    }

    #[test]
    fn create_truncates_stale_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("output.bin");
        std::fs::write(temp_path(&final_path), b"stale bytes from a failed try").unwrap();

        let builder = PartFileBuilder::create(&final_path).unwrap();
        assert_eq!(std::fs::metadata(builder.temp_path()).unwrap().len(), 0);
    }

    #[test]
    fn reader_reads_exact_spans() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.stp");
        std::fs::write(&path, b"0123456789").unwrap();

        let reader = ChunkReader::open(&path).unwrap();
        assert_eq!(reader.len(), 10);
        assert_eq!(reader.read_at(3, 4).unwrap(), b"3456");
        assert_eq!(reader.read_at(9, 1).unwrap(), b"9");
        assert!(reader.read_at(8, 5).is_err(), "reading past EOF must fail");
    }
}
