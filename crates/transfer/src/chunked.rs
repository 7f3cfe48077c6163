use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::TransferError;
use crate::types::Chunk;

/// Reads a file in fixed-size chunks, addressed by chunk index.
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: u64,
    next_index: u64,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading, positioned at chunk 0.
    pub fn open(path: &Path, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "chunk size must be positive",
            )));
        }
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self {
            file,
            chunk_size,
            next_index: 0,
            file_size,
        })
    }

    /// Positions the reader at the start of chunk `index` (for resume).
    pub fn seek_to_chunk(&mut self, index: u64) -> Result<(), TransferError> {
        self.file.seek(SeekFrom::Start(index * self.chunk_size))?;
        self.next_index = index;
        Ok(())
    }

    /// Reads the next chunk: exactly `chunk_size` bytes, except at the end
    /// of the file. Returns `None` at EOF.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let mut data = Vec::with_capacity(self.chunk_size.min(self.remaining()) as usize);
        (&mut self.file).take(self.chunk_size).read_to_end(&mut data)?;
        if data.is_empty() {
            return Ok(None);
        }

        let chunk = Chunk {
            index: self.next_index,
            data,
        };
        self.next_index += 1;
        Ok(Some(chunk))
    }

    /// Bytes from the current position to the end of the file.
    pub fn remaining(&self) -> u64 {
        self.file_size
            .saturating_sub(self.next_index * self.chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn reads_all_chunks_in_order() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "clip.mp4", b"AABBCCDDEE");

        let mut reader = ChunkReader::open(&path, 4).unwrap();
        assert_eq!(reader.remaining(), 10);

        let c0 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c0.index, 0);
        assert_eq!(c0.data, b"AABB");

        let c1 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c1.index, 1);
        assert_eq!(c1.data, b"CCDD");

        let c2 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c2.index, 2);
        assert_eq!(c2.data, b"EE");

        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn seek_resumes_at_chunk_boundary() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "clip.mp4", b"0123456789");

        let mut reader = ChunkReader::open(&path, 4).unwrap();
        reader.seek_to_chunk(1).unwrap();
        assert_eq!(reader.remaining(), 6);

        let c = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c.index, 1);
        assert_eq!(c.data, b"4567");
        assert_eq!(reader.next_chunk().unwrap().unwrap().data, b"89");
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn exact_multiple_has_no_trailing_chunk() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "clip.mp4", b"abcd");

        let mut reader = ChunkReader::open(&path, 4).unwrap();
        assert_eq!(reader.next_chunk().unwrap().unwrap().data, b"abcd");
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn one_byte_over_gives_short_last_chunk() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "clip.mp4", b"abcde");

        let mut reader = ChunkReader::open(&path, 4).unwrap();
        reader.next_chunk().unwrap();
        let last = reader.next_chunk().unwrap().unwrap();
        assert_eq!(last.index, 1);
        assert_eq!(last.data, b"e");
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "a.jpg", b"x");
        assert!(ChunkReader::open(&path, 0).is_err());
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        match ChunkReader::open(&dir.path().join("gone.mp4"), 4) {
            Err(TransferError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected NotFound, got {:?}", other.err()),
        }
    }
}
