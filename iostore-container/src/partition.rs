//! Partition file access.
//!
//! A container's content is split across one or more `.ucas` partition
//! files. Reads are positional so concurrent readers never contend on a
//! shared file cursor.

use std::fs::File;

use crate::error::{ContainerError, Result};

/// One physical content file of a mounted container.
#[derive(Debug)]
pub enum PartitionSource {
    /// A partition file opened read-only.
    File(File),
    /// An in-memory partition, used by memory mounts and fixtures.
    Memory(Vec<u8>),
}

impl PartitionSource {
    /// Read exactly `buf.len()` bytes at `offset`.
    ///
    /// Reaching end-of-partition before the buffer is full is a
    /// [`ContainerError::ShortRead`].
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        match self {
            Self::File(file) => read_file_at(file, offset, buf),
            Self::Memory(data) => {
                let start = offset as usize;
                let available = data.len().saturating_sub(start);
                if available < buf.len() {
                    return Err(ContainerError::ShortRead {
                        offset,
                        expected: buf.len(),
                        actual: available,
                    });
                }
                buf.copy_from_slice(&data[start..start + buf.len()]);
                Ok(())
            }
        }
    }
}

#[cfg(unix)]
fn read_file_at(file: &File, offset: u64, buf: &mut [u8]) -> Result<()> {
    use std::os::unix::fs::FileExt;

    let mut filled = 0usize;
    while filled < buf.len() {
        let n = match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            return Err(ContainerError::ShortRead {
                offset,
                expected: buf.len(),
                actual: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

#[cfg(windows)]
fn read_file_at(file: &File, offset: u64, buf: &mut [u8]) -> Result<()> {
    use std::os::windows::fs::FileExt;

    let mut filled = 0usize;
    while filled < buf.len() {
        let n = match file.seek_read(&mut buf[filled..], offset + filled as u64) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            return Err(ContainerError::ShortRead {
                offset,
                expected: buf.len(),
                actual: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_memory_read() {
        let partition = PartitionSource::Memory((0u8..32).collect());

        let mut buf = [0u8; 4];
        partition.read_exact_at(10, &mut buf).unwrap();
        assert_eq!(buf, [10, 11, 12, 13]);
    }

    #[test]
    fn test_memory_short_read() {
        let partition = PartitionSource::Memory(vec![0u8; 8]);

        let mut buf = [0u8; 16];
        let err = partition.read_exact_at(4, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            ContainerError::ShortRead {
                offset: 4,
                expected: 16,
                actual: 4,
            }
        ));
    }

    #[test]
    fn test_file_read() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0xABu8; 64]).unwrap();
        tmp.flush().unwrap();

        let partition = PartitionSource::File(File::open(tmp.path()).unwrap());
        let mut buf = [0u8; 16];
        partition.read_exact_at(32, &mut buf).unwrap();
        assert_eq!(buf, [0xAB; 16]);
    }

    #[test]
    fn test_file_short_read() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0u8; 8]).unwrap();
        tmp.flush().unwrap();

        let partition = PartitionSource::File(File::open(tmp.path()).unwrap());
        let mut buf = [0u8; 16];
        let err = partition.read_exact_at(0, &mut buf).unwrap_err();
        assert!(matches!(err, ContainerError::ShortRead { actual: 8, .. }));
    }
}
