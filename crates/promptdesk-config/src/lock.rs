use std::fs::File;
use std::path::Path;

/// Exclusive advisory lock held for as long as the value lives.
///
/// Blocks until every other holder of the same path has dropped theirs.
pub struct FileLock {
    _file: File,
}

impl FileLock {
    pub fn acquire_exclusive(lock_path: &Path) -> Result<Self, std::io::Error> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(lock_path)?;
        lock_exclusive(&file)?;
        Ok(FileLock { _file: file })
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> Result<(), std::io::Error> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    let result = unsafe { libc::flock(fd, libc::LOCK_EX) };
    if result != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> Result<(), std::io::Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("nested").join("users.lock");

        let lock = FileLock::acquire_exclusive(&lock_path).unwrap();
        assert!(lock_path.exists());
        drop(lock);

        // Released on drop, so a second acquisition does not block.
        let _again = FileLock::acquire_exclusive(&lock_path).unwrap();
    }
}
