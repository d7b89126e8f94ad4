//! Crash-safe in-place rewrites.
//!
//! The new image goes to a temporary file next to the original, which is
//! renamed over it only once fully written. Until then the original is not
//! touched, and dropping an uncommitted [`FileTransaction`] removes the
//! temporary file.

use std::ffi::OsString;
use std::fs::{self, File, FileTimes, Metadata, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::NamedTempFile;

use crate::constants::BACKUP_SUFFIX;
use crate::error::{Result, TransformError};
use crate::options::{TransformFlags, TransformOptions, TransformOutcome};
use crate::pipeline;
use crate::transform::TransformRequest;

pub struct FileTransaction {
    path: PathBuf,
    temp: NamedTempFile,
    backup: bool,
    times: Option<(SystemTime, SystemTime)>,
}

impl FileTransaction {
    /// Checks that `path` is readable and writable and prepares a temporary
    /// file carrying the same owner and permission bits.
    ///
    /// [`TransformFlags::FILE_BACKUP`] and [`TransformFlags::FILE_KEEP_TIME`]
    /// are honoured on commit.
    pub fn begin(path: &Path, flags: TransformFlags) -> Result<Self> {
        let file = open_source(path)?;
        let metadata = file.metadata()?;
        Self::start(path, &metadata, flags)
    }

    fn start(path: &Path, metadata: &Metadata, flags: TransformFlags) -> Result<Self> {
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut prefix = OsString::from(".");
        if let Some(name) = path.file_name() {
            prefix.push(name);
        }
        prefix.push(".");
        let temp = tempfile::Builder::new().prefix(&prefix).tempfile_in(directory)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            std::os::unix::fs::fchown(temp.as_file(), Some(metadata.uid()), Some(metadata.gid()))?;
        }
        temp.as_file().set_permissions(metadata.permissions())?;

        let times = if flags.contains(TransformFlags::FILE_KEEP_TIME) {
            Some((metadata.accessed()?, metadata.modified()?))
        } else {
            None
        };
        log::debug!("staging {} in {}", path.display(), temp.path().display());

        Ok(Self {
            path: path.to_path_buf(),
            temp,
            backup: flags.contains(TransformFlags::FILE_BACKUP),
            times,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// The temporary file the new content goes to.
    pub fn file(&mut self) -> &mut File {
        self.temp.as_file_mut()
    }

    /// Makes the new content visible under the original path.
    pub fn commit(self) -> Result<()> {
        self.temp.as_file().sync_all()?;

        if self.backup {
            let backup = backup_path(&self.path);
            // A stale backup from an earlier run is replaced.
            let _ = fs::remove_file(&backup);
            if fs::hard_link(&self.path, &backup).is_err() {
                fs::copy(&self.path, &backup)?;
            }
            log::debug!("backup at {}", backup.display());
        }

        let file = self.temp.persist(&self.path).map_err(|e| TransformError::Io(e.error))?;
        if let Some((accessed, modified)) = self.times {
            // Content is committed at this point.
            if let Err(e) = file.set_times(FileTimes::new().set_accessed(accessed).set_modified(modified)) {
                log::warn!("{}: could not restore file times: {e}", self.path.display());
            }
        }
        Ok(())
    }

    /// Deletes the temporary file. The original is left as it was.
    pub fn rollback(self) -> Result<()> {
        log::debug!("rolling back {}", self.path.display());
        self.temp.close()?;
        Ok(())
    }
}

fn open_source(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => TransformError::PermissionDenied(path.display().to_string()),
            _ => TransformError::Io(e),
        })
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

pub fn transform_file_in_place(
    path: &Path,
    request: TransformRequest,
    comment: Option<&[u8]>,
    thumbnail: Option<&[u8]>,
    flags: TransformFlags,
) -> Result<TransformOutcome> {
    let options = TransformOptions {
        request,
        comment,
        thumbnail,
        flags,
    };
    transform_file_in_place_with_options(path, &options)
}

/// Transforms the file at `path` and atomically replaces it.
///
/// When nothing needs to change the file is not written at all.
pub fn transform_file_in_place_with_options(path: &Path, options: &TransformOptions<'_>) -> Result<TransformOutcome> {
    transform_in_place_with(path, options, |file, data| file.write_all(data))
}

fn transform_in_place_with<F>(path: &Path, options: &TransformOptions<'_>, write: F) -> Result<TransformOutcome>
where
    F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
{
    let mut source = open_source(path)?;
    let metadata = source.metadata()?;
    let mut data = Vec::new();
    source.read_to_end(&mut data)?;
    drop(source);

    let Some(output) = pipeline::run(&data, options)? else {
        log::info!("{}: no change needed", path.display());
        return Ok(TransformOutcome::Unchanged);
    };

    let mut transaction = FileTransaction::start(path, &metadata, options.flags)?;
    match write(transaction.file(), &output) {
        Ok(()) => {
            transaction.commit()?;
            log::debug!("replaced {}", path.display());
            Ok(TransformOutcome::Transformed)
        }
        Err(e) => {
            if let Err(cleanup) = transaction.rollback() {
                log::warn!("could not remove temporary file: {cleanup}");
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::inspect;
    use crate::pipeline::tests::sample_jpeg;
    use std::time::{Duration, UNIX_EPOCH};

    fn entries(dir: &Path) -> Vec<OsString> {
        let mut names: Vec<_> = fs::read_dir(dir).unwrap().map(|e| e.unwrap().file_name()).collect();
        names.sort();
        names
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = OpenOptions::new().write(true).open(path).unwrap();
        file.set_times(FileTimes::new().set_accessed(time).set_modified(time)).unwrap();
    }

    #[test]
    fn rotates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        fs::write(&path, sample_jpeg(32, 16, Some(6))).unwrap();

        let outcome =
            transform_file_in_place(&path, TransformRequest::Automatic, None, None, TransformFlags::DEFAULT).unwrap();
        assert_eq!(outcome, TransformOutcome::Transformed);
        let info = inspect(&fs::read(&path).unwrap()).unwrap();
        assert_eq!((info.width, info.height), (16, 32));
        assert_eq!(u16::from(info.orientation), 1);
        assert_eq!(entries(dir.path()), [OsString::from("photo.jpg")]);
    }

    #[test]
    fn normal_orientation_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upright.jpg");
        let original = sample_jpeg(32, 16, Some(1));
        fs::write(&path, &original).unwrap();
        let old = UNIX_EPOCH + Duration::from_secs(1_000_000_000);
        set_mtime(&path, old);

        for _ in 0..2 {
            let outcome =
                transform_file_in_place(&path, TransformRequest::Automatic, None, None, TransformFlags::DEFAULT)
                    .unwrap();
            assert_eq!(outcome, TransformOutcome::Unchanged);
        }
        assert_eq!(fs::read(&path).unwrap(), original);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), old);
        assert_eq!(entries(dir.path()).len(), 1);
    }

    #[test]
    fn failed_write_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        let original = sample_jpeg(32, 16, Some(6));
        fs::write(&path, &original).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
        }

        let options = TransformOptions::new(TransformRequest::Automatic, TransformFlags::DEFAULT);
        let result = transform_in_place_with(&path, &options, |file, data| {
            file.write_all(&data[..data.len() / 2])?;
            Err(io::Error::other("disk full"))
        });
        assert!(matches!(result, Err(TransformError::Io(_))));
        assert_eq!(fs::read(&path).unwrap(), original);
        assert_eq!(entries(dir.path()), [OsString::from("photo.jpg")]);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o640);
        }
    }

    #[test]
    fn corrupt_source_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        let mut data = sample_jpeg(32, 16, Some(6));
        // Cut inside the Exif segment.
        data.truncate(40);
        fs::write(&path, &data).unwrap();

        let result = transform_file_in_place(&path, TransformRequest::Rotate90, None, None, TransformFlags::DEFAULT);
        assert!(result.is_err());
        assert_eq!(fs::read(&path).unwrap(), data);
        assert_eq!(entries(dir.path()).len(), 1);
    }

    #[test]
    fn backup_and_times_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        let original = sample_jpeg(32, 16, Some(3));
        fs::write(&path, &original).unwrap();
        fs::write(dir.path().join("photo.jpg~"), b"stale").unwrap();
        let old = UNIX_EPOCH + Duration::from_secs(1_200_000_000);
        set_mtime(&path, old);

        let flags = TransformFlags::DEFAULT | TransformFlags::FILE_BACKUP | TransformFlags::FILE_KEEP_TIME;
        let outcome = transform_file_in_place(&path, TransformRequest::Automatic, None, None, flags).unwrap();
        assert_eq!(outcome, TransformOutcome::Transformed);

        assert_eq!(fs::read(dir.path().join("photo.jpg~")).unwrap(), original);
        assert_ne!(fs::read(&path).unwrap(), original);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), old);
    }

    #[cfg(unix)]
    #[test]
    fn permissions_are_copied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("private.jpg");
        fs::write(&path, sample_jpeg(16, 16, Some(2))).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        transform_file_in_place(&path, TransformRequest::Automatic, None, None, TransformFlags::DEFAULT).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn rollback_removes_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        fs::write(&path, b"original").unwrap();

        let mut transaction = FileTransaction::begin(&path, TransformFlags::empty()).unwrap();
        let temp = transaction.temp_path().to_path_buf();
        assert!(temp.file_name().unwrap().to_string_lossy().starts_with(".photo.jpg."));
        transaction.file().write_all(b"partial").unwrap();
        transaction.rollback().unwrap();

        assert!(!temp.exists());
        assert_eq!(fs::read(&path).unwrap(), b"original");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileTransaction::begin(&dir.path().join("absent.jpg"), TransformFlags::empty());
        assert!(matches!(result, Err(TransformError::Io(_))));
    }
}
