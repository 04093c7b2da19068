use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use tracing::debug;

use crate::error::{Error, Result};

/// What to do when the target `.torrent` file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    Overwrite,
    Fail,
    /// Write `name (1).torrent`, `name (2).torrent`, ...
    Rename,
}

impl Default for OverwritePolicy {
    fn default() -> Self {
        OverwritePolicy::Overwrite
    }
}

impl OverwritePolicy {
    pub const VALUES: &'static [&'static str] = &["overwrite", "fail", "rename"];
}

impl FromStr for OverwritePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "overwrite" => Ok(OverwritePolicy::Overwrite),
            "fail" => Ok(OverwritePolicy::Fail),
            "rename" => Ok(OverwritePolicy::Rename),
            _ => Err(Error::InvalidArgument(format!(
                "Unknown conflict policy: {}",
                s
            ))),
        }
    }
}

/// Make a display name usable as a single path component.
pub fn sanitize_file_name(name: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match name.trim() {
        "" | "." | ".." => "_".repeat(name.len().max(1)),
        _ => name,
    }
}

pub fn check_output_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(Error::InvalidOutputDir(dir.to_path_buf()))
    }
}

/// Write `bytes` to `<dir>/<name>.torrent` and return the final path.
pub fn write_torrent(
    dir: &Path,
    name: &str,
    bytes: &[u8],
    policy: OverwritePolicy,
) -> Result<PathBuf> {
    check_output_dir(dir)?;
    let base = sanitize_file_name(name);
    let path = dir.join(format!("{}.torrent", base));

    match policy {
        OverwritePolicy::Overwrite => {
            fs::write(&path, bytes)?;
            Ok(path)
        }
        OverwritePolicy::Fail => match create_new(&path, bytes) {
            Ok(()) => Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(Error::OutputExists(path)),
            Err(e) => Err(e.into()),
        },
        OverwritePolicy::Rename => {
            let mut path = path;
            let mut n = 0;
            loop {
                match create_new(&path, bytes) {
                    Ok(()) => return Ok(path),
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                        n += 1;
                        debug!("{} exists", path.display());
                        path = dir.join(format!("{} ({}).torrent", base, n));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
}

fn create_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "magnet2torrent-output-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn sanitize() {
        assert_eq!("a_b_c", sanitize_file_name("a/b\\c"));
        assert_eq!("tab_name", sanitize_file_name("tab\tname"));
        assert_eq!("_", sanitize_file_name("."));
        assert_eq!("__", sanitize_file_name(".."));
        assert_eq!("_", sanitize_file_name(""));
        assert_eq!("Ubuntu 20.04", sanitize_file_name("Ubuntu 20.04"));
    }

    #[test]
    fn parse_policy() {
        assert_eq!(OverwritePolicy::Fail, "fail".parse().unwrap());
        assert_eq!(OverwritePolicy::Rename, "rename".parse().unwrap());
        assert_eq!(OverwritePolicy::Overwrite, "overwrite".parse().unwrap());
        assert!("skip".parse::<OverwritePolicy>().is_err());
    }

    #[test]
    fn overwrite_replaces() {
        let dir = temp_dir("overwrite");
        let first = write_torrent(&dir, "x", b"one", OverwritePolicy::Overwrite).unwrap();
        let second = write_torrent(&dir, "x", b"two", OverwritePolicy::Overwrite).unwrap();
        assert_eq!(first, second);
        assert_eq!(b"two", &fs::read(&second).unwrap()[..]);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn fail_keeps_existing() {
        let dir = temp_dir("fail");
        write_torrent(&dir, "x", b"one", OverwritePolicy::Fail).unwrap();
        let err = write_torrent(&dir, "x", b"two", OverwritePolicy::Fail).unwrap_err();
        assert!(matches!(err, Error::OutputExists(_)));
        assert_eq!(b"one", &fs::read(dir.join("x.torrent")).unwrap()[..]);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn rename_picks_free_name() {
        let dir = temp_dir("rename");
        write_torrent(&dir, "x", b"one", OverwritePolicy::Rename).unwrap();
        let second = write_torrent(&dir, "x", b"two", OverwritePolicy::Rename).unwrap();
        let third = write_torrent(&dir, "x", b"three", OverwritePolicy::Rename).unwrap();
        assert_eq!(dir.join("x (1).torrent"), second);
        assert_eq!(dir.join("x (2).torrent"), third);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_dir() {
        let dir = std::env::temp_dir().join("magnet2torrent-does-not-exist");
        let err = write_torrent(&dir, "x", b"", OverwritePolicy::Overwrite).unwrap_err();
        assert!(matches!(err, Error::InvalidOutputDir(_)));
    }
}
