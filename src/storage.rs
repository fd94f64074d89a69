use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;
use zeroize::Zeroizing;

use crate::crypto::{Base64Encoder, Cipher, Encoder, PasswordCipher};
use crate::error::RepositoryError;

/// Archived records live here, mirroring their live names.
pub const ARCHIVE_DIR: &str = ".archive";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryItem {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Present,
    Archived,
    Absent,
}

/// A directory tree of individually encrypted records.
pub struct Repository {
    root: PathBuf,
    cipher: Box<dyn Cipher>,
    encoder: Box<dyn Encoder>,
}

impl Repository {
    /// Derives nothing and reads nothing yet; keys are derived lazily per record salt.
    pub fn create(password: &str, root: impl Into<PathBuf>) -> Self {
        Self::with_cipher(
            root,
            Box::new(PasswordCipher::new(password)),
            Box::new(Base64Encoder),
        )
    }

    pub fn with_cipher(
        root: impl Into<PathBuf>,
        cipher: Box<dyn Cipher>,
        encoder: Box<dyn Encoder>,
    ) -> Self {
        Self {
            root: root.into(),
            cipher,
            encoder,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validates a user supplied name and normalizes it to `a/b/c` form.
    ///
    /// Rejects empty names, `.`/`..` and other dot segments (which also
    /// reserves the archive area), backslashes, NUL, and names that would
    /// collide with an existing folder or nest under an existing record.
    pub fn try_parse_location(&self, raw: &str) -> Option<String> {
        let name = normalize_name(raw)?;
        let path = self.root.join(&name);
        if path.is_dir() {
            return None;
        }
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir == self.root {
                break;
            }
            if dir.is_file() {
                return None;
            }
            parent = dir.parent();
        }
        Some(name)
    }

    pub fn get(&self, name: &str) -> Option<RepositoryItem> {
        let name = normalize_name(name)?;
        self.root
            .join(&name)
            .is_file()
            .then_some(RepositoryItem { name })
    }

    pub fn state(&self, name: &str) -> ItemState {
        let Some(name) = normalize_name(name) else {
            return ItemState::Absent;
        };
        if self.root.join(&name).is_file() {
            ItemState::Present
        } else if self.archive_root().join(&name).is_file() {
            ItemState::Archived
        } else {
            ItemState::Absent
        }
    }

    /// Records under `folder` (recursively), sorted by path. `""` and `"."`
    /// mean the repository root; a missing folder yields nothing.
    pub fn list(&self, folder: &str) -> Result<Vec<RepositoryItem>, RepositoryError> {
        let folder = folder.trim().trim_matches('/');
        let dir = if folder.is_empty() || folder == "." {
            self.root.clone()
        } else {
            let normalized =
                normalize_name(folder).ok_or_else(|| RepositoryError::InvalidName(folder.into()))?;
            self.root.join(normalized)
        };
        collect_items(&self.root, &dir)
    }

    pub fn read(&self, name: &str) -> Result<Zeroizing<String>, RepositoryError> {
        let path = self.existing_path(name)?;
        let raw = Zeroizing::new(fs::read(&path)?);
        let text = std::str::from_utf8(&raw)
            .map_err(|_| RepositoryError::Decrypt(name.to_string()))?;
        let sealed = self
            .encoder
            .decode(text)
            .map_err(|_| RepositoryError::Decrypt(name.to_string()))?;
        let plaintext = self
            .cipher
            .decrypt(&sealed)
            .map_err(|_| RepositoryError::Decrypt(name.to_string()))?;
        let plaintext = std::str::from_utf8(&plaintext)
            .map_err(|_| RepositoryError::Decrypt(name.to_string()))?;
        Ok(Zeroizing::new(plaintext.to_string()))
    }

    /// Replaces the record atomically: readers see the old or the new content.
    pub fn write(&self, name: &str, plaintext: &str) -> Result<(), RepositoryError> {
        let name = self
            .try_parse_location(name)
            .ok_or_else(|| RepositoryError::InvalidName(name.to_string()))?;
        let sealed = self.cipher.encrypt(plaintext.as_bytes())?;
        let text = self.encoder.encode(&sealed);
        let path = self.root.join(&name);
        atomic_write(&path, text.as_bytes())?;
        restrict_file(&path)?;
        debug!(record = %name, "record written");
        Ok(())
    }

    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<(), RepositoryError> {
        let from = self.existing_path(old_name)?;
        let new_name = self
            .try_parse_location(new_name)
            .ok_or_else(|| RepositoryError::InvalidName(new_name.to_string()))?;
        let to = self.root.join(&new_name);
        if to.exists() {
            return Err(RepositoryError::AlreadyExists(new_name));
        }
        ensure_dir(to.parent())?;
        fs::rename(&from, &to)?;
        prune_empty_dirs(from.parent(), &self.root)?;
        debug!(from = %old_name, to = %new_name, "record renamed");
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<(), RepositoryError> {
        let path = self.existing_path(name)?;
        fs::remove_file(&path)?;
        prune_empty_dirs(path.parent(), &self.root)?;
        debug!(record = %name, "record deleted");
        Ok(())
    }

    /// Moves the record out of the listable namespace. An archived record of
    /// the same name is kept; the newcomer gets the first free `name~N`.
    pub fn archive(&self, name: &str) -> Result<(), RepositoryError> {
        let from = self.existing_path(name)?;
        let normalized = normalize_name(name).ok_or_else(|| RepositoryError::NotFound(name.into()))?;
        let to = self.archive_target(&normalized);
        ensure_dir(to.parent())?;
        fs::rename(&from, &to)?;
        prune_empty_dirs(from.parent(), &self.root)?;
        debug!(record = %name, "record archived");
        Ok(())
    }

    pub fn archived(&self) -> Result<Vec<RepositoryItem>, RepositoryError> {
        let archive_root = self.archive_root();
        collect_items(&archive_root, &archive_root)
    }

    /// Brings an archived record back under its archived name.
    pub fn restore(&self, name: &str) -> Result<(), RepositoryError> {
        let normalized = normalize_name(name).ok_or_else(|| RepositoryError::NotFound(name.into()))?;
        let archive_root = self.archive_root();
        let from = archive_root.join(&normalized);
        if !from.is_file() {
            return Err(RepositoryError::NotFound(normalized));
        }
        let to_name = self
            .try_parse_location(&normalized)
            .ok_or_else(|| RepositoryError::InvalidName(normalized.clone()))?;
        let to = self.root.join(&to_name);
        if to.exists() {
            return Err(RepositoryError::AlreadyExists(to_name));
        }
        ensure_dir(to.parent())?;
        fs::rename(&from, &to)?;
        prune_empty_dirs(from.parent(), &archive_root)?;
        Ok(())
    }

    fn archive_root(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    /// First free archive path for `name`. When an archived record blocks a
    /// folder of `name`, the top segment is suffixed instead (`a~1/b`).
    fn archive_target(&self, name: &str) -> PathBuf {
        let archive_root = self.archive_root();
        let under_file = |path: &Path| {
            path.ancestors()
                .skip(1)
                .take_while(|dir| *dir != archive_root.as_path())
                .any(Path::is_file)
        };
        let plain = archive_root.join(name);
        if !plain.exists() && !under_file(&plain) {
            return plain;
        }
        let nested = under_file(&plain);
        let mut n = 1;
        loop {
            let candidate = match name.split_once('/') {
                Some((top, rest)) if nested => archive_root.join(format!("{top}~{n}")).join(rest),
                _ => archive_root.join(format!("{name}~{n}")),
            };
            if !candidate.exists() && !under_file(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn existing_path(&self, name: &str) -> Result<PathBuf, RepositoryError> {
        let normalized = normalize_name(name).ok_or_else(|| RepositoryError::NotFound(name.into()))?;
        let path = self.root.join(&normalized);
        if path.is_file() {
            Ok(path)
        } else {
            Err(RepositoryError::NotFound(normalized))
        }
    }
}

fn normalize_name(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.contains('\\') || raw.contains('\0') {
        return None;
    }
    let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return None;
    }
    if segments
        .iter()
        .any(|s| s.starts_with('.') || s.trim() != *s)
    {
        return None;
    }
    Some(segments.join("/"))
}

fn collect_items(base: &Path, dir: &Path) -> Result<Vec<RepositoryItem>, RepositoryError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut items = Vec::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(base) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        items.push(RepositoryItem { name });
    }
    Ok(items)
}

fn ensure_dir(dir: Option<&Path>) -> Result<(), RepositoryError> {
    let dir = dir.ok_or_else(|| std::io::Error::other("invalid record path"))?;
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        restrict_dir(dir)?;
    }
    Ok(())
}

fn prune_empty_dirs(start: Option<&Path>, stop: &Path) -> Result<(), RepositoryError> {
    let mut current = start;
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }
        if fs::read_dir(dir)?.next().is_some() {
            break;
        }
        fs::remove_dir(dir)?;
        current = dir.parent();
    }
    Ok(())
}

pub fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("invalid target path"))?;
    if !parent.exists() {
        fs::create_dir_all(parent)?;
        restrict_dir(parent)?;
    }

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn restrict_file(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.exists() {
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
    }
    Ok(())
}

pub fn restrict_dir(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.exists() {
            fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}
