//! Zip archive fixtures.
//!
//! [`ZipFixture`] builds small archives entry by entry so tests can shape the
//! exact container layout a code host would return.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

enum FixtureEntry {
    Dir { name: String, modified: DateTime },
    File { name: String, contents: Vec<u8>, modified: DateTime },
}

/// Builder for test zip archives.
///
/// Entries are written in the order they are added. Every entry carries the
/// timestamp set by the most recent [`timestamp`](Self::timestamp) call, or a
/// fixed default so archives are reproducible.
pub struct ZipFixture {
    entries: Vec<FixtureEntry>,
    current_time: DateTime,
}

impl Default for ZipFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipFixture {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            current_time: fixed_time(2024, 1, 2, 3, 4, 6),
        }
    }

    /// Add a directory entry (trailing `/` is added if missing).
    pub fn dir(mut self, name: &str) -> Self {
        let name = if name.ends_with('/') { name.to_string() } else { format!("{name}/") };
        self.entries.push(FixtureEntry::Dir {
            name,
            modified: self.current_time,
        });
        self
    }

    /// Add a deflated file entry.
    pub fn file(mut self, name: &str, contents: &[u8]) -> Self {
        self.entries.push(FixtureEntry::File {
            name: name.to_string(),
            contents: contents.to_vec(),
            modified: self.current_time,
        });
        self
    }

    /// Timestamp applied to entries added after this call.
    pub fn timestamp(
        mut self,
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Self {
        self.current_time = fixed_time(year, month, day, hour, minute, second);
        self
    }

    /// Write the archive to `path`.
    pub fn write(self, path: &Path) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);

        for entry in self.entries {
            match entry {
                FixtureEntry::Dir { name, modified } => {
                    let options = SimpleFileOptions::default().last_modified_time(modified);
                    writer.add_directory(name, options).unwrap();
                }
                FixtureEntry::File { name, contents, modified } => {
                    let options = SimpleFileOptions::default()
                        .compression_method(CompressionMethod::Deflated)
                        .last_modified_time(modified);
                    writer.start_file(name, options).unwrap();
                    writer.write_all(&contents).unwrap();
                }
            }
        }

        writer.finish().unwrap();
    }

    /// Write the archive and return its bytes.
    pub fn to_bytes(self) -> Vec<u8> {
        let temp = tempfile::NamedTempFile::new().unwrap();
        self.write(temp.path());
        std::fs::read(temp.path()).unwrap()
    }
}

fn fixed_time(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> DateTime {
    DateTime::from_date_and_time(year, month, day, hour, minute, second).unwrap()
}

/// An entry read back from an archive.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
    pub contents: Vec<u8>,
    pub modified: Option<DateTime>,
}

/// Read every entry of the archive at `path`, in container order.
pub fn read_entries(path: &Path) -> Vec<Entry> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).unwrap();
        let mut contents = Vec::new();
        if !file.is_dir() {
            file.read_to_end(&mut contents).unwrap();
        }
        entries.push(Entry {
            name: file.name().to_string(),
            is_dir: file.is_dir(),
            contents,
            modified: file.last_modified(),
        });
    }
    entries
}

/// A minimal valid pack zipball wrapped in `repo-abc123/`, as a code host
/// would serve it.
pub fn sample_zipball() -> Vec<u8> {
    ZipFixture::new()
        .dir("repo-abc123/")
        .file("repo-abc123/pack.mcmeta", br#"{"pack":{"pack_format":15,"description":"test"}}"#)
        .dir("repo-abc123/assets/")
        .file("repo-abc123/assets/a.png", b"\x89PNG fake")
        .file("repo-abc123/README.md", b"# pack")
        .to_bytes()
}

/// A zipball whose pack is fine but which carries an entry escaping the pack root.
pub fn zipball_with_escaping_entry() -> Vec<u8> {
    ZipFixture::new()
        .file("repo/pack.mcmeta", br#"{"pack":{"pack_format":15,"description":"test"}}"#)
        .file("repo/../evil.txt", b"outside")
        .to_bytes()
}

/// A zipball without the root marker.
pub fn zipball_without_marker() -> Vec<u8> {
    ZipFixture::new()
        .dir("repo-abc123/")
        .file("repo-abc123/README.md", b"# not a pack")
        .to_bytes()
}
