/*!
Application storage handles.

[`TargetContext`] is the boundary between the restorer and a live
application: it hands out preference writers, database connections and the
private files root. [`AppDataDir`] implements it over a conventional data
directory (`shared_prefs/`, `databases/`, `files/`) and doubles as the
source layout read by the extractors.
*/

use std::fmt::Display;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Decoder, Reader, Writer};
use rusqlite::Connection;
use tracing::debug;

use crate::extract::prefs::STORE_EXTENSION;
use crate::storage::write_atomic;
use crate::value::{PreferenceMap, TypedValue};
use crate::{Result, VaultError};

/// Buffered writer for one preference store.
///
/// Puts are staged in memory; nothing reaches storage until [`commit`].
///
/// [`commit`]: PreferenceWriter::commit
#[cfg_attr(test, mockall::automock)]
pub trait PreferenceWriter {
    fn put_string(&mut self, key: &str, value: &str);
    fn put_long(&mut self, key: &str, value: i64);
    fn put_float(&mut self, key: &str, value: f32);
    fn put_boolean(&mut self, key: &str, value: bool);
    fn commit(&mut self) -> Result<()>;
}

/// Live handle to the storage of the application being restored into
pub trait TargetContext {
    /// Open or create the named preference store for writing
    fn open_preferences(&self, store: &str) -> Result<Box<dyn PreferenceWriter + '_>>;

    /// Open or create the named database for reading and writing
    fn open_database(&self, name: &str) -> Result<Connection>;

    /// Root of the private files tree, created if necessary
    fn files_root(&self) -> Result<PathBuf>;
}

/// Leading whitespace of an entry appended to an existing store
const ENTRY_INDENT: &str = "\n    ";

/// Reject names that would escape their parent directory
pub fn validate_file_name(name: &str) -> Result<&str> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if plain {
        Ok(name)
    } else {
        Err(VaultError::invalid_identifier(name))
    }
}

/// A data directory laid out as `shared_prefs/`, `databases/` and `files/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDataDir {
    root: PathBuf,
}

impl AppDataDir {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Data directory of an installed package on a device
    pub fn for_package(package: &str) -> Result<Self> {
        Ok(Self::new(Path::new("/data/data").join(validate_file_name(package)?)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shared_prefs_dir(&self) -> PathBuf {
        self.root.join("shared_prefs")
    }

    pub fn databases_dir(&self) -> PathBuf {
        self.root.join("databases")
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    pub fn store_path(&self, store: &str) -> Result<PathBuf> {
        Ok(self
            .shared_prefs_dir()
            .join(format!("{}.{STORE_EXTENSION}", validate_file_name(store)?)))
    }

    pub fn database_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.databases_dir().join(validate_file_name(name)?))
    }
}

impl TargetContext for AppDataDir {
    fn open_preferences(&self, store: &str) -> Result<Box<dyn PreferenceWriter + '_>> {
        let path = self.store_path(store)?;
        Ok(Box::new(XmlPreferenceWriter::open(path)?))
    }

    fn open_database(&self, name: &str) -> Result<Connection> {
        let path = self.database_path(name)?;
        fs::create_dir_all(self.databases_dir())?;
        Ok(Connection::open(path)?)
    }

    fn files_root(&self) -> Result<PathBuf> {
        let dir = self.files_dir();
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Preference writer over an XML store file.
///
/// Puts are staged in memory. On commit the existing document is merged
/// element by element: entries whose key was not put are copied through as
/// they are, including ones the extractor cannot parse (sets, multi-line
/// strings), and staged keys replace their old element or are appended. An
/// existing document that is not well-formed fails the commit and is left
/// untouched. Integers are always written as `<long>`, so a key stored as
/// `<int>` reads back as a long once it has been overwritten.
#[derive(Debug)]
pub struct XmlPreferenceWriter {
    path: PathBuf,
    staged: PreferenceMap,
}

impl XmlPreferenceWriter {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), "Opened preference store");
        Ok(Self {
            path,
            staged: PreferenceMap::new(),
        })
    }

    /// Values put since the writer was opened
    pub fn staged(&self) -> &PreferenceMap {
        &self.staged
    }
}

impl PreferenceWriter for XmlPreferenceWriter {
    fn put_string(&mut self, key: &str, value: &str) {
        self.staged.insert(key, value);
    }

    fn put_long(&mut self, key: &str, value: i64) {
        self.staged.insert(key, value);
    }

    fn put_float(&mut self, key: &str, value: f32) {
        self.staged.insert(key, value);
    }

    fn put_boolean(&mut self, key: &str, value: bool) {
        self.staged.insert(key, value);
    }

    fn commit(&mut self) -> Result<()> {
        let existing = match fs::read_to_string(&self.path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let document = match existing.as_deref() {
            Some(content) if !content.trim().is_empty() => merge_store(content, &self.staged)?,
            _ => render_store(&self.staged)?,
        };
        write_atomic(&self.path, document.as_bytes())?;
        debug!(path = %self.path.display(), values = self.staged.len(), "Committed preference store");
        Ok(())
    }
}

fn xml_error<E: Display>(e: E) -> VaultError {
    VaultError::storage(format!("Failed to render preference store: {e}"))
}

fn write_entry<W: Write>(writer: &mut Writer<W>, key: &str, value: &TypedValue) -> Result<()> {
    let (tag, attr_value) = match value {
        TypedValue::String(text) => {
            let mut start = BytesStart::new("string");
            start.push_attribute(("name", key));
            writer.write_event(Event::Start(start)).map_err(xml_error)?;
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(xml_error)?;
            writer
                .write_event(Event::End(BytesEnd::new("string")))
                .map_err(xml_error)?;
            return Ok(());
        }
        TypedValue::Integer(i) => ("long", i.to_string()),
        TypedValue::Float(f) => ("float", f.to_string()),
        TypedValue::Boolean(b) => ("boolean", b.to_string()),
    };
    let mut element = BytesStart::new(tag);
    element.push_attribute(("name", key));
    element.push_attribute(("value", attr_value.as_str()));
    writer.write_event(Event::Empty(element)).map_err(xml_error)?;
    Ok(())
}

/// Render a store in the native XML layout, one entry per line
pub fn render_store(entries: &PreferenceMap) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("yes"))))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Start(BytesStart::new("map")))
        .map_err(xml_error)?;

    for (key, value) in entries {
        write_entry(&mut writer, key, value)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("map")))
        .map_err(xml_error)?;

    let mut document = String::from_utf8(writer.into_inner()).map_err(xml_error)?;
    document.push('\n');
    Ok(document)
}

fn write_staged<W: Write>(writer: &mut Writer<W>, staged: &PreferenceMap) -> Result<()> {
    for (key, value) in staged {
        writer
            .write_event(Event::Text(BytesText::new(ENTRY_INDENT)))
            .map_err(xml_error)?;
        write_entry(writer, key, value)?;
    }
    Ok(())
}

fn is_staged(element: &BytesStart<'_>, decoder: Decoder, staged: &PreferenceMap) -> Result<bool> {
    match element.try_get_attribute("name").map_err(xml_error)? {
        Some(attr) => {
            let name = attr.decode_and_unescape_value(decoder).map_err(xml_error)?;
            Ok(staged.get(&name).is_some())
        }
        None => Ok(false),
    }
}

fn is_blank(text: &BytesText<'_>) -> bool {
    text.iter().all(u8::is_ascii_whitespace)
}

/// Apply `staged` to an existing store document.
///
/// Children of the root whose `name` is staged are dropped together with the
/// whitespace in front of them; every other event is copied as read. Staged
/// entries are appended before the closing root tag.
pub fn merge_store(existing: &str, staged: &PreferenceMap) -> Result<String> {
    let mut reader = Reader::from_str(existing);
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    let mut closed = false;
    let mut pending: Option<BytesText<'_>> = None;

    loop {
        let event = reader.read_event().map_err(xml_error)?;

        if depth == 1 {
            let replaced = match &event {
                Event::Start(element) | Event::Empty(element) => {
                    is_staged(element, reader.decoder(), staged)?
                }
                _ => false,
            };
            if replaced {
                pending = None;
                if let Event::Start(element) = &event {
                    reader.read_to_end(element.name()).map_err(xml_error)?;
                }
                continue;
            }
            if let Event::Text(text) = &event {
                if is_blank(text) {
                    if let Some(previous) = pending.replace(text.clone()) {
                        writer.write_event(Event::Text(previous)).map_err(xml_error)?;
                    }
                    continue;
                }
            }
            if let Event::End(_) = &event {
                write_staged(&mut writer, staged)?;
                closed = true;
            }
            if let Some(text) = pending.take() {
                writer.write_event(Event::Text(text)).map_err(xml_error)?;
            }
        }

        match &event {
            Event::Eof => break,
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Empty(root) if depth == 0 && !closed => {
                // `<map />` of an empty store
                let name = String::from_utf8_lossy(root.name().as_ref()).into_owned();
                writer
                    .write_event(Event::Start(BytesStart::new(name.as_str())))
                    .map_err(xml_error)?;
                write_staged(&mut writer, staged)?;
                writer
                    .write_event(Event::Text(BytesText::new("\n")))
                    .map_err(xml_error)?;
                writer
                    .write_event(Event::End(BytesEnd::new(name.as_str())))
                    .map_err(xml_error)?;
                closed = true;
                continue;
            }
            _ => {}
        }
        writer.write_event(event).map_err(xml_error)?;
    }

    if !closed {
        return Err(VaultError::storage(
            "Preference store has no root element to merge into",
        ));
    }
    String::from_utf8(writer.into_inner()).map_err(xml_error)
}
