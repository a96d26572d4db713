/*!
Preference store extraction.

Stores are XML documents of the form

```text
<map>
    <string name="uid">123456</string>
    <long name="last_login" value="1700000000000" />
    <boolean name="dark_mode" value="true" />
</map>
```

Parsing is a permissive line scan: a line is accepted when it starts one of
the primitive element tags and carries a `name="..."` attribute. Anything
else (sets, multi-line strings, declarations, non-finite floats) is
skipped.
*/

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::value::{PreferenceMap, TypedValue};
use crate::Result;

/// File extension of a preference store
pub const STORE_EXTENSION: &str = "xml";

const NAME_MARKER: &str = "name=\"";

/// Extract every store found in `dir`, keyed by store name (file stem).
///
/// A missing directory yields an empty mapping; a store that cannot be read
/// is logged and left out.
pub fn extract_preferences(dir: &Path) -> BTreeMap<String, PreferenceMap> {
    let mut stores = BTreeMap::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("No preference stores at {}: {}", dir.display(), e);
            return stores;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(STORE_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };

        match read_store(&path) {
            Ok(values) => {
                info!(store = name, values = values.len(), "Extracted preference store");
                stores.insert(name.to_string(), values);
            }
            Err(e) => warn!("Failed to read preference store {}: {}", path.display(), e),
        }
    }

    stores
}

/// Read and parse one store file
pub fn read_store(path: &Path) -> Result<PreferenceMap> {
    let raw = fs::read(path)?;
    Ok(parse_store(&String::from_utf8_lossy(&raw)))
}

/// Parse the content of one store document
pub fn parse_store(content: &str) -> PreferenceMap {
    content
        .lines()
        .filter_map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Option<(String, TypedValue)> {
    let line = line.trim();
    if !line.contains(NAME_MARKER) {
        return None;
    }
    let tag = element_tag(line)?;
    let key = unescape(attribute(line, "name")?)?;

    let value = match tag {
        "string" => TypedValue::String(unescape(string_body(line)?)?),
        "int" | "long" => TypedValue::Integer(attribute(line, "value")?.trim().parse().ok()?),
        "float" => {
            let value: f32 = attribute(line, "value")?.trim().parse().ok()?;
            if !value.is_finite() {
                // no JSON encoding for NaN or infinities
                warn!(key = %key, "Skipping non-finite float preference {}", value);
                return None;
            }
            TypedValue::Float(value)
        }
        "boolean" => TypedValue::Boolean(attribute(line, "value")?.trim().parse().ok()?),
        _ => return None,
    };
    Some((key, value))
}

fn element_tag(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('<')?;
    let end = rest.find(|c: char| c.is_whitespace() || c == '>' || c == '/')?;
    Some(&rest[..end])
}

fn attribute<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let marker = format!(" {name}=\"");
    let start = line.find(&marker)? + marker.len();
    let len = line[start..].find('"')?;
    Some(&line[start..start + len])
}

fn string_body(line: &str) -> Option<&str> {
    let open_end = line.find('>')?;
    if line[..open_end].ends_with('/') {
        // <string name="k" />
        return Some("");
    }
    let body = &line[open_end + 1..];
    let close = body.find("</string>")?;
    Some(&body[..close])
}

fn unescape(raw: &str) -> Option<String> {
    quick_xml::escape::unescape(raw)
        .ok()
        .map(|value| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const STORE: &str = r#"<?xml version='1.0' encoding='utf-8' standalone='yes' ?>
<map>
    <string name="uid">123456</string>
    <string name="nickname">Alice &amp; Bob</string>
    <string name="empty"></string>
    <string name="self_closed" />
    <int name="launch_count" value="12" />
    <long name="last_login" value="1700000000000" />
    <float name="volume" value="0.75" />
    <boolean name="dark_mode" value="true" />
    <set name="tags">
        <string>a</string>
    </set>
    <string name="multi">first line
second line</string>
    <int name="broken" value="twelve" />
</map>
"#;

    #[test]
    fn test_parse_primitive_tags() {
        let map = parse_store(STORE);
        assert_eq!(map.get("uid"), Some(&TypedValue::String("123456".to_string())));
        assert_eq!(
            map.get("nickname"),
            Some(&TypedValue::String("Alice & Bob".to_string()))
        );
        assert_eq!(map.get("empty"), Some(&TypedValue::String(String::new())));
        assert_eq!(map.get("self_closed"), Some(&TypedValue::String(String::new())));
        assert_eq!(map.get("launch_count"), Some(&TypedValue::Integer(12)));
        assert_eq!(map.get("last_login"), Some(&TypedValue::Integer(1_700_000_000_000)));
        assert_eq!(map.get("volume"), Some(&TypedValue::Float(0.75)));
        assert_eq!(map.get("dark_mode"), Some(&TypedValue::Boolean(true)));
    }

    #[test]
    fn test_unparseable_lines_are_skipped() {
        let map = parse_store(STORE);
        assert!(map.get("tags").is_none());
        assert!(map.get("multi").is_none());
        assert!(map.get("broken").is_none());
        assert_eq!(map.len(), 8);
    }

    #[test]
    fn test_non_finite_floats_are_skipped() {
        let map = parse_store(
            "<map>\n    <float name=\"ratio\" value=\"NaN\" />\n    <float name=\"cap\" value=\"Infinity\" />\n    <float name=\"floor\" value=\"-inf\" />\n    <float name=\"gain\" value=\"1.25\" />\n</map>\n",
        );
        assert!(map.get("ratio").is_none());
        assert!(map.get("cap").is_none());
        assert!(map.get("floor").is_none());
        assert_eq!(map.get("gain"), Some(&TypedValue::Float(1.25)));

        let json = serde_json::to_string(&map).unwrap();
        let back: PreferenceMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_extract_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("account.xml"), STORE).unwrap();
        fs::write(
            dir.path().join("settings.xml"),
            "<map>\n<boolean name=\"push\" value=\"false\" />\n</map>\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "<string name=\"x\">y</string>").unwrap();

        let stores = extract_preferences(dir.path());
        assert_eq!(stores.len(), 2);
        assert_eq!(stores["account"].len(), 8);
        assert_eq!(stores["settings"].get("push"), Some(&TypedValue::Boolean(false)));
    }

    #[test]
    fn test_one_bad_store_does_not_abort_others() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("good.xml"), STORE).unwrap();
        // a directory with the store extension cannot be read as a file
        fs::create_dir(dir.path().join("bad.xml")).unwrap();

        let stores = extract_preferences(dir.path());
        assert_eq!(stores.len(), 1);
        assert!(stores.contains_key("good"));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(extract_preferences(&dir.path().join("absent")).is_empty());
    }
}
