use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDateTime;
use exif::{In, Reader};

/// Tags that may carry the capture date, most specific first.
const TAKEN_DATE_TAGS: &[&str] = &["DateTimeOriginal", "DateTimeDigitized", "DateTime"];

/// EXIF fields of the primary image, keyed by tag name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap {
    fields: BTreeMap<String, String>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(tag.into(), value.into());
    }

    pub fn get(&self, tag: &str) -> Option<&str> {
        self.fields.get(tag).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// First parseable capture date among the known date tags.
    pub fn taken_date(&self) -> Option<NaiveDateTime> {
        TAKEN_DATE_TAGS
            .iter()
            .filter_map(|tag| self.get(tag))
            .find_map(parse_exif_datetime)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = TagMap::new();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

/// Read the EXIF fields of a file. Returns `None` for anything that is not
/// a readable EXIF container (videos, text files, truncated images).
pub fn extract_tags(path: &Path) -> Option<TagMap> {
    let file = File::open(path).ok()?;
    let exif = Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .ok()?;

    let tags: TagMap = exif
        .fields()
        .filter(|f| f.ifd_num == In::PRIMARY)
        .map(|f| (f.tag.to_string(), f.display_value().to_string()))
        .collect();

    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

/// EXIF datetimes have no timezone info - they are local time as-is.
pub fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let cleaned = s
        .trim()
        .trim_end_matches('\0')
        .replace('-', ":")
        .replace('/', ":")
        .replace('\\', ":")
        .replace('.', ":");

    if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, "%Y:%m:%d %H:%M:%S") {
        return Some(dt);
    }

    if let Ok(d) = chrono::NaiveDate::parse_from_str(cleaned.split(' ').next()?, "%Y:%m:%d") {
        return d.and_hms_opt(0, 0, 0);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_native_and_display_forms() {
        let expected = NaiveDate::from_ymd_opt(2016, 6, 24)
            .unwrap()
            .and_hms_opt(10, 12, 2)
            .unwrap();
        assert_eq!(parse_exif_datetime("2016:06:24 10:12:02"), Some(expected));
        assert_eq!(parse_exif_datetime("2016-06-24 10:12:02"), Some(expected));
        assert_eq!(parse_exif_datetime("2016:06:24 10:12:02\0"), Some(expected));
    }

    #[test]
    fn test_parse_date_only() {
        let dt = parse_exif_datetime("2016:06:24").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2016-06-24 00:00:00");
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_exif_datetime("    :  :     :  :  ").is_none());
        assert!(parse_exif_datetime("yesterday").is_none());
    }

    #[test]
    fn test_taken_date_prefers_original() {
        let tags: TagMap = [
            ("DateTime", "2021:01:01 00:00:00"),
            ("DateTimeOriginal", "2020:05:05 05:05:05"),
        ]
        .into_iter()
        .collect();
        let dt = tags.taken_date().unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2020-05-05");
    }

    #[test]
    fn test_taken_date_skips_unparseable_tag() {
        let tags: TagMap = [
            ("DateTimeOriginal", "unknown"),
            ("DateTime", "2021:01:01 00:00:00"),
        ]
        .into_iter()
        .collect();
        assert_eq!(tags.taken_date().unwrap().format("%Y").to_string(), "2021");
    }

    #[test]
    fn test_extract_tags_from_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(extract_tags(&path).is_none());
    }
}
