//! 目录清单解析
//!
//! 清单结构:
//! ```xml
//! <!DOCTYPE MeikadePoemsXml>
//! <MeikadePoemsXml version="1.0">
//!   <Name>..</Name>
//!   <Description>..</Description>
//!   <Poets>
//!     <Poet id="5" name=".." type="0">
//!       <Revision structure="1" date="2023/01/01-00:00:00" guid=".." mimeType=".." compress="zip" version="1">
//!         <Url size="1024">http://..</Url>
//!         <Thumb size="64">http://..</Thumb>
//!       </Revision>
//!     </Poet>
//!   </Poets>
//! </MeikadePoemsXml>
//! ```

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use super::collation::sort_items;
use super::types::{CatalogItem, ContentKind, ItemStatus};
use crate::config::CatalogConfig;
use crate::database::PoetStore;

/// 更新判断所需的最小年份，早于此年份的日期视为无效
const MIN_SANE_YEAR: i32 = 2000;

/// 清单解析错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ManifestError {
    #[error("清单格式错误: {0}")]
    Malformed(String),

    #[error("文档类型不匹配: 期望 {expected}, 实际 {found}")]
    WrongDocType { expected: String, found: String },

    #[error("根元素不匹配: 期望 {expected}, 实际 {found}")]
    WrongRoot { expected: String, found: String },

    #[error("清单缺少 version 属性")]
    MissingVersion,

    #[error("清单版本过旧: {found} (最低 {min})")]
    OldVersion { found: String, min: String },
}

/// 解析后的清单
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub name: String,
    pub description: String,
    /// 已排序、已去重的条目
    pub items: Vec<CatalogItem>,
}

/// 简化的元素节点
#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn attr_or_empty(&self, name: &str) -> &str {
        self.attribute(name).unwrap_or("")
    }

    fn attr_i32(&self, name: &str) -> i32 {
        self.attr_or_empty(name).trim().parse().unwrap_or(0)
    }

    fn attr_i64(&self, name: &str) -> i64 {
        self.attr_or_empty(name).trim().parse().unwrap_or(0)
    }

    fn attr_u64(&self, name: &str) -> u64 {
        self.attr_or_empty(name).trim().parse().unwrap_or(0)
    }

    fn first_child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn child_text(&self, name: &str) -> String {
        self.first_child(name)
            .map(|c| c.text.trim().to_string())
            .unwrap_or_default()
    }
}

/// 读取后的文档：DOCTYPE 名称与根元素
struct Document {
    doc_type: Option<String>,
    root: Element,
}

fn malformed(e: impl std::fmt::Display) -> ManifestError {
    ManifestError::Malformed(e.to_string())
}

fn element_from(e: &quick_xml::events::BytesStart<'_>) -> Result<Element, ManifestError> {
    let mut element = Element {
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        ..Element::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(malformed)?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

/// 读取整个文档，任何结构错误都视为格式错误
fn read_document(data: &[u8]) -> Result<Document, ManifestError> {
    let mut reader = Reader::from_reader(data);
    let mut doc_type = None;
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            ManifestError::Malformed(format!("位置 {}: {}", reader.buffer_position(), e))
        })?;

        match event {
            Event::DocType(e) => {
                let raw = String::from_utf8_lossy(&e).into_owned();
                doc_type = raw
                    .trim()
                    .split(|c: char| c.is_whitespace() || c == '[')
                    .next()
                    .map(str::to_string);
            }
            Event::Start(e) => {
                if root.is_some() {
                    return Err(malformed("根元素之后出现多余元素"));
                }
                stack.push(element_from(&e)?);
            }
            Event::Empty(e) => {
                if root.is_some() {
                    return Err(malformed("根元素之后出现多余元素"));
                }
                let element = element_from(&e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| malformed("多余的结束标签"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(e) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&e.unescape().map_err(malformed)?);
                }
            }
            Event::CData(e) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(malformed("文档意外结束"));
    }
    let root = root.ok_or_else(|| malformed("文档为空"))?;
    Ok(Document { doc_type, root })
}

/// 解析修订日期，优先使用配置的格式
pub fn parse_revision_date(value: &str, format: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(value, format)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|d| d.naive_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y/%m/%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// 是否有可用更新
///
/// 远程日期需有效（年份晚于 2000），且晚于本地记录或本地未记录
pub fn is_update_available(
    installed: bool,
    remote: Option<NaiveDateTime>,
    local: Option<NaiveDateTime>,
) -> bool {
    match remote {
        Some(remote) => {
            installed
                && remote.year() > MIN_SANE_YEAR
                && local.map_or(true, |local| remote > local)
        }
        None => false,
    }
}

/// 校验文档头: DOCTYPE → 根元素 → 版本
fn validate(document: &Document, config: &CatalogConfig) -> Result<(), ManifestError> {
    let doc_type = document.doc_type.clone().unwrap_or_default();
    if doc_type != config.doc_type {
        return Err(ManifestError::WrongDocType {
            expected: config.doc_type.clone(),
            found: doc_type,
        });
    }

    if document.root.name != config.doc_type {
        return Err(ManifestError::WrongRoot {
            expected: config.doc_type.clone(),
            found: document.root.name.clone(),
        });
    }

    // 版本按字符串比较
    let version = document
        .root
        .attribute("version")
        .ok_or(ManifestError::MissingVersion)?;
    if version < config.min_version.as_str() {
        return Err(ManifestError::OldVersion {
            found: version.to_string(),
            min: config.min_version.clone(),
        });
    }
    Ok(())
}

/// 从一个 Poet 元素得到条目，没有可用修订时返回 None
fn read_poet(
    poet: &Element,
    config: &CatalogConfig,
    store: &dyn PoetStore,
) -> Option<CatalogItem> {
    let poet_id = poet.attr_i64("id");
    let mut item = CatalogItem {
        poet_id,
        name: poet.attr_or_empty("name").to_string(),
        kind: ContentKind::from_mask(poet.attr_i32("type")),
        ..CatalogItem::default()
    };

    for revision in poet.children_named("Revision") {
        let structure = revision.attr_i32("structure");
        let date = parse_revision_date(revision.attr_or_empty("date"), &config.date_format);
        // 同一日期的修订取最后出现的一个
        if structure > config.supported_structure || date < item.date {
            continue;
        }

        let url = revision.first_child("Url");
        let thumb = revision.first_child("Thumb");

        item.guid = revision.attr_or_empty("guid").trim().to_string();
        item.mime_type = revision.attr_or_empty("mimeType").to_string();
        item.compress = revision.attr_or_empty("compress").to_string();
        item.version = revision.attr_i32("version");
        item.date = date;
        item.structure = structure;
        item.download_url = url.map(|e| e.text.trim().to_string()).unwrap_or_default();
        item.thumb_url = thumb.map(|e| e.text.trim().to_string()).unwrap_or_default();
        item.file_size = url.map(|e| e.attr_u64("size")).unwrap_or(0);
        item.thumb_size = thumb.map(|e| e.attr_u64("size")).unwrap_or(0);
    }

    if item.guid.is_empty() {
        return None;
    }

    let installed = store.contains_poet(poet_id);
    item.status = ItemStatus {
        installed,
        update_available: is_update_available(
            installed,
            item.date,
            store.poet_last_update(poet_id),
        ),
        ..ItemStatus::default()
    };
    Some(item)
}

/// 解析并校验清单，返回按名称排序的条目
pub fn parse_manifest(
    data: &[u8],
    config: &CatalogConfig,
    store: &dyn PoetStore,
) -> Result<Manifest, ManifestError> {
    let document = read_document(data)?;
    validate(&document, config)?;

    let root = &document.root;
    let mut seen = HashSet::new();
    let mut items = Vec::new();
    let mut skipped = 0usize;

    if let Some(poets) = root.first_child("Poets") {
        for poet in poets.children_named("Poet") {
            match read_poet(poet, config, store) {
                Some(item) => {
                    if seen.insert(item.guid.clone()) {
                        items.push(item);
                    } else {
                        tracing::warn!("[目录] 忽略重复 guid: {}", item.guid);
                    }
                }
                None => skipped += 1,
            }
        }
    }

    sort_items(&mut items);
    tracing::debug!(
        "[目录] 清单解析完成: {} 个条目, 跳过 {} 个",
        items.len(),
        skipped
    );

    Ok(Manifest {
        name: root.child_text("Name"),
        description: root.child_text("Description"),
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::{INSTALLED_FLAG, UPDATE_AVAILABLE_FLAG};
    use std::collections::HashMap;

    /// 内存中的本地库
    #[derive(Default)]
    struct MemoryStore {
        poets: HashMap<i64, Option<NaiveDateTime>>,
    }

    impl MemoryStore {
        fn with_poet(mut self, poet_id: i64, last_update: Option<NaiveDateTime>) -> Self {
            self.poets.insert(poet_id, last_update);
            self
        }
    }

    impl PoetStore for MemoryStore {
        fn contains_poet(&self, poet_id: i64) -> bool {
            self.poets.contains_key(&poet_id)
        }

        fn poet_last_update(&self, poet_id: i64) -> Option<NaiveDateTime> {
            self.poets.get(&poet_id).copied().flatten()
        }

        fn installed_poets(&self) -> Vec<i64> {
            self.poets.keys().copied().collect()
        }

        fn poet_name(&self, _poet_id: i64) -> Option<String> {
            None
        }

        fn refresh(&self) {}
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn revision(structure: i32, date: &str, guid: &str) -> String {
        format!(
            r#"<Revision structure="{}" date="{}" guid="{}" mimeType="application/zip" compress="zip" version="2">
                <Url size="2048">http://example.com/{}.zip</Url>
                <Thumb size="64">http://example.com/{}.png</Thumb>
            </Revision>"#,
            structure, date, guid, guid, guid
        )
    }

    fn manifest(poets: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE MeikadePoemsXml>
<MeikadePoemsXml version="1.0">
    <Name>Meikade</Name>
    <Description>Poets &amp; poems</Description>
    <Poets>{}</Poets>
</MeikadePoemsXml>"#,
            poets
        )
    }

    fn hafez(revisions: &str) -> String {
        manifest(&format!(
            r#"<Poet id="5" name="حافظ" type="0">{}</Poet>"#,
            revisions
        ))
    }

    fn parse(xml: &str, store: &MemoryStore) -> Result<Manifest, ManifestError> {
        parse_manifest(xml.as_bytes(), &CatalogConfig::default(), store)
    }

    #[test]
    fn test_single_revision_not_installed() {
        let xml = hafez(&revision(1, "2023/01/01-00:00:00", "g1"));
        let manifest = parse(&xml, &MemoryStore::default()).unwrap();

        assert_eq!(manifest.name, "Meikade");
        assert_eq!(manifest.description, "Poets & poems");
        assert_eq!(manifest.items.len(), 1);

        let item = &manifest.items[0];
        assert_eq!(item.poet_id, 5);
        assert_eq!(item.guid, "g1");
        assert_eq!(item.date, Some(date(2023, 1, 1)));
        assert_eq!(item.download_url, "http://example.com/g1.zip");
        assert_eq!(item.file_size, 2048);
        assert_eq!(item.thumb_size, 64);
        assert_eq!(item.compress, "zip");
        assert_eq!(item.version, 2);
        assert!(!item.status.installed);
        assert!(!item.status.update_available);
    }

    #[test]
    fn test_installed_with_older_local_copy() {
        let xml = hafez(&revision(1, "2023/01/01-00:00:00", "g1"));
        let store = MemoryStore::default().with_poet(5, Some(date(2022, 1, 1)));
        let item = parse(&xml, &store).unwrap().items.remove(0);

        assert!(item.status.installed);
        assert!(item.status.update_available);
        assert_eq!(
            item.type_mask(),
            INSTALLED_FLAG | UPDATE_AVAILABLE_FLAG
        );
    }

    #[test]
    fn test_installed_and_current() {
        let xml = hafez(&revision(1, "2023/01/01-00:00:00", "g1"));
        let store = MemoryStore::default().with_poet(5, Some(date(2023, 1, 1)));
        let item = parse(&xml, &store).unwrap().items.remove(0);

        assert!(item.status.installed);
        assert!(!item.status.update_available);
    }

    #[test]
    fn test_newest_supported_revision_wins() {
        let revisions = [
            revision(1, "2021/05/01-00:00:00", "old"),
            revision(1, "2023/01/01-00:00:00", "new"),
            revision(2, "2024/01/01-00:00:00", "future"),
            revision(1, "2022/01/01-00:00:00", "middle"),
        ]
        .concat();
        let manifest = parse(&hafez(&revisions), &MemoryStore::default()).unwrap();
        assert_eq!(manifest.items[0].guid, "new");
        assert_eq!(manifest.items[0].structure, 1);
    }

    #[test]
    fn test_all_revisions_unsupported() {
        let xml = hafez(&revision(2, "2023/01/01-00:00:00", "g1"));
        let manifest = parse(&xml, &MemoryStore::default()).unwrap();
        assert!(manifest.items.is_empty());
    }

    #[test]
    fn test_equal_dates_last_wins() {
        let revisions = [
            revision(1, "2023/01/01-00:00:00", "first"),
            revision(1, "2023/01/01-00:00:00", "second"),
        ]
        .concat();
        let manifest = parse(&hafez(&revisions), &MemoryStore::default()).unwrap();
        assert_eq!(manifest.items[0].guid, "second");
    }

    #[test]
    fn test_items_sorted_and_deduplicated() {
        let poets = format!(
            r#"<Poet id="1" name="مولوی" type="0">{}</Poet>
               <Poet id="2" name="پروین" type="0">{}</Poet>
               <Poet id="3" name="تقی" type="0">{}</Poet>
               <Poet id="4" name="تکرار" type="0">{}</Poet>"#,
            revision(1, "2023/01/01-00:00:00", "g1"),
            revision(1, "2023/01/01-00:00:00", "g2"),
            revision(1, "2023/01/01-00:00:00", "g3"),
            revision(1, "2023/01/01-00:00:00", "g1"),
        );
        let manifest = parse(&manifest(&poets), &MemoryStore::default()).unwrap();

        let names: Vec<&str> = manifest.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["پروین", "تقی", "مولوی"]);
    }

    #[test]
    fn test_validation_errors() {
        let store = MemoryStore::default();

        assert!(matches!(
            parse("<MeikadePoemsXml version=\"1.0\">", &store),
            Err(ManifestError::Malformed(_))
        ));
        assert!(matches!(
            parse("<a><b></a>", &store),
            Err(ManifestError::Malformed(_))
        ));

        let no_doctype = r#"<MeikadePoemsXml version="1.0"></MeikadePoemsXml>"#;
        assert!(matches!(
            parse(no_doctype, &store),
            Err(ManifestError::WrongDocType { .. })
        ));

        let wrong_root = r#"<!DOCTYPE MeikadePoemsXml><Other version="1.0"></Other>"#;
        assert!(matches!(
            parse(wrong_root, &store),
            Err(ManifestError::WrongRoot { .. })
        ));

        let no_version = r#"<!DOCTYPE MeikadePoemsXml><MeikadePoemsXml></MeikadePoemsXml>"#;
        assert_eq!(parse(no_version, &store).unwrap_err(), ManifestError::MissingVersion);

        let old = r#"<!DOCTYPE MeikadePoemsXml><MeikadePoemsXml version="0.9"></MeikadePoemsXml>"#;
        assert!(matches!(
            parse(old, &store),
            Err(ManifestError::OldVersion { .. })
        ));

        let newer = r#"<!DOCTYPE MeikadePoemsXml><MeikadePoemsXml version="1.1"/>"#;
        assert!(parse(newer, &store).unwrap().items.is_empty());
    }

    #[test]
    fn test_update_rule() {
        let remote = Some(date(2023, 1, 1));
        assert!(is_update_available(true, remote, None));
        assert!(is_update_available(true, remote, Some(date(2022, 1, 1))));
        assert!(!is_update_available(true, remote, Some(date(2023, 1, 1))));
        assert!(!is_update_available(false, remote, None));
        assert!(!is_update_available(true, Some(date(1999, 1, 1)), None));
        assert!(!is_update_available(true, Some(date(2000, 6, 1)), None));
        assert!(!is_update_available(true, None, None));
    }

    #[test]
    fn test_revision_date_formats() {
        let fmt = CatalogConfig::default().date_format;
        let expected = NaiveDate::from_ymd_opt(2023, 3, 4)
            .unwrap()
            .and_hms_opt(5, 6, 7)
            .unwrap();
        assert_eq!(parse_revision_date("2023/03/04-05:06:07", &fmt), Some(expected));
        assert_eq!(parse_revision_date("2023-03-04 05:06:07", &fmt), Some(expected));
        assert_eq!(parse_revision_date("2023-03-04T05:06:07Z", &fmt), Some(expected));
        assert_eq!(parse_revision_date("2023/03/04", &fmt), Some(date(2023, 3, 4)));
        assert_eq!(parse_revision_date("soon", &fmt), None);
    }
}
