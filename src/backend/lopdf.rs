//! [`PdfLibrary`] on top of `lopdf`.
//!
//! ## Merge
//!
//! Each input is renumbered into a disjoint object-id range, then all objects
//! are copied into one document. The first input's catalog and root page
//! tree are kept; every page is re-parented onto that tree and `Kids` is rebuilt in
//! input order, page order within each input. Inherited attributes are copied
//! onto each page and removed from the kept tree. Outlines are dropped since
//! their destinations point into the discarded trees.
//!
//! In relaxed mode an input with no reachable pages is skipped with a warning
//! instead of failing the merge.

use super::PdfLibrary;
use crate::error::BackendError;
use crate::output::DocumentMetadata;
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Pure-Rust PDF library.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfLibrary;

impl LopdfLibrary {
    pub fn new() -> Self {
        Self
    }
}

fn pdf_err(path: &Path, e: impl std::fmt::Display) -> BackendError {
    BackendError::Pdf(format!("{}: {}", path.display(), e))
}

const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Copy attributes a page inherits from its ancestors onto the page itself,
/// since the ancestors are discarded when the page is re-parented.
fn flatten_inherited(doc: &Document, page: &Dictionary) -> Dictionary {
    let mut page = page.clone();
    for key in INHERITABLE {
        if page.has(key) {
            continue;
        }
        let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        // Bounded walk; malformed trees can contain cycles.
        for _ in 0..32 {
            let Some(node) = parent.and_then(|id| doc.get_dictionary(id).ok()) else {
                break;
            };
            if let Ok(value) = node.get(key) {
                page.set(key.to_vec(), value.clone());
                break;
            }
            parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        }
    }
    page
}

/// `/Type` of a dictionary object, if any.
fn type_of(object: &Object) -> Option<&[u8]> {
    object.as_dict().ok()?.get(b"Type").ok()?.as_name().ok()
}

impl PdfLibrary for LopdfLibrary {
    fn merge(&self, inputs: &[PathBuf], dest: &Path, relaxed: bool) -> Result<(), BackendError> {
        let mut max_id = 1;
        let mut page_order: Vec<ObjectId> = Vec::new();
        let mut pages: BTreeMap<ObjectId, Object> = BTreeMap::new();
        let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

        for path in inputs {
            let mut doc = Document::load(path).map_err(|e| pdf_err(path, e))?;
            doc.renumber_objects_with(max_id);
            max_id = doc.max_id + 1;

            let doc_pages = doc.get_pages();
            if doc_pages.is_empty() {
                if relaxed {
                    warn!(path = %path.display(), "Skipping input without pages");
                    continue;
                }
                return Err(pdf_err(path, "document has no pages"));
            }

            for (_, page_id) in doc_pages {
                match doc.get_dictionary(page_id) {
                    Ok(page) => {
                        page_order.push(page_id);
                        pages.insert(page_id, Object::Dictionary(flatten_inherited(&doc, page)));
                    }
                    Err(e) if relaxed => {
                        warn!(path = %path.display(), ?page_id, "Skipping unreadable page: {}", e);
                    }
                    Err(e) => return Err(pdf_err(path, e)),
                }
            }
            objects.extend(doc.objects);
        }

        if page_order.is_empty() {
            return Err(BackendError::Pdf("no pages to merge".into()));
        }

        // The first input's catalog and root page tree become the output's.
        let (catalog_id, mut catalog) = objects
            .iter()
            .find(|(_, o)| type_of(o) == Some(b"Catalog".as_slice()))
            .and_then(|(id, o)| Some((*id, o.as_dict().ok()?.clone())))
            .ok_or_else(|| BackendError::Pdf("no catalog found in inputs".into()))?;
        let pages_id = catalog
            .get(b"Pages")
            .and_then(Object::as_reference)
            .map_err(|e| BackendError::Pdf(format!("catalog has no page tree: {e}")))?;
        let mut page_tree = objects
            .get(&pages_id)
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .ok_or_else(|| BackendError::Pdf("page tree object missing".into()))?;

        let mut document = Document::with_version("1.5");
        for (id, object) in objects {
            let object_type = type_of(&object).map(<[u8]>::to_vec);
            match object_type.as_deref() {
                Some(b"Catalog") | Some(b"Pages") | Some(b"Page") | Some(b"Outlines")
                | Some(b"Outline") => {}
                _ => {
                    document.objects.insert(id, object);
                }
            }
        }

        for id in &page_order {
            if let Some(Ok(dict)) = pages.get(id).map(|o| o.as_dict()) {
                let mut dict = dict.clone();
                dict.set("Parent", pages_id);
                document.objects.insert(*id, Object::Dictionary(dict));
            }
        }

        page_tree.set("Count", page_order.len() as u32);
        page_tree.set(
            "Kids",
            page_order
                .iter()
                .map(|id| Object::Reference(*id))
                .collect::<Vec<_>>(),
        );
        // Pages carry their own copies of these; left on the root they would
        // apply to every page from later inputs.
        page_tree.remove(b"Parent");
        for key in INHERITABLE {
            page_tree.remove(key);
        }
        document.objects.insert(pages_id, Object::Dictionary(page_tree));

        catalog.set("Pages", pages_id);
        catalog.remove(b"Outlines");
        document.objects.insert(catalog_id, Object::Dictionary(catalog));

        document.trailer.set("Root", catalog_id);
        document.max_id = document.objects.keys().map(|(n, _)| *n).max().unwrap_or(0);
        document.renumber_objects();
        document.compress();

        document.save(dest).map_err(|e| pdf_err(dest, e))?;
        debug!(
            inputs = inputs.len(),
            pages = page_order.len(),
            dest = %dest.display(),
            "Merged"
        );
        Ok(())
    }

    fn set_metadata(
        &self,
        path: &Path,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), BackendError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut doc = Document::load(path).map_err(|e| pdf_err(path, e))?;

        let info_id = match doc.trailer.get(b"Info").and_then(Object::as_reference) {
            Ok(id) if doc.get_object(id).is_ok() => id,
            _ => {
                let id = doc.add_object(Dictionary::new());
                doc.trailer.set("Info", id);
                id
            }
        };

        let info = doc
            .get_object_mut(info_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| pdf_err(path, e))?;
        for (key, value) in fields {
            info.set(key.as_bytes().to_vec(), text_string(value));
        }

        doc.save(path).map_err(|e| pdf_err(path, e))?;
        Ok(())
    }

    fn read_metadata(&self, path: &Path) -> Result<DocumentMetadata, BackendError> {
        let doc = Document::load(path).map_err(|e| pdf_err(path, e))?;

        let info = doc
            .trailer
            .get(b"Info")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();

        let get = |key: &[u8]| -> Option<String> {
            let text = match info?.get(key).ok()? {
                Object::String(bytes, _) => decode_text_string(bytes),
                _ => return None,
            };
            Some(text).filter(|s| !s.is_empty())
        };

        Ok(DocumentMetadata {
            title: get(b"Title"),
            author: get(b"Author"),
            subject: get(b"Subject"),
            keywords: get(b"Keywords"),
            creator: get(b"Creator"),
            producer: get(b"Producer"),
            page_count: doc.get_pages().len(),
            pdf_version: doc.version.clone(),
        })
    }
}

/// Encode a PDF text string: plain literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(value: &str) -> Object {
    if value.is_ascii() {
        Object::string_literal(value)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in value.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::dictionary;

    /// Write a PDF with one blank page per entry in `widths`; each page's
    /// MediaBox width identifies it after a merge.
    pub(crate) fn write_pdf(path: &Path, widths: &[u32]) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = widths
            .iter()
            .map(|w| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), (*w as i64).into(), 800.into()],
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => widths.len() as u32,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    /// MediaBox widths of every page, in page order.
    pub(crate) fn page_widths(path: &Path) -> Vec<i64> {
        let doc = Document::load(path).unwrap();
        doc.get_pages()
            .values()
            .map(|id| {
                let page = doc.get_dictionary(*id).unwrap();
                let media = page.get(b"MediaBox").unwrap().as_array().unwrap();
                media[2].as_i64().unwrap()
            })
            .collect()
    }

    #[test]
    fn merge_preserves_input_and_page_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("b.pdf");
        let c = dir.path().join("c.pdf");
        write_pdf(&a, &[101, 102]);
        write_pdf(&b, &[201]);
        write_pdf(&c, &[301, 302, 303]);

        let out = dir.path().join("out.pdf");
        LopdfLibrary
            .merge(&[c.clone(), a.clone(), b.clone()], &out, true)
            .unwrap();

        assert_eq!(page_widths(&out), vec![301, 302, 303, 101, 102, 201]);
    }

    #[test]
    fn merge_keeps_inherited_media_box() {
        let dir = tempfile::tempdir().unwrap();
        let inherited = dir.path().join("inherited.pdf");
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 555.into(), 800.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        doc.save(&inherited).unwrap();

        let plain = dir.path().join("plain.pdf");
        write_pdf(&plain, &[100]);

        let out = dir.path().join("out.pdf");
        LopdfLibrary.merge(&[plain, inherited], &out, true).unwrap();
        assert_eq!(page_widths(&out), vec![100, 555]);
    }

    /// Value of `key` on the page or the nearest ancestor that sets it.
    fn effective(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
        let mut node = doc.get_dictionary(page_id).ok();
        for _ in 0..32 {
            let dict = node?;
            if let Ok(value) = dict.get(key) {
                return Some(value.clone());
            }
            node = dict
                .get(b"Parent")
                .and_then(Object::as_reference)
                .and_then(|id| doc.get_dictionary(id))
                .ok();
        }
        None
    }

    #[test]
    fn merge_does_not_leak_root_attributes_onto_later_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let rotated = dir.path().join("rotated.pdf");
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Rotate" => 90,
                "CropBox" => vec![0.into(), 0.into(), 10.into(), 10.into()],
                "MediaBox" => vec![0.into(), 0.into(), 300.into(), 800.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        doc.save(&rotated).unwrap();

        let plain = dir.path().join("plain.pdf");
        write_pdf(&plain, &[200]);

        let out = dir.path().join("out.pdf");
        LopdfLibrary.merge(&[rotated, plain], &out, true).unwrap();
        assert_eq!(page_widths(&out), vec![300, 200]);

        let merged = Document::load(&out).unwrap();
        let ids: Vec<ObjectId> = merged.get_pages().values().copied().collect();

        let first_rotate = effective(&merged, ids[0], b"Rotate").and_then(|o| o.as_i64().ok());
        assert_eq!(first_rotate, Some(90));
        assert!(effective(&merged, ids[0], b"CropBox").is_some());

        assert_eq!(effective(&merged, ids[1], b"Rotate"), None);
        assert_eq!(effective(&merged, ids[1], b"CropBox"), None);
    }

    #[test]
    fn merge_fails_on_unreadable_input() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.pdf");
        let bad = dir.path().join("bad.pdf");
        write_pdf(&good, &[100]);
        std::fs::write(&bad, b"not a pdf").unwrap();

        let out = dir.path().join("out.pdf");
        let err = LopdfLibrary.merge(&[good, bad], &out, true).unwrap_err();
        assert!(matches!(err, BackendError::Pdf(_)));
    }

    #[test]
    fn metadata_round_trip_including_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.pdf");
        write_pdf(&path, &[100, 200]);

        let mut fields = BTreeMap::new();
        fields.insert("Author".to_string(), "Records Office".to_string());
        fields.insert("Subject".to_string(), "Zürich résumé".to_string());
        LopdfLibrary.set_metadata(&path, &fields).unwrap();

        let meta = LopdfLibrary.read_metadata(&path).unwrap();
        assert_eq!(meta.author.as_deref(), Some("Records Office"));
        assert_eq!(meta.subject.as_deref(), Some("Zürich résumé"));
        assert_eq!(meta.creator, None);
        assert_eq!(meta.page_count, 2);
        assert_eq!(page_widths(&path), vec![100, 200]);
    }

    #[test]
    fn set_metadata_overwrites_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.pdf");
        write_pdf(&path, &[100]);

        let mut fields = BTreeMap::new();
        fields.insert("Creator".to_string(), "first".to_string());
        LopdfLibrary.set_metadata(&path, &fields).unwrap();
        fields.insert("Creator".to_string(), "second".to_string());
        LopdfLibrary.set_metadata(&path, &fields).unwrap();

        let meta = LopdfLibrary.read_metadata(&path).unwrap();
        assert_eq!(meta.creator.as_deref(), Some("second"));
    }
}
