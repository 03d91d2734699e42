use lopdf::{Dictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId};

/// Page attributes a page may inherit from its ancestors in the page tree.
pub(crate) const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

const MAX_TREE_DEPTH: usize = 64;

/// Looks `key` up on the page, then on each `Parent` in turn.
pub(crate) fn inherited_attribute(doc: &LoDocument, page_id: LoObjectId, key: &[u8]) -> Option<LoObject> {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(LoObject::as_reference).ok()?;
    }
    None
}

pub(crate) fn deref<'a>(doc: &'a LoDocument, obj: &'a LoObject) -> &'a LoObject {
    match obj {
        LoObject::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Owned copy of a dictionary given inline or by reference; empty when the
/// object is neither.
pub(crate) fn owned_dict(doc: &LoDocument, obj: Option<&LoObject>) -> Dictionary {
    match obj.map(|o| deref(doc, o)) {
        Some(LoObject::Dictionary(d)) => d.clone(),
        _ => Dictionary::new(),
    }
}

fn number(doc: &LoDocument, obj: &LoObject) -> Option<f32> {
    match deref(doc, obj) {
        LoObject::Integer(v) => Some(*v as f32),
        LoObject::Real(v) => Some(*v as f32),
        _ => None,
    }
}

/// `[x0, y0, x1, y1]` of the page's media box; US Letter when absent or
/// malformed.
pub(crate) fn media_box(doc: &LoDocument, page_id: LoObjectId) -> [f32; 4] {
    let fallback = [0.0, 0.0, 612.0, 792.0];
    let Some(obj) = inherited_attribute(doc, page_id, b"MediaBox") else {
        return fallback;
    };
    let Ok(items) = deref(doc, &obj).as_array() else {
        return fallback;
    };
    if items.len() != 4 {
        return fallback;
    }
    let mut out = [0.0f32; 4];
    for (slot, item) in out.iter_mut().zip(items) {
        match number(doc, item) {
            Some(v) => *slot = v,
            None => return fallback,
        }
    }
    out
}

/// Copies inherited attributes onto the page itself so the page survives
/// being moved under a different parent.
pub(crate) fn flatten_inherited(doc: &mut LoDocument, page_id: LoObjectId) -> Result<(), lopdf::Error> {
    let mut found: Vec<(&[u8], LoObject)> = Vec::new();
    for key in INHERITABLE_KEYS {
        if let Some(value) = inherited_attribute(doc, page_id, key) {
            found.push((key, value));
        }
    }
    let page = doc.get_dictionary_mut(page_id)?;
    for (key, value) in found {
        if !page.has(key) {
            page.set(key.to_vec(), value);
        }
    }
    Ok(())
}

/// Content stream references of a page in drawing order.
pub(crate) fn content_refs(doc: &LoDocument, page_id: LoObjectId) -> Vec<LoObject> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    match page.get(b"Contents") {
        Ok(LoObject::Array(items)) => items.clone(),
        Ok(LoObject::Reference(id)) => match doc.get_object(*id) {
            Ok(LoObject::Array(items)) => items.clone(),
            Ok(_) => vec![LoObject::Reference(*id)],
            Err(_) => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Root `Pages` node of the document's catalog.
pub(crate) fn root_pages_id(doc: &LoDocument) -> Result<LoObjectId, lopdf::Error> {
    doc.catalog()?.get(b"Pages")?.as_reference()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn nested_doc() -> (LoDocument, LoObjectId, LoObjectId) {
        let mut doc = LoDocument::with_version("1.5");
        let root_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => root_id,
        });
        doc.objects.insert(
            root_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 400.into(), LoObject::Real(300.5)],
                "Resources" => dictionary! { "Font" => dictionary! {} },
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => root_id,
        });
        doc.trailer.set("Root", catalog_id);
        (doc, root_id, page_id)
    }

    #[test]
    fn media_box_is_inherited_from_parent() {
        let (doc, _, page_id) = nested_doc();
        assert_eq!(media_box(&doc, page_id), [0.0, 0.0, 400.0, 300.5]);
    }

    #[test]
    fn flatten_copies_inherited_keys_onto_page() {
        let (mut doc, root_id, page_id) = nested_doc();
        flatten_inherited(&mut doc, page_id).expect("flatten");
        let page = doc.get_dictionary(page_id).expect("page");
        assert!(page.has(b"MediaBox"));
        assert!(page.has(b"Resources"));
        assert!(!page.has(b"Rotate"));
        assert_eq!(root_pages_id(&doc).expect("root"), root_id);
    }

    #[test]
    fn missing_contents_yield_no_refs() {
        let (doc, _, page_id) = nested_doc();
        assert!(content_refs(&doc, page_id).is_empty());
    }
}
