//! Page selection
//!
//! Builds a new page tree from an arbitrary list of existing pages. The
//! tree is rebuilt flat under the catalog's root `Pages` node, so attributes
//! a page inherits from intermediate nodes are copied onto the page first.

use std::collections::HashSet;

use lopdf::{Document, Object, ObjectId};

use crate::error::PdfJoinError;

/// Page attributes that may be inherited from ancestor `Pages` nodes
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Catalog entries that can point at pages outside the new page tree
const PAGE_LINKS: [&[u8]; 4] = [b"Outlines", b"Dests", b"Names", b"OpenAction"];

/// Guard against malformed, cyclic `Parent` chains
const MAX_TREE_DEPTH: usize = 64;

/// Copy of `doc` whose page tree holds exactly `indices` (0-based), in order.
///
/// A page requested twice is duplicated into a new object so each entry in
/// `Kids` is a distinct page with a single parent. Catalog links into the
/// old page tree are dropped, so unused pages become unreachable and are
/// pruned on save.
pub(crate) fn select_pages(doc: &Document, indices: &[u32]) -> Result<Document, PdfJoinError> {
    if indices.is_empty() {
        return Err(PdfJoinError::InvalidRange("No pages specified".into()));
    }

    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    let mut new_doc = doc.clone();
    drop_page_links(&mut new_doc)?;

    let mut used = HashSet::new();
    let mut kids = Vec::with_capacity(indices.len());

    for &index in indices {
        let page_id = *pages.get(index as usize).ok_or_else(|| {
            PdfJoinError::InvalidRange(format!(
                "Page {} does not exist (document has {} pages)",
                index + 1,
                pages.len()
            ))
        })?;

        let page_id = if used.insert(page_id) {
            page_id
        } else {
            flatten_inherited(&mut new_doc, page_id);
            let copy = new_doc
                .get_object(page_id)
                .map_err(|e| PdfJoinError::OperationError(format!("Page lookup: {}", e)))?
                .clone();
            new_doc.add_object(copy)
        };
        kids.push(page_id);
    }

    rebuild_page_tree(&mut new_doc, &kids)?;
    Ok(new_doc)
}

/// Point the root `Pages` node at `page_refs`, flattening inherited
/// attributes onto each page and re-parenting it.
pub(crate) fn rebuild_page_tree(
    doc: &mut Document,
    page_refs: &[ObjectId],
) -> Result<(), PdfJoinError> {
    for &page_id in page_refs {
        flatten_inherited(doc, page_id);
    }

    let pages_id = root_pages_id(doc)?;

    for &page_id in page_refs {
        if let Ok(page) = doc.get_dictionary_mut(page_id) {
            page.set("Parent", Object::Reference(pages_id));
        }
    }

    if let Some(Object::Dictionary(ref mut pages_dict)) = doc.objects.get_mut(&pages_id) {
        // Every page now carries its own copy, so nothing may be inherited
        for key in INHERITABLE {
            pages_dict.remove(key);
        }

        let kids = page_refs
            .iter()
            .map(|&id| Object::Reference(id))
            .collect::<Vec<_>>();
        pages_dict.set("Kids", Object::Array(kids));
        pages_dict.set("Count", Object::Integer(page_refs.len() as i64));
    } else {
        return Err(PdfJoinError::OperationError(
            "Invalid pages dictionary".into(),
        ));
    }

    Ok(())
}

fn catalog_id(doc: &Document) -> Result<ObjectId, PdfJoinError> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| PdfJoinError::OperationError("No Root in trailer".into()))
}

/// Remove bookmarks, named destinations and the open action
fn drop_page_links(doc: &mut Document) -> Result<(), PdfJoinError> {
    let catalog_id = catalog_id(doc)?;
    let catalog = doc
        .get_dictionary_mut(catalog_id)
        .map_err(|_| PdfJoinError::OperationError("Catalog not found".into()))?;

    for key in PAGE_LINKS {
        catalog.remove(key);
    }
    Ok(())
}

/// Resolve trailer -> Root -> Pages
fn root_pages_id(doc: &Document) -> Result<ObjectId, PdfJoinError> {
    let catalog_id = catalog_id(doc)?;

    let catalog = doc
        .get_dictionary(catalog_id)
        .map_err(|_| PdfJoinError::OperationError("Catalog not found".into()))?;

    catalog
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(|_| PdfJoinError::OperationError("No Pages in catalog".into()))
}

/// Copy inheritable attributes from ancestor nodes onto the page itself
fn flatten_inherited(doc: &mut Document, page_id: ObjectId) {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return;
    };

    let mut missing: Vec<&[u8]> = INHERITABLE
        .iter()
        .copied()
        .filter(|key| !page.has(key))
        .collect();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut inherited: Vec<(Vec<u8>, Object)> = Vec::new();
    let mut depth = 0;

    while let Some(node_id) = parent {
        if missing.is_empty() || depth >= MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };

        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                inherited.push((key.to_vec(), value.clone()));
                false
            }
            Err(_) => true,
        });

        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    if let Ok(page) = doc.get_dictionary_mut(page_id) {
        for (key, value) in inherited {
            page.set(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{add_bookmarks, create_nested_pdf, create_test_pdf, page_texts};
    use pretty_assertions::assert_eq;

    fn save(mut doc: Document) -> Vec<u8> {
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_split_empty_pages_fails() {
        let doc = Document::load_mem(&create_test_pdf(5, "S")).unwrap();
        assert!(select_pages(&doc, &[]).is_err());
    }

    #[test]
    fn test_split_extracts_single_page() {
        let doc = Document::load_mem(&create_test_pdf(5, "S")).unwrap();
        let result = select_pages(&doc, &[0]).unwrap();
        assert_eq!(result.get_pages().len(), 1);
    }

    #[test]
    fn test_split_extracts_range_in_order() {
        let doc = Document::load_mem(&create_test_pdf(10, "S")).unwrap();
        let result = save(select_pages(&doc, &[1, 2, 3, 4]).unwrap());
        assert_eq!(
            page_texts(&result),
            vec!["S-Page-2", "S-Page-3", "S-Page-4", "S-Page-5"]
        );
    }

    #[test]
    fn test_split_invalid_page_number_fails() {
        let doc = Document::load_mem(&create_test_pdf(5, "S")).unwrap();
        // Index 10 is page 11, which doesn't exist
        assert!(select_pages(&doc, &[10]).is_err());
    }

    #[test]
    fn test_repeated_page_gets_own_object() {
        let doc = Document::load_mem(&create_test_pdf(2, "S")).unwrap();
        let result = select_pages(&doc, &[0, 0]).unwrap();
        let ids: Vec<ObjectId> = result.get_pages().into_values().collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    /// Page dictionaries written to the file, reachable from the tree or not
    fn page_objects(bytes: &[u8]) -> usize {
        let doc = Document::load_mem(bytes).unwrap();
        doc.objects
            .values()
            .filter_map(|object| object.as_dict().ok())
            .filter(|dict| {
                matches!(dict.get(b"Type").and_then(Object::as_name), Ok(name) if name == b"Page")
            })
            .count()
    }

    #[test]
    fn test_bookmarked_split_keeps_only_selected_pages() {
        let bytes = add_bookmarks(&create_test_pdf(6, "B"), &[1, 4]);
        let doc = Document::load_mem(&bytes).unwrap();

        let mut result = select_pages(&doc, &[0]).unwrap();
        result.prune_objects();
        let output = save(result);

        assert_eq!(page_texts(&output), vec!["B-Page-1"]);
        assert_eq!(page_objects(&output), 1);
        assert!(!String::from_utf8_lossy(&output).contains("B-Page-4"));

        let reloaded = Document::load_mem(&output).unwrap();
        let catalog = reloaded.get_dictionary(catalog_id(&reloaded).unwrap()).unwrap();
        assert!(!catalog.has(b"Outlines"));
    }

    #[test]
    fn test_inherited_media_box_is_flattened() {
        let doc = Document::load_mem(&create_nested_pdf()).unwrap();
        let result = select_pages(&doc, &[1]).unwrap();

        let page_id = *result.get_pages().values().next().unwrap();
        let page = result.get_dictionary(page_id).unwrap();
        assert!(page.has(b"MediaBox"));
        assert!(page.has(b"Resources"));
    }
}
