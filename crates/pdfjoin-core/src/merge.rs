//! PDF Merge algorithm
//!
//! Combines multiple PDFs into a single document.

use crate::error::PdfJoinError;
use crate::split::rebuild_page_tree;
use lopdf::{Document, Object, ObjectId};

/// Merge multiple loaded documents into one
///
/// The algorithm:
/// 1. If empty, return error
/// 2. If single document, return it as-is
/// 3. Use the first document as the destination
/// 4. For each further source document:
///    a. Calculate ID offset to avoid conflicts
///    b. Import all objects with remapped IDs
///    c. Append its pages to the destination page list
/// 5. Rebuild the destination page tree from the combined page list
pub(crate) fn merge_documents(documents: Vec<Document>) -> Result<Document, PdfJoinError> {
    let mut documents = documents.into_iter();

    let Some(mut dest) = documents.next() else {
        return Err(PdfJoinError::OperationError("No documents to merge".into()));
    };

    let mut sources = documents.peekable();
    if sources.peek().is_none() {
        return Ok(dest);
    }

    let mut dest_max_id = dest.max_id;
    let mut dest_page_refs: Vec<ObjectId> = dest.get_pages().into_values().collect();

    for source in sources {
        // Get source pages before its objects are moved out
        let source_pages: Vec<ObjectId> = source.get_pages().into_values().collect();

        let id_offset = dest_max_id;

        for (old_id, object) in source.objects.into_iter() {
            let new_id = (old_id.0 + id_offset, old_id.1);
            dest.objects.insert(new_id, remap_object_refs(object, id_offset));
        }

        dest_page_refs.extend(
            source_pages
                .into_iter()
                .map(|(id, generation)| (id + id_offset, generation)),
        );

        dest_max_id = (source.max_id + id_offset).max(dest_max_id);
    }

    dest.max_id = dest_max_id;
    rebuild_page_tree(&mut dest, &dest_page_refs)?;

    Ok(dest)
}

/// Recursively remap object references in an object
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = remap_object_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_object_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{create_test_pdf, page_texts};
    use pretty_assertions::assert_eq;

    fn load_all(docs: Vec<Vec<u8>>) -> Vec<Document> {
        docs.iter()
            .map(|bytes| Document::load_mem(bytes).unwrap())
            .collect()
    }

    fn save(mut doc: Document) -> Vec<u8> {
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_merge_empty_fails() {
        let result = merge_documents(vec![]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("No documents to merge"));
    }

    #[test]
    fn test_merge_single_document_returns_same() {
        let docs = load_all(vec![create_test_pdf(2, "Single")]);
        let merged = merge_documents(docs).unwrap();
        assert_eq!(merged.get_pages().len(), 2);
    }

    #[test]
    fn test_merge_two_documents_combines_pages() {
        let docs = load_all(vec![create_test_pdf(2, "DocA"), create_test_pdf(3, "DocB")]);
        let merged = save(merge_documents(docs).unwrap());

        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 5, "Merged document should have 5 pages");
    }

    #[test]
    fn test_merge_preserves_page_order() {
        let docs = load_all(vec![
            create_test_pdf(2, "First"),
            create_test_pdf(1, "Second"),
            create_test_pdf(2, "Third"),
        ]);
        let merged = save(merge_documents(docs).unwrap());

        assert_eq!(
            page_texts(&merged),
            vec![
                "First-Page-1",
                "First-Page-2",
                "Second-Page-1",
                "Third-Page-1",
                "Third-Page-2"
            ]
        );
    }

    #[test]
    fn test_merge_handles_different_sizes() {
        let docs = load_all(vec![
            create_test_pdf(10, "Large"),
            create_test_pdf(1, "Small"),
            create_test_pdf(5, "Medium"),
        ]);
        let merged = save(merge_documents(docs).unwrap());

        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 16, "Merged document should have 16 pages");
    }

    #[test]
    fn test_merged_pages_point_at_single_root() {
        let docs = load_all(vec![create_test_pdf(1, "A"), create_test_pdf(1, "B")]);
        let merged = merge_documents(docs).unwrap();

        let parents: Vec<ObjectId> = merged
            .get_pages()
            .values()
            .map(|&id| {
                merged
                    .get_dictionary(id)
                    .unwrap()
                    .get(b"Parent")
                    .unwrap()
                    .as_reference()
                    .unwrap()
            })
            .collect();
        assert_eq!(parents[0], parents[1]);
    }
}
