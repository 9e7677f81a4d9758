//! Top-level bookmark lookup
//!
//! Walks `/Outlines -> /First -> /Next` and resolves each entry's explicit
//! destination (or GoTo action) to a page number. Nested bookmarks and
//! named destinations are not followed.

use std::collections::{HashMap, HashSet};

use lopdf::{Dictionary, Document, Object, ObjectId};

/// Upper bound on siblings, guards against `/Next` cycles that dodge the
/// visited set through malformed references
const MAX_SIBLINGS: usize = 10_000;

/// 1-based start pages of the top-level outline entries, in outline order
pub(crate) fn top_level_starts(doc: &Document) -> Vec<u32> {
    let page_numbers: HashMap<ObjectId, u32> = doc
        .get_pages()
        .into_iter()
        .map(|(number, id)| (id, number))
        .collect();

    let Some(mut current) = first_entry(doc) else {
        return Vec::new();
    };

    let mut starts = Vec::new();
    let mut visited = HashSet::new();

    loop {
        if !visited.insert(current) || visited.len() > MAX_SIBLINGS {
            break;
        }
        let Ok(entry) = doc.get_dictionary(current) else {
            break;
        };

        if let Some(page) = entry_page(doc, entry, &page_numbers) {
            starts.push(page);
        }

        match entry.get(b"Next").and_then(Object::as_reference) {
            Ok(next) => current = next,
            Err(_) => break,
        }
    }

    starts
}

fn first_entry(doc: &Document) -> Option<ObjectId> {
    let catalog_id = doc.trailer.get(b"Root").and_then(Object::as_reference).ok()?;
    let catalog = doc.get_dictionary(catalog_id).ok()?;
    let outlines = resolve(doc, catalog.get(b"Outlines").ok()?)?.as_dict().ok()?;
    outlines.get(b"First").and_then(Object::as_reference).ok()
}

/// Page number of an entry's `/Dest`, falling back to a GoTo `/A` action
fn entry_page(
    doc: &Document,
    entry: &Dictionary,
    page_numbers: &HashMap<ObjectId, u32>,
) -> Option<u32> {
    if let Some(page) = entry
        .get(b"Dest")
        .ok()
        .and_then(|dest| dest_page(doc, dest, page_numbers))
    {
        return Some(page);
    }

    let action = resolve(doc, entry.get(b"A").ok()?)?.as_dict().ok()?;
    match action.get(b"S") {
        Ok(Object::Name(kind)) if kind.as_slice() == b"GoTo" => {
            dest_page(doc, action.get(b"D").ok()?, page_numbers)
        }
        _ => None,
    }
}

/// Explicit destinations are arrays whose first element is the page
fn dest_page(doc: &Document, dest: &Object, page_numbers: &HashMap<ObjectId, u32>) -> Option<u32> {
    match resolve(doc, dest)? {
        Object::Array(items) => match items.first()? {
            Object::Reference(page_id) => page_numbers.get(page_id).copied(),
            _ => None,
        },
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}
