//! In-memory PDFs for tests
//!
//! Each page carries a single text run `"{prefix}-Page-{n}"` so tests can
//! check page order after merging or splitting.

use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};

/// Create a simple PDF with N pages containing identifiable text
pub fn create_test_pdf(num_pages: u32, content_prefix: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut page_ids = Vec::new();

    for page_num in 0..num_pages {
        let content_id = doc.add_object(page_content(content_prefix, page_num + 1));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        page_ids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => num_pages as i64,
            "Kids" => page_ids,
        }),
    );

    finish(doc, pages_id)
}

/// Two-page PDF whose pages inherit `MediaBox` and `Resources` from an
/// intermediate `Pages` node
pub fn create_nested_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");

    let root_pages_id = doc.new_object_id();
    let middle_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for page_num in 1..=2 {
        let content_id = doc.add_object(page_content("Nested", page_num));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => middle_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        middle_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Parent" => root_pages_id,
            "Count" => 2,
            "Kids" => kids,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        }),
    );
    doc.objects.insert(
        root_pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => 2,
            "Kids" => vec![Object::Reference(middle_id)],
        }),
    );

    finish(doc, root_pages_id)
}

/// Add a flat outline with one bookmark per given 1-based page
pub fn add_bookmarks(bytes: &[u8], pages: &[u32]) -> Vec<u8> {
    let mut doc = Document::load_mem(bytes).expect("fixture PDF should load");
    let page_ids = doc.get_pages();

    let outlines_id = doc.new_object_id();
    let entry_ids: Vec<_> = pages.iter().map(|_| doc.new_object_id()).collect();

    for (i, (&page, &entry_id)) in pages.iter().zip(&entry_ids).enumerate() {
        let page_id = page_ids[&page];
        let mut entry = dictionary! {
            "Title" => Object::String(format!("Chapter {}", i + 1).into_bytes(), StringFormat::Literal),
            "Parent" => outlines_id,
            "Dest" => vec![Object::Reference(page_id), "Fit".into()],
        };
        if let Some(&prev) = i.checked_sub(1).and_then(|p| entry_ids.get(p)) {
            entry.set("Prev", prev);
        }
        if let Some(&next) = entry_ids.get(i + 1) {
            entry.set("Next", next);
        }
        doc.objects.insert(entry_id, Object::Dictionary(entry));
    }

    let mut outlines = dictionary! {
        "Type" => "Outlines",
        "Count" => entry_ids.len() as i64,
    };
    if let (Some(&first), Some(&last)) = (entry_ids.first(), entry_ids.last()) {
        outlines.set("First", first);
        outlines.set("Last", last);
    }
    doc.objects.insert(outlines_id, Object::Dictionary(outlines));

    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .expect("fixture PDF should have a catalog");
    doc.get_dictionary_mut(catalog_id)
        .expect("catalog should be a dictionary")
        .set("Outlines", outlines_id);

    save(doc)
}

/// The text run of each page, in page order
pub fn page_texts(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).expect("output PDF should load");
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let content = doc.get_page_content(page_id).unwrap_or_default();
            let content = String::from_utf8_lossy(&content);
            content
                .split_once('(')
                .and_then(|(_, rest)| rest.split_once(')'))
                .map(|(text, _)| text.to_string())
                .unwrap_or_default()
        })
        .collect()
}

fn page_content(prefix: &str, page_num: u32) -> Stream {
    let content = format!(
        "BT /F1 12 Tf 50 700 Td ({}-Page-{}) Tj ET",
        prefix, page_num
    );
    Stream::new(Dictionary::new(), content.into_bytes())
}

fn finish(mut doc: Document, pages_id: lopdf::ObjectId) -> Vec<u8> {
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    save(doc)
}

fn save(mut doc: Document) -> Vec<u8> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("fixture PDF should save");
    buffer
}
