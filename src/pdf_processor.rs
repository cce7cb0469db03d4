use crate::types::*;
use lopdf::{Dictionary, Document as PdfDocument, Object, ObjectId};
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref};
use std::collections::BTreeMap;
use std::path::Path;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: &[&[u8]] = &[b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Object types that are rebuilt, not copied, when pages are reassembled.
const STRUCTURAL_TYPES: &[&[u8]] = &[b"Catalog", b"Pages", b"Page", b"Outlines", b"Outline"];

/// An already-encoded JPEG to be placed on its own page.
#[derive(Debug, Clone)]
pub struct JpegPage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Page size in PDF points.
    pub page_width: f32,
    pub page_height: f32,
}

pub struct PdfProcessor;

impl PdfProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn load(&self, path: &Path) -> Result<PdfDocument, ConversionError> {
        PdfDocument::load(path)
            .map_err(|e| ConversionError::Pdf(format!("Failed to load {}: {}", path.display(), e)))
    }

    pub fn page_count(&self, doc: &PdfDocument) -> usize {
        doc.get_pages().len()
    }

    /// Lossless structural pass: prune unreferenced objects, drop empty
    /// streams, Flate-compress raw streams and normalize the header version.
    ///
    /// Never fails. If the file cannot be parsed or written, or the rewrite
    /// comes out larger, the original bytes are returned.
    pub fn optimize_pdf(&self, content: &[u8]) -> Vec<u8> {
        let mut doc = match PdfDocument::load_mem(content) {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("PDF optimization failed, returning original: {}", e);
                return content.to_vec();
            }
        };

        doc.version = "1.7".to_string();
        doc.prune_objects();
        doc.delete_zero_length_streams();
        doc.compress();

        let mut output = Vec::new();
        if let Err(e) = doc.save_to(&mut output) {
            log::warn!("Failed to save optimized PDF, returning original: {}", e);
            return content.to_vec();
        }

        if output.len() >= content.len() {
            log::info!(
                "PDF optimization did not shrink the file ({} -> {} bytes), keeping original",
                content.len(),
                output.len()
            );
            return content.to_vec();
        }

        log::info!(
            "PDF optimized: {} -> {} bytes ({:.1}% reduction)",
            content.len(),
            output.len(),
            (1.0 - output.len() as f64 / content.len() as f64) * 100.0
        );
        output
    }

    /// Concatenate every page of every document, in order.
    pub fn merge(&self, documents: Vec<PdfDocument>) -> Result<Vec<u8>, ConversionError> {
        let mut assembler = PageAssembler::new();
        for doc in documents {
            let all: Vec<usize> = (0..self.page_count(&doc)).collect();
            assembler.append(doc, &all)?;
        }
        log::info!("Merged {} pages", assembler.page_count());
        assembler.finish()
    }

    /// Build a new document from zero-based `indices`, in the given order.
    /// A repeated index produces a repeated page.
    pub fn select_pages(
        &self,
        doc: PdfDocument,
        indices: &[usize],
    ) -> Result<Vec<u8>, ConversionError> {
        let mut assembler = PageAssembler::new();
        assembler.append(doc, indices)?;
        assembler.finish()
    }

    /// Text of every page, pages separated by a blank line. Pages whose text
    /// cannot be extracted contribute an empty block.
    pub fn extract_text(&self, doc: &PdfDocument) -> String {
        doc.get_pages()
            .keys()
            .map(|&page_number| {
                doc.extract_text(&[page_number]).unwrap_or_else(|e| {
                    log::warn!("Text extraction failed on page {}: {}", page_number, e);
                    String::new()
                })
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Lay out JPEG images one per page, embedding the JPEG data unchanged.
    pub fn jpeg_pages_to_pdf(&self, pages: &[JpegPage]) -> Result<Vec<u8>, ConversionError> {
        if pages.is_empty() {
            return Err(ConversionError::Pdf("No pages to write".to_string()));
        }

        let mut pdf = Pdf::new();
        let catalog_id = Ref::new(1);
        let page_tree_id = Ref::new(2);
        let image_name = Name(b"Im1");
        let mut page_ids = Vec::with_capacity(pages.len());

        pdf.catalog(catalog_id).pages(page_tree_id);

        for (index, page) in pages.iter().enumerate() {
            let base = 3 + 3 * index as i32;
            let page_id = Ref::new(base);
            let image_id = Ref::new(base + 1);
            let content_id = Ref::new(base + 2);
            page_ids.push(page_id);

            let mut page_writer = pdf.page(page_id);
            page_writer.media_box(Rect::new(0.0, 0.0, page.page_width, page.page_height));
            page_writer.parent(page_tree_id);
            page_writer.contents(content_id);
            page_writer.resources().x_objects().pair(image_name, image_id);
            page_writer.finish();

            let mut image = pdf.image_xobject(image_id, &page.data);
            image.filter(Filter::DctDecode);
            image.width(page.width as i32);
            image.height(page.height as i32);
            image.color_space().device_rgb();
            image.bits_per_component(8);
            image.finish();

            let mut content = Content::new();
            content.save_state();
            content.transform([page.page_width, 0.0, 0.0, page.page_height, 0.0, 0.0]);
            content.x_object(image_name);
            content.restore_state();
            pdf.stream(content_id, &content.finish());
        }

        pdf.pages(page_tree_id)
            .kids(page_ids.iter().copied())
            .count(page_ids.len() as i32);

        let bytes = pdf.finish();
        log::info!("Created PDF with {} image pages: {} bytes", pages.len(), bytes.len());
        Ok(bytes)
    }
}

impl Default for PdfProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects pages from one or more source documents into a fresh page tree.
///
/// Each source is renumbered above the objects already collected, so ids
/// never collide. Page dictionaries are copied with their inherited
/// attributes resolved and get new ids when the output is written, which is
/// what lets the same source page appear more than once.
struct PageAssembler {
    next_id: u32,
    pages: Vec<Dictionary>,
    objects: BTreeMap<ObjectId, Object>,
}

impl PageAssembler {
    fn new() -> Self {
        Self {
            next_id: 1,
            pages: Vec::new(),
            objects: BTreeMap::new(),
        }
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn append(&mut self, mut doc: PdfDocument, indices: &[usize]) -> Result<(), ConversionError> {
        doc.renumber_objects_with(self.next_id);
        self.next_id = doc.max_id + 1;

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for &index in indices {
            let page_id = page_ids.get(index).copied().ok_or_else(|| {
                ConversionError::Pdf(format!(
                    "Page index {} out of range ({} pages)",
                    index,
                    page_ids.len()
                ))
            })?;
            self.pages.push(flatten_page(&doc, page_id)?);
        }

        for (object_id, object) in doc.objects {
            let structural = type_name(&object).is_some_and(|name| STRUCTURAL_TYPES.contains(&name));
            if !structural {
                self.objects.insert(object_id, object);
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>, ConversionError> {
        let mut document = PdfDocument::with_version("1.7");
        document.objects = self.objects;
        document.max_id = self.next_id;

        let pages_id = document.new_object_id();
        let mut kids = Vec::with_capacity(self.pages.len());
        for mut page in self.pages {
            page.set("Parent", Object::Reference(pages_id));
            kids.push(Object::Reference(document.add_object(page)));
        }

        let count = kids.len() as i64;
        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ]);
        document.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = document.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        document.trailer.set("Root", Object::Reference(catalog_id));

        // Resources of pages that were not selected are unreachable now.
        document.prune_objects();
        document.renumber_objects();
        document.compress();

        let mut output = Vec::new();
        document
            .save_to(&mut output)
            .map_err(|e| ConversionError::Pdf(format!("Failed to save PDF: {}", e)))?;
        Ok(output)
    }
}

/// Copy a page dictionary, pulling inheritable attributes down from its
/// ancestors so it stays valid under a new parent.
fn flatten_page(doc: &PdfDocument, page_id: ObjectId) -> Result<Dictionary, ConversionError> {
    let mut page = doc.get_dictionary(page_id)?.clone();
    let mut parent = page.get(b"Parent").and_then(|p| p.as_reference()).ok();
    let mut depth = 0;

    while let Some(parent_id) = parent {
        // Guards against cyclic Parent chains in broken files.
        if depth > 64 {
            break;
        }
        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(|p| p.as_reference()).ok();
        depth += 1;
    }

    page.remove(b"Parent");
    Ok(page)
}

fn type_name(object: &Object) -> Option<&[u8]> {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return None,
    };
    dict.get(b"Type").and_then(|t| t.as_name()).ok()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{Dictionary, Document, Object, Stream};

    /// A PDF whose page `i` is `base_width + i` points wide and shows
    /// `"<label><i+1>"`.
    pub fn labelled_pdf(label: &str, pages: u32, base_width: i64) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ]));
        let resources_id = doc.add_object(Dictionary::from_iter(vec![(
            "Font",
            Object::Dictionary(Dictionary::from_iter(vec![("F1", Object::Reference(font_id))])),
        )]));

        let mut kids = Vec::new();
        for i in 0..pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                    Operation::new("Td", vec![Object::Integer(20), Object::Integer(700)]),
                    Operation::new(
                        "Tj",
                        vec![Object::string_literal(format!("{}{}", label, i + 1))],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let page_id = doc.add_object(Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                (
                    "MediaBox",
                    Object::Array(vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(base_width + i as i64),
                        Object::Integer(792),
                    ]),
                ),
                ("Resources", Object::Reference(resources_id)),
                ("Contents", Object::Reference(content_id)),
            ]));
            kids.push(Object::Reference(page_id));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Count", Object::Integer(pages as i64)),
                ("Kids", Object::Array(kids)),
            ])),
        );
        let catalog_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    /// Page widths in page order.
    pub fn page_widths(bytes: &[u8]) -> Vec<i64> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|&id| {
                let page = doc.get_dictionary(id).unwrap();
                page.get(b"MediaBox").unwrap().as_array().unwrap()[2]
                    .as_i64()
                    .unwrap()
            })
            .collect()
    }

    /// Page widths in points, for files whose boxes may be written as reals.
    pub fn media_box_widths(bytes: &[u8]) -> Vec<f32> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|&id| {
                let page = doc.get_dictionary(id).unwrap();
                page.get(b"MediaBox").unwrap().as_array().unwrap()[2]
                    .as_float()
                    .unwrap()
            })
            .collect()
    }
}
