//! PDF generation and merging
//!
//! Wraps each captured raster in a single-page PDF whose page box matches
//! the image aspect, then merges per-domain and global documents with one
//! bookmark per source document.

use crate::error::{PdfError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Bookmark, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Rasters with a side longer than this are downscaled before embedding;
/// several PDF viewers reject larger page boxes.
const MAX_PIXEL_DIMENSION: u32 = 20_000;

const JPEG_QUALITY: u8 = 90;

/// One source document for a merge, bookmarked under `title`.
#[derive(Debug, Clone)]
pub struct MergeInput {
    /// Bookmark title
    pub title: String,
    /// Path to the source PDF
    pub path: PathBuf,
}

/// Builds single-image PDFs and merges them into larger documents.
#[derive(Debug, Clone)]
pub struct PdfGenerator {
    dpi: u32,
}

impl Default for PdfGenerator {
    fn default() -> Self {
        Self { dpi: 300 }
    }
}

impl PdfGenerator {
    /// Create a generator that maps pixels to points at the given density.
    pub fn new(dpi: u32) -> Self {
        Self { dpi: dpi.max(1) }
    }

    /// Write `image` as a one-page PDF at `out_path`.
    ///
    /// The raster is embedded as a DCT-encoded (JPEG) image XObject; the
    /// page box is sized so the image fills it edge to edge.
    #[instrument(skip(self, image), fields(out = %out_path.display()))]
    pub fn image_to_pdf(&self, image: &RgbaImage, out_path: &Path) -> Result<()> {
        let rgb = self.prepare(image);
        let (width, height) = rgb.dimensions();

        let mut jpeg = Vec::new();
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut jpeg), JPEG_QUALITY);
        encoder
            .encode_image(&rgb)
            .map_err(|e| PdfError::ImageEncode(e.to_string()))?;

        let scale = 72.0 / self.dpi as f32;
        let width_pt = width as f32 * scale;
        let height_pt = height as f32 * scale;

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width_pt.into(),
                        0.into(),
                        0.into(),
                        height_pt.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec!["Im0".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().map_err(|e| PdfError::Content(e.to_string()))?,
        ));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
            "MediaBox" => vec![0.into(), 0.into(), width_pt.into(), height_pt.into()],
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Producer" => Object::string_literal(crate::NAME),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        doc.save(out_path)?;
        debug!("Wrote {}x{}px page to {}", width, height, out_path.display());
        Ok(())
    }

    /// Downscale oversized rasters and drop the alpha channel.
    fn prepare(&self, image: &RgbaImage) -> image::RgbImage {
        let (width, height) = image.dimensions();
        let longest = width.max(height);
        if longest <= MAX_PIXEL_DIMENSION {
            return DynamicImage::ImageRgba8(image.clone()).to_rgb8();
        }

        let factor = MAX_PIXEL_DIMENSION as f64 / longest as f64;
        let new_width = ((width as f64 * factor) as u32).max(1);
        let new_height = ((height as f64 * factor) as u32).max(1);
        info!(
            "Downscaling {}x{} raster to {}x{} for PDF embedding",
            width, height, new_width, new_height
        );
        let resized = image::imageops::resize(image, new_width, new_height, FilterType::Lanczos3);
        DynamicImage::ImageRgba8(resized).to_rgb8()
    }
}

/// Keep only inputs that load as PDFs with at least one page.
///
/// Unreadable files are logged and dropped so one corrupt page PDF cannot
/// sink a whole merge.
pub fn filter_valid(inputs: Vec<MergeInput>) -> Vec<MergeInput> {
    inputs
        .into_iter()
        .filter(|input| match Document::load(&input.path) {
            Ok(doc) if !doc.get_pages().is_empty() => true,
            Ok(_) => {
                warn!("Skipping empty PDF: {}", input.path.display());
                false
            }
            Err(e) => {
                warn!("Skipping unreadable PDF {}: {}", input.path.display(), e);
                false
            }
        })
        .collect()
}

/// Merge the inputs into one document at `out_path`, in order, with one
/// outline bookmark pointing at each input's first page.
///
/// Returns the number of documents merged.
#[instrument(skip(inputs), fields(out = %out_path.display()))]
pub fn merge(inputs: Vec<MergeInput>, out_path: &Path) -> Result<usize> {
    let inputs = filter_valid(inputs);
    if inputs.is_empty() {
        return Err(PdfError::NothingToMerge.into());
    }
    let merged_count = inputs.len();

    let mut max_id = 1;
    let mut merged = Document::with_version("1.5");
    let mut all_pages: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut all_objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for input in inputs {
        let mut doc = Document::load(&input.path).map_err(PdfError::Document)?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let mut bookmarked = false;
        for (_, page_id) in doc.get_pages() {
            if !bookmarked {
                merged.add_bookmark(
                    Bookmark::new(input.title.clone(), [0.0, 0.0, 0.0], 0, page_id),
                    None,
                );
                bookmarked = true;
            }
            if let Ok(object) = doc.get_object(page_id) {
                all_pages.insert(page_id, object.to_owned());
            }
        }
        all_objects.extend(doc.objects);
    }

    let mut catalog: Option<(ObjectId, Object)> = None;
    let mut pages: Option<(ObjectId, lopdf::Dictionary)> = None;

    for (object_id, object) in all_objects {
        match object.type_name().unwrap_or(b"") {
            b"Catalog" => {
                catalog.get_or_insert((object_id, object));
            }
            b"Pages" => {
                if let Ok(dict) = object.as_dict() {
                    match pages.as_mut() {
                        Some((_, merged_dict)) => merged_dict.extend(dict),
                        None => pages = Some((object_id, dict.clone())),
                    }
                }
            }
            // Page objects are re-parented below; stale outlines are
            // rebuilt from the collected bookmarks.
            b"Page" | b"Outlines" | b"Outline" => {}
            _ => {
                merged.objects.insert(object_id, object);
            }
        }
    }

    let (pages_id, mut pages_dict) = pages.ok_or(PdfError::NothingToMerge)?;
    let (catalog_id, catalog_object) = catalog.ok_or(PdfError::NothingToMerge)?;

    for (page_id, object) in &all_pages {
        if let Ok(dict) = object.as_dict() {
            let mut dict = dict.clone();
            dict.set("Parent", pages_id);
            merged.objects.insert(*page_id, Object::Dictionary(dict));
        }
    }

    pages_dict.set("Count", all_pages.len() as u32);
    pages_dict.set(
        "Kids",
        all_pages
            .keys()
            .map(|id| Object::Reference(*id))
            .collect::<Vec<_>>(),
    );
    merged
        .objects
        .insert(pages_id, Object::Dictionary(pages_dict));

    let mut catalog_dict = catalog_object
        .as_dict()
        .map_err(PdfError::Document)?
        .clone();
    catalog_dict.set("Pages", pages_id);
    catalog_dict.remove(b"Outlines");
    merged
        .objects
        .insert(catalog_id, Object::Dictionary(catalog_dict));

    merged.trailer.set("Root", catalog_id);

    // Everything so far went in through `objects.insert`, which does not
    // advance `max_id`; it must be caught up before `add_object` hands out
    // the next id, or the Info dictionary lands on an existing object.
    merged.max_id = max_id.saturating_sub(1);
    let info_id = merged.add_object(dictionary! {
        "Producer" => Object::string_literal(crate::NAME),
    });
    merged.trailer.set("Info", info_id);

    merged.renumber_objects();
    merged.adjust_zero_pages();

    if let Some(outline_id) = merged.build_outline() {
        // Renumbering rewrote every reference, so resolve the catalog
        // through the trailer rather than the pre-renumber id.
        let root_id = merged
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(PdfError::Document)?;
        if let Ok(Object::Dictionary(dict)) = merged.get_object_mut(root_id) {
            dict.set("Outlines", Object::Reference(outline_id));
        }
    }

    merged.compress();
    merged.save(out_path)?;
    info!("Merged {} documents into {}", merged_count, out_path.display());
    Ok(merged_count)
}
