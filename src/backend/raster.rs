//! [`Rasterizer`] that wraps one image in a single-page A4 PDF.
//!
//! The page is portrait unless the image is wider than it is tall. The image
//! is scaled to fit the page with its aspect ratio intact and anchored at the
//! top-left corner. Transparent pixels are composited onto white.
//!
//! Decoding and encoding are CPU-bound, so the work runs on the blocking pool.

use super::Rasterizer;
use crate::error::BackendError;
use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A4 in PDF points.
const A4_POINTS: (f32, f32) = (595.28, 841.89);

/// Image → PDF via `image` and `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageRasterizer;

impl ImageRasterizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Rasterizer for ImageRasterizer {
    async fn rasterize(&self, image: &Path, dest: &Path) -> Result<(), BackendError> {
        let image: PathBuf = image.to_path_buf();
        let dest: PathBuf = dest.to_path_buf();
        tokio::task::spawn_blocking(move || rasterize_blocking(&image, &dest))
            .await
            .map_err(|e| BackendError::Image(format!("rasterize task panicked: {e}")))?
    }
}

fn rasterize_blocking(image: &Path, dest: &Path) -> Result<(), BackendError> {
    let img_err = |e: image::ImageError| BackendError::Image(format!("{}: {}", image.display(), e));

    let decoded = image::ImageReader::open(image)?
        .with_guessed_format()?
        .decode()
        .map_err(img_err)?;
    let rgb = flatten_onto_white(decoded);
    let (w, h) = rgb.dimensions();
    if w == 0 || h == 0 {
        return Err(BackendError::Image(format!("{}: empty image", image.display())));
    }

    let (pw, ph) = page_size(w, h);
    let (dw, dh) = fit(w, h, pw, ph);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut xobject = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => w as i64,
            "Height" => h as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        rgb.into_raw(),
    );
    xobject
        .compress()
        .map_err(|e| BackendError::Pdf(format!("compress image stream: {e}")))?;
    let image_id = doc.add_object(xobject);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    dw.into(),
                    0.into(),
                    0.into(),
                    dh.into(),
                    0.into(),
                    (ph - dh).into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|e| BackendError::Pdf(format!("encode page content: {e}")))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), pw.into(), ph.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(dest)
        .map_err(|e| BackendError::Pdf(format!("{}: {}", dest.display(), e)))?;
    debug!(width = w, height = h, landscape = pw > ph, dest = %dest.display(), "Rasterized image");
    Ok(())
}

/// A4, landscape when the image is wider than tall.
fn page_size(w: u32, h: u32) -> (f32, f32) {
    let (short, long) = A4_POINTS;
    if w > h {
        (long, short)
    } else {
        (short, long)
    }
}

/// Largest size with the image's aspect ratio that fits in `pw × ph`.
fn fit(w: u32, h: u32, pw: f32, ph: f32) -> (f32, f32) {
    let scale = (pw / w as f32).min(ph / h as f32);
    (w as f32 * scale, h as f32 * scale)
}

fn flatten_onto_white(img: DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| ((c as u16 * a as u16 + 255 * (255 - a as u16)) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}
