//! Decoded raster cache for image annotations
//!
//! Holds one decoded pixmap per image id. An entry is re-decoded only when
//! the image's bytes change and is released when the image disappears from
//! the document or the document closes.

use annotation_model::{ImageAnnotation, ImageId, ImageMimeType};
use image::ImageFormat;
use std::collections::HashMap;
use std::sync::Arc;
use tiny_skia::{IntSize, Pixmap};

#[derive(Debug)]
struct CachedImage {
    source: Arc<[u8]>,
    /// `None` when decoding failed; retried only if the bytes change
    pixmap: Option<Pixmap>,
}

#[derive(Debug, Default)]
pub struct ImageCache {
    entries: HashMap<ImageId, CachedImage>,
    decodes: usize,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded pixmap for an image, decoding on first use or after its bytes change
    pub fn get(&mut self, image: &ImageAnnotation) -> Option<&Pixmap> {
        let stale = match self.entries.get(&image.id) {
            Some(entry) => !same_bytes(&entry.source, &image.data),
            None => true,
        };

        if stale {
            self.decodes += 1;
            let pixmap = match decode(&image.data, image.mime_type) {
                Ok(pixmap) => Some(pixmap),
                Err(err) => {
                    tracing::warn!(
                        image = %image.id,
                        error = %err,
                        "failed to decode image annotation"
                    );
                    None
                }
            };
            self.entries
                .insert(image.id, CachedImage { source: Arc::clone(&image.data), pixmap });
        }

        self.entries.get(&image.id).and_then(|entry| entry.pixmap.as_ref())
    }

    /// Drop every entry whose id is not in `live`
    pub fn retain_ids(&mut self, live: impl IntoIterator<Item = ImageId>) {
        let live: std::collections::HashSet<ImageId> = live.into_iter().collect();
        self.entries.retain(|id, _| live.contains(id));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of decode attempts so far
    pub fn decode_count(&self) -> usize {
        self.decodes
    }
}

fn same_bytes(a: &Arc<[u8]>, b: &Arc<[u8]>) -> bool {
    Arc::ptr_eq(a, b) || a[..] == b[..]
}

#[derive(Debug, thiserror::Error)]
enum DecodeError {
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("image of {width}x{height} cannot be rasterized")]
    Size { width: u32, height: u32 },
}

fn decode(bytes: &[u8], mime_type: ImageMimeType) -> Result<Pixmap, DecodeError> {
    let format = match mime_type {
        ImageMimeType::Png => ImageFormat::Png,
        ImageMimeType::Jpeg => ImageFormat::Jpeg,
    };
    let rgba = image::load_from_memory_with_format(bytes, format)?.to_rgba8();
    let (width, height) = rgba.dimensions();

    // tiny-skia stores premultiplied alpha
    let mut data = rgba.into_raw();
    for pixel in data.chunks_exact_mut(4) {
        let alpha = u16::from(pixel[3]);
        for channel in &mut pixel[..3] {
            *channel = ((u16::from(*channel) * alpha + 127) / 255) as u8;
        }
    }

    IntSize::from_wh(width, height)
        .and_then(|size| Pixmap::from_vec(data, size))
        .ok_or(DecodeError::Size { width, height })
}
