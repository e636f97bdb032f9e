use crate::PageSize;
use lopdf::{Document, Object, ObjectId};

/// Depth limit when walking the page tree for inherited attributes
const MAX_TREE_DEPTH: usize = 32;

/// Page MediaBox in PDF user space (bottom-left origin)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x0: f32,
    pub y0: f32,
    pub width: f32,
    pub height: f32,
}

impl PageBox {
    /// US Letter, used when a page carries no readable MediaBox
    pub const LETTER: PageBox = PageBox { x0: 0.0, y0: 0.0, width: 612.0, height: 792.0 };

    pub fn size(&self) -> PageSize {
        PageSize { width_pt: self.width, height_pt: self.height }
    }
}

/// Follow a reference one level, returning the object itself otherwise
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

/// Look up a page attribute, walking up the page tree for inheritable keys
/// such as `MediaBox` and `Resources`.
pub(crate) fn inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

pub fn media_box(doc: &Document, page_id: ObjectId) -> PageBox {
    inherited(doc, page_id, b"MediaBox")
        .and_then(|object| object.as_array().ok())
        .and_then(|array| parse_box(doc, array))
        .unwrap_or(PageBox::LETTER)
}

fn parse_box(doc: &Document, array: &[Object]) -> Option<PageBox> {
    if array.len() != 4 {
        return None;
    }

    let mut values = [0.0f32; 4];
    for (slot, object) in values.iter_mut().zip(array) {
        *slot = resolve(doc, object).as_float().ok()?;
    }

    let [ax, ay, bx, by] = values;
    let width = (bx - ax).abs();
    let height = (by - ay).abs();
    if width <= 0.0 || height <= 0.0 {
        return None;
    }

    Some(PageBox { x0: ax.min(bx), y0: ay.min(by), width, height })
}
