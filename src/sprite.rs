use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use crate::error::{SpritecastError, SpritecastResult};

/// Decoded sprite raster: straight (non-premultiplied) RGBA8, row-major,
/// tightly packed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpriteImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl SpriteImage {
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> SpritecastResult<Self> {
        if width == 0 || height == 0 {
            return Err(SpritecastError::validation(
                "sprite width/height must be non-zero",
            ));
        }
        if data.len() != (width as usize) * (height as usize) * 4 {
            return Err(SpritecastError::validation(
                "sprite data length must be width*height*4",
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> SpritecastResult<Self> {
        let px = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(px * 4);
        for _ in 0..px {
            data.extend_from_slice(&rgba);
        }
        Self::from_rgba8(width, height, data)
    }

    /// Straight RGBA at (x, y); `None` outside bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + x as usize) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    /// Scale to `target_h` rows, preserving aspect ratio. Width is floored
    /// with a minimum of one column.
    pub fn resize_to_height(&self, target_h: u32) -> SpritecastResult<SpriteImage> {
        let target_h = target_h.max(1);
        let scale = f64::from(target_h) / f64::from(self.height);
        let target_w = ((f64::from(self.width) * scale) as u32).max(1);
        if target_w == self.width && target_h == self.height {
            return Ok(self.clone());
        }

        let img = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| {
                SpritecastError::evaluation("sprite buffer does not match its dimensions")
            })?;
        let resized =
            image::imageops::resize(&img, target_w, target_h, image::imageops::FilterType::Triangle);
        Ok(SpriteImage {
            width: target_w,
            height: target_h,
            data: resized.into_raw(),
        })
    }
}

/// Decode raster bytes into straight RGBA8.
///
/// 3-channel sources are promoted with alpha 255; single-channel sources are
/// expanded to gray RGBA. Undecodable data is a [`SpritecastError::Decode`],
/// never silently substituted.
pub fn decode_sprite(bytes: &[u8], origin: &Path) -> SpritecastResult<SpriteImage> {
    let dyn_img = image::load_from_memory(bytes).map_err(|e| {
        SpritecastError::decode(format!("decode sprite '{}': {e}", origin.display()))
    })?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    SpriteImage::from_rgba8(width, height, rgba.into_raw())
}

/// Load a sprite from disk.
///
/// A missing file is `Ok(None)` so callers can run their fallback chain;
/// any other IO or decode failure propagates.
pub fn load_sprite(path: &Path) -> SpritecastResult<Option<SpriteImage>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(SpritecastError::Other(anyhow::Error::new(e).context(
                format!("read sprite '{}'", path.display()),
            )));
        }
    };
    decode_sprite(&bytes, path).map(Some)
}

/// Sprite cache owned by one render invocation, keyed by resolved path.
///
/// Read-mostly after first load. Concurrent misses may decode the same file
/// twice; the last writer wins, which is fine for an immutable asset set.
/// Unbounded on purpose: the asset set is finite per run.
#[derive(Debug, Default)]
pub struct SpriteCache {
    entries: RwLock<HashMap<PathBuf, Arc<SpriteImage>>>,
}

impl SpriteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_or_load(&self, path: &Path) -> SpritecastResult<Option<Arc<SpriteImage>>> {
        if let Some(hit) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
        {
            return Ok(Some(hit.clone()));
        }

        let Some(img) = load_sprite(path)? else {
            return Ok(None);
        };
        let img = Arc::new(img);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), img.clone());
        Ok(Some(img))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn png_bytes(img: image::DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn decode_promotes_rgb_to_opaque_rgba() {
        let rgb = image::RgbImage::from_raw(1, 1, vec![10u8, 20u8, 30u8]).unwrap();
        let bytes = png_bytes(image::DynamicImage::ImageRgb8(rgb));
        let sprite = decode_sprite(&bytes, Path::new("x.png")).unwrap();
        assert_eq!(sprite.data, vec![10, 20, 30, 255]);
    }

    #[test]
    fn decode_promotes_gray_to_rgba() {
        let gray = image::GrayImage::from_raw(1, 1, vec![77u8]).unwrap();
        let bytes = png_bytes(image::DynamicImage::ImageLuma8(gray));
        let sprite = decode_sprite(&bytes, Path::new("x.png")).unwrap();
        assert_eq!(sprite.data, vec![77, 77, 77, 255]);
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_sprite(b"not an image", Path::new("junk.bin")).unwrap_err();
        assert!(matches!(err, SpritecastError::Decode(_)));
    }

    #[test]
    fn load_missing_file_is_none() {
        let missing = std::env::temp_dir().join("spritecast_definitely_missing.png");
        assert!(load_sprite(&missing).unwrap().is_none());
    }

    #[test]
    fn resize_preserves_aspect_ratio() {
        let sprite = SpriteImage::solid(10, 20, [1, 2, 3, 4]).unwrap();
        let resized = sprite.resize_to_height(10).unwrap();
        assert_eq!((resized.width, resized.height), (5, 10));

        let same = sprite.resize_to_height(20).unwrap();
        assert_eq!((same.width, same.height), (10, 20));
    }

    #[test]
    fn resize_never_collapses_to_zero() {
        let sprite = SpriteImage::solid(1, 100, [0, 0, 0, 255]).unwrap();
        let resized = sprite.resize_to_height(3).unwrap();
        assert_eq!((resized.width, resized.height), (1, 3));
    }

    #[test]
    fn cache_hits_share_the_decoded_sprite() {
        let dir = std::env::temp_dir().join(format!("spritecast_cache_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("px.png");
        let img = image::RgbaImage::from_raw(1, 1, vec![9, 8, 7, 255]).unwrap();
        std::fs::write(&path, png_bytes(image::DynamicImage::ImageRgba8(img))).unwrap();

        let cache = SpriteCache::new();
        let a = cache.get_or_load(&path).unwrap().unwrap();
        let b = cache.get_or_load(&path).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
