use std::ops::{Index, IndexMut};

use rayon::prelude::*;

/// Row-major 2D buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer<T> {
    width: usize,
    height: usize,
    pixels: Vec<T>,
}

/// Single-channel float image holding raw sensor samples.
pub type Mosaic = ImageBuffer<f32>;

/// Half-resolution image with one channel per 2x2 Bayer position.
pub type Rgba = ImageBuffer<[f32; 4]>;

impl<T> ImageBuffer<T> {
    pub fn new(width: usize, height: usize, pixels: Vec<T>) -> Self {
        assert_eq!(
            pixels.len(),
            width * height,
            "pixel count must equal width * height"
        );
        Self {
            width,
            height,
            pixels,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    pub fn pixels(&self) -> &[T] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [T] {
        &mut self.pixels
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }
}

impl<T: Clone> ImageBuffer<T> {
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self::new(width, height, vec![value; width * height])
    }
}

impl<T: Default + Clone> ImageBuffer<T> {
    pub fn new_default(width: usize, height: usize) -> Self {
        Self::filled(width, height, T::default())
    }
}

impl<T: Send> ImageBuffer<T> {
    /// Builds a buffer by evaluating `f(x, y)` for every pixel, rows in parallel.
    pub fn from_fn<F>(width: usize, height: usize, f: F) -> Self
    where
        F: Fn(usize, usize) -> T + Sync,
    {
        let f = &f;
        let pixels = (0..height)
            .into_par_iter()
            .flat_map_iter(|y| (0..width).map(move |x| f(x, y)))
            .collect();
        Self::new(width, height, pixels)
    }
}

impl<T: Sync> ImageBuffer<T> {
    pub fn map<U, F>(&self, f: F) -> ImageBuffer<U>
    where
        U: Send,
        F: Fn(&T) -> U + Sync + Send,
    {
        ImageBuffer::new(self.width, self.height, self.pixels.par_iter().map(f).collect())
    }
}

impl<T> Index<(usize, usize)> for ImageBuffer<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &T {
        debug_assert!(x < self.width && y < self.height);
        &self.pixels[y * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize)> for ImageBuffer<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut T {
        debug_assert!(x < self.width && y < self.height);
        &mut self.pixels[y * self.width + x]
    }
}
