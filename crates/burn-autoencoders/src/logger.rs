//! Logger sinks for training and evaluation
//!
//! Models and the trainer report through the [`Logger`] trait. Two sinks are
//! provided:
//!
//! - [`MemoryLogger`] keeps every entry in memory
//! - [`DirLogger`] writes PNG grids, GIF videos and JSON-lines records into a
//!   run directory

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use burn::prelude::*;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, ImageBuffer, Rgb, RgbImage};
use serde_json::json;

use crate::error::{Error, Result};

/// Host copy of an image batch, `[n, c, h, w]` with values in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

impl ImageBatch {
    pub fn from_tensor<B: Backend>(tensor: Tensor<B, 4>) -> Result<Self> {
        let shape = tensor.dims();
        let data = tensor
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| Error::TensorData(format!("{e:?}")))?;
        Ok(Self { shape, data })
    }

    pub fn len(&self) -> usize {
        self.shape[0]
    }

    pub fn is_empty(&self) -> bool {
        self.shape[0] == 0
    }

    fn value(&self, n: usize, c: usize, y: usize, x: usize) -> u8 {
        let [_, channels, h, w] = self.shape;
        if channels == 0 {
            return 0;
        }
        // images without three channels show their first one as grey
        let c = if channels < 3 { 0 } else { c };
        let v = self.data[((n * channels + c) * h + y) * w + x];
        (v.clamp(0.0, 1.0) * 255.0).round() as u8
    }

    /// Single image as RGB
    pub fn to_rgb(&self, index: usize) -> RgbImage {
        let [_, _, h, w] = self.shape;
        ImageBuffer::from_fn(w as u32, h as u32, |x, y| {
            let (x, y) = (x as usize, y as usize);
            Rgb([
                self.value(index, 0, y, x),
                self.value(index, 1, y, x),
                self.value(index, 2, y, x),
            ])
        })
    }

    /// All images tiled row-major into a grid `cols` wide, 2px apart
    pub fn grid(&self, cols: usize) -> RgbImage {
        const PAD: usize = 2;
        let [n, _, h, w] = self.shape;
        let cols = cols.clamp(1, n.max(1));
        let rows = n.div_ceil(cols);

        let width = cols * w + (cols + 1) * PAD;
        let height = rows * h + (rows + 1) * PAD;
        let mut out = RgbImage::new(width as u32, height as u32);

        for i in 0..n {
            let (row, col) = (i / cols, i % cols);
            let x0 = PAD + col * (w + PAD);
            let y0 = PAD + row * (h + PAD);
            for y in 0..h {
                for x in 0..w {
                    let px = Rgb([self.value(i, 0, y, x), self.value(i, 1, y, x), self.value(i, 2, y, x)]);
                    out.put_pixel((x0 + x) as u32, (y0 + y) as u32, px);
                }
            }
        }
        out
    }
}

/// Destination for scalars, histograms, images, text and videos
pub trait Logger {
    /// Step attached to subsequent entries
    fn set_step(&mut self, step: usize);

    fn add_scalar(&mut self, name: &str, value: f64) -> Result<()>;

    fn add_histogram(&mut self, name: &str, values: &[f64]) -> Result<()>;

    /// Logs a batch of images, shown as a grid `cols` wide
    fn add_images(&mut self, name: &str, images: &ImageBatch, cols: usize) -> Result<()>;

    fn add_text(&mut self, name: &str, text: &str) -> Result<()>;

    /// Logs frames (one image per frame) as a video
    fn add_video(&mut self, name: &str, frames: &ImageBatch, fps: u32) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

/// What a [`MemoryLogger`] entry holds
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
    Scalar(f64),
    Histogram(Vec<f64>),
    Images { shape: [usize; 4], cols: usize },
    Text(String),
    Video { shape: [usize; 4], fps: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub step: usize,
    pub name: String,
    pub value: LogValue,
}

/// Logger that records entries in memory
#[derive(Debug, Default)]
pub struct MemoryLogger {
    step: usize,
    pub entries: Vec<LogEntry>,
    pub flushes: usize,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, name: &str, value: LogValue) {
        self.entries.push(LogEntry {
            step: self.step,
            name: name.to_string(),
            value,
        });
    }

    /// Most recent entry with this name
    pub fn get(&self, name: &str) -> Option<&LogValue> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.name == name)
            .map(|e| &e.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}

impl Logger for MemoryLogger {
    fn set_step(&mut self, step: usize) {
        self.step = step;
    }

    fn add_scalar(&mut self, name: &str, value: f64) -> Result<()> {
        self.push(name, LogValue::Scalar(value));
        Ok(())
    }

    fn add_histogram(&mut self, name: &str, values: &[f64]) -> Result<()> {
        self.push(name, LogValue::Histogram(values.to_vec()));
        Ok(())
    }

    fn add_images(&mut self, name: &str, images: &ImageBatch, cols: usize) -> Result<()> {
        self.push(
            name,
            LogValue::Images {
                shape: images.shape,
                cols,
            },
        );
        Ok(())
    }

    fn add_text(&mut self, name: &str, text: &str) -> Result<()> {
        self.push(name, LogValue::Text(text.to_string()));
        Ok(())
    }

    fn add_video(&mut self, name: &str, frames: &ImageBatch, fps: u32) -> Result<()> {
        self.push(
            name,
            LogValue::Video {
                shape: frames.shape,
                fps,
            },
        );
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

/// Logger writing into a run directory
///
/// Layout:
///
/// ```text
/// <root>/scalars.jsonl
/// <root>/histograms.jsonl
/// <root>/text.jsonl
/// <root>/images/<name>-<step>.png
/// <root>/videos/<name>-<step>.gif
/// ```
pub struct DirLogger {
    root: PathBuf,
    step: usize,
    scalars: BufWriter<File>,
    histograms: BufWriter<File>,
    text: BufWriter<File>,
}

fn append(path: &Path) -> Result<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

impl DirLogger {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("images"))?;
        fs::create_dir_all(root.join("videos"))?;

        Ok(Self {
            scalars: append(&root.join("scalars.jsonl"))?,
            histograms: append(&root.join("histograms.jsonl"))?,
            text: append(&root.join("text.jsonl"))?,
            root,
            step: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_name(&self, name: &str, ext: &str) -> String {
        format!("{}-{:06}.{ext}", name.replace(['/', '\\'], "_"), self.step)
    }
}

impl Logger for DirLogger {
    fn set_step(&mut self, step: usize) {
        self.step = step;
    }

    fn add_scalar(&mut self, name: &str, value: f64) -> Result<()> {
        let line = json!({ "step": self.step, "name": name, "value": value });
        writeln!(self.scalars, "{line}")?;
        Ok(())
    }

    fn add_histogram(&mut self, name: &str, values: &[f64]) -> Result<()> {
        let line = json!({ "step": self.step, "name": name, "values": values });
        writeln!(self.histograms, "{line}")?;
        Ok(())
    }

    fn add_images(&mut self, name: &str, images: &ImageBatch, cols: usize) -> Result<()> {
        let path = self.root.join("images").join(self.file_name(name, "png"));
        images.grid(cols).save(&path)?;
        tracing::debug!(path = %path.display(), "saved images");
        Ok(())
    }

    fn add_text(&mut self, name: &str, text: &str) -> Result<()> {
        let line = json!({ "step": self.step, "name": name, "text": text });
        writeln!(self.text, "{line}")?;
        Ok(())
    }

    fn add_video(&mut self, name: &str, frames: &ImageBatch, fps: u32) -> Result<()> {
        let path = self.root.join("videos").join(self.file_name(name, "gif"));
        let mut encoder = GifEncoder::new(File::create(&path)?);
        encoder.set_repeat(Repeat::Infinite)?;

        let delay = Delay::from_numer_denom_ms(1000, fps.max(1));
        for i in 0..frames.len() {
            let rgba = DynamicImage::ImageRgb8(frames.to_rgb(i)).to_rgba8();
            encoder.encode_frame(Frame::from_parts(rgba, 0, 0, delay))?;
        }
        tracing::debug!(path = %path.display(), frames = frames.len(), "saved video");
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.scalars.flush()?;
        self.histograms.flush()?;
        self.text.flush()?;
        Ok(())
    }
}

impl Drop for DirLogger {
    fn drop(&mut self) {
        let _ = Logger::flush(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_image_batch_grid() {
        let device = Default::default();
        let imgs = Tensor::<TestBackend, 4>::ones([3, 1, 4, 5], &device);
        let batch = ImageBatch::from_tensor(imgs).unwrap();
        assert_eq!(batch.len(), 3);

        let grid = batch.grid(2);
        // 2 cols, 2 rows, 2px padding
        assert_eq!(grid.dimensions(), (2 * 5 + 3 * 2, 2 * 4 + 3 * 2));
        assert_eq!(grid.get_pixel(2, 2), &Rgb([255, 255, 255]));
        assert_eq!(grid.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_rgb_channels() {
        let device = Default::default();
        let imgs = Tensor::<TestBackend, 4>::from_floats([[[[1.0]], [[0.0]], [[0.5]]]], &device);
        let batch = ImageBatch::from_tensor(imgs).unwrap();
        assert_eq!(batch.to_rgb(0).get_pixel(0, 0), &Rgb([255, 0, 128]));
    }

    #[test]
    fn test_two_channel_images_show_first_channel() {
        let device = Default::default();
        let first = Tensor::<TestBackend, 4>::ones([2, 1, 4, 4], &device);
        let second = Tensor::<TestBackend, 4>::zeros([2, 1, 4, 4], &device);
        let batch = ImageBatch::from_tensor(Tensor::cat(vec![first, second], 1)).unwrap();

        let grid = batch.grid(1);
        assert_eq!(grid.dimensions(), (4 + 2 * 2, 2 * 4 + 3 * 2));
        // last pixel of the second image
        assert_eq!(grid.get_pixel(5, 11), &Rgb([255, 255, 255]));
        assert_eq!(batch.to_rgb(1).get_pixel(3, 3), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_memory_logger() {
        let mut logger = MemoryLogger::new();
        logger.set_step(7);
        logger.add_scalar("loss", 1.5).unwrap();
        logger.add_scalar("loss", 0.5).unwrap();
        logger.add_text("imp_str", "[0.1]").unwrap();

        assert_eq!(logger.get("loss"), Some(&LogValue::Scalar(0.5)));
        assert_eq!(logger.entries[0].step, 7);
        assert!(logger.contains("imp_str"));
        assert!(!logger.contains("rec"));
    }

    #[test]
    fn test_dir_logger_writes_files() {
        let dir = std::env::temp_dir().join(format!("bae-logger-{}", std::process::id()));
        let device = Default::default();
        {
            let mut logger = DirLogger::new(&dir).unwrap();
            logger.set_step(3);
            logger.add_scalar("rec_loss", 0.25).unwrap();
            logger.add_histogram("latent-norm", &[1.0, 2.0]).unwrap();

            let imgs = Tensor::<TestBackend, 4>::zeros([2, 3, 8, 8], &device);
            let batch = ImageBatch::from_tensor(imgs).unwrap();
            logger.add_images("rec", &batch, 2).unwrap();
            logger.add_video("traversals", &batch, 12).unwrap();
        }

        let scalars = fs::read_to_string(dir.join("scalars.jsonl")).unwrap();
        let line: serde_json::Value = serde_json::from_str(scalars.lines().next().unwrap()).unwrap();
        assert_eq!(line["name"], "rec_loss");
        assert_eq!(line["step"], 3);
        assert!(dir.join("images/rec-000003.png").exists());
        assert!(dir.join("videos/traversals-000003.gif").exists());

        fs::remove_dir_all(&dir).ok();
    }
}
