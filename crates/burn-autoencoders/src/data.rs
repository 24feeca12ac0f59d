//! Image folder dataset
//!
//! Every image below a root directory is one sample. The name of the
//! first-level subdirectory is its class. Images directly under the root form
//! a class of their own, named [`ROOT_CLASS`] and listed after the folders.

use std::fs;
use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn::tensor::TensorData;
use image::imageops::FilterType;
use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::error::{Error, Result};

/// Class of the images directly under the root
pub const ROOT_CLASS: &str = ".";

const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn scan(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            scan(&path, out)?;
        } else if is_image(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// Images below a directory, resized to a fixed `[c, h, w]`
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    paths: Vec<PathBuf>,
    labels: Vec<usize>,
    classes: Vec<String>,
    shape: [usize; 3],
}

impl ImageFolder {
    /// Scans `root` recursively; `shape` is `[channels, height, width]` with
    /// 1 (greyscale) or 3 (RGB) channels
    pub fn new<P: AsRef<Path>>(root: P, shape: [usize; 3]) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !matches!(shape[0], 1 | 3) {
            return Err(burn_autoencoders_core::Error::InvalidConfig(format!(
                "images must have 1 or 3 channels, got {}",
                shape[0]
            ))
            .into());
        }

        let mut paths = Vec::new();
        scan(&root, &mut paths)?;
        if paths.is_empty() {
            return Err(Error::EmptyDataset(root));
        }
        paths.sort();

        let class_of = |path: &Path| -> Option<String> {
            let rel = path.strip_prefix(&root).ok()?;
            let mut parts = rel.components();
            let first = parts.next()?;
            parts.next()?;
            Some(first.as_os_str().to_string_lossy().into_owned())
        };

        let mut classes: Vec<String> = paths.iter().filter_map(|p| class_of(p)).collect();
        classes.sort();
        classes.dedup();
        let folders = classes.len();
        if paths.iter().any(|p| class_of(p).is_none()) {
            classes.push(ROOT_CLASS.to_string());
        }

        let labels = paths
            .iter()
            .map(|p| match class_of(p) {
                Some(c) => classes[..folders].binary_search(&c).unwrap_or(folders),
                None => folders,
            })
            .collect();

        tracing::info!(
            images = paths.len(),
            classes = classes.len(),
            root = %root.display(),
            "loaded image folder"
        );

        Ok(Self {
            root,
            paths,
            labels,
            classes,
            shape,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name, used as a fallback dataset name
    pub fn name(&self) -> Option<&str> {
        self.root.file_name().and_then(|n| n.to_str())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Index into [`Self::classes`]
    pub fn label(&self, index: usize) -> usize {
        self.labels[index]
    }

    /// Pixels of one image, channel-major, in `[0, 1]`
    pub fn load(&self, index: usize) -> Result<Vec<f32>> {
        let [c, h, w] = self.shape;
        let img = image::open(&self.paths[index])?.resize_exact(
            w as u32,
            h as u32,
            FilterType::Triangle,
        );

        let mut data = vec![0.0f32; c * h * w];
        if c == 1 {
            for (i, p) in img.to_luma8().pixels().enumerate() {
                data[i] = p[0] as f32 / 255.0;
            }
        } else {
            for (i, p) in img.to_rgb8().pixels().enumerate() {
                for ch in 0..3 {
                    data[ch * h * w + i] = p[ch] as f32 / 255.0;
                }
            }
        }
        Ok(data)
    }

    /// Stacks the given samples into `[n, c, h, w]`
    pub fn batch<B: Backend>(&self, indices: &[usize], device: &B::Device) -> Result<Tensor<B, 4>> {
        let [c, h, w] = self.shape;
        let mut data = Vec::with_capacity(indices.len() * c * h * w);
        for &i in indices {
            data.extend(self.load(i)?);
        }
        Ok(Tensor::from_data(
            TensorData::new(data, [indices.len(), c, h, w]),
            device,
        ))
    }

    pub fn labels<B: Backend>(&self, indices: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
        let labels: Vec<i64> = indices.iter().map(|&i| self.labels[i] as i64).collect();
        Tensor::from_data(TensorData::new(labels, [indices.len()]), device)
    }

    /// Sample order for one epoch, random permutation when `shuffle`
    pub fn order(&self, shuffle: bool) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        if shuffle {
            indices.shuffle(&mut thread_rng());
        }
        indices
    }

    /// Index chunks of one epoch; the last chunk may be short
    pub fn batches(&self, batch_size: usize, shuffle: bool) -> Vec<Vec<usize>> {
        self.order(shuffle)
            .chunks(batch_size.max(1))
            .map(<[usize]>::to_vec)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};

    type TestBackend = NdArray<f32>;

    fn fixture(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bae-data-{name}-{}", std::process::id()));
        for (class, value) in [("cats", 255u8), ("dogs", 0u8)] {
            fs::create_dir_all(dir.join(class)).unwrap();
            for i in 0..3 {
                RgbImage::from_pixel(10, 6, Rgb([value, value, value]))
                    .save(dir.join(class).join(format!("{i}.png")))
                    .unwrap();
            }
        }
        dir
    }

    #[test]
    fn test_scan_and_labels() {
        let dir = fixture("labels");
        let data = ImageFolder::new(&dir, [3, 8, 8]).unwrap();

        assert_eq!(data.len(), 6);
        assert_eq!(data.classes(), &["cats".to_string(), "dogs".to_string()]);
        assert_eq!(data.label(0), 0);
        assert_eq!(data.label(5), 1);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_batch_resizes_and_scales() {
        let dir = fixture("batch");
        let device = Default::default();
        let data = ImageFolder::new(&dir, [1, 8, 8]).unwrap();

        let x = data.batch::<TestBackend>(&[0, 5], &device).unwrap();
        assert_eq!(x.dims(), [2, 1, 8, 8]);
        let v: Vec<f32> = x.into_data().to_vec().unwrap();
        assert!((v[0] - 1.0).abs() < 1e-6);
        assert!(v[64].abs() < 1e-6);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_shuffled_batches_cover_everything() {
        let dir = fixture("order");
        let data = ImageFolder::new(&dir, [3, 8, 8]).unwrap();

        assert_eq!(data.order(false), (0..6).collect::<Vec<_>>());
        let batches = data.batches(4, true);
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 2]);
        let mut all: Vec<usize> = batches.into_iter().flatten().collect();
        all.sort();
        assert_eq!(all, (0..6).collect::<Vec<_>>());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_root_images_form_their_own_class() {
        let dir = fixture("mixed");
        RgbImage::from_pixel(10, 6, Rgb([9, 9, 9]))
            .save(dir.join("loose.png"))
            .unwrap();
        let device = Default::default();
        let data = ImageFolder::new(&dir, [3, 8, 8]).unwrap();

        assert_eq!(data.len(), 7);
        assert_eq!(data.classes().to_vec(), vec!["cats", "dogs", ROOT_CLASS]);
        // paths sort as cats/*, dogs/*, loose.png
        assert_eq!(data.label(0), 0);
        assert_eq!(data.label(6), 2);

        let labels: Vec<i64> = data
            .labels::<TestBackend>(&[0, 3, 6], &device)
            .into_data()
            .convert::<i64>()
            .to_vec()
            .unwrap();
        assert_eq!(labels, vec![0, 1, 2]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_empty_dir() {
        let dir = std::env::temp_dir().join(format!("bae-data-empty-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        assert!(matches!(
            ImageFolder::new(&dir, [3, 8, 8]),
            Err(Error::EmptyDataset(_))
        ));
        fs::remove_dir_all(&dir).ok();
    }
}
