#![allow(dead_code)]

use anyhow::Result;
use image::{Rgb, RgbImage};
use kitti_loader::Config;
use lidar_ops::write_point_cloud;
use ndarray::Array2;
use std::{fs, path::Path};

pub const IMAGE_WIDTH: u32 = 32;
pub const IMAGE_HEIGHT: u32 = 16;

/// LiDAR x forward, y left, z up to a camera looking along x with the
/// principal point at the image center.
pub const CALIB: &str = "\
P0: 10 0 16 0 0 10 8 0 0 0 1 0
P2: 10 0 16 0 0 10 8 0 0 0 1 0
R0_rect: 1 0 0 0 1 0 0 0 1
Tr_velo_to_cam: 0 -1 0 0 0 0 -1 0 1 0 0 0
";

pub const LABEL: &str =
    "Car 0.00 0 -1.58 587.01 173.33 614.12 200.12 1.65 1.67 3.64 -0.65 1.71 46.70 -1.59\n";

pub fn tag(index: usize) -> String {
    format!("{:06}", index)
}

/// Points that project inside the synthetic image.
pub fn points(seed: usize) -> Array2<f32> {
    Array2::from_shape_fn((64, 4), |(row, col)| {
        let step = row + seed;
        match col {
            0 => 10.0 + (step % 4) as f32,
            1 => -1.0 + (step % 8) as f32 * 0.25,
            2 => -1.0 + (step % 2) as f32 * 0.5,
            _ => 0.5,
        }
    })
}

/// Write a KITTI-layout dataset with `num_samples` samples.
pub fn write_dataset(dir: &Path, num_samples: usize) -> Result<()> {
    for subdir in ["image_2", "velodyne", "label_2", "calib"] {
        fs::create_dir_all(dir.join(subdir))?;
    }

    for index in 0..num_samples {
        let tag = tag(index);
        let image = RgbImage::from_fn(IMAGE_WIDTH, IMAGE_HEIGHT, |x, y| {
            Rgb([x as u8 * 8, y as u8 * 16, index as u8])
        });
        image.save(dir.join("image_2").join(format!("{}.png", tag)))?;
        write_point_cloud(
            dir.join("velodyne").join(format!("{}.bin", tag)),
            points(index).view(),
        )?;
        fs::write(dir.join("label_2").join(format!("{}.txt", tag)), LABEL)?;
        fs::write(dir.join("calib").join(format!("{}.txt", tag)), CALIB)?;
    }
    Ok(())
}

/// Truncate the point cloud of a sample so that it fails to decode.
pub fn corrupt_point_cloud(dir: &Path, index: usize) -> Result<()> {
    fs::write(
        dir.join("velodyne").join(format!("{}.bin", tag(index))),
        [0u8; 5],
    )?;
    Ok(())
}

pub fn write_split(path: &Path, indices: &[usize]) -> Result<()> {
    let text: String = indices.iter().map(|&index| tag(index) + "\n").collect();
    fs::write(path, text)?;
    Ok(())
}

/// A loader configuration over `dir`. `loader` is the body of the loader section.
pub fn config(dir: &Path, loader: &str) -> Result<Config> {
    let text = format!(
        r#"{{
            dataset: {{ dir: "{}" }},
            loader: {{ {} }},
            image: {{ height: 8, width: 16 }},
            voxel: {{
                voxel_size: [0.4, 0.2, 0.2],
                max_points_per_voxel: 8,
                augment: {{ dropout_prob: 0.0, intensity_jitter: 0.0 }},
            }},
        }}"#,
        dir.display(),
        loader
    );
    let config: Config = json5::from_str(&text)?;
    Ok(config)
}
