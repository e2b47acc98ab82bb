//! LiDAR and camera file routines for KITTI-layout datasets.
//!
//! This crate reads point clouds, labels and calibration files, filters
//! points by camera projection, groups points into voxels and applies
//! point cloud augmentation.

mod common;

pub mod augment;
pub use augment::*;

pub mod calib;
pub use calib::*;

pub mod error;
pub use error::*;

pub mod point_cloud;
pub use point_cloud::*;

pub mod projection;
pub use projection::*;

pub mod voxel;
pub use voxel::*;
