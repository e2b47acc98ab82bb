use anyhow::Result;
use approx::assert_abs_diff_eq;
use kitti_loader::{config::FailurePolicy, Config};

#[test]
fn open_sample_config() -> Result<()> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/kitti-loader.json5");
    let config = Config::open(path)?;

    assert_eq!(config.loader.batch_size.get(), 4);
    assert_eq!(config.loader.replica_size(), 2);
    assert_eq!(config.loader.num_producers(), 4);
    assert_eq!(config.loader.failure_policy, FailurePolicy::AbandonBatch);
    assert_eq!(config.loader.seed, None);
    assert_eq!(config.image.height.get(), 384);
    assert_abs_diff_eq!(config.voxel.range.x[1], 70.4);
    assert_abs_diff_eq!(config.voxel.augment.dropout_prob, 0.05);

    let [z, y, x] = config.voxel.voxel_size;
    assert_abs_diff_eq!(z, 0.4);
    assert_abs_diff_eq!(y, 0.2);
    assert_abs_diff_eq!(x, 0.2);
    Ok(())
}

#[test]
fn skip_sample_policy() -> Result<()> {
    let config: Config = json5::from_str(
        r#"{
            dataset: { dir: "kitti" },
            loader: { queue_capacity: 1, batch_size: 1, failure_policy: "skip_sample" },
            image: { height: 1, width: 1 },
            voxel: { voxel_size: [1.0, 1.0, 1.0], max_points_per_voxel: 1 },
        }"#,
    )?;
    assert_eq!(config.loader.failure_policy, FailurePolicy::SkipSample);
    assert_eq!(config.loader.num_workers, 0);
    assert_eq!(config.loader.num_producers(), 1);
    Ok(())
}

#[test]
fn reject_zero_queue_capacity() {
    let result = json5::from_str::<Config>(
        r#"{
            dataset: { dir: "kitti" },
            loader: { queue_capacity: 0, batch_size: 1 },
            image: { height: 1, width: 1 },
            voxel: { voxel_size: [1.0, 1.0, 1.0], max_points_per_voxel: 1 },
        }"#,
    );
    assert!(result.is_err());
}
