use crate::common::*;

pub const IMAGE_DIR: &str = "image_2";
pub const POINT_CLOUD_DIR: &str = "velodyne";
pub const LABEL_DIR: &str = "label_2";
pub const CALIB_DIR: &str = "calib";

/// The tag and file paths of one sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleDescriptor {
    pub tag: String,
    pub image: PathBuf,
    pub point_cloud: PathBuf,
    pub label: PathBuf,
    pub calib: PathBuf,
}

impl SampleDescriptor {
    /// Build the paths of a sample tag in a KITTI-layout directory.
    pub fn from_tag(dir: impl AsRef<Path>, tag: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            tag: tag.to_owned(),
            image: dir.join(IMAGE_DIR).join(format!("{}.png", tag)),
            point_cloud: dir.join(POINT_CLOUD_DIR).join(format!("{}.bin", tag)),
            label: dir.join(LABEL_DIR).join(format!("{}.txt", tag)),
            calib: dir.join(CALIB_DIR).join(format!("{}.txt", tag)),
        }
    }
}

/// An ordered list of sample descriptors.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSet {
    descriptors: Vec<Arc<SampleDescriptor>>,
}

impl DescriptorSet {
    /// Zip four index-aligned path lists. The tag is the file stem of the label path.
    pub fn from_path_lists(
        images: Vec<PathBuf>,
        point_clouds: Vec<PathBuf>,
        labels: Vec<PathBuf>,
        calibs: Vec<PathBuf>,
    ) -> Result<Self> {
        ensure!(
            images.len() == point_clouds.len()
                && images.len() == labels.len()
                && images.len() == calibs.len(),
            "mismatched sample lists: {} images, {} point clouds, {} labels, {} calibrations",
            images.len(),
            point_clouds.len(),
            labels.len(),
            calibs.len()
        );

        let descriptors: Vec<_> = izip!(images, point_clouds, labels, calibs)
            .map(|(image, point_cloud, label, calib)| -> Result<_> {
                let tag = label
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .ok_or_else(|| format_err!("invalid label path '{}'", label.display()))?
                    .to_owned();
                Ok(Arc::new(SampleDescriptor {
                    tag,
                    image,
                    point_cloud,
                    label,
                    calib,
                }))
            })
            .try_collect()?;

        Ok(Self { descriptors })
    }

    pub fn from_tags<I, S>(dir: impl AsRef<Path>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let dir = dir.as_ref();
        let descriptors = tags
            .into_iter()
            .map(|tag| Arc::new(SampleDescriptor::from_tag(dir, tag.as_ref())))
            .collect();
        Self { descriptors }
    }

    /// Read a split file listing one tag per line.
    pub fn load_split_file(dir: impl AsRef<Path>, split_file: impl AsRef<Path>) -> Result<Self> {
        let split_file = split_file.as_ref();
        let text = fs::read_to_string(split_file)
            .with_context(|| format!("failed to read split file '{}'", split_file.display()))?;
        let tags = text.lines().map(str::trim).filter(|line| !line.is_empty());
        Ok(Self::from_tags(dir, tags))
    }

    /// Discover samples in the four subdirectories, sorted by path.
    pub fn discover(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let list = |subdir: &str, ext: &str| -> Result<Vec<PathBuf>> {
            let pattern = format!("{}/{}/*.{}", dir.display(), subdir, ext);
            let mut paths: Vec<_> = glob::glob(&pattern)?.try_collect()?;
            paths.sort();
            Ok(paths)
        };

        Self::from_path_lists(
            list(IMAGE_DIR, "png")?,
            list(POINT_CLOUD_DIR, "bin")?,
            list(LABEL_DIR, "txt")?,
            list(CALIB_DIR, "txt")?,
        )
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<SampleDescriptor>> {
        self.descriptors.get(index)
    }

    pub fn descriptors(&self) -> &[Arc<SampleDescriptor>] {
        &self.descriptors
    }
}
