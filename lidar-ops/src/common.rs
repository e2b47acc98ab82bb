pub use byteorder::{ByteOrder, LittleEndian};
pub use itertools::Itertools as _;
pub use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
pub use rand::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    collections::BTreeMap,
    fmt::Debug,
    fs,
    path::{Path, PathBuf},
};

pub use crate::error::{OpsError, OpsResult};
