//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use derivative::Derivative;
pub use futures::future;
pub use itertools::{izip, Itertools as _};
pub use ndarray::{s, Array1, Array2, Array3, Array4, ArrayView2, Axis};
pub use noisy_float::prelude::*;
pub use rand::{prelude::*, rngs::StdRng, seq::SliceRandom};
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Cow,
    fmt::Debug,
    fs,
    num::NonZeroUsize,
    ops::Range,
    path::{Path, PathBuf},
    sync::{
        atomic::{self, AtomicBool},
        Arc,
    },
    time::{Duration, Instant},
};
pub use tokio::sync::{mpsc, oneshot};
pub use tracing::{debug, error, info, trace, trace_span, warn, Instrument};

unzip_n::unzip_n!(pub 5);
