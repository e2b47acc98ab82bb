mod descriptor;
mod fetcher;
mod record;

pub use descriptor::*;
pub use fetcher::*;
pub use record::*;
