mod buf;
mod depiction;
mod handy;
mod log_init;

pub use buf::{SliceReader, SliceWriter};
pub use depiction::page_depiction;
pub use handy::HandyRwLock;
pub use log_init::init_log;
