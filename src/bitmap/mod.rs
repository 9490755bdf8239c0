pub mod wah;

pub use wah::{BitIndexes, BitmapEncoding, WahBitmap, DEFAULT_SWITCHOVER};
