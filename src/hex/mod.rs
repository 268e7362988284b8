pub mod hexcrc;
pub mod image;
pub mod reader;
pub mod record;
pub mod uf2;
pub mod universal;

pub use image::{patch_boot_crc, Image, ImageError};
pub use reader::{decode_records, decode_str, encode_records, encode_string, read_file, write_file, DecodeError};
pub use record::{Record, RecordError, RecordKind};
pub use universal::{merge, Target, UniversalHex};
