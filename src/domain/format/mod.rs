pub mod mime;

pub use mime::MimeFormat;
