mod literal;
mod png;

pub use literal::render_raw;
pub use png::{encode_png, PNG_SIGNATURE};
