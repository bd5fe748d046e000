pub mod html;

pub use html::{HtmlPage, column_text, format_float};
