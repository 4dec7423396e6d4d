//! Browser chat UI served at `/`.
//!
//! A single static page: agent selector, optional ticker, query box and the
//! rendered markdown answer. Markdown is rendered client side and passed
//! through DOMPurify before it reaches the DOM.

pub const INDEX_HTML: &str = include_str!("../assets/index.html");
