//! # mailintake-mime
//!
//! MIME decoding for mailbox ingestion.
//!
//! ## Features
//!
//! - **Charset resolution**: case-insensitive lookup with a fixed fallback
//! - **Transfer decoding**: Base64 and Quoted-Printable with lossy fallback
//! - **Part tree parsing**: arbitrarily nested `multipart/*` containers
//! - **Classification**: inline content vs. attachments, decided once per part
//! - **Body selection**: plain text beats HTML independent of part order
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailintake_mime::{CharsetResolver, Walker};
//!
//! let walker = Walker::new(CharsetResolver::new());
//! let extraction = walker.walk_bytes(raw_message);
//! println!("{}", extraction.text);
//! for attachment in &extraction.attachments {
//!     println!("{} ({} bytes)", attachment.filename, attachment.data.len());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod charset;
mod classify;
mod content_type;
mod error;
mod header;
mod part;
mod walker;

pub mod encoding;
pub mod html;

pub use charset::{Charset, CharsetResolver};
pub use classify::{AttachmentPart, ClassifiedPart, InlinePart, classify};
pub use content_type::{ContentDisposition, ContentType, Parameters, extended_parameter};
pub use encoding::TransferEncoding;
pub use error::{Error, Result};
pub use header::Headers;
pub use part::{MAX_DEPTH, MimeNode, Part};
pub use walker::{ExtractedAttachment, Extraction, TextSource, Walker};
