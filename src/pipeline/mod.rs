//! Stages of menu extraction.
//!
//! Each submodule implements one transformation step, so each can be tested
//! on its own and a backend can be swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! Image ──▶ encode ──▶ vision ──▶ reply
//! (bytes)   (base64)   (VLM)      (fences + JSON)
//! ```
//!
//! 1. [`encode`]: decode the capture and re-encode it as PNG (JPEG fallback);
//!    also produces the cheap thumbnail used for change detection
//! 2. [`vision`]: the only stage with network I/O; Gemini REST or any
//!    `edgequake-llm` provider
//! 3. [`reply`]: strip Markdown fences and parse the JSON leniently

pub mod encode;
pub mod reply;
pub mod vision;
