//! Pipeline stages for document extraction.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the network-facing step can be swapped for a fake.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ request ──▶ transport ──▶ normalize
//! (path/URL)  (payload)   (HTTP)      (outcome)
//!                                        │
//!                      Escalate ◀────────┘  (Auto mode, once)
//! ```
//!
//! 1. [`input`]     — turn a path, URL or data URI into a named document
//! 2. [`encode`]    — base64 data URIs and media-type sniffing
//! 3. [`request`]   — build the wire payload for one attempt
//! 4. [`transport`] — the only stage with network I/O
//! 5. [`normalize`] — reduce any response body to one outcome

pub mod encode;
pub mod input;
pub mod normalize;
pub mod request;
pub mod transport;
