//! Pipeline stages for fetching, converting and merging a batch.
//!
//! Each submodule is one component with its own tests. The orchestration
//! that wires them together per item lives in [`crate::merge`].
//!
//! ## Data Flow
//!
//! ```text
//! reference ──▶ resolve ──▶ classify ──▶ dispatch ──▶ slot[index]
//!               (fetch pool)             (convert pool)
//!
//! slot[0..n] ──▶ assemble (index order, merge, stamp) ──▶ MergedDocument
//!
//! janitor ◀── every temp file, registered at creation
//! ```
//!
//! 1. [`resolve`]: existing local path (zero-copy) or HTTP(S) download
//!    into a tracked temp file, bounded by the fetch semaphore
//! 2. [`classify`]: file name → [`classify::Kind`]; unknown kinds are dropped
//! 3. [`dispatch`]: PDF passes through; images go to the rasterizer, HTML to
//!    the render service, bounded by the conversion semaphore
//! 4. [`assemble`]: ordered merge and metadata stamping
//! 5. [`janitor`]: deletes every temp file exactly once

pub mod assemble;
pub mod classify;
pub mod dispatch;
pub mod janitor;
pub mod resolve;
