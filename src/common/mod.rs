//! Common types and abstractions
//!
//! This module defines the core types used throughout the crate:
//! - Metadata: per-flow context for routing
//! - Stream: unified async I/O abstraction
//! - FlowQueue: bounded hand-off with blocking or best-effort send
//! - BufferPool: pooled datagram buffers
//! - Single: single-flight result cache with TTL

mod metadata;
mod pool;
mod queue;
mod singleflight;
mod stream;

pub use metadata::{AddrFamily, DnsMode, IngressType, Metadata, Network};
pub use pool::{BufferPool, PooledBuf, UDP_BUFFER_SIZE};
pub use queue::{bounded, FlowQueue, SendMode};
pub use singleflight::Single;
pub use stream::{AsyncReadWrite, IntoStream, Stream};

// Re-export error types from crate root
pub use crate::error::{Error, Result};
