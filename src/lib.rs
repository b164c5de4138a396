//! Smart Inventory: a two-tier inventory telemetry pipeline.
//!
//! The `device` half polls physical sensors, debounces and classifies their
//! readings, queues them durably and uploads them in batches. The `server`
//! half ingests those batches idempotently, derives per-item status and
//! alerts, and fans out live updates to SSE subscribers.

pub mod device;
pub mod server;
pub mod wire;
