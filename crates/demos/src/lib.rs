//! Driver demos: the `set<text>` collections example and the custom payload
//! round trip, both run against an embedded cluster.

pub mod application;
pub mod collections;
pub mod custom_payload;

#[cfg(test)]
mod tests;
