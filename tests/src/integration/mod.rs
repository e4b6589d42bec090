//! Multi-validator scenarios over [`crate::harness::SimNetwork`].

mod liveness;
mod safety;
