//! Catalog domain module.
//!
//! This crate contains the product record the order engine reads from. The
//! engine never creates or reprices products; the only field it mutates is
//! `stock` (through the store's unit of work).

pub mod product;

pub use product::{NewProduct, Product};
