//! Labeled dataset production and persistence
//!
//! This module provides the synthetic generator used to bootstrap training,
//! CSV reading and writing, and the stratified split that separates the
//! held-out fold before any fitting happens.

mod generator;
mod io;
mod split;


pub use generator::{generate, GenerationMode, GeneratorConfig, DEFAULT_SAMPLES};
pub use io::{csv_header, load_csv, read_csv, write_csv, DatasetFile};
pub use split::{stratified_split, SplitIndices, DEFAULT_TEST_FRACTION};
