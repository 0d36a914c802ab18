//! # Klisis
//!
//! Facade over [`klisis_core`] (encoding, cascade, scoring, corpus reading)
//! and [`klisis_trainer`] (sample building and training).

pub use klisis_core::*;

pub mod trainer {
    pub use klisis_trainer::*;
}
