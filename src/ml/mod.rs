//! Machine learning helpers for training and inference.
//!
//! A class-balanced linear classifier, its sigmoid calibration, and evaluation metrics.

pub mod calibration;
pub mod metrics;
pub mod svm;

pub use calibration::{CalibratedClassifier, CalibrationOptions, PlattSigmoid};
pub use svm::{LinearSvm, SvmOptions, train_linear_svm};
