/*!
 * # Machine Learning Module
 *
 * The text classifier trained from user corrections, and the registry that
 * records which model version is active.
 */

/// Bag-of-words naive Bayes classifier over invoice texts
pub mod classifier;

/// Model version bookkeeping backed by the `ml_models` table
pub mod registry;

pub use classifier::{FitReport, InvoiceClassifier, TrainingError, TrainingExample};
pub use registry::{ModelRegistry, NewModelVersion};
