/*!
 * # Invoice Text Classifier
 *
 * Bag-of-words features over lower-cased alphanumeric tokens feeding a
 * multinomial naive Bayes model with Laplace smoothing. Each label is the
 * canonical JSON form of a user-corrected extraction, so the model learns to
 * map a document text to the structured data a human confirmed for it.
 */

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the serialized classifier inside the model directory.
pub const ARTIFACT_FILE_NAME: &str = "invoice_classifier.json";

const MAX_FEATURES: usize = 5000;
const TEST_FRACTION: f64 = 0.2;
const SPLIT_SEED: u64 = 42;
const SMOOTHING: f64 = 1.0;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("no training examples were supplied")]
    EmptyDataset,
    #[error("{total} example(s) leave no room for a training split")]
    InsufficientData { total: usize },
    #[error("training documents contain no usable tokens")]
    EmptyVocabulary,
    #[error("failed to write model artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize model: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One document text paired with the label it should predict.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub text: String,
    pub label: String,
}

impl TrainingExample {
    /// Labels a text with the canonical JSON string of `corrected`.
    pub fn from_correction(text: impl Into<String>, corrected: &serde_json::Value) -> Self {
        Self {
            text: text.into(),
            label: corrected.to_string(),
        }
    }
}

/// Outcome of a fit: held-out accuracy and split sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitReport {
    pub accuracy: f64,
    pub train_size: usize,
    pub test_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceClassifier {
    vocabulary: BTreeMap<String, usize>,
    labels: Vec<String>,
    class_log_prior: Vec<f64>,
    /// `feature_log_prob[class][feature]`
    feature_log_prob: Vec<Vec<f64>>,
    trained_on: usize,
    trained_at: DateTime<Utc>,
}

/// Lower-cased alphanumeric tokens of at least two characters.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_lowercase)
}

/// Deterministic shuffled split; the test side gets `ceil(0.2 n)` examples.
fn split_indices(n: usize) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(SPLIT_SEED);
    indices.shuffle(&mut rng);

    let n_test = (n as f64 * TEST_FRACTION).ceil() as usize;
    let train = indices.split_off(n_test);
    (train, indices)
}

fn build_vocabulary<'a>(documents: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for doc in documents {
        for token in tokenize(doc) {
            *counts.entry(token).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(MAX_FEATURES);

    let mut terms: Vec<String> = ranked.into_iter().map(|(term, _)| term).collect();
    terms.sort();
    terms
        .into_iter()
        .enumerate()
        .map(|(idx, term)| (term, idx))
        .collect()
}

impl InvoiceClassifier {
    /// Fits on an 80/20 split of `examples` and reports held-out accuracy.
    pub fn fit(examples: &[TrainingExample]) -> Result<(Self, FitReport), TrainingError> {
        if examples.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }
        let (train_idx, test_idx) = split_indices(examples.len());
        if train_idx.is_empty() {
            return Err(TrainingError::InsufficientData {
                total: examples.len(),
            });
        }

        let train: Vec<&TrainingExample> = train_idx.iter().map(|&i| &examples[i]).collect();
        let model = Self::fit_on(&train)?;

        let correct = test_idx
            .iter()
            .map(|&i| &examples[i])
            .filter(|example| model.predict(&example.text).as_deref() == Some(example.label.as_str()))
            .count();
        let accuracy = if test_idx.is_empty() {
            0.0
        } else {
            correct as f64 / test_idx.len() as f64
        };

        let report = FitReport {
            accuracy,
            train_size: train_idx.len(),
            test_size: test_idx.len(),
        };
        Ok((model, report))
    }

    fn fit_on(train: &[&TrainingExample]) -> Result<Self, TrainingError> {
        let vocabulary = build_vocabulary(train.iter().map(|e| e.text.as_str()));
        if vocabulary.is_empty() {
            return Err(TrainingError::EmptyVocabulary);
        }

        let labels: Vec<String> = train
            .iter()
            .map(|e| e.label.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        let label_index: HashMap<&str, usize> = labels
            .iter()
            .enumerate()
            .map(|(idx, label)| (label.as_str(), idx))
            .collect();

        let n_features = vocabulary.len();
        let mut class_counts = vec![0usize; labels.len()];
        let mut feature_counts = vec![vec![0.0f64; n_features]; labels.len()];

        for example in train {
            let class = label_index[example.label.as_str()];
            class_counts[class] += 1;
            for token in tokenize(&example.text) {
                if let Some(&feature) = vocabulary.get(&token) {
                    feature_counts[class][feature] += 1.0;
                }
            }
        }

        let total = train.len() as f64;
        let class_log_prior = class_counts
            .iter()
            .map(|&count| (count as f64 / total).ln())
            .collect();
        let feature_log_prob = feature_counts
            .iter()
            .map(|counts| {
                let denominator = counts.iter().sum::<f64>() + SMOOTHING * n_features as f64;
                counts
                    .iter()
                    .map(|&count| ((count + SMOOTHING) / denominator).ln())
                    .collect()
            })
            .collect();

        Ok(Self {
            vocabulary,
            labels,
            class_log_prior,
            feature_log_prob,
            trained_on: train.len(),
            trained_at: Utc::now(),
        })
    }

    /// Most likely label for `text`; ties resolve to the smallest label.
    pub fn predict(&self, text: &str) -> Option<String> {
        let mut term_counts: HashMap<usize, f64> = HashMap::new();
        for token in tokenize(text) {
            if let Some(&feature) = self.vocabulary.get(&token) {
                *term_counts.entry(feature).or_default() += 1.0;
            }
        }

        let mut best: Option<(usize, f64)> = None;
        for (class, prior) in self.class_log_prior.iter().enumerate() {
            let score = prior
                + term_counts
                    .iter()
                    .map(|(&feature, &count)| count * self.feature_log_prob[class][feature])
                    .sum::<f64>();
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((class, score));
            }
        }
        best.map(|(class, _)| self.labels[class].clone())
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn trained_on(&self) -> usize {
        self.trained_on
    }

    /// Writes the model to `dir/invoice_classifier.json`, replacing any
    /// previous artifact only once the new one is fully written.
    pub fn persist(&self, dir: &Path) -> Result<PathBuf, TrainingError> {
        self.stage(dir)?.commit()
    }

    /// Writes the model next to its final location without replacing the
    /// current artifact. The caller decides whether to commit or discard.
    pub fn stage(&self, dir: &Path) -> Result<StagedArtifact, TrainingError> {
        fs::create_dir_all(dir)?;
        let staged = StagedArtifact {
            staging: dir.join(format!("{ARTIFACT_FILE_NAME}.tmp")),
            target: dir.join(ARTIFACT_FILE_NAME),
        };

        let bytes = serde_json::to_vec(self)?;
        if let Err(e) = fs::write(&staged.staging, bytes) {
            staged.discard();
            return Err(e.into());
        }
        Ok(staged)
    }

    pub fn load(path: &Path) -> Result<Self, TrainingError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// A fully written model file waiting to replace the live artifact.
#[derive(Debug)]
pub struct StagedArtifact {
    staging: PathBuf,
    target: PathBuf,
}

impl StagedArtifact {
    /// Where the artifact will live once committed.
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn commit(self) -> Result<PathBuf, TrainingError> {
        fs::rename(&self.staging, &self.target)?;
        Ok(self.target)
    }

    pub fn discard(self) {
        let _ = fs::remove_file(&self.staging);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn example(text: &str, label: &str) -> TrainingExample {
        TrainingExample {
            text: text.to_string(),
            label: label.to_string(),
        }
    }

    fn corpus() -> Vec<TrainingExample> {
        let mut examples = Vec::new();
        for i in 0..5 {
            examples.push(example(
                &format!("FACTURE acme fournitures bureau papier {i}"),
                "acme",
            ));
            examples.push(example(
                &format!("INVOICE globex consulting services hours {i}"),
                "globex",
            ));
        }
        examples
    }

    #[test]
    fn tokenizer_lowercases_and_drops_short_tokens() {
        let tokens: Vec<String> = tokenize("TOTAL: 1400,58 € a TVA").collect();
        assert_eq!(tokens, vec!["total", "1400", "58", "tva"]);
    }

    #[test]
    fn split_is_deterministic_and_sized() {
        let (train, test) = split_indices(10);
        assert_eq!(test.len(), 2);
        assert_eq!(train.len(), 8);
        assert_eq!(split_indices(10), (train, test));

        let (train, test) = split_indices(3);
        assert_eq!((train.len(), test.len()), (2, 1));
    }

    #[test]
    fn rejects_empty_and_single_example_sets() {
        assert!(matches!(
            InvoiceClassifier::fit(&[]),
            Err(TrainingError::EmptyDataset)
        ));
        assert!(matches!(
            InvoiceClassifier::fit(&[example("facture acme", "a")]),
            Err(TrainingError::InsufficientData { total: 1 })
        ));
    }

    #[test]
    fn rejects_texts_without_tokens() {
        let examples = vec![example("", "a"), example("", "b"), example("", "a")];
        assert!(matches!(
            InvoiceClassifier::fit(&examples),
            Err(TrainingError::EmptyVocabulary)
        ));
    }

    #[test]
    fn separable_corpus_is_learned() {
        let (model, report) = InvoiceClassifier::fit(&corpus()).unwrap();
        assert_eq!(report.train_size, 8);
        assert_eq!(report.test_size, 2);
        assert_eq!(report.accuracy, 1.0);
        assert_eq!(model.label_count(), 2);
        assert_eq!(
            model.predict("acme papier bureau").as_deref(),
            Some("acme")
        );
        assert_eq!(
            model.predict("globex consulting").as_deref(),
            Some("globex")
        );
    }

    #[test]
    fn labels_are_canonical_json() {
        let a = TrainingExample::from_correction("x", &json!({"b": 1, "a": 2}));
        let b = TrainingExample::from_correction("x", &json!({"a": 2, "b": 1}));
        assert_eq!(a.label, b.label);
    }

    #[test]
    fn persist_overwrites_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let (model, _) = InvoiceClassifier::fit(&corpus()).unwrap();

        let path = model.persist(dir.path()).unwrap();
        let path_again = model.persist(dir.path()).unwrap();
        assert_eq!(path, path_again);
        assert!(!dir.path().join(format!("{ARTIFACT_FILE_NAME}.tmp")).exists());

        let loaded = InvoiceClassifier::load(&path).unwrap();
        assert_eq!(loaded.vocabulary_size(), model.vocabulary_size());
        assert_eq!(loaded.trained_on(), model.trained_on());
        assert_eq!(loaded.predict("globex hours").as_deref(), Some("globex"));
    }

    #[test]
    fn staged_artifact_leaves_live_file_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let (model, _) = InvoiceClassifier::fit(&corpus()).unwrap();
        let live = model.persist(dir.path()).unwrap();
        let before = fs::read(&live).unwrap();
        let staging = dir.path().join(format!("{ARTIFACT_FILE_NAME}.tmp"));

        let (retrained, _) = InvoiceClassifier::fit(&corpus()[..4]).unwrap();
        let staged = retrained.stage(dir.path()).unwrap();
        assert_eq!(staged.target(), live.as_path());
        assert!(staging.exists());
        assert_eq!(fs::read(&live).unwrap(), before);
        staged.discard();
        assert!(!staging.exists());
        assert_eq!(fs::read(&live).unwrap(), before);

        let committed = retrained.stage(dir.path()).unwrap().commit().unwrap();
        assert_eq!(committed, live);
        assert!(!staging.exists());
        let loaded = InvoiceClassifier::load(&live).unwrap();
        assert_eq!(loaded.trained_on(), retrained.trained_on());
    }
}
