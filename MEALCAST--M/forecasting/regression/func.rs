use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Row indices of a train/test partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    /// Rows used for fitting.
    pub train: Vec<usize>,
    /// Held-out rows.
    pub test: Vec<usize>,
}

/// Shuffled train/test split; the test side holds `ceil(n * test_ratio)` rows.
#[must_use]
pub fn train_test_split(n: usize, test_ratio: f64, seed: u64) -> Split {
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let n_test = ((n as f64) * test_ratio.clamp(0.0, 1.0)).ceil() as usize;
    let test = order[..n_test.min(n)].to_vec();
    let train = order[n_test.min(n)..].to_vec();
    Split { train, test }
}

/// Contiguous, unshuffled k-fold partitions. The first `n % k` folds get one extra row.
#[must_use]
pub fn k_fold(n: usize, k: usize) -> Vec<Split> {
    let k = k.clamp(1, n.max(1));
    let base = n / k;
    let extra = n % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = base + usize::from(fold < extra);
        let end = start + size;
        folds.push(Split {
            train: (0..start).chain(end..n).collect(),
            test: (start..end).collect(),
        });
        start = end;
    }
    folds
}

/// Picks `indices` out of `items`.
#[must_use]
pub fn select<T: Clone>(items: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&idx| items[idx].clone()).collect()
}

/// Mean absolute error. Empty or misaligned inputs yield 0.
#[must_use]
pub fn mean_absolute_error(predictions: &[f64], labels: &[f64]) -> f64 {
    if predictions.is_empty() || predictions.len() != labels.len() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = predictions.len() as f64;
    predictions
        .iter()
        .zip(labels)
        .map(|(pred, label)| (pred - label).abs())
        .sum::<f64>()
        / n
}

/// Root mean squared error. Empty or misaligned inputs yield 0.
#[must_use]
pub fn root_mean_squared_error(predictions: &[f64], labels: &[f64]) -> f64 {
    if predictions.is_empty() || predictions.len() != labels.len() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = predictions.len() as f64;
    (predictions
        .iter()
        .zip(labels)
        .map(|(pred, label)| (pred - label).powi(2))
        .sum::<f64>()
        / n)
        .sqrt()
}

/// Coefficient of determination. A constant label vector scores 1 when fitted
/// exactly and 0 otherwise.
#[must_use]
pub fn r2_score(predictions: &[f64], labels: &[f64]) -> f64 {
    if predictions.is_empty() || predictions.len() != labels.len() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = labels.iter().sum::<f64>() / labels.len() as f64;
    let ss_res: f64 = predictions
        .iter()
        .zip(labels)
        .map(|(pred, label)| (label - pred).powi(2))
        .sum();
    let ss_tot: f64 = labels.iter().map(|label| (label - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}
