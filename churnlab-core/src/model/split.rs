//! Deterministic stratified train/validation split.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::ModelError;

/// Row indices of each side of a split, ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Split row indices so each class keeps its proportion on both sides.
///
/// The same `(labels, test_fraction, seed)` always yields the same split.
/// Every class present must have at least 2 rows.
pub fn stratified_split(labels: &[bool], test_fraction: f64, seed: u64) -> Result<Split, ModelError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ModelError::InvalidSplit(format!(
            "test_fraction must be in (0, 1), got {test_fraction}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut validation = Vec::new();

    for class in [false, true] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == class)
            .map(|(i, _)| i)
            .collect();
        if members.is_empty() {
            continue;
        }
        if members.len() < 2 {
            return Err(ModelError::InvalidSplit(format!(
                "class {} has only {} row(s); at least 2 are needed to stratify",
                u8::from(class),
                members.len()
            )));
        }
        members.shuffle(&mut rng);
        let n_val = ((members.len() as f64 * test_fraction).round() as usize)
            .clamp(1, members.len() - 1);
        validation.extend_from_slice(&members[..n_val]);
        train.extend_from_slice(&members[n_val..]);
    }

    train.sort_unstable();
    validation.sort_unstable();
    Ok(Split { train, validation })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize, positives: usize) -> Vec<bool> {
        (0..n).map(|i| i < positives).collect()
    }

    #[test]
    fn same_seed_same_split() {
        let y = labels(100, 20);
        assert_eq!(stratified_split(&y, 0.25, 42).unwrap(), stratified_split(&y, 0.25, 42).unwrap());
        assert_ne!(stratified_split(&y, 0.25, 42).unwrap(), stratified_split(&y, 0.25, 7).unwrap());
    }

    #[test]
    fn preserves_class_ratio() {
        let y = labels(100, 20);
        let split = stratified_split(&y, 0.25, 42).unwrap();
        assert_eq!(split.validation.len(), 25);
        assert_eq!(split.train.len(), 75);
        let val_pos = split.validation.iter().filter(|&&i| y[i]).count();
        assert_eq!(val_pos, 5);
    }

    #[test]
    fn sides_are_disjoint_and_cover() {
        let y = labels(37, 11);
        let split = stratified_split(&y, 0.3, 1).unwrap();
        let mut all: Vec<usize> = split.train.iter().chain(&split.validation).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn singleton_class_is_rejected() {
        let y = labels(10, 1);
        assert!(matches!(stratified_split(&y, 0.25, 42), Err(ModelError::InvalidSplit(_))));
    }

    #[test]
    fn rejects_bad_fraction() {
        let y = labels(10, 5);
        assert!(stratified_split(&y, 0.0, 42).is_err());
        assert!(stratified_split(&y, 1.0, 42).is_err());
    }
}
