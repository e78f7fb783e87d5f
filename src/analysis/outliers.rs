//! Standard-deviation clipping.
//!
//! A group keeps the values inside `[mean - k*sd, mean + k*sd]` (inclusive),
//! where `sd` is the sample standard deviation of the group.

/// Bounds computed for one group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierBounds {
    pub mean: f64,
    pub std_dev: f64,
    pub lower: f64,
    pub upper: f64,
}

impl OutlierBounds {
    /// Whether `value` lies inside the bounds.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Result of filtering one group.
#[derive(Debug, Clone)]
pub struct FilteredGroup<T> {
    pub kept: Vec<T>,
    pub removed: usize,
    /// `None` for an empty group.
    pub bounds: Option<OutlierBounds>,
}

/// Arithmetic mean; `None` when empty.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator). A single value has zero deviation.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if values.len() < 2 {
        return Some(0.0);
    }
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Compute the clipping bounds of a group.
pub fn bounds(values: &[f64], sigma: f64) -> Option<OutlierBounds> {
    let mean = mean(values)?;
    let std_dev = sample_std_dev(values)?;
    Some(OutlierBounds {
        mean,
        std_dev,
        lower: mean - sigma * std_dev,
        upper: mean + sigma * std_dev,
    })
}

/// Keep the items whose `value` lies within `sigma` standard deviations of the group mean.
///
/// Item order is preserved. An empty group is returned unchanged.
pub fn filter_outliers<T, F>(items: Vec<T>, value: F, sigma: f64) -> FilteredGroup<T>
where
    F: Fn(&T) -> f64,
{
    let values: Vec<f64> = items.iter().map(&value).collect();
    let Some(band) = bounds(&values, sigma) else {
        return FilteredGroup {
            kept: items,
            removed: 0,
            bounds: None,
        };
    };

    let before = items.len();
    let kept: Vec<T> = items
        .into_iter()
        .filter(|item| band.contains(value(item)))
        .collect();

    FilteredGroup {
        removed: before - kept.len(),
        kept,
        bounds: Some(band),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_group_unchanged() {
        let result = filter_outliers(Vec::<f64>::new(), |v| *v, 3.0);
        assert!(result.kept.is_empty());
        assert_eq!(result.removed, 0);
        assert!(result.bounds.is_none());
    }

    #[test]
    fn test_single_value_retained() {
        let result = filter_outliers(vec![420.0], |v| *v, 3.0);
        assert_eq!(result.kept, vec![420.0]);
        assert_eq!(result.removed, 0);
        assert_eq!(result.bounds.unwrap().std_dev, 0.0);
    }

    #[test]
    fn test_constant_group_retained() {
        let result = filter_outliers(vec![5.0; 10], |v| *v, 3.0);
        assert_eq!(result.kept.len(), 10);
    }

    #[test]
    fn test_boundary_values_retained() {
        // mean 0, sample sd exactly 1: +-3 sit on the bounds.
        let mut values = vec![0.0; 17];
        values.push(-3.0);
        values.push(3.0);

        let result = filter_outliers(values, |v| *v, 3.0);
        let bounds = result.bounds.unwrap();
        assert_eq!(bounds.mean, 0.0);
        assert_eq!(bounds.std_dev, 1.0);
        assert_eq!(result.removed, 0);
        assert!(result.kept.contains(&-3.0));
        assert!(result.kept.contains(&3.0));
    }

    #[test]
    fn test_far_value_removed() {
        let mut values = vec![10.0; 20];
        values.push(1000.0);

        let result = filter_outliers(values, |v| *v, 3.0);
        assert_eq!(result.removed, 1);
        assert_eq!(result.kept.len(), 20);
        assert!(!result.kept.contains(&1000.0));
    }

    #[test]
    fn test_kept_values_are_exactly_those_in_band() {
        let values: Vec<f64> = (0..30).map(|i| (i * i) as f64).chain([5000.0]).collect();
        let b = bounds(&values, 3.0).unwrap();
        let expected: Vec<f64> = values.iter().copied().filter(|v| b.contains(*v)).collect();

        let result = filter_outliers(values.clone(), |v| *v, 3.0);
        assert_eq!(result.kept, expected);
        assert_eq!(result.removed, values.len() - expected.len());
    }

    #[test]
    fn test_filter_by_field() {
        let rows = vec![("a", 1.0), ("b", 1.0), ("c", 1.0), ("d", 1.0), ("e", 1.0)];
        let result = filter_outliers(rows, |r| r.1, 3.0);
        assert_eq!(result.kept.len(), 5);
        assert_eq!(result.kept[0].0, "a");
    }
}
