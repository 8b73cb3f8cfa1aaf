/// Result of scaling the coloring attribute onto `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalization {
    /// `(v - min) / (max - min)` per point, in input order.
    Scaled { values: Vec<f64>, min: f64, max: f64 },
    /// Every point carries `value`; there is nothing to scale.
    NoVariance { value: f64 },
}

/// Min-max normalization over the whole attribute set.
///
/// Returns `None` for an empty set. A set whose minimum equals its maximum
/// yields [`Normalization::NoVariance`] instead of dividing by zero. Bounds so
/// far apart that `max - min` overflows are scaled in halves.
pub fn normalize(values: &[f64]) -> Option<Normalization> {
    let (min, max) = values.iter().fold(None, |acc: Option<(f64, f64)>, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })?;

    let range = max - min;
    if range == 0.0 {
        return Some(Normalization::NoVariance { value: min });
    }

    let values = if range.is_finite() {
        values
            .iter()
            .map(|&v| ((v - min) / range).clamp(0.0, 1.0))
            .collect()
    } else {
        let half_range = max / 2.0 - min / 2.0;
        values
            .iter()
            .map(|&v| ((v / 2.0 - min / 2.0) / half_range).clamp(0.0, 1.0))
            .collect()
    };
    Some(Normalization::Scaled { values, min, max })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_min_to_zero_and_max_to_one() {
        let input = [2.0, -1.0, 0.5, 5.0, 3.5];
        match normalize(&input).unwrap() {
            Normalization::Scaled { values, min, max } => {
                assert_eq!(min, -1.0);
                assert_eq!(max, 5.0);
                assert_eq!(values[1], 0.0);
                assert_eq!(values[3], 1.0);
                assert!((values[2] - 0.25).abs() < 1e-12);
                assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
            }
            other => panic!("expected scaled values, got {:?}", other),
        }
    }

    #[test]
    fn constant_attribute_reports_no_variance() {
        let normalized = normalize(&[5.0; 8]).unwrap();
        assert_eq!(normalized, Normalization::NoVariance { value: 5.0 });
    }

    #[test]
    fn extreme_bounds_do_not_overflow() {
        match normalize(&[-1e308, 0.0, 1e308]).unwrap() {
            Normalization::Scaled { values, min, max } => {
                assert_eq!((min, max), (-1e308, 1e308));
                assert_eq!(values, vec![0.0, 0.5, 1.0]);
            }
            other => panic!("expected scaled values, got {:?}", other),
        }
    }

    #[test]
    fn single_value_has_no_variance() {
        assert_eq!(
            normalize(&[-0.3]),
            Some(Normalization::NoVariance { value: -0.3 })
        );
    }

    #[test]
    fn empty_input_has_no_normalization() {
        assert_eq!(normalize(&[]), None);
    }
}
